use crate::protocol::{Metric, RouteEntry, RouteStatus};
use crate::{NetworkId, RouterId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteSnapshot {
    pub destination: NetworkId,
    pub metric: Metric,
    /// `None` for a directly attached network.
    pub next_hop: Option<RouterId>,
    pub status: RouteStatus,
    pub last_updated: DateTime<Utc>,
}

impl From<&RouteEntry> for RouteSnapshot {
    fn from(entry: &RouteEntry) -> Self {
        Self {
            destination: entry.destination.clone(),
            metric: entry.metric,
            next_hop: entry.next_hop.clone(),
            status: entry.status,
            last_updated: entry.last_updated,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterSnapshot {
    pub router: RouterId,
    pub timestamp: DateTime<Utc>,
    pub boot_time: DateTime<Utc>,
    pub routes: Vec<RouteSnapshot>,
    pub route_count: usize,
}

impl RouterSnapshot {
    pub fn route(&self, destination: &str) -> Option<&RouteSnapshot> {
        self.routes.iter().find(|route| route.destination == destination)
    }
}

/// In-memory store the snapshot task writes to.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    snapshots: Mutex<Vec<RouterSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save(&self, snapshot: RouterSnapshot) {
        self.lock().push(snapshot);
    }

    /// Oldest first, optionally filtered by router and start time.
    pub fn snapshots(&self, router: Option<&str>, since: Option<DateTime<Utc>>) -> Vec<RouterSnapshot> {
        let mut matching: Vec<RouterSnapshot> = self
            .lock()
            .iter()
            .filter(|s| router.is_none_or(|r| s.router == r))
            .filter(|s| since.is_none_or(|t| s.timestamp >= t))
            .cloned()
            .collect();
        matching.sort_by_key(|s| s.timestamp);
        matching
    }

    pub fn latest(&self, router: &str) -> Option<RouterSnapshot> {
        self.lock()
            .iter()
            .filter(|s| s.router == router)
            .max_by_key(|s| s.timestamp)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<RouterSnapshot>> {
        self.snapshots.lock().unwrap_or_else(|e| e.into_inner())
    }
}
