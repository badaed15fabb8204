use super::{Metric, RouteEntry, RouteStatus};
use crate::{NetworkId, RouterId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One route as the sender advertises it to a particular neighbor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisedRoute {
    pub destination: NetworkId,
    pub metric: Metric,
    /// Next hop from the sender's point of view; `None` if direct.
    pub next_hop: Option<RouterId>,
    pub status: RouteStatus,
}

impl AdvertisedRoute {
    pub fn from_entry(entry: &RouteEntry) -> Self {
        Self {
            destination: entry.destination.clone(),
            metric: entry.metric,
            next_hop: entry.next_hop.clone(),
            status: entry.status,
        }
    }
}

/// Built and consumed within a single send; never queued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateMessage {
    pub source: RouterId,
    pub destination: RouterId,
    pub timestamp: DateTime<Utc>,
    pub triggered: bool,
    pub routes: Vec<AdvertisedRoute>,
}

impl UpdateMessage {
    pub fn route(&self, destination: &str) -> Option<&AdvertisedRoute> {
        self.routes.iter().find(|route| route.destination == destination)
    }
}
