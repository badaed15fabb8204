//! Protocol events and the sinks that observe them.
//!
//! The engine only produces events. Formatting and storage belong to
//! whichever [`EventSink`] it was built with.

use crate::protocol::Metric;
use crate::{NetworkId, RouterId};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Router name used for events not tied to a single router.
pub const SYSTEM: &str = "SYSTEM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    UpdateSent,
    UpdateReceived,
    RouteInstalled,
    RouteChanged,
    RouteInvalidated,
    HoldDownStarted,
    HoldDownExpired,
    RouteFlushed,
    LinkUp,
    LinkDown,
    DirectNetworkEnabled,
    RouterBoot,
    SnapshotSaved,
    ConvergenceReached,
    ConvergenceLost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidationReason {
    Timeout,
    PoisonReceived,
    DirectNetworkDisabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    UpdateSent {
        destination: RouterId,
        route_count: usize,
        triggered: bool,
    },
    UpdateReceived {
        source: RouterId,
        route_count: usize,
    },
    RouteInstalled {
        network: NetworkId,
        metric: Metric,
        next_hop: RouterId,
    },
    RouteChanged {
        network: NetworkId,
        old_metric: Metric,
        new_metric: Metric,
        next_hop: RouterId,
        improved: bool,
    },
    RouteInvalidated {
        network: NetworkId,
        previous_metric: Metric,
        reason: InvalidationReason,
    },
    HoldDownStarted {
        network: NetworkId,
        previous_metric: Metric,
    },
    HoldDownExpired {
        network: NetworkId,
    },
    RouteFlushed {
        network: NetworkId,
    },
    LinkUp {
        router_a: RouterId,
        router_b: RouterId,
    },
    LinkDown {
        router_a: RouterId,
        router_b: RouterId,
    },
    DirectNetworkEnabled {
        network: NetworkId,
    },
    RouterBoot {
        direct_networks: Vec<NetworkId>,
        interface_count: usize,
    },
    SnapshotSaved {
        route_count: usize,
    },
    ConvergenceReached {
        elapsed_secs: f64,
    },
    ConvergenceLost,
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::UpdateSent { .. } => EventKind::UpdateSent,
            EventPayload::UpdateReceived { .. } => EventKind::UpdateReceived,
            EventPayload::RouteInstalled { .. } => EventKind::RouteInstalled,
            EventPayload::RouteChanged { .. } => EventKind::RouteChanged,
            EventPayload::RouteInvalidated { .. } => EventKind::RouteInvalidated,
            EventPayload::HoldDownStarted { .. } => EventKind::HoldDownStarted,
            EventPayload::HoldDownExpired { .. } => EventKind::HoldDownExpired,
            EventPayload::RouteFlushed { .. } => EventKind::RouteFlushed,
            EventPayload::LinkUp { .. } => EventKind::LinkUp,
            EventPayload::LinkDown { .. } => EventKind::LinkDown,
            EventPayload::DirectNetworkEnabled { .. } => EventKind::DirectNetworkEnabled,
            EventPayload::RouterBoot { .. } => EventKind::RouterBoot,
            EventPayload::SnapshotSaved { .. } => EventKind::SnapshotSaved,
            EventPayload::ConvergenceReached { .. } => EventKind::ConvergenceReached,
            EventPayload::ConvergenceLost => EventKind::ConvergenceLost,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub router: RouterId,
    pub message: String,
    pub payload: EventPayload,
}

impl LogEntry {
    pub fn new(timestamp: DateTime<Utc>, router: &str, message: String, payload: EventPayload) -> Self {
        Self {
            timestamp,
            router: router.to_string(),
            message,
            payload,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

pub trait EventSink: Send + Sync {
    fn record(&self, entry: LogEntry);
}

/// Forwards events to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn record(&self, entry: LogEntry) {
        match entry.kind() {
            EventKind::UpdateSent | EventKind::UpdateReceived | EventKind::SnapshotSaved => {
                debug!("[{}] {:?}: {}", entry.router, entry.kind(), entry.message);
            }
            EventKind::LinkDown | EventKind::RouteFlushed | EventKind::ConvergenceLost => {
                warn!("[{}] {:?}: {}", entry.router, entry.kind(), entry.message);
            }
            _ => {
                info!("[{}] {:?}: {}", entry.router, entry.kind(), entry.message);
            }
        }
    }
}

/// Keeps every event in memory for later queries.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Oldest first, optionally filtered by router and start time.
    pub fn logs(&self, router: Option<&str>, since: Option<DateTime<Utc>>) -> Vec<LogEntry> {
        let mut matching: Vec<LogEntry> = self
            .lock()
            .iter()
            .filter(|e| router.is_none_or(|r| e.router == r))
            .filter(|e| since.is_none_or(|t| e.timestamp >= t))
            .cloned()
            .collect();
        matching.sort_by_key(|e| e.timestamp);
        matching
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<LogEntry> {
        self.lock().iter().filter(|e| e.kind() == kind).cloned().collect()
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

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<LogEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EventSink for MemoryEventLog {
    fn record(&self, entry: LogEntry) {
        self.lock().push(entry);
    }
}

/// Delivers each event to every inner sink.
#[derive(Default, Clone)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl EventSink for FanoutSink {
    fn record(&self, entry: LogEntry) {
        if let Some((last, rest)) = self.sinks.split_last() {
            for sink in rest {
                sink.record(entry.clone());
            }
            last.record(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn payload_serializes_with_kind_tag() {
        let payload = EventPayload::RouteInstalled {
            network: "NB".into(),
            metric: 2,
            next_hop: "B".into(),
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["kind"], "route_installed");
        assert_eq!(json["metric"], 2);
        assert_eq!(payload.kind(), EventKind::RouteInstalled);
    }

    #[test]
    fn memory_log_filters_by_router_and_time() {
        let t0 = Utc::now();
        let log = MemoryEventLog::new();
        log.record(LogEntry::new(t0, "A", "a".into(), EventPayload::ConvergenceLost));
        log.record(LogEntry::new(
            t0 + Duration::seconds(5),
            "B",
            "b".into(),
            EventPayload::RouteFlushed { network: "NA".into() },
        ));

        assert_eq!(log.logs(Some("A"), None).len(), 1);
        assert_eq!(log.logs(None, Some(t0 + Duration::seconds(1))).len(), 1);
        assert_eq!(log.of_kind(EventKind::RouteFlushed).len(), 1);
        log.clear();
        assert!(log.is_empty());
    }

    #[test]
    fn fanout_reaches_every_sink() {
        let first = Arc::new(MemoryEventLog::new());
        let second = Arc::new(MemoryEventLog::new());
        let fanout = FanoutSink::new()
            .with(first.clone())
            .with(Arc::new(LogEventSink))
            .with(second.clone());

        fanout.record(LogEntry::new(Utc::now(), SYSTEM, "x".into(), EventPayload::ConvergenceLost));

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
    }
}
