use crate::config::RipConfig;
use crate::{NetworkId, RouterId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type Metric = u8;

pub const DIRECT_METRIC: Metric = 1;
pub const INFINITY_METRIC: Metric = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RouteStatus {
    Valid,
    Invalid,
    HoldDown,
    Flushed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    pub destination: NetworkId,
    pub metric: Metric,
    /// `None` for directly attached networks.
    pub next_hop: Option<RouterId>,
    pub learned_from: Option<RouterId>,
    pub last_updated: DateTime<Utc>,
    pub status: RouteStatus,
    pub invalidated_at: Option<DateTime<Utc>>,
    pub hold_down_started_at: Option<DateTime<Utc>>,
    /// Metric held when the route entered hold-down.
    pub hold_down_metric: Option<Metric>,
}

impl RouteEntry {
    pub fn direct(destination: NetworkId, now: DateTime<Utc>) -> Self {
        Self {
            destination,
            metric: DIRECT_METRIC,
            next_hop: None,
            learned_from: None,
            last_updated: now,
            status: RouteStatus::Valid,
            invalidated_at: None,
            hold_down_started_at: None,
            hold_down_metric: None,
        }
    }

    pub fn learned(destination: NetworkId, metric: Metric, via: &str, now: DateTime<Utc>) -> Self {
        debug_assert!((DIRECT_METRIC..INFINITY_METRIC).contains(&metric));
        Self {
            destination,
            metric,
            next_hop: Some(via.to_string()),
            learned_from: Some(via.to_string()),
            last_updated: now,
            status: RouteStatus::Valid,
            invalidated_at: None,
            hold_down_started_at: None,
            hold_down_metric: None,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.next_hop.is_none()
    }

    pub fn is_valid(&self) -> bool {
        self.status == RouteStatus::Valid
    }

    pub fn is_learned_from(&self, router: &str) -> bool {
        self.learned_from.as_deref() == Some(router)
    }

    /// Overwrites the path and brings the entry back to Valid.
    pub fn refresh(&mut self, metric: Metric, via: &str, now: DateTime<Utc>) {
        debug_assert!((DIRECT_METRIC..INFINITY_METRIC).contains(&metric));
        self.metric = metric;
        self.next_hop = Some(via.to_string());
        self.learned_from = Some(via.to_string());
        self.last_updated = now;
        self.status = RouteStatus::Valid;
        self.invalidated_at = None;
        self.hold_down_started_at = None;
        self.hold_down_metric = None;
    }

    pub fn invalidate(&mut self, now: DateTime<Utc>) {
        self.metric = INFINITY_METRIC;
        self.status = RouteStatus::Invalid;
        self.invalidated_at = Some(now);
    }

    pub fn start_hold_down(&mut self, now: DateTime<Utc>) {
        self.hold_down_metric = Some(self.metric);
        self.metric = INFINITY_METRIC;
        self.status = RouteStatus::HoldDown;
        self.invalidated_at = Some(now);
        self.hold_down_started_at = Some(now);
    }

    pub fn in_hold_down(&self, config: &RipConfig, now: DateTime<Utc>) -> bool {
        self.status == RouteStatus::HoldDown
            && self
                .hold_down_started_at
                .is_some_and(|started| now - started <= config.hold_down_timer())
    }

    fn withdraw(&mut self, config: &RipConfig, now: DateTime<Utc>) -> TimerTransition {
        let previous_metric = self.metric;
        if config.hold_down_enabled {
            self.start_hold_down(now);
            TimerTransition::HoldDownStarted {
                network: self.destination.clone(),
                previous_metric,
            }
        } else {
            self.invalidate(now);
            TimerTransition::Invalidated {
                network: self.destination.clone(),
                previous_metric,
            }
        }
    }
}

/// Lifecycle change applied to a route by a timer check or a withdrawal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerTransition {
    Invalidated { network: NetworkId, previous_metric: Metric },
    HoldDownStarted { network: NetworkId, previous_metric: Metric },
    HoldDownExpired { network: NetworkId },
    Flushed { network: NetworkId },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingTable {
    entries: BTreeMap<NetworkId, RouteEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: RouteEntry) {
        debug_assert!((DIRECT_METRIC..=INFINITY_METRIC).contains(&entry.metric));
        self.entries.insert(entry.destination.clone(), entry);
    }

    pub fn get(&self, destination: &str) -> Option<&RouteEntry> {
        self.entries.get(destination)
    }

    pub fn get_mut(&mut self, destination: &str) -> Option<&mut RouteEntry> {
        self.entries.get_mut(destination)
    }

    pub fn remove(&mut self, destination: &str) -> Option<RouteEntry> {
        self.entries.remove(destination)
    }

    pub fn contains(&self, destination: &str) -> bool {
        self.entries.contains_key(destination)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in destination order.
    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.entries.values()
    }

    pub fn has_valid_route(&self, destination: &str) -> bool {
        self.get(destination).is_some_and(RouteEntry::is_valid)
    }

    /// Withdraws a learned route right away, as if its invalid timer had
    /// just expired.
    pub fn withdraw(
        &mut self,
        destination: &str,
        config: &RipConfig,
        now: DateTime<Utc>,
    ) -> Option<TimerTransition> {
        let entry = self.entries.get_mut(destination)?;
        if entry.is_direct() || !entry.is_valid() {
            return None;
        }
        Some(entry.withdraw(config, now))
    }

    /// Ages learned routes: Valid -> Invalid (or HoldDown) after the
    /// invalid timer, HoldDown -> Invalid after the hold-down timer, and
    /// removal once the flush timer has run since invalidation. Direct
    /// routes are never aged.
    pub fn check_timers(&mut self, config: &RipConfig, now: DateTime<Utc>) -> Vec<TimerTransition> {
        let mut transitions = Vec::new();
        let mut flushed = Vec::new();

        for entry in self.entries.values_mut().filter(|e| !e.is_direct()) {
            match entry.status {
                RouteStatus::Valid => {
                    if now - entry.last_updated > config.invalid_timer() {
                        transitions.push(entry.withdraw(config, now));
                    }
                }
                RouteStatus::HoldDown => {
                    if !entry.in_hold_down(config, now) {
                        entry.status = RouteStatus::Invalid;
                        entry.hold_down_started_at = None;
                        transitions.push(TimerTransition::HoldDownExpired {
                            network: entry.destination.clone(),
                        });
                    }
                }
                RouteStatus::Invalid | RouteStatus::Flushed => {}
            }

            if matches!(entry.status, RouteStatus::Invalid | RouteStatus::HoldDown)
                && entry
                    .invalidated_at
                    .is_some_and(|at| now - at > config.flush_timer())
            {
                entry.status = RouteStatus::Flushed;
            }

            if entry.status == RouteStatus::Flushed {
                flushed.push(entry.destination.clone());
            }
        }

        for network in flushed {
            self.entries.remove(&network);
            transitions.push(TimerTransition::Flushed { network });
        }

        transitions
    }
}
