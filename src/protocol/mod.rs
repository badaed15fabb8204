pub mod messages;
pub mod route_manager;
pub mod routing_table;
pub mod task_manager;

pub use messages::*;
pub use route_manager::UpdateOutcome;
pub use routing_table::*;
pub use task_manager::{ConvergenceState, Scheduler};

use crate::clock::Clock;
use crate::config::{RipConfig, TopologyConfig};
use crate::error::{RipError, RipResult};
use crate::events::{EventPayload, EventSink, InvalidationReason, LogEntry};
use crate::fault::FaultInjector;
use crate::network::Topology;
use crate::snapshot::RouterSnapshot;
use crate::{NetworkId, RouterId, SharedTopology};
use chrono::{DateTime, Utc};
use log::{debug, info};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Distance-vector engine over a shared topology.
///
/// Every public operation takes the topology lock once and holds it until
/// the operation is complete, so operations never interleave. Cloning the
/// engine shares the same topology, sink and clock.
#[derive(Clone)]
pub struct RipEngine {
    topology: SharedTopology,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl RipEngine {
    pub fn new(events: Arc<dyn EventSink>, clock: Arc<dyn Clock>) -> Self {
        Self {
            topology: Arc::new(RwLock::new(Topology::new())),
            events,
            clock,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn events(&self) -> Arc<dyn EventSink> {
        self.events.clone()
    }

    pub fn fault_injector(&self) -> FaultInjector {
        FaultInjector::new(self.topology.clone(), self.events.clone(), self.clock.clone())
    }

    pub async fn initialize_topology(&self, config: &TopologyConfig) {
        let now = self.now();
        let mut topology = self.topology.write().await;
        topology.initialize(config, now);

        for router in topology.routers() {
            let direct_networks: Vec<NetworkId> = router.direct_networks.iter().cloned().collect();
            self.emit(
                now,
                &router.id,
                format!("Router booted with networks [{}]", direct_networks.join(", ")),
                EventPayload::RouterBoot {
                    direct_networks,
                    interface_count: router.interfaces.len(),
                },
            );
        }

        info!(
            "Topology initialized with {} routers and {} links",
            config.routers.len(),
            config.links.len()
        );
    }

    pub async fn topology_snapshot(&self) -> TopologyConfig {
        self.topology.read().await.snapshot()
    }

    pub async fn router_ids(&self) -> Vec<RouterId> {
        self.topology.read().await.router_ids()
    }

    pub async fn active_neighbors(&self, name: &str) -> Vec<RouterId> {
        self.topology.read().await.active_neighbors(name)
    }

    pub async fn all_networks(&self) -> BTreeSet<NetworkId> {
        self.topology.read().await.all_networks()
    }

    pub async fn route(&self, router: &str, network: &str) -> Option<RouteEntry> {
        let topology = self.topology.read().await;
        topology.router(router)?.routing_table.get(network).cloned()
    }

    /// Adjusts one router's protocol knobs in place.
    pub async fn configure_router<F>(&self, name: &str, apply: F) -> RipResult<()>
    where
        F: FnOnce(&mut RipConfig),
    {
        let mut topology = self.topology.write().await;
        let router = topology
            .router_mut(name)
            .ok_or_else(|| RipError::UnknownRouter(name.to_string()))?;
        apply(&mut router.config);
        debug!("{}: configuration now {:?}", name, router.config);
        Ok(())
    }

    pub async fn create_update_message(
        &self,
        source: &str,
        destination: &str,
        triggered: bool,
    ) -> Option<UpdateMessage> {
        let now = self.now();
        let topology = self.topology.read().await;
        route_manager::create_update_message(&topology, source, destination, triggered, now)
    }

    pub async fn process_received_update(&self, message: &UpdateMessage) -> RipResult<UpdateOutcome> {
        let now = self.now();
        let mut topology = self.topology.write().await;
        route_manager::process_received_update(&mut topology, message, now, self.events.as_ref())
    }

    /// Sends to every active neighbor right away. Returns the number of
    /// neighbors reached.
    pub async fn send_triggered_update(&self, name: &str) -> RipResult<usize> {
        let now = self.now();
        let mut topology = self.topology.write().await;
        self.broadcast_update(&mut topology, name, true, now)
    }

    pub async fn send_scheduled_update(&self, name: &str) -> RipResult<usize> {
        let now = self.now();
        let mut topology = self.topology.write().await;
        self.broadcast_update(&mut topology, name, false, now)
    }

    /// One triggered round from every router, in name order.
    pub async fn send_triggered_update_all(&self) -> usize {
        let now = self.now();
        let mut topology = self.topology.write().await;
        let mut sent = 0;
        for name in topology.router_ids() {
            sent += self.broadcast_update(&mut topology, &name, true, now).unwrap_or(0);
        }
        sent
    }

    /// Sends a scheduled update from each router whose update interval has
    /// elapsed and returns the routers that sent.
    pub async fn send_scheduled_updates_due(&self) -> Vec<RouterId> {
        let now = self.now();
        let mut topology = self.topology.write().await;
        let due: Vec<RouterId> = topology
            .routers()
            .filter(|router| router.is_update_due(now))
            .map(|router| router.id.clone())
            .collect();

        for name in &due {
            if let Err(e) = self.broadcast_update(&mut topology, name, false, now) {
                debug!("Scheduled update from {} skipped: {}", name, e);
            }
        }
        due
    }

    pub async fn check_router_timers(&self, name: &str) -> RipResult<Vec<TimerTransition>> {
        let now = self.now();
        let mut topology = self.topology.write().await;
        let router = topology
            .router_mut(name)
            .ok_or_else(|| RipError::UnknownRouter(name.to_string()))?;
        let transitions = router.check_timers(now);
        self.emit_transitions(now, name, &transitions);
        Ok(transitions)
    }

    pub async fn check_all_timers(&self) -> Vec<(RouterId, TimerTransition)> {
        let now = self.now();
        let mut topology = self.topology.write().await;
        let mut all = Vec::new();
        for router in topology.routers_mut() {
            let transitions = router.check_timers(now);
            self.emit_transitions(now, &router.id, &transitions);
            all.extend(transitions.into_iter().map(|t| (router.id.clone(), t)));
        }
        all
    }

    pub async fn router_snapshot(&self, name: &str) -> Option<RouterSnapshot> {
        let now = self.now();
        let topology = self.topology.read().await;
        topology.router(name).map(|router| router.snapshot(now))
    }

    pub async fn all_router_snapshots(&self) -> Vec<RouterSnapshot> {
        let now = self.now();
        let topology = self.topology.read().await;
        topology.routers().map(|router| router.snapshot(now)).collect()
    }

    /// Every router holds a Valid route to every known network.
    pub async fn has_network_converged(&self) -> bool {
        let topology = self.topology.read().await;
        let networks = topology.all_networks();
        topology.routers().all(|router| {
            networks
                .iter()
                .all(|network| router.routing_table.has_valid_route(network))
        })
    }

    fn broadcast_update(
        &self,
        topology: &mut Topology,
        name: &str,
        triggered: bool,
        now: DateTime<Utc>,
    ) -> RipResult<usize> {
        if topology.router(name).is_none() {
            return Err(RipError::UnknownRouter(name.to_string()));
        }

        let neighbors = topology.active_neighbors(name);
        let kind = if triggered { "triggered" } else { "scheduled" };

        for neighbor in &neighbors {
            let Some(message) = route_manager::create_update_message(topology, name, neighbor, triggered, now) else {
                continue;
            };

            self.emit(
                now,
                name,
                format!("Sent {} update to {} with {} routes", kind, neighbor, message.routes.len()),
                EventPayload::UpdateSent {
                    destination: neighbor.clone(),
                    route_count: message.routes.len(),
                    triggered,
                },
            );

            route_manager::process_received_update(topology, &message, now, self.events.as_ref())?;
        }

        if let Some(router) = topology.router_mut(name) {
            router.last_update_sent = Some(now);
        }
        Ok(neighbors.len())
    }

    fn emit_transitions(&self, now: DateTime<Utc>, router: &str, transitions: &[TimerTransition]) {
        for transition in transitions {
            let (message, payload) = route_manager::describe_transition(transition, InvalidationReason::Timeout);
            self.emit(now, router, message, payload);
        }
    }

    fn emit(&self, now: DateTime<Utc>, router: &str, message: String, payload: EventPayload) {
        self.events.record(LogEntry::new(now, router, message, payload));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::{LinkDefinition, RouterDefinition};
    use crate::events::{EventKind, MemoryEventLog};

    fn engine() -> (RipEngine, Arc<MemoryEventLog>, Arc<ManualClock>) {
        let log = Arc::new(MemoryEventLog::new());
        let clock = Arc::new(ManualClock::default());
        (RipEngine::new(log.clone(), clock.clone()), log, clock)
    }

    fn two_routers() -> TopologyConfig {
        TopologyConfig {
            routers: vec![RouterDefinition::new("A", &["NA"]), RouterDefinition::new("B", &["NB"])],
            links: vec![LinkDefinition::up("A", "B")],
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn boot_logs_one_event_per_router() {
        let (engine, log, _) = engine();
        engine.initialize_topology(&two_routers()).await;

        assert_eq!(log.of_kind(EventKind::RouterBoot).len(), 2);
        assert!(!engine.has_network_converged().await);
    }

    #[tokio::test]
    async fn triggered_round_converges_two_routers() {
        let (engine, log, _) = engine();
        engine.initialize_topology(&two_routers()).await;

        assert_eq!(engine.send_triggered_update("A").await, Ok(1));
        assert_eq!(engine.send_triggered_update("B").await, Ok(1));

        let nb = engine.route("A", "NB").await.unwrap();
        assert_eq!(nb.metric, 2);
        assert_eq!(nb.next_hop.as_deref(), Some("B"));
        assert!(engine.has_network_converged().await);
        assert_eq!(log.of_kind(EventKind::UpdateSent).len(), 2);
    }

    #[tokio::test]
    async fn unknown_router_is_an_error() {
        let (engine, _, _) = engine();
        engine.initialize_topology(&two_routers()).await;

        assert_eq!(
            engine.send_triggered_update("Z").await,
            Err(RipError::UnknownRouter("Z".into()))
        );
        assert!(engine.check_router_timers("Z").await.is_err());
        assert!(engine.configure_router("Z", |_| {}).await.is_err());
        assert!(engine.router_snapshot("Z").await.is_none());
    }

    #[tokio::test]
    async fn scheduled_updates_respect_the_interval() {
        let (engine, _, clock) = engine();
        engine.initialize_topology(&two_routers()).await;

        assert_eq!(engine.send_scheduled_updates_due().await.len(), 2);
        clock.advance_secs(10);
        assert!(engine.send_scheduled_updates_due().await.is_empty());
        clock.advance_secs(20);
        assert_eq!(engine.send_scheduled_updates_due().await, vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn timer_expiry_is_logged_with_timeout_reason() {
        let (engine, log, clock) = engine();
        engine.initialize_topology(&two_routers()).await;
        engine.send_triggered_update_all().await;

        clock.advance_secs(181);
        let transitions = engine.check_all_timers().await;
        assert_eq!(transitions.len(), 2);
        assert!(matches!(
            log.of_kind(EventKind::RouteInvalidated)[0].payload,
            EventPayload::RouteInvalidated { reason: InvalidationReason::Timeout, .. }
        ));
        assert!(!engine.has_network_converged().await);
    }

    #[tokio::test]
    async fn configure_router_changes_only_that_router() {
        let (engine, _, _) = engine();
        engine.initialize_topology(&two_routers()).await;

        engine
            .configure_router("A", |rip| rip.poison_reverse = true)
            .await
            .unwrap();

        let snapshot = engine.topology_snapshot().await;
        let rip_of = |name: &str| {
            snapshot
                .routers
                .iter()
                .find(|r| r.name == name)
                .and_then(|r| r.rip.clone())
                .unwrap()
        };
        assert!(rip_of("A").poison_reverse);
        assert!(!rip_of("B").poison_reverse);
    }
}
