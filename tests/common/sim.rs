use rip_sim::RipEngine;
use rip_sim::clock::ManualClock;
use rip_sim::config::TopologyConfig;
use rip_sim::events::MemoryEventLog;
use rip_sim::fault::FaultInjector;
use rip_sim::protocol::{Metric, RouteEntry};
use std::sync::Arc;

/// Engine driven by a manual clock, one update interval per tick.
pub struct SimNetwork {
    pub engine: RipEngine,
    pub log: Arc<MemoryEventLog>,
    pub clock: Arc<ManualClock>,
}

impl SimNetwork {
    pub async fn create(config: TopologyConfig) -> SimNetwork {
        let log = Arc::new(MemoryEventLog::new());
        let clock = Arc::new(ManualClock::default());
        let engine = RipEngine::new(log.clone(), clock.clone());
        engine.initialize_topology(&config).await;
        SimNetwork { engine, log, clock }
    }

    pub fn faults(&self) -> FaultInjector {
        self.engine.fault_injector()
    }

    /// One full triggered round from every router.
    pub async fn round(&self) {
        self.engine.send_triggered_update_all().await;
    }

    pub async fn rounds(&self, n: usize) {
        for _ in 0..n {
            self.round().await;
        }
    }

    /// Advances one update interval, sends due updates, then ages routes.
    pub async fn tick(&self) {
        self.clock.advance_secs(30);
        self.engine.send_scheduled_updates_due().await;
        self.engine.check_all_timers().await;
    }

    pub async fn tick_n(&self, n: usize) {
        for _ in 0..n {
            self.tick().await;
        }
    }

    /// Moves time forward and runs a timer check, sending nothing.
    pub async fn age(&self, secs: i64) {
        self.clock.advance_secs(secs);
        self.engine.check_all_timers().await;
    }

    pub async fn route(&self, router: &str, network: &str) -> RouteEntry {
        self.engine
            .route(router, network)
            .await
            .unwrap_or_else(|| panic!("No route from {router} to {network}"))
    }

    pub async fn metric_to(&self, router: &str, network: &str) -> Metric {
        self.route(router, network).await.metric
    }

    pub async fn next_hop(&self, router: &str, network: &str) -> String {
        self.route(router, network)
            .await
            .next_hop
            .unwrap_or_else(|| "direct".to_string())
    }

    pub async fn all_metrics(&self) -> Vec<Metric> {
        self.engine
            .all_router_snapshots()
            .await
            .into_iter()
            .flat_map(|snapshot| snapshot.routes.into_iter().map(|route| route.metric))
            .collect()
    }
}
