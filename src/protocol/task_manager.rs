use super::RipEngine;
use crate::config::SchedulerConfig;
use crate::events::{EventPayload, LogEntry, SYSTEM};
use crate::snapshot::SnapshotStore;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Latest result of the convergence check, published on a watch channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConvergenceState {
    pub converged: bool,
    /// Set when the current convergence episode began.
    pub converged_at: Option<DateTime<Utc>>,
    /// Seconds from scheduler start to `converged_at`.
    pub elapsed_secs: Option<f64>,
}

/// Runs the periodic protocol tasks against one engine until shut down.
pub struct Scheduler {
    engine: RipEngine,
    snapshots: Arc<SnapshotStore>,
    config: SchedulerConfig,
    is_running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    convergence_tx: Arc<watch::Sender<ConvergenceState>>,
}

impl Scheduler {
    pub fn new(engine: RipEngine, snapshots: Arc<SnapshotStore>, config: SchedulerConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        let (convergence_tx, _) = watch::channel(ConvergenceState::default());
        Self {
            engine,
            snapshots,
            config,
            is_running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            task_handles: Mutex::new(Vec::new()),
            convergence_tx: Arc::new(convergence_tx),
        }
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::Relaxed)
    }

    pub fn snapshots(&self) -> Arc<SnapshotStore> {
        self.snapshots.clone()
    }

    pub fn convergence(&self) -> ConvergenceState {
        self.convergence_tx.borrow().clone()
    }

    pub fn subscribe_convergence(&self) -> watch::Receiver<ConvergenceState> {
        self.convergence_tx.subscribe()
    }

    /// Starts the update, timer, convergence and snapshot tasks. Calling it
    /// again while running is a no-op.
    pub async fn start_tasks(&self) {
        if self.is_running.swap(true, Ordering::Relaxed) {
            warn!("Scheduler already running");
            return;
        }

        let started_at = self.engine.now();
        let mut handles = self.task_handles.lock().await;

        handles.push(tokio::spawn(update_task(
            self.engine.clone(),
            self.is_running.clone(),
            self.shutdown_tx.subscribe(),
            period(self.config.update_check_interval),
        )));

        handles.push(tokio::spawn(timer_task(
            self.engine.clone(),
            self.is_running.clone(),
            self.shutdown_tx.subscribe(),
            period(self.config.timer_check_interval),
        )));

        handles.push(tokio::spawn(convergence_task(
            self.engine.clone(),
            self.convergence_tx.clone(),
            started_at,
            self.is_running.clone(),
            self.shutdown_tx.subscribe(),
            period(self.config.convergence_check_interval),
        )));

        handles.push(tokio::spawn(snapshot_task(
            self.engine.clone(),
            self.snapshots.clone(),
            self.is_running.clone(),
            self.shutdown_tx.subscribe(),
            period(self.config.snapshot_interval),
        )));

        info!("All protocol tasks started");
    }

    /// Runs a link flap sequence alongside the periodic tasks; it is
    /// cancelled together with them.
    pub async fn spawn_flap_sequence(&self, a: &str, b: &str, flaps: usize, flap_period: Duration) {
        let injector = self.engine.fault_injector();
        let shutdown_rx = self.shutdown_tx.subscribe();
        let (a, b) = (a.to_string(), b.to_string());

        let handle = tokio::spawn(async move {
            if let Err(e) = injector.flap_link(&a, &b, flaps, flap_period, shutdown_rx).await {
                error!("Flap sequence on {}-{} failed: {}", a, b, e);
            }
        });
        self.task_handles.lock().await.push(handle);
    }

    /// Resolves as soon as the network is converged, or `false` on timeout.
    pub async fn wait_for_convergence(&self, timeout: Duration) -> bool {
        let mut rx = self.subscribe_convergence();
        let converged = matches!(
            tokio::time::timeout(timeout, rx.wait_for(|state| state.converged)).await,
            Ok(Ok(_))
        );
        converged
    }

    /// Signals every task and waits for all of them to finish.
    pub async fn shutdown(&self) {
        self.is_running.store(false, Ordering::Relaxed);
        let _ = self.shutdown_tx.send(());

        let handles: Vec<JoinHandle<()>> = self.task_handles.lock().await.drain(..).collect();
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("Protocol task ended abnormally: {}", e);
            }
        }
        info!("All protocol tasks stopped");
    }
}

fn period(secs: u64) -> Duration {
    Duration::from_secs(secs.max(1))
}

async fn update_task(
    engine: RipEngine,
    is_running: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
    every: Duration,
) {
    let mut interval = interval(every);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Update task shutting down");
                break;
            }
            _ = interval.tick() => {
                if !is_running.load(Ordering::Relaxed) {
                    break;
                }

                let sent = engine.send_scheduled_updates_due().await;
                if !sent.is_empty() {
                    debug!("Scheduled updates sent by {:?}", sent);
                }
            }
        }
    }
}

async fn timer_task(
    engine: RipEngine,
    is_running: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
    every: Duration,
) {
    let mut interval = interval(every);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Timer task shutting down");
                break;
            }
            _ = interval.tick() => {
                if !is_running.load(Ordering::Relaxed) {
                    break;
                }

                let transitions = engine.check_all_timers().await;
                if !transitions.is_empty() {
                    debug!("Timer check applied {} route transitions", transitions.len());
                }
            }
        }
    }
}

async fn convergence_task(
    engine: RipEngine,
    convergence_tx: Arc<watch::Sender<ConvergenceState>>,
    started_at: DateTime<Utc>,
    is_running: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
    every: Duration,
) {
    let mut interval = interval(every);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Convergence task shutting down");
                break;
            }
            _ = interval.tick() => {
                if !is_running.load(Ordering::Relaxed) {
                    break;
                }

                let converged = engine.has_network_converged().await;
                let was_converged = convergence_tx.borrow().converged;
                let now = engine.now();

                match (was_converged, converged) {
                    (false, true) => {
                        let elapsed_secs = (now - started_at).num_milliseconds() as f64 / 1000.0;
                        engine.events().record(LogEntry::new(
                            now,
                            SYSTEM,
                            format!("Network converged after {:.1}s", elapsed_secs),
                            EventPayload::ConvergenceReached { elapsed_secs },
                        ));
                        convergence_tx.send_replace(ConvergenceState {
                            converged: true,
                            converged_at: Some(now),
                            elapsed_secs: Some(elapsed_secs),
                        });
                    }
                    (true, false) => {
                        engine.events().record(LogEntry::new(
                            now,
                            SYSTEM,
                            "Network is no longer converged".to_string(),
                            EventPayload::ConvergenceLost,
                        ));
                        convergence_tx.send_replace(ConvergenceState::default());
                    }
                    _ => {}
                }
            }
        }
    }
}

async fn snapshot_task(
    engine: RipEngine,
    store: Arc<SnapshotStore>,
    is_running: Arc<AtomicBool>,
    mut shutdown_rx: broadcast::Receiver<()>,
    every: Duration,
) {
    let mut interval = interval(every);

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!("Snapshot task shutting down");
                break;
            }
            _ = interval.tick() => {
                if !is_running.load(Ordering::Relaxed) {
                    break;
                }

                let events = engine.events();
                for snapshot in engine.all_router_snapshots().await {
                    events.record(LogEntry::new(
                        snapshot.timestamp,
                        &snapshot.router,
                        format!("Snapshot saved with {} routes", snapshot.route_count),
                        EventPayload::SnapshotSaved { route_count: snapshot.route_count },
                    ));
                    store.save(snapshot);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::RuntimeClock;
    use crate::config::{LinkDefinition, RouterDefinition, TopologyConfig};
    use crate::events::{EventKind, MemoryEventLog};

    fn chain() -> TopologyConfig {
        TopologyConfig {
            routers: vec![
                RouterDefinition::new("A", &["NA"]),
                RouterDefinition::new("B", &["NB"]),
                RouterDefinition::new("C", &["NC"]),
            ],
            links: vec![LinkDefinition::up("A", "B"), LinkDefinition::up("B", "C")],
            ..Default::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_updates_alone_converge_a_chain() {
        let log = Arc::new(MemoryEventLog::new());
        let engine = RipEngine::new(log.clone(), Arc::new(RuntimeClock::new()));
        engine.initialize_topology(&chain()).await;

        let scheduler = Scheduler::new(engine.clone(), Arc::new(SnapshotStore::new()), SchedulerConfig::default());
        scheduler.start_tasks().await;
        assert!(scheduler.is_running());

        assert!(scheduler.wait_for_convergence(Duration::from_secs(120)).await);
        let state = scheduler.convergence();
        assert!(state.converged);
        assert!(state.elapsed_secs.is_some());

        scheduler.shutdown().await;
        assert!(!scheduler.is_running());
        assert_eq!(log.of_kind(EventKind::ConvergenceReached).len(), 1);
        assert_eq!(engine.route("A", "NC").await.unwrap().metric, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_task_stores_every_router() {
        let log = Arc::new(MemoryEventLog::new());
        let engine = RipEngine::new(log.clone(), Arc::new(RuntimeClock::new()));
        engine.initialize_topology(&chain()).await;
        let store = Arc::new(SnapshotStore::new());

        let scheduler = Scheduler::new(engine, store.clone(), SchedulerConfig::default());
        scheduler.start_tasks().await;
        tokio::time::sleep(Duration::from_secs(25)).await;
        scheduler.shutdown().await;

        assert_eq!(store.snapshots(Some("B"), None).len(), 3);
        assert!(store.latest("A").is_some());
        assert_eq!(log.of_kind(EventKind::SnapshotSaved).len(), 9);
    }
}
