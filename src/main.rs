use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};
use rip_sim::clock::RuntimeClock;
use rip_sim::config::{LinkDefinition, RipConfig, RouterDefinition, SchedulerConfig, TopologyConfig};
use rip_sim::events::{FanoutSink, LogEventSink, MemoryEventLog};
use rip_sim::snapshot::SnapshotStore;
use rip_sim::{RipEngine, Scheduler};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder;

#[derive(Parser)]
#[command(name = "rip-sim", about = "Simulate RIP convergence over an in-memory topology")]
struct Cli {
    /// Topology JSON; a four-router demo network is used when omitted
    #[arg(long)]
    topology: Option<PathBuf>,

    /// Simulated run time in seconds
    #[arg(long, default_value_t = 120)]
    duration: u64,

    #[arg(long, overrides_with = "no_split_horizon")]
    split_horizon: bool,

    #[arg(long, overrides_with = "split_horizon")]
    no_split_horizon: bool,

    #[arg(long)]
    poison_reverse: bool,

    #[arg(long)]
    hold_down: bool,

    /// Invalidate a route as soon as its next hop advertises it at 16
    #[arg(long)]
    poison_invalidates: bool,

    /// Flap the link between two routers
    #[arg(long, num_args = 2, value_names = ["ROUTER_A", "ROUTER_B"])]
    flap: Option<Vec<String>>,

    #[arg(long, default_value_t = 5)]
    flaps: usize,

    /// Seconds per down/up cycle
    #[arg(long, default_value_t = 20)]
    flap_period: u64,

    /// Write the final routing tables here as JSON
    #[arg(long)]
    export: Option<PathBuf>,
}

impl Cli {
    fn apply(&self, rip: &mut RipConfig) {
        if self.split_horizon {
            rip.split_horizon = true;
        }
        if self.no_split_horizon {
            rip.split_horizon = false;
        }
        rip.poison_reverse |= self.poison_reverse;
        rip.hold_down_enabled |= self.hold_down;
        rip.poison_invalidates |= self.poison_invalidates;
    }
}

fn demo_topology() -> TopologyConfig {
    TopologyConfig {
        routers: vec![
            RouterDefinition::new("R1", &["10.1.0.0/24"]),
            RouterDefinition::new("R2", &["10.2.0.0/24"]),
            RouterDefinition::new("R3", &["10.3.0.0/24"]),
            RouterDefinition::new("R4", &["10.4.0.0/24", "10.44.0.0/24"]),
        ],
        links: vec![
            LinkDefinition::up("R1", "R2"),
            LinkDefinition::up("R2", "R3"),
            LinkDefinition::up("R3", "R4"),
            LinkDefinition::up("R1", "R3"),
        ],
        defaults: RipConfig::default(),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let mut topology = match &cli.topology {
        Some(path) => TopologyConfig::load(path)?,
        None => demo_topology(),
    };
    cli.apply(&mut topology.defaults);
    for router in &mut topology.routers {
        if let Some(rip) = router.rip.as_mut() {
            cli.apply(rip);
        }
    }

    let rt = Builder::new_multi_thread().enable_all().build()?;

    rt.block_on(async {
        let log = Arc::new(MemoryEventLog::new());
        let sink = FanoutSink::new().with(Arc::new(LogEventSink)).with(log.clone());
        let engine = RipEngine::new(Arc::new(sink), Arc::new(RuntimeClock::new()));

        engine.initialize_topology(&topology).await;
        let sent = engine.send_triggered_update_all().await;
        info!("Initial triggered round reached {} neighbors", sent);

        let scheduler = Scheduler::new(engine.clone(), Arc::new(SnapshotStore::new()), SchedulerConfig::default());
        scheduler.start_tasks().await;

        if let Some(pair) = &cli.flap {
            scheduler
                .spawn_flap_sequence(&pair[0], &pair[1], cli.flaps, Duration::from_secs(cli.flap_period))
                .await;
        }

        tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(cli.duration)) => {
                info!("Simulation time elapsed");
            }
            _ = tokio::signal::ctrl_c() => {
                warn!("Interrupted, shutting down");
            }
        }

        scheduler.shutdown().await;

        let state = scheduler.convergence();
        match state.elapsed_secs {
            Some(secs) if state.converged => println!("Converged after {:.1}s", secs),
            _ => println!("Network not converged"),
        }

        let snapshots = engine.all_router_snapshots().await;
        for snapshot in &snapshots {
            println!(
                "\n{} ({} routes, up {}s)",
                snapshot.router,
                snapshot.route_count,
                (snapshot.timestamp - snapshot.boot_time).num_seconds()
            );
            for route in &snapshot.routes {
                println!(
                    "  {:<18} metric {:>2}  via {:<10} {:?}",
                    route.destination,
                    route.metric,
                    route.next_hop.as_deref().unwrap_or("direct"),
                    route.status
                );
            }
        }
        println!("\n{} events recorded", log.len());

        if let Some(path) = &cli.export {
            let json = serde_json::to_string_pretty(&snapshots)?;
            std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
            info!("Routing tables exported to {}", path.display());
        }

        Ok::<(), anyhow::Error>(())
    })
}
