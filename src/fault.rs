//! Administrative faults: disabling attached networks and taking links
//! down, plus scripted link flapping.

use crate::SharedTopology;
use crate::clock::Clock;
use crate::error::{RipError, RipResult};
use crate::events::{EventPayload, EventSink, InvalidationReason, LogEntry};
use crate::network::{LinkStatus, Topology};
use crate::protocol::{INFINITY_METRIC, RouteEntry};
use crate::{NetworkId, RouterId};
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

/// Shares the engine's topology lock, so a fault is applied atomically with
/// respect to updates and timer checks.
#[derive(Clone)]
pub struct FaultInjector {
    topology: SharedTopology,
    events: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
}

impl FaultInjector {
    pub fn new(topology: SharedTopology, events: Arc<dyn EventSink>, clock: Arc<dyn Clock>) -> Self {
        Self { topology, events, clock }
    }

    /// Poisons the router's own route to `network`. The route stays in the
    /// table at infinity until the network is enabled again.
    pub async fn disable_direct_network(&self, router: &str, network: &str) -> RipResult<()> {
        let now = self.clock.now();
        let mut topology = self.topology.write().await;
        check_direct_network(&topology, router, network)?;
        topology.mark_network_disabled(router, network);

        let Some(entry) = topology
            .router_mut(router)
            .and_then(|r| r.routing_table.get_mut(network))
        else {
            return Ok(());
        };
        if !entry.is_direct() {
            return Ok(());
        }

        let previous_metric = entry.metric;
        entry.invalidate(now);

        self.events.record(LogEntry::new(
            now,
            router,
            format!("Direct network {} disabled, metric set to {}", network, INFINITY_METRIC),
            EventPayload::RouteInvalidated {
                network: network.to_string(),
                previous_metric,
                reason: InvalidationReason::DirectNetworkDisabled,
            },
        ));
        Ok(())
    }

    /// Restores the direct route at metric 1, replacing whatever path the
    /// router may hold for the network.
    pub async fn enable_direct_network(&self, router: &str, network: &str) -> RipResult<()> {
        let now = self.clock.now();
        let mut topology = self.topology.write().await;
        check_direct_network(&topology, router, network)?;
        topology.mark_network_enabled(router, network);

        if let Some(r) = topology.router_mut(router) {
            r.routing_table.insert(RouteEntry::direct(network.to_string(), now));
        }

        self.events.record(LogEntry::new(
            now,
            router,
            format!("Direct network {} re-enabled", network),
            EventPayload::DirectNetworkEnabled {
                network: network.to_string(),
            },
        ));
        Ok(())
    }

    pub async fn is_direct_network_enabled(&self, router: &str, network: &str) -> bool {
        self.topology.read().await.is_network_enabled(router, network)
    }

    pub async fn disabled_networks(&self, router: &str) -> Vec<NetworkId> {
        self.topology.read().await.disabled_networks(router)
    }

    pub async fn set_link_down(&self, a: &str, b: &str) -> RipResult<()> {
        self.set_link(a, b, LinkStatus::Down).await
    }

    pub async fn set_link_up(&self, a: &str, b: &str) -> RipResult<()> {
        self.set_link(a, b, LinkStatus::Up).await
    }

    async fn set_link(&self, a: &str, b: &str, status: LinkStatus) -> RipResult<()> {
        let now = self.clock.now();
        let mut topology = self.topology.write().await;
        let was_up = topology.is_link_up(a, b);
        if !topology.set_link_status(a, b, status) {
            return Err(RipError::UnknownLink(a.to_string(), b.to_string()));
        }
        if was_up == (status == LinkStatus::Up) {
            debug!("Link {}-{} already {:?}", a, b, status);
            return Ok(());
        }

        let (router_a, router_b): (RouterId, RouterId) = (a.to_string(), b.to_string());
        let (message, payload) = match status {
            LinkStatus::Up => (format!("Link {}-{} is UP", a, b), EventPayload::LinkUp { router_a, router_b }),
            LinkStatus::Down => (format!("Link {}-{} is DOWN", a, b), EventPayload::LinkDown { router_a, router_b }),
        };
        self.events.record(LogEntry::new(now, a, message, payload));
        Ok(())
    }

    /// Takes the link down for half of `period` and back up for the other
    /// half, `flaps` times. Stops early on shutdown and always leaves the
    /// link up. Returns the number of completed flaps.
    pub async fn flap_link(
        &self,
        a: &str,
        b: &str,
        flaps: usize,
        period: Duration,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> RipResult<usize> {
        let half = period / 2;
        info!("Flapping link {}-{} {} times every {:?}", a, b, flaps, period);

        for flap in 0..flaps {
            self.set_link_down(a, b).await?;
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    self.set_link_up(a, b).await?;
                    debug!("Flap sequence on {}-{} interrupted after {} flaps", a, b, flap);
                    return Ok(flap);
                }
                _ = tokio::time::sleep(half) => {}
            }

            self.set_link_up(a, b).await?;
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Flap sequence on {}-{} interrupted after {} flaps", a, b, flap + 1);
                    return Ok(flap + 1);
                }
                _ = tokio::time::sleep(half) => {}
            }
        }

        info!("Flap sequence on {}-{} complete", a, b);
        Ok(flaps)
    }
}

fn check_direct_network(topology: &Topology, router: &str, network: &str) -> RipResult<()> {
    let r = topology
        .router(router)
        .ok_or_else(|| RipError::UnknownRouter(router.to_string()))?;
    if r.is_direct_network(network) {
        Ok(())
    } else {
        Err(RipError::UnknownNetwork {
            router: router.to_string(),
            network: network.to_string(),
        })
    }
}
