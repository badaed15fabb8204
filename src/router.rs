use crate::config::{InterfaceDefinition, RipConfig, RouterDefinition};
use crate::protocol::{RouteEntry, RoutingTable, TimerTransition};
use crate::snapshot::{RouteSnapshot, RouterSnapshot};
use crate::{NetworkId, RouterId};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

#[derive(Debug, Clone)]
pub struct Router {
    pub id: RouterId,
    pub direct_networks: BTreeSet<NetworkId>,
    pub routing_table: RoutingTable,
    /// Derived from link status by the topology; never authoritative.
    pub neighbors: BTreeSet<RouterId>,
    pub config: RipConfig,
    pub interfaces: Vec<InterfaceDefinition>,
    pub boot_time: DateTime<Utc>,
    pub last_update_sent: Option<DateTime<Utc>>,
}

impl Router {
    pub fn new(definition: &RouterDefinition, config: RipConfig, now: DateTime<Utc>) -> Self {
        let direct_networks: BTreeSet<NetworkId> = definition.direct_networks.iter().cloned().collect();

        let mut routing_table = RoutingTable::new();
        for network in &direct_networks {
            routing_table.insert(RouteEntry::direct(network.clone(), now));
        }

        Self {
            id: definition.name.clone(),
            direct_networks,
            routing_table,
            neighbors: BTreeSet::new(),
            config,
            interfaces: definition.interfaces.clone(),
            boot_time: now,
            last_update_sent: None,
        }
    }

    pub fn is_direct_network(&self, network: &str) -> bool {
        self.direct_networks.contains(network)
    }

    /// A router that has never sent is always due.
    pub fn is_update_due(&self, now: DateTime<Utc>) -> bool {
        self.last_update_sent
            .is_none_or(|sent| now - sent >= self.config.update_interval())
    }

    pub fn check_timers(&mut self, now: DateTime<Utc>) -> Vec<TimerTransition> {
        self.routing_table.check_timers(&self.config, now)
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> RouterSnapshot {
        let routes: Vec<RouteSnapshot> = self.routing_table.iter().map(RouteSnapshot::from).collect();
        RouterSnapshot {
            router: self.id.clone(),
            timestamp: now,
            boot_time: self.boot_time,
            route_count: routes.len(),
            routes,
        }
    }

    pub fn definition(&self) -> RouterDefinition {
        RouterDefinition {
            name: self.id.clone(),
            direct_networks: self.direct_networks.iter().cloned().collect(),
            interfaces: self.interfaces.clone(),
            rip: Some(self.config.clone()),
        }
    }
}
