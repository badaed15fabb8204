use super::{Link, LinkStatus};
use crate::config::{LinkDefinition, TopologyConfig};
use crate::router::Router;
use crate::{NetworkId, RouterId};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

/// Routers, links and the fault injector's record of disabled direct
/// networks. Owned by the engine behind a single lock.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    routers: BTreeMap<RouterId, Router>,
    links: Vec<Link>,
    defaults: crate::config::RipConfig,
    disabled_networks: BTreeMap<RouterId, BTreeSet<NetworkId>>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces everything. Links naming unknown routers are kept (they can
    /// never carry traffic) so that the snapshot reflects the input.
    pub fn initialize(&mut self, config: &TopologyConfig, now: DateTime<Utc>) {
        self.routers.clear();
        self.links.clear();
        self.disabled_networks.clear();
        self.defaults = config.defaults.clone();

        for definition in &config.routers {
            let rip = config.rip_config_for(definition);
            let router = Router::new(definition, rip, now);
            self.routers.insert(router.id.clone(), router);
        }

        for LinkDefinition { router_a, router_b, status } in &config.links {
            self.links.push(Link::new(router_a.clone(), router_b.clone(), *status));
        }

        let ids: Vec<RouterId> = self.routers.keys().cloned().collect();
        for id in ids {
            self.refresh_neighbors(&id);
        }
    }

    pub fn router(&self, name: &str) -> Option<&Router> {
        self.routers.get(name)
    }

    pub fn router_mut(&mut self, name: &str) -> Option<&mut Router> {
        self.routers.get_mut(name)
    }

    pub fn routers(&self) -> impl Iterator<Item = &Router> {
        self.routers.values()
    }

    pub fn routers_mut(&mut self) -> impl Iterator<Item = &mut Router> {
        self.routers.values_mut()
    }

    pub fn router_ids(&self) -> Vec<RouterId> {
        self.routers.keys().cloned().collect()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    /// Computed from current link status on every call.
    pub fn active_neighbors(&self, name: &str) -> Vec<RouterId> {
        if !self.routers.contains_key(name) {
            return Vec::new();
        }

        let mut neighbors: Vec<RouterId> = self
            .links
            .iter()
            .filter(|link| link.is_up())
            .filter_map(|link| link.other_end(name))
            .filter(|other| self.routers.contains_key(other.as_str()))
            .cloned()
            .collect();
        neighbors.sort();
        neighbors.dedup();
        neighbors
    }

    pub fn is_link_up(&self, a: &str, b: &str) -> bool {
        self.links.iter().any(|link| link.is_up() && link.joins(a, b))
    }

    /// Returns `false` when no link joins `a` and `b`.
    pub fn set_link_status(&mut self, a: &str, b: &str, status: LinkStatus) -> bool {
        let mut found = false;
        for link in self.links.iter_mut().filter(|link| link.joins(a, b)) {
            link.status = status;
            found = true;
        }

        if found {
            self.refresh_neighbors(a);
            self.refresh_neighbors(b);
        }
        found
    }

    pub fn all_networks(&self) -> BTreeSet<NetworkId> {
        self.routers
            .values()
            .flat_map(|router| router.direct_networks.iter().cloned())
            .collect()
    }

    pub fn mark_network_disabled(&mut self, router: &str, network: &str) {
        self.disabled_networks
            .entry(router.to_string())
            .or_default()
            .insert(network.to_string());
    }

    pub fn mark_network_enabled(&mut self, router: &str, network: &str) {
        if let Some(disabled) = self.disabled_networks.get_mut(router) {
            disabled.remove(network);
            if disabled.is_empty() {
                self.disabled_networks.remove(router);
            }
        }
    }

    pub fn is_network_enabled(&self, router: &str, network: &str) -> bool {
        self.disabled_networks
            .get(router)
            .is_none_or(|disabled| !disabled.contains(network))
    }

    pub fn disabled_networks(&self, router: &str) -> Vec<NetworkId> {
        self.disabled_networks
            .get(router)
            .map(|disabled| disabled.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn snapshot(&self) -> TopologyConfig {
        TopologyConfig {
            routers: self.routers.values().map(Router::definition).collect(),
            links: self
                .links
                .iter()
                .map(|link| LinkDefinition {
                    router_a: link.router_a.clone(),
                    router_b: link.router_b.clone(),
                    status: link.status,
                })
                .collect(),
            defaults: self.defaults.clone(),
        }
    }

    fn refresh_neighbors(&mut self, name: &str) {
        let neighbors = self.active_neighbors(name);
        if let Some(router) = self.routers.get_mut(name) {
            router.neighbors = neighbors.into_iter().collect();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterDefinition;

    fn triangle() -> Topology {
        let config = TopologyConfig {
            routers: vec![
                RouterDefinition::new("A", &["NA"]),
                RouterDefinition::new("B", &["NB", "NB2"]),
                RouterDefinition::new("C", &["NC"]),
            ],
            links: vec![
                LinkDefinition::up("A", "B"),
                LinkDefinition::up("B", "C"),
                LinkDefinition {
                    router_a: "C".into(),
                    router_b: "A".into(),
                    status: LinkStatus::Down,
                },
            ],
            ..Default::default()
        };
        let mut topology = Topology::new();
        topology.initialize(&config, Utc::now());
        topology
    }

    #[test]
    fn initial_neighbors_follow_up_links_only() {
        let topology = triangle();
        assert_eq!(topology.active_neighbors("A"), vec!["B".to_string()]);
        assert_eq!(topology.active_neighbors("B"), vec!["A".to_string(), "C".to_string()]);
        assert_eq!(topology.active_neighbors("C"), vec!["B".to_string()]);
        assert!(topology.active_neighbors("Z").is_empty());

        let a = topology.router("A").unwrap();
        assert!(a.neighbors.contains("B"));
        assert!(!a.neighbors.contains("C"));
    }

    #[test]
    fn link_status_changes_are_unordered_and_idempotent() {
        let mut topology = triangle();

        assert!(topology.set_link_status("A", "C", LinkStatus::Up));
        assert!(topology.set_link_status("C", "A", LinkStatus::Up));
        assert!(topology.is_link_up("A", "C"));
        assert_eq!(topology.active_neighbors("A"), vec!["B".to_string(), "C".to_string()]);

        assert!(topology.set_link_status("B", "A", LinkStatus::Down));
        assert_eq!(topology.active_neighbors("A"), vec!["C".to_string()]);
        assert!(!topology.router("B").unwrap().neighbors.contains("A"));

        assert!(!topology.set_link_status("A", "Z", LinkStatus::Down));
    }

    #[test]
    fn network_universe_is_union_of_direct_networks() {
        let topology = triangle();
        let networks: Vec<_> = topology.all_networks().into_iter().collect();
        assert_eq!(networks, vec!["NA", "NB", "NB2", "NC"]);
    }

    #[test]
    fn reinitialization_is_a_full_reset() {
        let mut topology = triangle();
        topology.mark_network_disabled("A", "NA");

        let config = TopologyConfig {
            routers: vec![RouterDefinition::new("X", &["NX"])],
            links: vec![],
            ..Default::default()
        };
        topology.initialize(&config, Utc::now());

        assert!(topology.router("A").is_none());
        assert!(topology.links().is_empty());
        assert!(topology.is_network_enabled("A", "NA"));
        assert_eq!(topology.router_ids(), vec!["X".to_string()]);
    }

    #[test]
    fn snapshot_reflects_current_link_status() {
        let mut topology = triangle();
        topology.set_link_status("A", "B", LinkStatus::Down);

        let snapshot = topology.snapshot();
        assert_eq!(snapshot.routers.len(), 3);
        let ab = snapshot
            .links
            .iter()
            .find(|l| l.router_a == "A" && l.router_b == "B")
            .unwrap();
        assert_eq!(ab.status, LinkStatus::Down);
    }
}
