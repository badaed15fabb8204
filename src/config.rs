use crate::network::LinkStatus;
use crate::{NetworkId, RouterId};
use anyhow::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Per-router protocol settings. All timers are in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RipConfig {
    pub update_interval: u64,
    pub invalid_timer: u64,
    pub hold_down_timer: u64,
    pub flush_timer: u64,
    pub split_horizon: bool,
    pub poison_reverse: bool,
    /// Put timed-out routes into hold-down instead of plain invalid.
    pub hold_down_enabled: bool,
    /// Treat a metric-16 advertisement from the current next hop as an
    /// immediate withdrawal instead of discarding it.
    pub poison_invalidates: bool,
}

impl Default for RipConfig {
    fn default() -> Self {
        Self {
            update_interval: 30,    // 30 seconds
            invalid_timer: 180,     // 6 x update interval
            hold_down_timer: 180,   // same as invalid timer
            flush_timer: 240,       // invalid timer + 60
            split_horizon: true,
            poison_reverse: false,
            hold_down_enabled: false,
            poison_invalidates: false,
        }
    }
}

impl RipConfig {
    pub fn update_interval(&self) -> Duration {
        secs(self.update_interval)
    }

    pub fn invalid_timer(&self) -> Duration {
        secs(self.invalid_timer)
    }

    pub fn hold_down_timer(&self) -> Duration {
        secs(self.hold_down_timer)
    }

    pub fn flush_timer(&self) -> Duration {
        secs(self.flush_timer)
    }
}

/// Values beyond what `Duration` can hold saturate to `Duration::MAX`.
fn secs(value: u64) -> Duration {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Cadences of the periodic simulation tasks, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub update_check_interval: u64,
    pub timer_check_interval: u64,
    pub convergence_check_interval: u64,
    pub snapshot_interval: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            update_check_interval: 1,
            timer_check_interval: 5,
            convergence_check_interval: 5,
            snapshot_interval: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceDefinition {
    pub name: String,
    pub ip_address: String,
    /// Neighbor router name, or a LAN label.
    pub connected_to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterDefinition {
    pub name: RouterId,
    pub direct_networks: Vec<NetworkId>,
    #[serde(default)]
    pub interfaces: Vec<InterfaceDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rip: Option<RipConfig>,
}

impl RouterDefinition {
    pub fn new(name: impl Into<RouterId>, direct_networks: &[&str]) -> Self {
        Self {
            name: name.into(),
            direct_networks: direct_networks.iter().map(|n| n.to_string()).collect(),
            interfaces: Vec::new(),
            rip: None,
        }
    }

    pub fn with_rip(mut self, rip: RipConfig) -> Self {
        self.rip = Some(rip);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkDefinition {
    pub router_a: RouterId,
    pub router_b: RouterId,
    #[serde(default)]
    pub status: LinkStatus,
}

impl LinkDefinition {
    pub fn up(a: impl Into<RouterId>, b: impl Into<RouterId>) -> Self {
        Self {
            router_a: a.into(),
            router_b: b.into(),
            status: LinkStatus::Up,
        }
    }
}

/// Batch topology definition, also used as the topology snapshot format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyConfig {
    pub routers: Vec<RouterDefinition>,
    pub links: Vec<LinkDefinition>,
    /// Applied to routers that carry no `rip` override.
    #[serde(default)]
    pub defaults: RipConfig,
}

impl TopologyConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: TopologyConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn rip_config_for(&self, router: &RouterDefinition) -> RipConfig {
        router.rip.clone().unwrap_or_else(|| self.defaults.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_rip_timers() {
        let config = RipConfig::default();
        assert_eq!(config.update_interval(), Duration::seconds(30));
        assert_eq!(config.invalid_timer(), Duration::seconds(180));
        assert_eq!(config.hold_down_timer(), Duration::seconds(180));
        assert_eq!(config.flush_timer(), Duration::seconds(240));
        assert!(config.split_horizon);
        assert!(!config.poison_reverse);
    }

    #[test]
    fn oversized_timers_saturate() {
        let config: RipConfig = serde_json::from_str(r#"{ "invalid_timer": 10000000000000000, "flush_timer": 18446744073709551615 }"#).unwrap();
        assert_eq!(config.invalid_timer(), Duration::MAX);
        assert_eq!(config.flush_timer(), Duration::MAX);
        assert_eq!(config.update_interval(), Duration::seconds(30));
    }

    #[test]
    fn topology_json_fills_missing_fields() {
        let json = r#"{
            "routers": [
                { "name": "A", "direct_networks": ["10.0.1.0/24"] },
                { "name": "B", "direct_networks": ["10.0.2.0/24"],
                  "rip": { "poison_reverse": true } }
            ],
            "links": [ { "router_a": "A", "router_b": "B" } ]
        }"#;

        let config: TopologyConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.links[0].status, LinkStatus::Up);

        let a = config.rip_config_for(&config.routers[0]);
        assert_eq!(a, RipConfig::default());

        let b = config.rip_config_for(&config.routers[1]);
        assert!(b.poison_reverse);
        assert!(b.split_horizon);
        assert_eq!(b.flush_timer, 240);
    }

    #[test]
    fn save_then_load_from_disk() {
        let path = std::env::temp_dir().join(format!("rip-sim-topology-{}.json", std::process::id()));
        let config = TopologyConfig {
            routers: vec![RouterDefinition::new("A", &["NA"])],
            links: vec![],
            defaults: RipConfig::default(),
        };

        config.save(&path).unwrap();
        let loaded = TopologyConfig::load(&path).unwrap();
        let _ = fs::remove_file(&path);

        assert_eq!(loaded, config);
    }
}
