use crate::RouterId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinkStatus {
    #[default]
    Up,
    Down,
}

/// Bidirectional link; endpoint order carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub router_a: RouterId,
    pub router_b: RouterId,
    pub status: LinkStatus,
}

impl Link {
    pub fn new(router_a: RouterId, router_b: RouterId, status: LinkStatus) -> Self {
        Self {
            router_a,
            router_b,
            status,
        }
    }

    pub fn is_up(&self) -> bool {
        self.status == LinkStatus::Up
    }

    pub fn joins(&self, a: &str, b: &str) -> bool {
        (self.router_a == a && self.router_b == b) || (self.router_a == b && self.router_b == a)
    }

    pub fn other_end(&self, router: &str) -> Option<&RouterId> {
        if self.router_a == router {
            Some(&self.router_b)
        } else if self.router_b == router {
            Some(&self.router_a)
        } else {
            None
        }
    }
}
