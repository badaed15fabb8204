pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod fault;
pub mod network;
pub mod protocol;
pub mod router;
pub mod snapshot;

use std::sync::Arc;
use tokio::sync::RwLock;

pub type RouterId = String;
pub type NetworkId = String;

pub type SharedTopology = Arc<RwLock<network::Topology>>;

pub use error::{RipError, RipResult};
pub use protocol::{RipEngine, Scheduler};
