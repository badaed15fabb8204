use crate::{NetworkId, RouterId};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RipError {
    #[error("unknown router {0}")]
    UnknownRouter(RouterId),
    #[error("no link between {0} and {1}")]
    UnknownLink(RouterId, RouterId),
    #[error("router {router} has no direct network {network}")]
    UnknownNetwork { router: RouterId, network: NetworkId },
}

pub type RipResult<T> = Result<T, RipError>;
