pub mod link;
pub mod topology;

pub use link::*;
pub use topology::*;
