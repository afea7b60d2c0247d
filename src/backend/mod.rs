//! Backend pool management and load balancing algorithms.

pub mod algorithms;
mod pool;
mod upstream;

pub use pool::{PoolError, ServicePool};
pub use upstream::Backend;
pub(crate) use upstream::authority_of;
