//! meshpool - client-side weighted load-balancing connection pool for
//! distributed storage networks
//!
//! Hands out a currently-healthy client with frequency proportional to its
//! configured weight, continuously re-evaluates health in the background and
//! fails over across priority tiers when an entire tier is down.

pub mod client;
pub mod config;
pub mod lb;
pub mod pool;

pub use client::{IdentityKey, NodeClient};
pub use config::{ConfigError, NodeParam, PoolConfig};
pub use pool::{Pool, PoolError};
