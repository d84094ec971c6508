//! Load balancing primitives for the pool
//!
//! This module provides the pure building blocks the pool wires to clients
//! and locking:
//!
//! - [`Sampler`]: weighted random index selection (Vose alias method)
//! - [`ClientStatus`]: per-client health state with threshold-based
//!   unhealthy transitions
//!
//! # Thread Safety
//!
//! [`ClientStatus`] uses atomic types so probe tasks can record outcomes
//! without locks. [`Sampler`] owns a mutable random source and must be
//! serialized by the caller; the tier lock in the pool module guarantees
//! this.

pub mod sampler;
pub mod status;

pub use sampler::Sampler;
pub use status::ClientStatus;
