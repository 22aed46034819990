//! # Conduit Infrastructure
//!
//! Runtime implementations of the `conduit-core` ports.
//!
//! This crate contains:
//! - Configuration loading from files and the environment
//! - Tracing subscriber bootstrap
//! - The consumer host (receive loop) and the resilient producer
//! - The JSON codec and the in-memory broker
//!
//! ## Architecture
//! - Implements traits defined in `conduit-core`
//! - Contains all "impure" code (I/O, spawned tasks, global subscriber)

pub mod config;
pub mod messaging;
pub mod observability;

// Re-export commonly used items
pub use messaging::{
    ConsumerHost, HostError, HostResult, InMemoryBroker, JsonCodec, ResilientProducer,
};
pub use observability::init_tracing;
