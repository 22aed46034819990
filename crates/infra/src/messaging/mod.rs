//! Messaging runtime
//!
//! The consumer host and the resilient producer are written against the
//! ports in `conduit-core` only. [`InMemoryBroker`] is the transport variant
//! shipped with this crate.

pub mod codec;
pub mod consumer_host;
pub mod error;
pub mod memory;
pub mod producer;

pub use codec::{JsonCodec, JSON_CONTENT_TYPE};
pub use consumer_host::{ConsumerHost, ConsumerStats, ErrorCallback, DEFAULT_RECEIVE_BACKOFF};
pub use error::{HostError, HostResult};
pub use memory::{
    DeadLetter, DeadLetterReason, InMemoryBroker, InMemorySource, DEFAULT_HISTORY_LIMIT,
};
pub use producer::ResilientProducer;
