//! Message-level domain types

pub mod ack;
pub mod envelope;
pub mod scoped_key;

pub use ack::{AckDecision, ProcessingErrorAction};
pub use envelope::{Envelope, Headers};
pub use scoped_key::ScopedKey;
