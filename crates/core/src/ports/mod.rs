//! Port interfaces for broker adapters
//!
//! These traits define the boundary between the pipeline and resilience
//! core and the transport implementations in `conduit-infra`.

pub mod codec;
pub mod consumer;
pub mod producer;
pub mod transport;

pub use codec::MessageCodec;
pub use consumer::{DeliveryTag, MessageHandler, MessageSource, RawMessage};
pub use producer::{MessageProducer, MessagePublisher, OutboundMessage};
pub use transport::{TransportError, TransportErrorKind};
