//! # Conduit Core
//!
//! Broker-agnostic message processing - no transport dependencies.
//!
//! This crate contains:
//! - The execution pipeline and its stages (context, logging scope,
//!   culture, timing)
//! - The consumer and producer error taxonomy
//! - Port interfaces (traits) implemented by broker adapters
//! - The service client base and settings-to-policy translation
//!
//! ## Architecture Principles
//! - Only depends on `conduit-common` and `conduit-domain`
//! - No broker SDK, file or network code
//! - All transports via traits

pub mod ack;
pub mod client;
pub mod error;
pub mod pipeline;
pub mod ports;
pub mod resilience;

// Re-export specific items to avoid ambiguity
pub use ack::AckOutcome;
pub use client::ServiceClient;
pub use error::{BoxError, ConsumerError, ConsumerResult, ProducerError};
pub use pipeline::{
    ContextStage, Culture, CultureStage, HandlerPanic, LogScope, LoggingScopeStage,
    MessageContext, Next, Pipeline, PipelineBuilder, Stage, TimingStage,
};
pub use ports::{
    DeliveryTag, MessageCodec, MessageHandler, MessageProducer, MessagePublisher, MessageSource,
    OutboundMessage, RawMessage, TransportError, TransportErrorKind,
};
pub use resilience::ResiliencePolicyFactory;
