//! Producer-side ports

use async_trait::async_trait;
use conduit_domain::Headers;

use super::TransportError;
use crate::error::ProducerError;

/// Encoded message ready for a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub body: Vec<u8>,
    pub headers: Headers,
}

impl OutboundMessage {
    pub fn new(body: Vec<u8>, headers: Headers) -> Self {
        Self { body, headers }
    }
}

/// Raw publish surface implemented by each broker adapter
///
/// Both calls are all-or-nothing: on `Err` the transport has accepted
/// nothing from the call.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    async fn publish(
        &self,
        destination: &str,
        message: OutboundMessage,
    ) -> Result<(), TransportError>;

    async fn publish_batch(
        &self,
        destination: &str,
        messages: Vec<OutboundMessage>,
    ) -> Result<(), TransportError>;
}

/// Typed producer used by application code
#[async_trait]
pub trait MessageProducer<T>: Send + Sync
where
    T: Send + Sync + 'static,
{
    /// Send one message with headers
    async fn send_message(&self, payload: T, headers: Headers) -> Result<(), ProducerError>;

    /// Send a batch; either every message is accepted or none is
    async fn send_messages(&self, payloads: Vec<T>) -> Result<(), ProducerError>;
}
