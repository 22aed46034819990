//! Consumer-side port
//!
//! A [`MessageSource`] is the narrow surface every broker adapter exposes to
//! the consumer host: pull the next delivery, then settle it exactly once.

use std::fmt;
use std::future::Future;

use async_trait::async_trait;
use conduit_domain::{AckDecision, Envelope, Headers};
use tokio_util::sync::CancellationToken;

use super::TransportError;
use crate::error::BoxError;

/// Opaque broker handle for settling one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeliveryTag(pub u64);

impl fmt::Display for DeliveryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Undecoded message as received from a broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    pub tag: DeliveryTag,
    pub body: Vec<u8>,
    pub headers: Headers,
    /// How many times the broker has delivered this message, starting at 1.
    pub delivery_count: u32,
}

/// Receives messages from one binding and settles them
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Topic, queue or subscription this source reads from
    fn binding(&self) -> &str;

    /// Wait for the next delivery
    ///
    /// `Ok(None)` means the source is closed and no further messages will
    /// arrive. The future must be safe to drop mid-wait.
    async fn receive(&self) -> Result<Option<RawMessage>, TransportError>;

    /// Apply the acknowledgement decision for a delivery
    async fn settle(&self, tag: DeliveryTag, decision: AckDecision) -> Result<(), TransportError>;
}

/// Application code invoked once per decoded message
///
/// Implemented for any `Fn(Envelope<T>, CancellationToken) -> Future` so a
/// plain async closure can be handed to a consumer host.
#[async_trait]
pub trait MessageHandler<T>: Send + Sync
where
    T: Send + 'static,
{
    async fn handle(&self, message: Envelope<T>, cancel: CancellationToken) -> Result<(), BoxError>;
}

#[async_trait]
impl<T, F, Fut, E> MessageHandler<T> for F
where
    T: Send + 'static,
    F: Fn(Envelope<T>, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError> + 'static,
{
    async fn handle(
        &self,
        message: Envelope<T>,
        cancel: CancellationToken,
    ) -> Result<(), BoxError> {
        (self)(message, cancel).await.map_err(Into::into)
    }
}
