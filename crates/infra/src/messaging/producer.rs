//! Typed producer over a [`MessagePublisher`]
//!
//! Payloads are encoded before anything is handed to the transport, so an
//! encoding failure in a batch sends nothing. Every publish goes through the
//! destination's [`ServiceClient`] and its resilience policies.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use conduit_common::resilience::{Clock, SystemClock};
use conduit_core::{
    MessageCodec, MessageProducer, MessagePublisher, OutboundMessage, ProducerError,
    ServiceClient, TransportError,
};
use conduit_domain::constants::{CONTENT_TYPE_HEADER, MESSAGE_ID_HEADER};
use conduit_domain::{ConduitError, Headers, ResilienceSettings};
use tracing::{debug, warn};
use uuid::Uuid;

pub struct ResilientProducer<T, C: Clock = SystemClock> {
    publisher: Arc<dyn MessagePublisher>,
    codec: Arc<dyn MessageCodec<T>>,
    client: ServiceClient<TransportError, C>,
}

impl<T, C: Clock> fmt::Debug for ResilientProducer<T, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientProducer")
            .field("destination", &self.client.endpoint())
            .field("content_type", &self.codec.content_type())
            .finish()
    }
}

impl<T> ResilientProducer<T, SystemClock> {
    /// Producer for `destination` with policies built from `settings`
    pub fn from_settings(
        destination: impl Into<String>,
        publisher: Arc<dyn MessagePublisher>,
        codec: Arc<dyn MessageCodec<T>>,
        settings: &ResilienceSettings,
    ) -> Result<Self, ConduitError> {
        let client = ServiceClient::from_settings(destination, settings)?;
        Ok(Self::new(publisher, codec, client))
    }
}

impl<T, C: Clock> ResilientProducer<T, C> {
    /// Producer sending to the client's endpoint
    pub fn new(
        publisher: Arc<dyn MessagePublisher>,
        codec: Arc<dyn MessageCodec<T>>,
        client: ServiceClient<TransportError, C>,
    ) -> Self {
        Self { publisher, codec, client }
    }

    pub fn destination(&self) -> &str {
        self.client.endpoint()
    }

    fn encode(&self, payload: &T, mut headers: Headers) -> Result<OutboundMessage, ProducerError> {
        let body = self.codec.encode(payload).map_err(|source| ProducerError::Encode {
            destination: self.destination().to_string(),
            source,
        })?;

        if !headers.contains(CONTENT_TYPE_HEADER) {
            headers.insert(CONTENT_TYPE_HEADER, self.codec.content_type());
        }
        if !headers.contains(MESSAGE_ID_HEADER) {
            headers.insert(MESSAGE_ID_HEADER, Uuid::new_v4().to_string());
        }
        Ok(OutboundMessage::new(body, headers))
    }

    fn failed(&self, err: ProducerError) -> ProducerError {
        warn!(destination = self.destination(), error = %err, "Send failed");
        err
    }
}

#[async_trait]
impl<T, C> MessageProducer<T> for ResilientProducer<T, C>
where
    T: Send + Sync + 'static,
    C: Clock,
{
    async fn send_message(&self, payload: T, headers: Headers) -> Result<(), ProducerError> {
        let message = self.encode(&payload, headers)?;
        let publisher = &self.publisher;
        let destination = self.destination();

        self.client
            .call(|| publisher.publish(destination, message.clone()))
            .await
            .map_err(|err| self.failed(ProducerError::from_resilience(destination, err)))?;

        debug!(destination, "Message sent");
        Ok(())
    }

    async fn send_messages(&self, payloads: Vec<T>) -> Result<(), ProducerError> {
        if payloads.is_empty() {
            return Ok(());
        }

        let messages = payloads
            .iter()
            .map(|payload| self.encode(payload, Headers::new()))
            .collect::<Result<Vec<_>, _>>()?;
        let count = messages.len();
        let publisher = &self.publisher;
        let destination = self.destination();

        self.client
            .call(|| publisher.publish_batch(destination, messages.clone()))
            .await
            .map_err(|err| self.failed(ProducerError::from_resilience(destination, err)))?;

        debug!(destination, count, "Batch sent");
        Ok(())
    }
}
