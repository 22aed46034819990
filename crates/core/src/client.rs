//! Service client base
//!
//! A [`ServiceClient`] names one remote endpoint and routes every outbound
//! call through that endpoint's resilience handler. Callers must not retry
//! a [`ResilienceError::PolicyExhausted`] themselves.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use conduit_common::error::ErrorClassification;
use conduit_common::resilience::{
    Clock, ResilienceError, ResilienceHandler, ResilienceResult, SystemClock,
};
use conduit_domain::{ConduitError, ResilienceSettings};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::resilience::ResiliencePolicyFactory;

pub struct ServiceClient<E, C: Clock = SystemClock> {
    endpoint: Arc<str>,
    handler: ResilienceHandler<E, C>,
}

impl<E, C: Clock> Clone for ServiceClient<E, C> {
    fn clone(&self) -> Self {
        Self { endpoint: Arc::clone(&self.endpoint), handler: self.handler.clone() }
    }
}

impl<E, C: Clock> std::fmt::Debug for ServiceClient<E, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceClient")
            .field("endpoint", &self.endpoint)
            .field("handler", &self.handler)
            .finish()
    }
}

impl<E> ServiceClient<E, SystemClock>
where
    E: ErrorClassification + std::error::Error + Send + Sync + 'static,
{
    /// Client for `endpoint` with policies built from `settings`
    pub fn from_settings(
        endpoint: impl Into<String>,
        settings: &ResilienceSettings,
    ) -> Result<Self, ConduitError> {
        let endpoint = endpoint.into();
        let handler = ResiliencePolicyFactory::handler(&endpoint, settings)?;
        Ok(Self::new(endpoint, handler))
    }
}

impl<E, C> ServiceClient<E, C>
where
    E: std::error::Error + Send + Sync + 'static,
    C: Clock,
{
    pub fn new(endpoint: impl Into<String>, handler: ResilienceHandler<E, C>) -> Self {
        Self { endpoint: Arc::from(endpoint.into()), handler }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn handler(&self) -> &ResilienceHandler<E, C> {
        &self.handler
    }

    /// Invoke `operation` under the endpoint's policies
    pub async fn call<F, Fut, T>(&self, operation: F) -> ResilienceResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_with_cancellation(operation, &CancellationToken::new()).await
    }

    pub async fn call_with_cancellation<F, Fut, T>(
        &self,
        operation: F,
        cancel: &CancellationToken,
    ) -> ResilienceResult<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let result = self.handler.handle_with_cancellation(operation, cancel).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => debug!(endpoint = %self.endpoint, elapsed_ms, "Service call succeeded"),
            Err(ResilienceError::CircuitOpen { .. }) => {
                debug!(endpoint = %self.endpoint, "Service call rejected by open circuit");
            }
            Err(err) => {
                warn!(endpoint = %self.endpoint, elapsed_ms, error = %err, "Service call failed");
            }
        }
        result
    }
}
