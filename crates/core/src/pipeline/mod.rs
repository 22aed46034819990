//! Message execution pipeline
//!
//! A [`Pipeline`] folds an ordered list of [`Stage`]s around a message
//! handler. Stages enter in registration order and exit in exact reverse
//! order. Whatever the handler fails with (including a panic) is turned into
//! a single [`ConsumerError::Processing`] at the terminal, and stages pass it
//! outward unchanged.
//!
//! ```text
//! culture -> logging scope -> context -> handler
//!                                           |
//! culture <- logging scope <- context <-----+
//! ```

pub mod builder;
pub mod context;
pub mod culture;
pub mod logging;
pub mod stage;
pub mod timing;

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

pub use builder::PipelineBuilder;
use conduit_domain::{ConduitError, Envelope, Headers, PipelineConfig};
pub use context::{ContextStage, MessageContext};
pub use culture::{Culture, CultureStage};
use futures::future::BoxFuture;
use futures::FutureExt;
pub use logging::{LogScope, LoggingScopeStage};
pub use stage::{Next, Stage};
use thiserror::Error;
pub use timing::TimingStage;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use self::stage::Continuation;
use crate::error::{BoxError, ConsumerError, ConsumerResult};

/// A message handler panicked; carried as the cause of a processing error
#[derive(Debug, Error)]
#[error("message handler panicked: {0}")]
pub struct HandlerPanic(pub String);

/// Ordered chain of stages, outermost first
///
/// Cheap to clone and safe to share between concurrently processed
/// messages; per-message state lives in task-local scopes.
#[derive(Clone)]
pub struct Pipeline {
    stages: Arc<[Arc<dyn Stage>]>,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::from_stages(Vec::new())
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").field("stages", &self.stage_names()).finish()
    }
}

impl Pipeline {
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    pub(crate) fn from_stages(stages: Vec<Arc<dyn Stage>>) -> Self {
        Self { stages: stages.into() }
    }

    /// The standard culture -> logging scope -> context chain
    ///
    /// Equivalent to decorating a context stage, then a logging scope stage,
    /// then a culture stage.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, ConduitError> {
        config.validate()?;
        let default_culture = config.default_culture.as_deref().map(Culture::parse).transpose()?;

        Ok(Self::builder()
            .decorate(
                ContextStage::new(config.context_keys.clone())
                    .with_culture_injection(config.inject_culture_into_context),
            )
            .decorate(LoggingScopeStage::new(config.logging_keys.clone()))
            .decorate(CultureStage::new(config.culture_header.clone(), default_culture))
            .build())
    }

    /// Stage names, outermost first
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Run `handler` for `envelope` through every stage
    ///
    /// The handler receives the envelope with whatever headers the stages
    /// added, plus a clone of `cancel`. A token cancelled before the call
    /// yields [`ConsumerError::Cancelled`] without entering any stage.
    pub async fn execute<'a, T, H, Fut, E>(
        &'a self,
        envelope: Envelope<T>,
        handler: H,
        cancel: &CancellationToken,
    ) -> ConsumerResult
    where
        T: Send + 'a,
        H: FnOnce(Envelope<T>, CancellationToken) -> Fut + Send + 'a,
        Fut: Future<Output = Result<(), E>> + Send + 'a,
        E: Into<BoxError> + 'a,
    {
        if cancel.is_cancelled() {
            return Err(ConsumerError::Cancelled);
        }

        let (payload, headers) = envelope.into_parts();
        let token = cancel.clone();
        let terminal: Continuation<'a> = Box::new(move |headers| {
            invoke(handler, Envelope::with_headers(payload, headers), token).boxed()
        });

        trace!(stages = self.stages.len(), "Executing message pipeline");
        dispatch(&self.stages, headers, terminal).await
    }
}

fn dispatch<'a>(
    stages: &'a [Arc<dyn Stage>],
    headers: Headers,
    terminal: Continuation<'a>,
) -> BoxFuture<'a, ConsumerResult> {
    match stages.split_first() {
        None => terminal(headers),
        Some((stage, inner)) => {
            let next = Next::new(Box::new(move |headers| dispatch(inner, headers, terminal)));
            stage.process(headers, next)
        }
    }
}

async fn invoke<T, H, Fut, E>(
    handler: H,
    envelope: Envelope<T>,
    cancel: CancellationToken,
) -> ConsumerResult
where
    H: FnOnce(Envelope<T>, CancellationToken) -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Into<BoxError>,
{
    let call = async move { handler(envelope, cancel).await };
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(ConsumerError::processing(err)),
        Err(panic) => Err(ConsumerError::processing(HandlerPanic(panic_message(panic.as_ref())))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use conduit_domain::ScopedKey;

    use super::*;

    #[test]
    fn test_from_config_orders_culture_outermost() {
        let config = PipelineConfig {
            context_keys: vec![ScopedKey::required("tenant")],
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::from_config(&config).unwrap();
        assert_eq!(pipeline.stage_names(), vec!["culture", "logging_scope", "context"]);
    }

    #[test]
    fn test_from_config_rejects_bad_default_culture() {
        let config = PipelineConfig {
            default_culture: Some("not_a_culture".to_string()),
            ..PipelineConfig::default()
        };
        assert!(matches!(Pipeline::from_config(&config), Err(ConduitError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_empty_pipeline_runs_handler() {
        let pipeline = Pipeline::default();
        let result = pipeline
            .execute(
                Envelope::new(7_u32),
                |envelope, _| async move {
                    assert_eq!(*envelope.payload(), 7);
                    Ok::<_, ConsumerError>(())
                },
                &CancellationToken::new(),
            )
            .await;
        assert!(result.is_ok());
    }

    async fn exploding(_: Envelope<()>, _: CancellationToken) -> Result<(), ConsumerError> {
        panic!("handler exploded")
    }

    async fn never_called(_: Envelope<()>, _: CancellationToken) -> Result<(), ConsumerError> {
        unreachable!("handler must not run")
    }

    #[tokio::test]
    async fn test_panic_becomes_processing_error() {
        let pipeline = Pipeline::default();
        let err = pipeline
            .execute(Envelope::new(()), exploding, &CancellationToken::new())
            .await
            .unwrap_err();

        let panic = err.downcast_cause::<HandlerPanic>().unwrap();
        assert_eq!(panic.0, "handler exploded");
    }

    #[tokio::test]
    async fn test_cancelled_token_skips_handler() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = Pipeline::default().execute(Envelope::new(()), never_called, &cancel).await;
        assert!(matches!(result, Err(ConsumerError::Cancelled)));
    }
}
