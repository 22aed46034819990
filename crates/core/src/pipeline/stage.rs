//! The "wrap the next stage" contract

use async_trait::async_trait;
use conduit_domain::Headers;
use futures::future::BoxFuture;

use crate::error::ConsumerResult;

pub(crate) type Continuation<'a> =
    Box<dyn FnOnce(Headers) -> BoxFuture<'a, ConsumerResult> + Send + 'a>;

/// The rest of the chain, ending in the message handler
///
/// Consumed by [`Next::run`]; a stage that fails before calling it
/// short-circuits everything inside it.
pub struct Next<'a> {
    inner: Continuation<'a>,
}

impl<'a> Next<'a> {
    pub(crate) fn new(inner: Continuation<'a>) -> Self {
        Self { inner }
    }

    /// Hand the (possibly modified) headers to the inner stages
    pub async fn run(self, headers: Headers) -> ConsumerResult {
        (self.inner)(headers).await
    }
}

/// One cross-cutting behavior around message handling
///
/// A stage receives the message headers, may read or extend them, and
/// either fails or calls `next`. Work after `next.run(..).await` runs on
/// every exit path of the inner call, since the inner result is an ordinary
/// return value. Stages must propagate inner errors unchanged.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Short identifier used in logs and introspection
    fn name(&self) -> &'static str;

    async fn process(&self, headers: Headers, next: Next<'_>) -> ConsumerResult;
}
