//! Telemetry timing stage

use std::time::Instant;

use async_trait::async_trait;
use conduit_domain::Headers;
use tracing::{debug, warn};

use super::stage::{Next, Stage};
use crate::error::ConsumerResult;

/// Measures the inner call and logs its outcome with `elapsed_ms`
///
/// Errors pass through untouched.
#[derive(Debug, Clone)]
pub struct TimingStage {
    operation: String,
}

impl TimingStage {
    pub fn new(operation: impl Into<String>) -> Self {
        Self { operation: operation.into() }
    }
}

#[async_trait]
impl Stage for TimingStage {
    fn name(&self) -> &'static str {
        "timing"
    }

    async fn process(&self, headers: Headers, next: Next<'_>) -> ConsumerResult {
        let started = Instant::now();
        let result = next.run(headers).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(()) => debug!(operation = %self.operation, elapsed_ms, "Message processed"),
            Err(err) => warn!(
                operation = %self.operation,
                elapsed_ms,
                kind = err.kind(),
                error = %err,
                "Message processing failed"
            ),
        }
        result
    }
}
