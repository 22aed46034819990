//! Shared test helpers for `conduit-core` integration tests.
//!
//! A recording stage and a few handler fixtures so the pipeline tests can
//! focus on ordering and scoping behaviour.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use conduit_core::{ConsumerResult, Next, Stage};
use conduit_domain::Headers;

/// Shared journal of stage entries and exits
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn record(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Stage that journals `enter:<name>` and `exit:<name>` around the inner call
pub struct RecordingStage {
    pub name: &'static str,
    pub journal: Journal,
}

impl RecordingStage {
    pub fn new(name: &'static str, journal: &Journal) -> Self {
        Self { name, journal: journal.clone() }
    }
}

#[async_trait]
impl Stage for RecordingStage {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn process(&self, headers: Headers, next: Next<'_>) -> ConsumerResult {
        self.journal.record(format!("enter:{}", self.name));
        let result = next.run(headers).await;
        self.journal.record(format!("exit:{}", self.name));
        result
    }
}

/// Handler failure used to check cause propagation
#[derive(Debug, thiserror::Error)]
#[error("invalid operation: {0}")]
pub struct InvalidOperation(pub &'static str);
