//! Structured logging scope stage
//!
//! Opens a `message_scope` span carrying the declared header values for the
//! duration of the inner call. Every event the handler logs is emitted inside
//! that span. The pairs are also readable through [`LogScope::current`].

use std::fmt;

use async_trait::async_trait;
use conduit_domain::{Headers, ScopedKey};
use tracing::Instrument;

use super::context::require_keys;
use super::stage::{Next, Stage};
use crate::error::ConsumerResult;

tokio::task_local! {
    static LOG_SCOPE: LogScope;
}

/// Name/value pairs attached to the current logging scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogScope {
    pairs: Vec<(String, Option<String>)>,
}

impl LogScope {
    /// Scope of the current message, if one is open
    pub fn current() -> Option<Self> {
        LOG_SCOPE.try_with(LogScope::clone).ok()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs.iter().rev().find(|(n, _)| n == name).and_then(|(_, v)| v.as_deref())
    }

    pub fn pairs(&self) -> &[(String, Option<String>)] {
        &self.pairs
    }

    fn push(&mut self, name: String, value: Option<String>) {
        self.pairs.retain(|(n, _)| *n != name);
        self.pairs.push((name, value));
    }
}

impl fmt::Display for LogScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.pairs.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={}", value.as_deref().unwrap_or("null"))?;
        }
        Ok(())
    }
}

/// Attaches declared headers to a logging scope around the inner call
#[derive(Debug, Clone, Default)]
pub struct LoggingScopeStage {
    keys: Vec<ScopedKey>,
}

impl LoggingScopeStage {
    pub fn new(keys: Vec<ScopedKey>) -> Self {
        Self { keys }
    }

    pub fn keys(&self) -> &[ScopedKey] {
        &self.keys
    }
}

#[async_trait]
impl Stage for LoggingScopeStage {
    fn name(&self) -> &'static str {
        "logging_scope"
    }

    async fn process(&self, headers: Headers, next: Next<'_>) -> ConsumerResult {
        require_keys(&self.keys, &headers)?;

        let mut scope = LogScope::current().unwrap_or_default();
        for key in &self.keys {
            scope.push(key.name.clone(), headers.get(&key.name).map(str::to_owned));
        }

        let span = tracing::info_span!("message_scope", scope = %scope);
        LOG_SCOPE.scope(scope, next.run(headers).instrument(span)).await
    }
}
