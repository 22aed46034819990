//! Ambient per-call context and the stage that populates it
//!
//! The context is bound to the task executing the message, so concurrent
//! messages never observe each other's values. Values exist only while the
//! inner call runs; nothing leaks into the next message handled by the same
//! worker.

use std::cell::RefCell;
use std::collections::BTreeMap;

use async_trait::async_trait;
use conduit_domain::constants::CULTURE_CONTEXT_KEY;
use conduit_domain::{Headers, ScopedKey};
use tracing::trace;

use super::culture;
use super::stage::{Next, Stage};
use crate::error::{ConsumerError, ConsumerResult};

tokio::task_local! {
    static CONTEXT: RefCell<MessageContext>;
}

/// Name/value pairs visible to the handler of one message
///
/// A declared optional key that was absent is stored with a `None` value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageContext {
    values: BTreeMap<String, Option<String>>,
}

impl MessageContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a value
    pub fn upsert(&mut self, key: impl Into<String>, value: Option<String>) {
        self.values.insert(key.into(), value);
    }

    /// Value for `key`; `None` when absent or stored without a value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Option::as_deref)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }

    /// Snapshot of the context of the current message, if any
    pub fn current() -> Option<Self> {
        CONTEXT.try_with(|ctx| ctx.borrow().clone()).ok()
    }

    /// Read a single value from the current message's context
    pub fn current_value(key: &str) -> Option<String> {
        CONTEXT.try_with(|ctx| ctx.borrow().get(key).map(str::to_owned)).ok().flatten()
    }

    /// Upsert into the current message's context
    ///
    /// Returns `false` when called outside a context scope.
    pub fn set_current(key: impl Into<String>, value: Option<String>) -> bool {
        let key = key.into();
        CONTEXT.try_with(|ctx| ctx.borrow_mut().upsert(key, value)).is_ok()
    }

    /// Run `fut` with `self` as the ambient context
    pub async fn scope<F: std::future::Future>(self, fut: F) -> F::Output {
        CONTEXT.scope(RefCell::new(self), fut).await
    }
}

/// Check every required key is present before any inner stage runs
pub(crate) fn require_keys(keys: &[ScopedKey], headers: &Headers) -> ConsumerResult {
    match keys.iter().find(|key| key.required && !headers.contains(&key.name)) {
        Some(missing) => Err(ConsumerError::missing_key(&missing.name)),
        None => Ok(()),
    }
}

/// Copies declared headers into the ambient context
#[derive(Debug, Clone, Default)]
pub struct ContextStage {
    keys: Vec<ScopedKey>,
    inject_culture: bool,
}

impl ContextStage {
    pub fn new(keys: Vec<ScopedKey>) -> Self {
        Self { keys, inject_culture: false }
    }

    /// Also publish the active culture under the reserved context key
    pub fn with_culture_injection(mut self, enabled: bool) -> Self {
        self.inject_culture = enabled;
        self
    }

    pub fn keys(&self) -> &[ScopedKey] {
        &self.keys
    }
}

#[async_trait]
impl Stage for ContextStage {
    fn name(&self) -> &'static str {
        "context"
    }

    async fn process(&self, headers: Headers, next: Next<'_>) -> ConsumerResult {
        require_keys(&self.keys, &headers)?;

        // Nested pipelines see the outer message's values as well.
        let mut context = MessageContext::current().unwrap_or_default();
        for key in &self.keys {
            context.upsert(key.name.clone(), headers.get(&key.name).map(str::to_owned));
        }
        if self.inject_culture {
            if let Some(culture) = culture::current() {
                context.upsert(CULTURE_CONTEXT_KEY, Some(culture.to_string()));
            }
        }

        trace!(keys = context.len(), "Message context populated");
        context.scope(next.run(headers)).await
    }
}
