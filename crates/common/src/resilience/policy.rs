//! Declarative policy primitives that a [`ResilienceHandler`] is built from
//!
//! [`ResilienceHandler`]: super::handler::ResilienceHandler

use std::fmt;
use std::sync::Arc;

use super::circuit_breaker::CircuitBreakerConfig;
use super::retry::RetryConfig;
use crate::error::{ErrorClassification, FailureClass};

/// Decides whether a policy handles a given failure
pub type TriggerPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Ordered policies for one logical operation
pub type ResiliencePolicySet<E> = Vec<PolicyPrimitive<E>>;

/// Trigger matching [`FailureClass::Transient`] failures
pub fn transient_failures<E>() -> TriggerPredicate<E>
where
    E: ErrorClassification + 'static,
{
    Arc::new(|error: &E| error.classify() == FailureClass::Transient)
}

/// What a policy does once triggered
#[derive(Debug, Clone, PartialEq)]
pub enum PolicyKind {
    CircuitBreaker(CircuitBreakerConfig),
    Retry(RetryConfig),
}

impl PolicyKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CircuitBreaker(_) => "circuit_breaker",
            Self::Retry(_) => "retry",
        }
    }
}

/// One resilience policy with its trigger and on/off switch
pub struct PolicyPrimitive<E> {
    kind: PolicyKind,
    enabled: bool,
    trigger: TriggerPredicate<E>,
}

impl<E> PolicyPrimitive<E> {
    pub fn new(kind: PolicyKind, trigger: TriggerPredicate<E>) -> Self {
        Self { kind, enabled: true, trigger }
    }

    /// Circuit breaker triggered by transient failures
    pub fn circuit_breaker(config: CircuitBreakerConfig) -> Self
    where
        E: ErrorClassification + 'static,
    {
        Self::new(PolicyKind::CircuitBreaker(config), transient_failures())
    }

    /// Retry triggered by transient failures
    pub fn retry(config: RetryConfig) -> Self
    where
        E: ErrorClassification + 'static,
    {
        Self::new(PolicyKind::Retry(config), transient_failures())
    }

    pub fn with_trigger<F>(mut self, trigger: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.trigger = Arc::new(trigger);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn kind(&self) -> &PolicyKind {
        &self.kind
    }

    pub fn trigger(&self) -> &TriggerPredicate<E> {
        &self.trigger
    }

    pub(crate) fn into_parts(self) -> (PolicyKind, TriggerPredicate<E>) {
        (self.kind, self.trigger)
    }
}

impl<E> Clone for PolicyPrimitive<E> {
    fn clone(&self) -> Self {
        Self { kind: self.kind.clone(), enabled: self.enabled, trigger: Arc::clone(&self.trigger) }
    }
}

impl<E> fmt::Debug for PolicyPrimitive<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyPrimitive")
            .field("kind", &self.kind)
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}
