//! Resilience patterns for calls to unreliable dependencies
//!
//! - **Circuit Breaker**: stops calling a dependency whose recent failure
//!   ratio crossed a threshold, then tests it with a single trial call
//! - **Retry**: re-invokes an operation on matching failures with fixed,
//!   linear, exponential or custom backoff and optional jitter
//! - **Handler**: composes the two for one logical operation, breaker on
//!   the outside
//!
//! Policies are described with [`PolicyPrimitive`] and turned into a
//! [`ResilienceHandler`]. Each policy carries a trigger predicate; by
//! default it matches failures whose
//! [`classify`](crate::error::ErrorClassification::classify) is
//! [`FailureClass::Transient`](crate::error::FailureClass::Transient).
//! Failures no policy matches come back unmodified as
//! [`ResilienceError::Operation`].

pub mod circuit_breaker;
pub mod error;
pub mod handler;
pub mod policy;
pub mod retry;

pub use circuit_breaker::{
    CallPermit, CircuitBreaker, CircuitBreakerBuilderWithClock, CircuitBreakerConfig,
    CircuitBreakerConfigBuilder, CircuitBreakerMetrics, CircuitState, Clock, HealthSnapshot,
    MockClock, PermitGuard, Rejected, SystemClock,
};
pub use error::{ConfigError, ConfigResult, ResilienceError, ResilienceResult};
pub use handler::ResilienceHandler;
pub use policy::{
    transient_failures, PolicyKind, PolicyPrimitive, ResiliencePolicySet, TriggerPredicate,
};
pub use retry::{
    BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryDecision,
    RetryError, RetryExecutor, RetryPolicy, RetryResult,
};
