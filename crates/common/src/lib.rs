//! Shared error classification, resilience primitives and test helpers for
//! Conduit crates.
//!
//! # Feature Tiers
//!
//! Enable cargo features to opt into the tiers you need:
//! - `foundation`: errors and failure classification
//! - `runtime`: async resilience (circuit breaker, retry, composite handler)
//! - `test-utils`: async test helpers, error fixtures and in-memory log capture

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

// Foundation tier
// -----------------------------------------------------------------
#[cfg(feature = "foundation")]
pub mod error;

// Runtime tier
// --------------------------------------------------------------------
#[cfg(feature = "runtime")]
pub mod resilience;

// Testing utilities
// ---------------------------------------------------------------
#[cfg(any(feature = "test-utils", all(test, feature = "runtime")))]
pub mod testing;

// Re-export commonly used types and traits for convenience
// ------------------------
#[cfg(feature = "foundation")]
pub use error::{ErrorClassification, ErrorSeverity, FailureClass};
#[cfg(feature = "runtime")]
pub use resilience::{
    BackoffStrategy, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerMetrics, CircuitState,
    Clock, Jitter, MockClock, PolicyKind, PolicyPrimitive, ResilienceError, ResilienceHandler,
    ResilienceResult, RetryConfig, RetryExecutor, SystemClock,
};
