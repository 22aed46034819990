//! Error types for resilience operations

use std::time::Duration;

use thiserror::Error;

use crate::error::{ErrorClassification, ErrorSeverity, FailureClass};

/// Simple configuration error for validation
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

impl ConfigError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid { message: message.into() }
    }
}

/// Configuration result type using simple config errors
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors surfaced by the resilience handler and its primitives
///
/// Generic over the underlying operation error `E`. Failures the policies
/// did not act on come back as [`ResilienceError::Operation`], unmodified.
#[derive(Debug, Error)]
pub enum ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    /// The breaker is open; the operation was not invoked.
    #[error("Circuit breaker for '{operation}' is open, rejecting calls")]
    CircuitOpen { operation: String, retry_after: Option<Duration> },

    /// Every retry attempt failed with a matching error.
    #[error("'{operation}' failed after {attempts} attempts")]
    PolicyExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: E,
    },

    /// Cancellation was observed before the call could complete.
    #[error("'{operation}' cancelled after {attempts} attempts")]
    Cancelled { operation: String, attempts: u32 },

    /// The operation failed and no policy engaged.
    #[error(transparent)]
    Operation(E),
}

/// Result type for resilience operations
pub type ResilienceResult<T, E> = Result<T, ResilienceError<E>>;

impl<E> ResilienceError<E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, Self::PolicyExhausted { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The operation error this failure carries, if any.
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            Self::PolicyExhausted { source, .. } | Self::Operation(source) => Some(source),
            Self::CircuitOpen { .. } | Self::Cancelled { .. } => None,
        }
    }

    pub fn into_operation_error(self) -> Option<E> {
        match self {
            Self::PolicyExhausted { source, .. } | Self::Operation(source) => Some(source),
            Self::CircuitOpen { .. } | Self::Cancelled { .. } => None,
        }
    }
}

impl<E> ErrorClassification for ResilienceError<E>
where
    E: std::error::Error + ErrorClassification + Send + Sync + 'static,
{
    fn is_retryable(&self) -> bool {
        match self {
            // The breaker recovers on its own; callers may come back later.
            Self::CircuitOpen { .. } => true,
            // Retries already happened inside the handler.
            Self::PolicyExhausted { .. } | Self::Cancelled { .. } => false,
            Self::Operation(e) => e.is_retryable(),
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::CircuitOpen { .. } => ErrorSeverity::Warning,
            Self::PolicyExhausted { .. } => ErrorSeverity::Error,
            Self::Cancelled { .. } => ErrorSeverity::Info,
            Self::Operation(e) => e.severity(),
        }
    }

    fn is_critical(&self) -> bool {
        match self {
            Self::Operation(e) => e.is_critical(),
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => *retry_after,
            Self::Operation(e) => e.retry_after(),
            _ => None,
        }
    }

    fn classify(&self) -> FailureClass {
        match self {
            Self::CircuitOpen { .. } => FailureClass::Transient,
            Self::PolicyExhausted { .. } => FailureClass::Terminal,
            Self::Cancelled { .. } => FailureClass::Cancelled,
            Self::Operation(e) => e.classify(),
        }
    }
}
