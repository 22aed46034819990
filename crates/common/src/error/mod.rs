//! Error classification shared across Conduit crates
//!
//! Every layer keeps its own `thiserror` enum and implements
//! [`ErrorClassification`] so resilience policies and acknowledgement
//! decisions can reason about failures without knowing their concrete type.
//! Resilience policies use [`ErrorClassification::classify`] as their
//! default trigger predicate.
//!
//! | Class | Meaning | Typical errors |
//! |-------|---------|----------------|
//! | **Transient** | May succeed if attempted again | timeouts, throttling, connection resets |
//! | **Terminal** | Will fail the same way again | validation, not found, malformed payload |
//! | **Cancelled** | The caller gave up | shutdown, token cancellation |

use std::fmt;
use std::time::Duration;

/// Whether a failure is worth another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// The same call may succeed if attempted again
    Transient,
    /// The same call will fail the same way
    Terminal,
    /// The caller stopped waiting
    Cancelled,
}

impl fmt::Display for FailureClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Terminal => write!(f, "terminal"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Standard interface for classifying errors
///
/// # Example
///
/// ```rust,ignore
/// impl ErrorClassification for TransportError {
///     fn is_retryable(&self) -> bool {
///         matches!(self.kind, TransportErrorKind::Timeout | TransportErrorKind::Throttled)
///     }
///
///     fn severity(&self) -> ErrorSeverity {
///         ErrorSeverity::Error
///     }
///
///     fn is_critical(&self) -> bool {
///         false
///     }
///
///     fn retry_after(&self) -> Option<Duration> {
///         None
///     }
/// }
/// ```
pub trait ErrorClassification {
    /// Check if this error is retryable
    ///
    /// Retryable errors are typically transient issues that may succeed if
    /// attempted again, such as:
    /// - Network timeouts
    /// - Rate limiting
    /// - Circuit breaker open states
    /// - Temporary service unavailability
    fn is_retryable(&self) -> bool;

    /// Get the error severity level
    fn severity(&self) -> ErrorSeverity;

    /// Check if this is a critical error requiring immediate attention
    fn is_critical(&self) -> bool;

    /// Get the suggested retry delay if applicable
    ///
    /// Returns `Some(Duration)` when a specific retry delay is recommended
    /// (e.g., from a broker throttling hint), or `None` otherwise.
    fn retry_after(&self) -> Option<Duration>;

    /// Classify the failure for resilience policies
    ///
    /// Defaults to [`FailureClass::Transient`] for retryable errors and
    /// [`FailureClass::Terminal`] for everything else.
    fn classify(&self) -> FailureClass {
        if self.is_retryable() {
            FailureClass::Transient
        } else {
            FailureClass::Terminal
        }
    }
}

/// Error severity levels for monitoring and alerting
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Informational, typically for debugging
    Info,
    /// Warning, should be monitored but not critical
    Warning,
    /// Error, requires attention and action
    Error,
    /// Critical, immediate action required
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}
