//! Broker-agnostic transport failures
//!
//! Every adapter reports its SDK's failures as a [`TransportError`]. The
//! kind alone decides whether resilience policies engage, so policy logic
//! never inspects SDK exception types.

use std::fmt;
use std::time::Duration;

use conduit_common::error::{ErrorClassification, ErrorSeverity, FailureClass};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportErrorKind {
    /// The call did not complete in time.
    Timeout,
    /// The connection could not be established or was lost.
    Connection,
    /// The broker or service is temporarily unavailable.
    Unavailable,
    /// The broker asked the client to slow down.
    Throttled,
    /// The broker refused the request (bad payload, authorization).
    Rejected,
    /// The destination does not exist.
    NotFound,
    /// The caller abandoned the call.
    Cancelled,
    Other,
}

impl TransportErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::Unavailable => "unavailable",
            Self::Throttled => "throttled",
            Self::Rejected => "rejected",
            Self::NotFound => "not_found",
            Self::Cancelled => "cancelled",
            Self::Other => "other",
        }
    }

    pub fn failure_class(self) -> FailureClass {
        match self {
            Self::Timeout | Self::Connection | Self::Unavailable | Self::Throttled => {
                FailureClass::Transient
            }
            Self::Cancelled => FailureClass::Cancelled,
            Self::Rejected | Self::NotFound | Self::Other => FailureClass::Terminal,
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transport failure reported by a broker or service adapter
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
    /// Broker-supplied hint for when to try again.
    pub retry_after: Option<Duration>,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), retry_after: None }
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Timeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Connection, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unavailable, message)
    }

    pub fn throttled(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self { retry_after, ..Self::new(TransportErrorKind::Throttled, message) }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Rejected, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotFound, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Cancelled, message)
    }

    pub fn other(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Other, message)
    }
}

impl ErrorClassification for TransportError {
    fn is_retryable(&self) -> bool {
        self.kind.failure_class() == FailureClass::Transient
    }

    fn severity(&self) -> ErrorSeverity {
        match self.kind {
            TransportErrorKind::Cancelled => ErrorSeverity::Info,
            TransportErrorKind::Throttled => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    fn classify(&self) -> FailureClass {
        self.kind.failure_class()
    }
}
