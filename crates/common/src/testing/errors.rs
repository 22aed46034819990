//! Error fixture with a fixed failure class

use std::time::Duration;

use thiserror::Error;

use crate::error::{ErrorClassification, ErrorSeverity, FailureClass};

/// Error whose [`FailureClass`] is chosen by the test
///
/// Lets resilience policies be exercised without a real transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} ({class})")]
pub struct ClassifiedError {
    pub class: FailureClass,
    pub message: String,
    pub retry_after: Option<Duration>,
}

impl ClassifiedError {
    pub fn new(class: FailureClass, message: impl Into<String>) -> Self {
        Self { class, message: message.into(), retry_after: None }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(FailureClass::Transient, message)
    }

    pub fn terminal(message: impl Into<String>) -> Self {
        Self::new(FailureClass::Terminal, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(FailureClass::Cancelled, message)
    }

    /// Attach a retry hint, as a throttling broker would
    pub fn with_retry_after(mut self, delay: Duration) -> Self {
        self.retry_after = Some(delay);
        self
    }
}

impl ErrorClassification for ClassifiedError {
    fn is_retryable(&self) -> bool {
        self.class == FailureClass::Transient
    }

    fn severity(&self) -> ErrorSeverity {
        match self.class {
            FailureClass::Transient => ErrorSeverity::Warning,
            FailureClass::Terminal => ErrorSeverity::Error,
            FailureClass::Cancelled => ErrorSeverity::Info,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    fn classify(&self) -> FailureClass {
        self.class
    }
}
