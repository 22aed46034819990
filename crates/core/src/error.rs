//! Consumer and producer error taxonomy
//!
//! Adapters only ever see these two shapes. Handler failures of any type are
//! normalized into [`ConsumerError::Processing`] once, at the pipeline's
//! terminal; outbound failures always surface as a [`ProducerError`].

use std::error::Error as StdError;
use std::time::Duration;

use conduit_common::error::{ErrorClassification, ErrorSeverity, FailureClass};
use conduit_common::resilience::ResilienceError;
use thiserror::Error;

use crate::ports::TransportError;

/// Boxed error accepted from application handlers and codecs
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Failure while receiving or processing one inbound message
#[derive(Debug, Error)]
pub enum ConsumerError {
    /// A header declared as required was absent; the handler never ran.
    #[error("required key '{key}' is missing from the message headers")]
    MissingRequiredKey { key: String },

    /// The application handler failed (or panicked).
    #[error("message processing failed: {source}")]
    Processing {
        #[source]
        source: BoxError,
    },

    #[error("message processing was cancelled")]
    Cancelled,

    /// The adapter could not receive from the transport.
    #[error("failed to receive message: {source}")]
    Receive {
        #[source]
        source: TransportError,
    },

    /// The adapter received a body it could not decode.
    #[error("failed to deserialize message: {source}")]
    Deserialize {
        #[source]
        source: BoxError,
    },
}

/// Result type for pipeline execution
pub type ConsumerResult<T = ()> = Result<T, ConsumerError>;

impl ConsumerError {
    pub fn missing_key(key: impl Into<String>) -> Self {
        Self::MissingRequiredKey { key: key.into() }
    }

    /// Wrap a handler failure
    ///
    /// Always yields [`ConsumerError::Processing`], even when the handler
    /// itself returned a `ConsumerError`; that error stays reachable as the
    /// cause.
    pub fn processing(error: impl Into<BoxError>) -> Self {
        Self::Processing { source: error.into() }
    }

    pub fn deserialize(error: impl Into<BoxError>) -> Self {
        Self::Deserialize { source: error.into() }
    }

    /// The wrapped handler failure, if this is a processing error
    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            Self::Processing { source } | Self::Deserialize { source } => Some(source.as_ref()),
            _ => None,
        }
    }

    /// Downcast the wrapped handler failure to a concrete type
    pub fn downcast_cause<T: StdError + 'static>(&self) -> Option<&T> {
        self.cause().and_then(|cause| cause.downcast_ref::<T>())
    }

    /// True for failures raised before a handler could run
    pub fn is_adapter_failure(&self) -> bool {
        matches!(self, Self::Receive { .. } | Self::Deserialize { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::MissingRequiredKey { .. } => "missing_required_key",
            Self::Processing { .. } => "processing",
            Self::Cancelled => "cancelled",
            Self::Receive { .. } => "receive",
            Self::Deserialize { .. } => "deserialize",
        }
    }
}

impl ErrorClassification for ConsumerError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Processing { .. } => true,
            Self::Receive { source } => source.is_retryable(),
            Self::MissingRequiredKey { .. } | Self::Cancelled | Self::Deserialize { .. } => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Cancelled => ErrorSeverity::Info,
            Self::MissingRequiredKey { .. } | Self::Deserialize { .. } => ErrorSeverity::Warning,
            Self::Processing { .. } | Self::Receive { .. } => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Receive { source } => source.retry_after(),
            _ => None,
        }
    }

    fn classify(&self) -> FailureClass {
        match self {
            Self::Cancelled => FailureClass::Cancelled,
            Self::Receive { source } => source.classify(),
            _ if self.is_retryable() => FailureClass::Transient,
            _ => FailureClass::Terminal,
        }
    }
}

/// Failure while publishing outbound messages
///
/// A failed send never leaves part of a batch published.
#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("failed to encode message for '{destination}': {source}")]
    Encode {
        destination: String,
        #[source]
        source: BoxError,
    },

    #[error("failed to send to '{destination}': {source}")]
    Send {
        destination: String,
        #[source]
        source: TransportError,
    },

    /// Fast-fail while the destination's circuit is open; nothing was sent.
    #[error("circuit open for '{destination}'")]
    CircuitOpen { destination: String, retry_after: Option<Duration> },

    #[error("send to '{destination}' failed after {attempts} attempts: {source}")]
    PolicyExhausted {
        destination: String,
        attempts: u32,
        #[source]
        source: TransportError,
    },

    #[error("send to '{destination}' was cancelled")]
    Cancelled { destination: String },
}

impl ProducerError {
    /// Translate a resilience outcome for `destination`
    pub fn from_resilience(
        destination: impl Into<String>,
        error: ResilienceError<TransportError>,
    ) -> Self {
        let destination = destination.into();
        match error {
            ResilienceError::CircuitOpen { retry_after, .. } => {
                Self::CircuitOpen { destination, retry_after }
            }
            ResilienceError::PolicyExhausted { attempts, source, .. } => {
                Self::PolicyExhausted { destination, attempts, source }
            }
            ResilienceError::Cancelled { .. } => Self::Cancelled { destination },
            ResilienceError::Operation(source) => Self::Send { destination, source },
        }
    }

    pub fn destination(&self) -> &str {
        match self {
            Self::Encode { destination, .. }
            | Self::Send { destination, .. }
            | Self::CircuitOpen { destination, .. }
            | Self::PolicyExhausted { destination, .. }
            | Self::Cancelled { destination } => destination,
        }
    }

    /// The transport failure behind this error, if any
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            Self::Send { source, .. } | Self::PolicyExhausted { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl ErrorClassification for ProducerError {
    fn is_retryable(&self) -> bool {
        match self {
            Self::Send { source, .. } => source.is_retryable(),
            Self::CircuitOpen { .. } => true,
            Self::Encode { .. } | Self::PolicyExhausted { .. } | Self::Cancelled { .. } => false,
        }
    }

    fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Cancelled { .. } => ErrorSeverity::Info,
            Self::CircuitOpen { .. } => ErrorSeverity::Warning,
            _ => ErrorSeverity::Error,
        }
    }

    fn is_critical(&self) -> bool {
        false
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { retry_after, .. } => *retry_after,
            Self::Send { source, .. } => source.retry_after(),
            _ => None,
        }
    }

    fn classify(&self) -> FailureClass {
        match self {
            Self::Cancelled { .. } => FailureClass::Cancelled,
            _ if self.is_retryable() => FailureClass::Transient,
            _ => FailureClass::Terminal,
        }
    }
}
