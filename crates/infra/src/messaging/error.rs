//! Consumer host lifecycle errors

use conduit_domain::ConduitError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("Consumer host already running")]
    AlreadyRunning,

    #[error("Consumer host not running")]
    NotRunning,

    /// In-flight messages did not finish within the shutdown timeout.
    #[error("Consumer host did not drain within {millis}ms")]
    Timeout { millis: u64 },

    #[error("Receive loop join failed: {0}")]
    TaskJoinFailed(String),
}

impl From<HostError> for ConduitError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::AlreadyRunning | HostError::NotRunning => {
                Self::InvalidInput(err.to_string())
            }
            HostError::Timeout { .. } | HostError::TaskJoinFailed(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

/// Convenience type alias for consumer host operations
pub type HostResult<T> = Result<T, HostError>;
