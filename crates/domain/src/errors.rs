//! Error types used throughout the application

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for Conduit configuration and domain validation
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum ConduitError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for Conduit domain operations
pub type Result<T> = std::result::Result<T, ConduitError>;

impl From<serde_json::Error> for ConduitError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ConduitError::Config("retry.attempts must be > 0".to_string());
        assert_eq!(err.to_string(), "Configuration error: retry.attempts must be > 0");
    }

    #[test]
    fn test_error_serializes_tagged() {
        let err = ConduitError::InvalidInput("bad header".to_string());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["type"], "InvalidInput");
        assert_eq!(json["message"], "bad header");
    }

    #[test]
    fn test_from_serde_json_error() {
        let parse = serde_json::from_str::<u32>("not-a-number").unwrap_err();
        let err: ConduitError = parse.into();
        assert!(matches!(err, ConduitError::Serialization(_)));
    }
}
