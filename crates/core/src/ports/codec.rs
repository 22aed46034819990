//! Payload serialization port

use crate::error::BoxError;

/// Converts typed payloads to and from message bodies
pub trait MessageCodec<T>: Send + Sync {
    /// MIME type written to the `content-type` header
    fn content_type(&self) -> &'static str;

    fn encode(&self, payload: &T) -> Result<Vec<u8>, BoxError>;

    fn decode(&self, body: &[u8]) -> Result<T, BoxError>;
}
