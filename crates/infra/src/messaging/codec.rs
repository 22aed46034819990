//! JSON payload codec

use std::fmt;
use std::marker::PhantomData;

use conduit_core::{BoxError, MessageCodec};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const JSON_CONTENT_TYPE: &str = "application/json";

/// [`MessageCodec`] backed by `serde_json`
pub struct JsonCodec<T> {
    _payload: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    pub const fn new() -> Self {
        Self { _payload: PhantomData }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("JsonCodec")
    }
}

impl<T> MessageCodec<T> for JsonCodec<T>
where
    T: Serialize + DeserializeOwned,
{
    fn content_type(&self) -> &'static str {
        JSON_CONTENT_TYPE
    }

    fn encode(&self, payload: &T) -> Result<Vec<u8>, BoxError> {
        serde_json::to_vec(payload).map_err(Into::into)
    }

    fn decode(&self, body: &[u8]) -> Result<T, BoxError> {
        serde_json::from_slice(body).map_err(Into::into)
    }
}
