//! Message envelope
//!
//! An [`Envelope`] is created once per message at the broker boundary and
//! consumed by the pipeline. The payload is immutable; the header map may be
//! read and extended by pipeline stages before the handler runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Header map carried next to a payload.
///
/// Lookups are exact-match on the header name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Headers(BTreeMap<String, String>);

impl Headers {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Insert or replace a header, returning the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.0.remove(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Builder-style insert, handy when constructing messages.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Payload plus headers for one inbound or outbound message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    payload: T,
    #[serde(default)]
    pub headers: Headers,
}

impl<T> Envelope<T> {
    pub fn new(payload: T) -> Self {
        Self { payload, headers: Headers::new() }
    }

    pub fn with_headers(payload: T, headers: Headers) -> Self {
        Self { payload, headers }
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Split the envelope into its payload and headers.
    pub fn into_parts(self) -> (T, Headers) {
        (self.payload, self.headers)
    }
}
