//! Scoped key declarations
//!
//! A scoped key names a header the context and logging stages copy into
//! their per-call scope. Required keys must be present or the message fails
//! before any handler runs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopedKey {
    #[serde(alias = "keyName")]
    pub name: String,
    #[serde(default)]
    pub required: bool,
}

impl ScopedKey {
    pub fn required(name: impl Into<String>) -> Self {
        Self { name: name.into(), required: true }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self { name: name.into(), required: false }
    }
}
