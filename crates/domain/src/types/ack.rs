//! Acknowledgement decisions
//!
//! Every received message is settled exactly once with one of these
//! decisions.

use serde::{Deserialize, Serialize};

use crate::impl_domain_enum_conversions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckDecision {
    /// Remove the message from the broker.
    Ack,
    /// Return the message for redelivery.
    NackRequeue,
    /// Drop the message (or dead-letter it, if the broker supports that).
    NackDiscard,
}

impl_domain_enum_conversions!(AckDecision {
    Ack => "ack",
    NackRequeue => "nack_requeue",
    NackDiscard => "nack_discard",
});

/// What a consumer does with a message whose handler failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingErrorAction {
    #[default]
    Requeue,
    Discard,
}

impl_domain_enum_conversions!(ProcessingErrorAction {
    Requeue => "requeue",
    Discard => "discard",
});

impl ProcessingErrorAction {
    pub fn decision(self) -> AckDecision {
        match self {
            Self::Requeue => AckDecision::NackRequeue,
            Self::Discard => AckDecision::NackDiscard,
        }
    }
}
