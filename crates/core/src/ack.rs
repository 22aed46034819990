//! Acknowledgement decision for a processed message

use conduit_domain::{AckDecision, ProcessingErrorAction};

use crate::error::{ConsumerError, ConsumerResult};

/// Maps a pipeline outcome to the single settlement of its message
pub trait AckOutcome: Sized {
    fn for_outcome(outcome: &ConsumerResult, on_processing_error: ProcessingErrorAction) -> Self;
}

impl AckOutcome for AckDecision {
    /// - success: ack
    /// - missing required key or undecodable body: discard, redelivery
    ///   cannot fix either
    /// - handler failure: requeue unless configured to discard
    /// - cancelled or receive failure: requeue
    fn for_outcome(outcome: &ConsumerResult, on_processing_error: ProcessingErrorAction) -> Self {
        match outcome {
            Ok(()) => Self::Ack,
            Err(ConsumerError::MissingRequiredKey { .. } | ConsumerError::Deserialize { .. }) => {
                Self::NackDiscard
            }
            Err(ConsumerError::Processing { .. }) => on_processing_error.decision(),
            Err(ConsumerError::Cancelled | ConsumerError::Receive { .. }) => Self::NackRequeue,
        }
    }
}
