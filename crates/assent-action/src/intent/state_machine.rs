//! Intent state machine with validated transitions.
//!
//! pending -> executing -> executed
//! pending -> cancelled | expired
//! executing -> cancelled (permanent failure, stuck reconciliation)
//! executing -> pending (retryable failure, re-offer)

use assent_core::types::IntentStatus;

use crate::error::IntentError;

/// Validate that a status transition is allowed.
///
/// Valid transitions:
/// - Pending -> Executing (lock)
/// - Pending -> Cancelled
/// - Pending -> Expired (lazy or swept)
/// - Executing -> Executed
/// - Executing -> Cancelled
/// - Executing -> Pending
pub fn validate_transition(from: IntentStatus, to: IntentStatus) -> Result<(), IntentError> {
    let valid = matches!(
        (from, to),
        (IntentStatus::Pending, IntentStatus::Executing)
            | (IntentStatus::Pending, IntentStatus::Cancelled)
            | (IntentStatus::Pending, IntentStatus::Expired)
            | (IntentStatus::Executing, IntentStatus::Executed)
            | (IntentStatus::Executing, IntentStatus::Cancelled)
            | (IntentStatus::Executing, IntentStatus::Pending)
    );

    if valid {
        Ok(())
    } else {
        Err(IntentError::InvalidTransition(from, to))
    }
}
