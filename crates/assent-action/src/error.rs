//! Error types for the confirmation subsystem.

use assent_core::error::AssentError;
use assent_core::types::{IntentKind, IntentStatus};
use uuid::Uuid;

/// Errors reported by an action executor.
///
/// The variant is the executor's classification of the failure: it decides
/// whether the intent is re-offered (`pending`) or closed (`cancelled`).
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Temporary failure: {0}")]
    Retryable(String),
    #[error("Action failed: {0}")]
    Permanent(String),
    #[error("Payload validation failed: {0}")]
    InvalidPayload(String),
}

impl ActionError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ActionError::Retryable(_))
    }
}

/// Errors from the pending intent manager.
#[derive(Debug, thiserror::Error)]
pub enum IntentError {
    #[error("Invalid intent arguments: {0}")]
    InvalidArguments(String),
    #[error("Unknown intent kind: {0}")]
    UnknownKind(String),
    #[error("Intent not found: {0}")]
    NotFound(Uuid),
    #[error("Invalid state transition: {0} -> {1}")]
    InvalidTransition(IntentStatus, IntentStatus),
    #[error("Storage error: {0}")]
    Storage(#[from] AssentError),
}

/// Errors from the confirmation coordinator.
///
/// Conversational outcomes (ambiguity, lost lock races, executor failures)
/// are not errors; they come back as `ConfirmationOutcome` variants.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("No executor registered for intent kind: {0}")]
    UnregisteredExecutor(IntentKind),
    #[error(transparent)]
    Intent(#[from] IntentError),
    #[error("Storage error: {0}")]
    Storage(#[from] AssentError),
}
