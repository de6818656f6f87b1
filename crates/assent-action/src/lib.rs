//! Confirmation engine for assent.
//!
//! Manages pending intents through their lifecycle, classifies user
//! replies, resolves confirmations with disambiguation, and dispatches
//! locked intents to pluggable executors.

pub mod coordinator;
pub mod error;
pub mod executor;
pub mod intent;
pub mod reply;
pub mod sweeper;
pub mod types;

pub use coordinator::Coordinator;
pub use error::{ActionError, CoordinatorError, IntentError};
pub use executor::{ActionExecutor, ExecutorRegistry};
pub use intent::PendingIntentManager;
pub use reply::{classify_reply, Reply};
pub use sweeper::{ExpirySweeper, SweepReport};
pub use types::{
    ActionPayload, ActionResult, ChoiceOption, ConfirmationOutcome, DeclarationArgs,
    DeclarationItem, EmailArgs, IntentArgs, PaymentArgs,
};
