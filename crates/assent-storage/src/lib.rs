//! Assent Storage crate - SQLite persistence for pending intents.
//!
//! Provides a WAL-mode SQLite database with migrations, the intent record
//! store and the choice prompt store used for disambiguation.

pub mod db;
pub mod intents;
pub mod migrations;
pub mod prompts;

pub use db::Database;
pub use intents::{IntentRepository, EXPIRED_NOTE};
pub use prompts::ChoicePromptRepository;
