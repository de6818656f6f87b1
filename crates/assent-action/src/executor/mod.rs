//! Action executor registry and trait definition.
//!
//! Defines the `ActionExecutor` async trait and the registry the
//! coordinator uses to dispatch a locked intent to its executor.

pub mod declaration;
pub mod email;
pub mod gateway;
pub mod payment;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use assent_core::types::IntentKind;

use crate::error::ActionError;
use crate::types::{ActionPayload, ActionResult, IntentArgs};

pub use declaration::DeclarationExecutor;
pub use email::EmailExecutor;
pub use gateway::{
    DeclarationGateway, DryRunGateway, GatewayError, MailGateway, PaymentGateway,
};
pub use payment::PaymentExecutor;

/// Performs the side effect of one intent kind.
///
/// Only the confirmation coordinator calls `execute`, and only while it
/// holds the intent's lock.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    fn kind(&self) -> IntentKind;

    async fn execute(&self, payload: &ActionPayload) -> Result<ActionResult, ActionError>;

    /// Sanitized one-line description of what `execute` would do.
    fn describe(&self, payload: &ActionPayload) -> String;
}

/// Executors keyed by the intent kind they handle.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<IntentKind, Arc<dyn ActionExecutor>>,
}

impl ExecutorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an executor, replacing any previous one for its kind.
    pub fn register(&mut self, executor: Arc<dyn ActionExecutor>) {
        self.executors.insert(executor.kind(), executor);
    }

    /// Register executors for every kind backed by the dry-run gateway.
    pub fn register_dry_run(&mut self) {
        self.register(Arc::new(EmailExecutor::new(DryRunGateway)));
        self.register(Arc::new(DeclarationExecutor::new(DryRunGateway)));
        self.register(Arc::new(PaymentExecutor::new(DryRunGateway)));
    }

    pub fn get(&self, kind: IntentKind) -> Option<Arc<dyn ActionExecutor>> {
        self.executors.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<IntentKind> {
        IntentKind::ALL
            .into_iter()
            .filter(|k| self.executors.contains_key(k))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.executors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.executors.is_empty()
    }
}

/// Deserialize and validate a payload as the arguments of `kind`.
fn typed_args(kind: IntentKind, payload: &ActionPayload) -> Result<IntentArgs, ActionError> {
    IntentArgs::from_value(kind, &payload.data).map_err(ActionError::InvalidPayload)
}

impl std::fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
