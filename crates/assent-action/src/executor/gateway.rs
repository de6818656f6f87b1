//! Interfaces to the external systems that perform side effects.
//!
//! Each gateway receives the intent id as an idempotency key so that a
//! re-offered intent does not produce a second side effect on systems that
//! support deduplication.

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::error::ActionError;
use crate::types::{DeclarationArgs, EmailArgs, PaymentArgs};

/// Failure reported by an external system.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    /// The system could not be reached or timed out. Safe to re-offer.
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// The system refused the request. Re-sending will not help.
    #[error("rejected: {0}")]
    Rejected(String),
}

impl From<GatewayError> for ActionError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Unavailable(_) => ActionError::Retryable(err.to_string()),
            GatewayError::Rejected(_) => ActionError::Permanent(err.to_string()),
        }
    }
}

/// Outbound mail delivery. Returns the provider's message id.
#[async_trait]
pub trait MailGateway: Send + Sync {
    async fn send(&self, idempotency_key: Uuid, email: &EmailArgs) -> Result<String, GatewayError>;
}

/// Customs declaration registration. Returns the protocol number.
#[async_trait]
pub trait DeclarationGateway: Send + Sync {
    async fn register(
        &self,
        idempotency_key: Uuid,
        declaration: &DeclarationArgs,
    ) -> Result<String, GatewayError>;
}

/// Bank transfer execution. Returns the transaction id.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn pay(&self, idempotency_key: Uuid, payment: &PaymentArgs)
        -> Result<String, GatewayError>;
}

/// Gateway that performs nothing and logs what it would have done.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunGateway;

impl DryRunGateway {
    fn reference(prefix: &str, key: Uuid) -> String {
        format!("{}-{}", prefix, key.simple())
    }
}

#[async_trait]
impl MailGateway for DryRunGateway {
    async fn send(&self, idempotency_key: Uuid, email: &EmailArgs) -> Result<String, GatewayError> {
        info!(
            intent_id = %idempotency_key,
            recipients = email.to.len() + email.cc.len(),
            "Dry run: email not sent"
        );
        Ok(Self::reference("dry-run-msg", idempotency_key))
    }
}

#[async_trait]
impl DeclarationGateway for DryRunGateway {
    async fn register(
        &self,
        idempotency_key: Uuid,
        declaration: &DeclarationArgs,
    ) -> Result<String, GatewayError> {
        info!(
            intent_id = %idempotency_key,
            items = declaration.items.len(),
            "Dry run: declaration not registered"
        );
        Ok(Self::reference("dry-run-decl", idempotency_key))
    }
}

#[async_trait]
impl PaymentGateway for DryRunGateway {
    async fn pay(
        &self,
        idempotency_key: Uuid,
        payment: &PaymentArgs,
    ) -> Result<String, GatewayError> {
        info!(
            intent_id = %idempotency_key,
            currency = %payment.currency,
            "Dry run: payment not executed"
        );
        Ok(Self::reference("dry-run-pay", idempotency_key))
    }
}
