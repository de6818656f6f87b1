//! Customs declaration executor.

use async_trait::async_trait;
use tracing::info;

use assent_core::preview::sanitize;
use assent_core::types::IntentKind;

use crate::error::ActionError;
use crate::executor::gateway::DeclarationGateway;
use crate::executor::{typed_args, ActionExecutor};
use crate::types::{ActionPayload, ActionResult, DeclarationArgs, IntentArgs};

/// Registers the declaration described by a `declaration_create` intent.
pub struct DeclarationExecutor<G> {
    gateway: G,
}

impl<G: DeclarationGateway> DeclarationExecutor<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    fn args(payload: &ActionPayload) -> Result<DeclarationArgs, ActionError> {
        match typed_args(IntentKind::DeclarationCreate, payload)? {
            IntentArgs::Declaration(args) => Ok(args),
            other => Err(ActionError::InvalidPayload(format!(
                "expected declaration arguments, got {}",
                other.kind()
            ))),
        }
    }
}

#[async_trait]
impl<G: DeclarationGateway> ActionExecutor for DeclarationExecutor<G> {
    fn kind(&self) -> IntentKind {
        IntentKind::DeclarationCreate
    }

    async fn execute(&self, payload: &ActionPayload) -> Result<ActionResult, ActionError> {
        let args = Self::args(payload)?;
        let protocol = self.gateway.register(payload.intent_id, &args).await?;

        info!(
            intent_id = %payload.intent_id,
            items = args.items.len(),
            "Declaration registered"
        );

        Ok(ActionResult {
            success: true,
            message: format!(
                "Declaration {} ({}) registered under protocol {}",
                args.reference, args.declaration_type, protocol
            ),
            output: Some(protocol),
        })
    }

    fn describe(&self, payload: &ActionPayload) -> String {
        match Self::args(payload) {
            Ok(args) => sanitize(&format!(
                "Register {} declaration {} for importer {} with {} item(s)",
                args.declaration_type,
                args.reference,
                args.importer_tax_id,
                args.items.len()
            )),
            Err(_) => "Register declaration (invalid arguments)".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::gateway::GatewayError;
    use uuid::Uuid;

    struct FixedProtocol(Result<String, GatewayError>);

    #[async_trait]
    impl DeclarationGateway for FixedProtocol {
        async fn register(
            &self,
            _key: Uuid,
            _declaration: &DeclarationArgs,
        ) -> Result<String, GatewayError> {
            self.0.clone()
        }
    }

    fn payload() -> ActionPayload {
        ActionPayload {
            intent_id: Uuid::new_v4(),
            data: serde_json::json!({
                "declaration_type": "import",
                "importer_tax_id": "12.345.678/0001-90",
                "reference": "PO-7781",
                "items": [
                    {"description": "Bearings", "tariff_code": "8482.10.10", "quantity": 200, "unit_value_cents": 450},
                    {"description": "Seals", "tariff_code": "4016.93.00", "quantity": 50, "unit_value_cents": 120}
                ]
            }),
        }
    }

    #[tokio::test]
    async fn test_declaration_registered() {
        let executor = DeclarationExecutor::new(FixedProtocol(Ok("25BR0001".to_string())));
        let result = executor.execute(&payload()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.output.as_deref(), Some("25BR0001"));
        assert!(result.message.contains("PO-7781"));
    }

    #[tokio::test]
    async fn test_declaration_gateway_down_is_retryable() {
        let executor = DeclarationExecutor::new(FixedProtocol(Err(GatewayError::Unavailable(
            "portal offline".to_string(),
        ))));
        assert!(executor.execute(&payload()).await.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_wrong_kind_payload_rejected() {
        let executor = DeclarationExecutor::new(FixedProtocol(Ok("x".to_string())));
        let payload = ActionPayload {
            intent_id: Uuid::new_v4(),
            data: serde_json::json!({"to": ["a@b.com"], "subject": "s", "body": "b"}),
        };
        let err = executor.execute(&payload).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidPayload(_)));
    }

    #[test]
    fn test_describe_masks_tax_id() {
        let executor = DeclarationExecutor::new(FixedProtocol(Ok("x".to_string())));
        let text = executor.describe(&payload());
        assert_eq!(
            text,
            "Register import declaration PO-7781 for importer 12.***.***/****-** with 2 item(s)"
        );
    }
}
