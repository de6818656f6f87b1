//! Bank payment executor.

use async_trait::async_trait;
use tracing::info;

use assent_core::preview::sanitize;
use assent_core::types::IntentKind;

use crate::error::ActionError;
use crate::executor::gateway::PaymentGateway;
use crate::executor::{typed_args, ActionExecutor};
use crate::types::{ActionPayload, ActionResult, IntentArgs, PaymentArgs};

/// Executes the transfer described by a `payment_execute` intent.
pub struct PaymentExecutor<G> {
    gateway: G,
}

impl<G: PaymentGateway> PaymentExecutor<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    fn args(payload: &ActionPayload) -> Result<PaymentArgs, ActionError> {
        match typed_args(IntentKind::PaymentExecute, payload)? {
            IntentArgs::Payment(args) => Ok(args),
            other => Err(ActionError::InvalidPayload(format!(
                "expected payment arguments, got {}",
                other.kind()
            ))),
        }
    }
}

/// "BRL 1500.00" style amount.
fn format_amount(currency: &str, cents: i64) -> String {
    format!("{} {}.{:02}", currency, cents / 100, cents % 100)
}

#[async_trait]
impl<G: PaymentGateway> ActionExecutor for PaymentExecutor<G> {
    fn kind(&self) -> IntentKind {
        IntentKind::PaymentExecute
    }

    async fn execute(&self, payload: &ActionPayload) -> Result<ActionResult, ActionError> {
        let args = Self::args(payload)?;
        let transaction_id = self.gateway.pay(payload.intent_id, &args).await?;

        info!(intent_id = %payload.intent_id, currency = %args.currency, "Payment executed");

        Ok(ActionResult {
            success: true,
            message: format!(
                "Payment of {} to {} completed",
                format_amount(&args.currency, args.amount_cents),
                args.payee_name
            ),
            output: Some(transaction_id),
        })
    }

    fn describe(&self, payload: &ActionPayload) -> String {
        match Self::args(payload) {
            Ok(args) => sanitize(&format!(
                "Pay {} to {} ({}) from account {}",
                format_amount(&args.currency, args.amount_cents),
                args.payee_name,
                args.payee_tax_id,
                args.payer_account
            )),
            Err(_) => "Execute payment (invalid arguments)".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::gateway::GatewayError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    #[derive(Default)]
    struct CountingBank {
        calls: AtomicUsize,
        reject: bool,
    }

    #[async_trait]
    impl PaymentGateway for CountingBank {
        async fn pay(&self, _key: Uuid, _payment: &PaymentArgs) -> Result<String, GatewayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.reject {
                Err(GatewayError::Rejected("insufficient funds".to_string()))
            } else {
                Ok("tx-99".to_string())
            }
        }
    }

    fn payload(amount_cents: i64) -> ActionPayload {
        payload_in("BRL", amount_cents)
    }

    fn payload_in(currency: &str, amount_cents: i64) -> ActionPayload {
        ActionPayload {
            intent_id: Uuid::new_v4(),
            data: serde_json::json!({
                "payer_account": "0001-123456",
                "payee_name": "ACME Ltda",
                "payee_tax_id": "123.456.789-09",
                "amount_cents": amount_cents,
                "currency": currency,
                "description": "Invoice 42"
            }),
        }
    }

    #[test]
    fn test_format_amount() {
        assert_eq!(format_amount("BRL", 150_000), "BRL 1500.00");
        assert_eq!(format_amount("USD", 5), "USD 0.05");
    }

    #[tokio::test]
    async fn test_payment_executed() {
        let executor = PaymentExecutor::new(CountingBank::default());
        let result = executor.execute(&payload(150_000)).await.unwrap();
        assert_eq!(result.message, "Payment of BRL 1500.00 to ACME Ltda completed");
        assert_eq!(result.output.as_deref(), Some("tx-99"));
        assert_eq!(executor.gateway.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_positive_amount_never_reaches_bank() {
        let executor = PaymentExecutor::new(CountingBank::default());
        let err = executor.execute(&payload(0)).await.unwrap_err();
        assert!(matches!(err, ActionError::InvalidPayload(_)));
        assert_eq!(executor.gateway.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_rejection_is_permanent() {
        let executor = PaymentExecutor::new(CountingBank {
            reject: true,
            ..CountingBank::default()
        });
        let err = executor.execute(&payload(100)).await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_describe_masks_amount_and_tax_id() {
        let executor = PaymentExecutor::new(CountingBank::default());
        let text = executor.describe(&payload(150_000));
        assert_eq!(
            text,
            "Pay BRL *** to ACME Ltda (123.***.***-**) from account 0001-123456"
        );
    }

    #[test]
    fn test_describe_masks_any_currency() {
        let executor = PaymentExecutor::new(CountingBank::default());
        let text = executor.describe(&payload_in("GBP", 150_000));
        assert_eq!(
            text,
            "Pay GBP *** to ACME Ltda (123.***.***-**) from account 0001-123456"
        );
    }

    #[tokio::test]
    async fn test_result_message_masks_once_sanitized() {
        let executor = PaymentExecutor::new(CountingBank::default());
        let result = executor.execute(&payload_in("ARS", 2_500_000)).await.unwrap();
        assert_eq!(
            sanitize(&result.message),
            "Payment of ARS *** to ACME Ltda completed"
        );
    }
}
