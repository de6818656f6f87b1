//! Typed arguments, executor payloads and confirmation outcomes.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use assent_core::types::IntentKind;

use crate::error::ActionError;

// =============================================================================
// Per-kind arguments
// =============================================================================

/// Arguments of an `email_send` intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailArgs {
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// One line of a customs declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarationItem {
    pub description: String,
    /// Tariff classification code (NCM).
    pub tariff_code: String,
    pub quantity: u32,
    pub unit_value_cents: i64,
}

/// Arguments of a `declaration_create` intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarationArgs {
    pub declaration_type: String,
    pub importer_tax_id: String,
    pub reference: String,
    pub items: Vec<DeclarationItem>,
}

/// Arguments of a `payment_execute` intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentArgs {
    pub payer_account: String,
    pub payee_name: String,
    pub payee_tax_id: String,
    pub amount_cents: i64,
    pub currency: String,
    #[serde(default)]
    pub description: String,
}

/// Closed set of arguments, one variant per intent kind.
///
/// Rows store the inner value only; the kind column says which variant it is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "args", rename_all = "snake_case")]
pub enum IntentArgs {
    Email(EmailArgs),
    Declaration(DeclarationArgs),
    Payment(PaymentArgs),
}

impl IntentArgs {
    pub fn kind(&self) -> IntentKind {
        match self {
            IntentArgs::Email(_) => IntentKind::EmailSend,
            IntentArgs::Declaration(_) => IntentKind::DeclarationCreate,
            IntentArgs::Payment(_) => IntentKind::PaymentExecute,
        }
    }

    /// Parse and validate stored arguments for `kind`.
    pub fn from_value(kind: IntentKind, value: &serde_json::Value) -> Result<Self, String> {
        let args = match kind {
            IntentKind::EmailSend => IntentArgs::Email(parse_args(value)?),
            IntentKind::DeclarationCreate => IntentArgs::Declaration(parse_args(value)?),
            IntentKind::PaymentExecute => IntentArgs::Payment(parse_args(value)?),
        };
        args.validate()?;
        Ok(args)
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            IntentArgs::Email(a) => {
                if a.to.is_empty() {
                    return Err("email needs at least one recipient".to_string());
                }
                if a.to.iter().chain(a.cc.iter()).any(|r| !r.contains('@')) {
                    return Err("email recipient is not an address".to_string());
                }
            }
            IntentArgs::Declaration(a) => {
                if a.declaration_type.trim().is_empty() || a.importer_tax_id.trim().is_empty() {
                    return Err("declaration type and importer are required".to_string());
                }
                if a.items.is_empty() {
                    return Err("declaration needs at least one item".to_string());
                }
                if a.items.iter().any(|i| i.quantity == 0) {
                    return Err("declaration item quantity must be positive".to_string());
                }
            }
            IntentArgs::Payment(a) => {
                if a.amount_cents <= 0 {
                    return Err("payment amount must be positive".to_string());
                }
                if a.currency.len() != 3 || !a.currency.chars().all(|c| c.is_ascii_uppercase()) {
                    return Err(format!("invalid currency code: {}", a.currency));
                }
                if a.payer_account.trim().is_empty() || a.payee_name.trim().is_empty() {
                    return Err("payer account and payee are required".to_string());
                }
            }
        }
        Ok(())
    }
}

fn parse_args<T: DeserializeOwned>(value: &serde_json::Value) -> Result<T, String> {
    T::deserialize(value).map_err(|e| e.to_string())
}

// =============================================================================
// Executor boundary
// =============================================================================

/// What an executor receives once the coordinator holds the lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionPayload {
    /// Stable across re-offers; gateways may use it as an idempotency key.
    pub intent_id: Uuid,
    pub data: serde_json::Value,
}

impl ActionPayload {
    /// Deserialize the payload into an executor's argument type.
    pub fn args<T: DeserializeOwned>(&self) -> Result<T, ActionError> {
        T::deserialize(&self.data).map_err(|e| ActionError::InvalidPayload(e.to_string()))
    }
}

/// Result returned by action executors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    /// External reference (message id, protocol number, transaction id).
    pub output: Option<String>,
}

// =============================================================================
// Confirmation outcomes
// =============================================================================

/// One entry of a numbered disambiguation list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// 1-based position the user replies with.
    pub index: usize,
    pub intent_id: Uuid,
    pub preview_text: String,
}

/// Result of resolving one user reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConfirmationOutcome {
    Executed {
        intent_id: Uuid,
        result: ActionResult,
    },
    /// The executor failed. A retryable failure left the intent pending.
    Failed {
        intent_id: Uuid,
        error: String,
        retryable: bool,
    },
    Cancelled {
        count: usize,
    },
    AmbiguousChoiceRequired {
        options: Vec<ChoiceOption>,
    },
    AlreadyExecuting {
        intent_id: Uuid,
    },
    NoPendingIntent,
    /// A single intent is pending but the reply was neither yes nor no.
    NotUnderstood {
        intent_id: Uuid,
        preview: String,
    },
}

impl ConfirmationOutcome {
    /// Text to show the user.
    pub fn user_message(&self) -> String {
        match self {
            ConfirmationOutcome::Executed { result, .. } => result.message.clone(),
            ConfirmationOutcome::Failed {
                error, retryable, ..
            } => {
                if *retryable {
                    format!("{}. You can confirm again to retry.", error)
                } else {
                    format!("{}. The action was cancelled.", error)
                }
            }
            ConfirmationOutcome::Cancelled { count: 1 } => "Cancelled.".to_string(),
            ConfirmationOutcome::Cancelled { count } => format!("Cancelled {} actions.", count),
            ConfirmationOutcome::AmbiguousChoiceRequired { options } => {
                let mut text = String::from(
                    "Several actions are waiting for confirmation. Reply with a number, or \"cancel\":",
                );
                for option in options {
                    text.push_str(&format!("\n({}) {}", option.index, option.preview_text));
                }
                text
            }
            ConfirmationOutcome::AlreadyExecuting { .. } => {
                "This action is already being processed, please wait.".to_string()
            }
            ConfirmationOutcome::NoPendingIntent => {
                "There is no action waiting for confirmation.".to_string()
            }
            ConfirmationOutcome::NotUnderstood { preview, .. } => {
                format!("Reply \"yes\" to confirm or \"cancel\" to discard: {}", preview)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn email_value() -> serde_json::Value {
        json!({
            "to": ["ana@example.com"],
            "subject": "Invoice 42",
            "body": "Please find the invoice attached."
        })
    }

    fn payment_value(amount: i64, currency: &str) -> serde_json::Value {
        json!({
            "payer_account": "0001-123456",
            "payee_name": "ACME Ltda",
            "payee_tax_id": "12.345.678/0001-90",
            "amount_cents": amount,
            "currency": currency,
        })
    }

    #[test]
    fn test_email_args_parse_with_default_cc() {
        let args = IntentArgs::from_value(IntentKind::EmailSend, &email_value()).unwrap();
        match args {
            IntentArgs::Email(ref email) => {
                assert_eq!(email.to, vec!["ana@example.com"]);
                assert!(email.cc.is_empty());
            }
            _ => panic!("expected email args"),
        }
        assert_eq!(args.kind(), IntentKind::EmailSend);
    }

    #[test]
    fn test_email_without_recipients_rejected() {
        let value = json!({"to": [], "subject": "s", "body": "b"});
        let err = IntentArgs::from_value(IntentKind::EmailSend, &value).unwrap_err();
        assert!(err.contains("recipient"));
    }

    #[test]
    fn test_args_of_wrong_kind_rejected() {
        assert!(IntentArgs::from_value(IntentKind::PaymentExecute, &email_value()).is_err());
    }

    #[test]
    fn test_payment_validation() {
        assert!(IntentArgs::from_value(IntentKind::PaymentExecute, &payment_value(1_500, "BRL"))
            .is_ok());
        assert!(IntentArgs::from_value(IntentKind::PaymentExecute, &payment_value(0, "BRL"))
            .is_err());
        assert!(IntentArgs::from_value(IntentKind::PaymentExecute, &payment_value(10, "reais"))
            .is_err());
    }

    #[test]
    fn test_declaration_needs_items() {
        let value = json!({
            "declaration_type": "import",
            "importer_tax_id": "12.345.678/0001-90",
            "reference": "PO-7",
            "items": []
        });
        assert!(IntentArgs::from_value(IntentKind::DeclarationCreate, &value).is_err());
    }

    #[test]
    fn test_payload_args_invalid() {
        let payload = ActionPayload {
            intent_id: Uuid::new_v4(),
            data: json!({"subject": 3}),
        };
        let err = payload.args::<EmailArgs>().unwrap_err();
        assert!(matches!(err, ActionError::InvalidPayload(_)));
    }

    #[test]
    fn test_ambiguous_message_lists_options() {
        let outcome = ConfirmationOutcome::AmbiguousChoiceRequired {
            options: vec![
                ChoiceOption {
                    index: 1,
                    intent_id: Uuid::new_v4(),
                    preview_text: "Send email to an***@example.com".to_string(),
                },
                ChoiceOption {
                    index: 2,
                    intent_id: Uuid::new_v4(),
                    preview_text: "Send email to bo***@example.com".to_string(),
                },
            ],
        };
        let text = outcome.user_message();
        assert!(text.contains("\n(1) Send email to an***@example.com"));
        assert!(text.contains("\n(2) Send email to bo***@example.com"));
    }

    #[test]
    fn test_outcome_serializes_with_tag() {
        let json = serde_json::to_value(ConfirmationOutcome::Cancelled { count: 2 }).unwrap();
        assert_eq!(json, json!({"outcome": "cancelled", "count": 2}));
    }
}
