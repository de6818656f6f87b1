//! Email send executor.

use async_trait::async_trait;
use tracing::info;

use assent_core::preview::sanitize;
use assent_core::types::IntentKind;

use crate::error::ActionError;
use crate::executor::gateway::MailGateway;
use crate::executor::{typed_args, ActionExecutor};
use crate::types::{ActionPayload, ActionResult, EmailArgs, IntentArgs};

/// Sends the email described by an `email_send` intent.
pub struct EmailExecutor<G> {
    gateway: G,
}

impl<G: MailGateway> EmailExecutor<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }

    fn args(payload: &ActionPayload) -> Result<EmailArgs, ActionError> {
        match typed_args(IntentKind::EmailSend, payload)? {
            IntentArgs::Email(args) => Ok(args),
            other => Err(ActionError::InvalidPayload(format!(
                "expected email arguments, got {}",
                other.kind()
            ))),
        }
    }
}

#[async_trait]
impl<G: MailGateway> ActionExecutor for EmailExecutor<G> {
    fn kind(&self) -> IntentKind {
        IntentKind::EmailSend
    }

    async fn execute(&self, payload: &ActionPayload) -> Result<ActionResult, ActionError> {
        let args = Self::args(payload)?;
        let message_id = self.gateway.send(payload.intent_id, &args).await?;

        let recipients = args.to.len() + args.cc.len();
        info!(intent_id = %payload.intent_id, recipients, "Email sent");

        Ok(ActionResult {
            success: true,
            message: format!("Email \"{}\" sent to {}", args.subject, args.to.join(", ")),
            output: Some(message_id),
        })
    }

    fn describe(&self, payload: &ActionPayload) -> String {
        match Self::args(payload) {
            Ok(args) => sanitize(&format!(
                "Send email \"{}\" to {}",
                args.subject,
                args.to.join(", ")
            )),
            Err(_) => "Send email (invalid arguments)".to_string(),
        }
    }
}
