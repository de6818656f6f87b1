//! Confirmation coordinator.
//!
//! Turns a user's reply into at most one execution of one pending intent.
//! With several candidates of the same kind it never guesses: it persists a
//! numbered `ChoicePrompt` and waits for an index. Execution always happens
//! behind `PendingIntentManager::try_lock`.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use assent_core::types::{ChoicePrompt, IntentKind, IntentStatus, PendingIntent, Timestamp};
use assent_storage::ChoicePromptRepository;

use crate::error::{CoordinatorError, IntentError};
use crate::executor::ExecutorRegistry;
use crate::intent::PendingIntentManager;
use crate::reply::{classify_reply, Reply};
use crate::types::{ActionPayload, ChoiceOption, ConfirmationOutcome};

/// Note stored on intents the user declined.
pub const CANCELLED_BY_USER_NOTE: &str = "cancelled by user";

/// Resolves confirmation replies for pending intents.
pub struct Coordinator {
    manager: Arc<PendingIntentManager>,
    prompts: ChoicePromptRepository,
    registry: ExecutorRegistry,
    choice_ttl_secs: i64,
}

impl Coordinator {
    pub fn new(
        manager: Arc<PendingIntentManager>,
        prompts: ChoicePromptRepository,
        registry: ExecutorRegistry,
        choice_ttl_secs: i64,
    ) -> Self {
        Self {
            manager,
            prompts,
            registry,
            choice_ttl_secs,
        }
    }

    pub fn manager(&self) -> &Arc<PendingIntentManager> {
        &self.manager
    }

    /// Resolve a reply for the kind named by `kind_hint` ("email", "payment_execute").
    ///
    /// An unknown hint resolves to `NoPendingIntent`.
    pub async fn resolve_confirmation(
        &self,
        owner_session_id: &str,
        reply_text: &str,
        kind_hint: &str,
    ) -> Result<ConfirmationOutcome, CoordinatorError> {
        match IntentKind::from_hint(kind_hint) {
            Some(kind) => self.resolve(owner_session_id, reply_text, kind).await,
            None => {
                debug!(session = %owner_session_id, hint = %kind_hint, "Unknown kind hint");
                Ok(ConfirmationOutcome::NoPendingIntent)
            }
        }
    }

    /// Resolve a reply against the session's pending intents of `kind`.
    pub async fn resolve(
        &self,
        owner_session_id: &str,
        reply_text: &str,
        kind: IntentKind,
    ) -> Result<ConfirmationOutcome, CoordinatorError> {
        let reply = classify_reply(reply_text);
        let now = self.manager.now();
        let candidates = self
            .manager
            .list_pending_by_kind_and_owner(kind, owner_session_id)?;

        debug!(
            session = %owner_session_id,
            kind = %kind,
            reply = ?reply,
            candidates = candidates.len(),
            "Resolving confirmation reply"
        );

        if let Some(prompt) = self.open_prompt(owner_session_id, kind, now)? {
            return self
                .resolve_choice(owner_session_id, kind, &prompt, reply, candidates)
                .await;
        }

        match candidates.as_slice() {
            [] => Ok(ConfirmationOutcome::NoPendingIntent),
            [only] => self.resolve_single(owner_session_id, only, reply).await,
            _ => self.present_choices(owner_session_id, kind, &candidates, now),
        }
    }

    /// Exactly one candidate: affirm confirms it, cancel cancels it.
    async fn resolve_single(
        &self,
        owner_session_id: &str,
        only: &PendingIntent,
        reply: Reply,
    ) -> Result<ConfirmationOutcome, CoordinatorError> {
        match reply {
            Reply::Affirm | Reply::Choose(1) => self.confirm(owner_session_id, only.intent_id).await,
            Reply::Cancel | Reply::CancelOne(1) => Ok(self.cancel_all(&[only.intent_id])?),
            Reply::Choose(_) | Reply::CancelOne(_) | Reply::Unrecognized => {
                Ok(ConfirmationOutcome::NotUnderstood {
                    intent_id: only.intent_id,
                    preview: only.preview_text.clone(),
                })
            }
        }
    }

    /// Confirm one intent by id and execute it if the lock is won.
    ///
    /// Intents of another session, or no longer pending, resolve to
    /// `NoPendingIntent`; an intent already executing to `AlreadyExecuting`.
    pub async fn confirm(
        &self,
        owner_session_id: &str,
        intent_id: Uuid,
    ) -> Result<ConfirmationOutcome, CoordinatorError> {
        let intent = match self.manager.get(intent_id) {
            Ok(intent) => intent,
            Err(IntentError::NotFound(_)) => return Ok(ConfirmationOutcome::NoPendingIntent),
            Err(e) => return Err(e.into()),
        };

        if intent.owner_session_id != owner_session_id {
            warn!(
                intent_id = %intent_id,
                session = %owner_session_id,
                "Confirmation attempted from a session that does not own the intent"
            );
            return Ok(ConfirmationOutcome::NoPendingIntent);
        }

        if intent.status == IntentStatus::Executing {
            return Ok(ConfirmationOutcome::AlreadyExecuting { intent_id });
        }
        if intent.status.is_terminal() {
            return Ok(ConfirmationOutcome::NoPendingIntent);
        }

        // Checked before locking so that a missing executor never strands a row in `executing`.
        let executor = self
            .registry
            .get(intent.kind)
            .ok_or(CoordinatorError::UnregisteredExecutor(intent.kind))?;

        if !self.manager.try_lock(intent_id)? {
            return self.lock_lost(intent_id);
        }

        let payload = ActionPayload {
            intent_id,
            data: intent.normalized_args,
        };

        info!(
            intent_id = %intent_id,
            kind = %intent.kind,
            attempt = intent.attempts + 1,
            action = %executor.describe(&payload),
            "Executing confirmed intent"
        );

        match executor.execute(&payload).await {
            Ok(result) if result.success => {
                if !self.manager.mark_executed(intent_id, &result.message)? {
                    warn!(intent_id = %intent_id, "Executed intent was no longer locked");
                }
                Ok(ConfirmationOutcome::Executed { intent_id, result })
            }
            Ok(result) => {
                if !self.manager.mark_failed(intent_id, &result.message, false)? {
                    warn!(intent_id = %intent_id, "Failed intent was no longer locked");
                }
                warn!(intent_id = %intent_id, "Executor reported an unsuccessful result");
                Ok(ConfirmationOutcome::Failed {
                    intent_id,
                    error: result.message,
                    retryable: false,
                })
            }
            Err(e) => {
                let error = e.to_string();
                let moved = self.manager.mark_failed(intent_id, &error, e.is_retryable())?;
                if !moved {
                    warn!(intent_id = %intent_id, "Failed intent was no longer locked");
                }
                // Retry is only offered when the row is pending again.
                let retryable = e.is_retryable() && moved;
                warn!(
                    intent_id = %intent_id,
                    retryable,
                    error = %self.manager.sanitizer().sanitize(&error),
                    "Intent execution failed"
                );
                Ok(ConfirmationOutcome::Failed {
                    intent_id,
                    error,
                    retryable,
                })
            }
        }
    }

    /// Interpret a reply while a numbered list is open.
    async fn resolve_choice(
        &self,
        owner_session_id: &str,
        kind: IntentKind,
        prompt: &ChoicePrompt,
        reply: Reply,
        candidates: Vec<PendingIntent>,
    ) -> Result<ConfirmationOutcome, CoordinatorError> {
        match reply {
            Reply::Choose(n) => {
                if let Some(intent_id) = prompt.candidate(n) {
                    self.prompts.delete(owner_session_id, kind)?;
                    info!(session = %owner_session_id, kind = %kind, choice = n, "Choice selected");
                    return self.confirm(owner_session_id, intent_id).await;
                }
            }
            Reply::CancelOne(n) => {
                if let Some(intent_id) = prompt.candidate(n) {
                    self.prompts.delete(owner_session_id, kind)?;
                    return Ok(self.cancel_all(&[intent_id])?);
                }
            }
            Reply::Cancel => {
                self.prompts.delete(owner_session_id, kind)?;
                let still_pending: Vec<Uuid> = prompt
                    .candidates
                    .iter()
                    .copied()
                    .filter(|id| candidates.iter().any(|c| c.intent_id == *id))
                    .collect();
                return Ok(self.cancel_all(&still_pending)?);
            }
            Reply::Affirm | Reply::Unrecognized => {}
        }

        // Anything else re-presents the list as it stands now.
        match candidates.as_slice() {
            [] => {
                self.prompts.delete(owner_session_id, kind)?;
                Ok(ConfirmationOutcome::NoPendingIntent)
            }
            [only] => {
                self.prompts.delete(owner_session_id, kind)?;
                self.resolve_single(owner_session_id, only, reply).await
            }
            _ => self.present_choices(owner_session_id, kind, &candidates, self.manager.now()),
        }
    }

    /// Persist a numbered list of `candidates` and return it.
    fn present_choices(
        &self,
        owner_session_id: &str,
        kind: IntentKind,
        candidates: &[PendingIntent],
        now: Timestamp,
    ) -> Result<ConfirmationOutcome, CoordinatorError> {
        let prompt = ChoicePrompt {
            owner_session_id: owner_session_id.to_string(),
            kind,
            candidates: candidates.iter().map(|c| c.intent_id).collect(),
            created_at: now,
            expires_at: now.plus_secs(self.choice_ttl_secs),
        };
        self.prompts.upsert(&prompt)?;

        info!(
            session = %owner_session_id,
            kind = %kind,
            options = candidates.len(),
            "Disambiguation required"
        );

        let options = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| ChoiceOption {
                index: i + 1,
                intent_id: c.intent_id,
                preview_text: c.preview_text.clone(),
            })
            .collect();
        Ok(ConfirmationOutcome::AmbiguousChoiceRequired { options })
    }

    /// The session's open prompt for `kind`, dropping it if it has expired.
    fn open_prompt(
        &self,
        owner_session_id: &str,
        kind: IntentKind,
        now: Timestamp,
    ) -> Result<Option<ChoicePrompt>, CoordinatorError> {
        let Some(prompt) = self.prompts.get(owner_session_id, kind)? else {
            return Ok(None);
        };
        if now > prompt.expires_at {
            debug!(session = %owner_session_id, kind = %kind, "Choice prompt expired");
            self.prompts.delete(owner_session_id, kind)?;
            return Ok(None);
        }
        Ok(Some(prompt))
    }

    fn cancel_all(&self, intent_ids: &[Uuid]) -> Result<ConfirmationOutcome, IntentError> {
        let mut count = 0;
        for intent_id in intent_ids {
            if self.manager.mark_cancelled(*intent_id, CANCELLED_BY_USER_NOTE)? {
                count += 1;
            }
        }
        if count == 0 {
            return Ok(ConfirmationOutcome::NoPendingIntent);
        }
        Ok(ConfirmationOutcome::Cancelled { count })
    }

    /// Outcome for a caller whose `try_lock` failed.
    fn lock_lost(&self, intent_id: Uuid) -> Result<ConfirmationOutcome, CoordinatorError> {
        let status = self.manager.get(intent_id)?.status;
        debug!(intent_id = %intent_id, status = %status, "Lock not acquired");
        match status {
            IntentStatus::Expired | IntentStatus::Cancelled => {
                Ok(ConfirmationOutcome::NoPendingIntent)
            }
            _ => Ok(ConfirmationOutcome::AlreadyExecuting { intent_id }),
        }
    }
}
