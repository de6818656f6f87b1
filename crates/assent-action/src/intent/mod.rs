//! Pending intent lifecycle management.
//!
//! `PendingIntentManager` is the only writer of `pending_intents` rows. It
//! sanitizes previews on the way in, applies expiry lazily on every read,
//! and performs every transition as a conditional update so that the
//! database, not an in-process lock, decides who wins a race.

pub mod state_machine;

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use assent_core::config::IntentConfig;
use assent_core::preview::PreviewSanitizer;
use assent_core::types::{
    Clock, IntentKind, IntentStatus, PendingIntent, SystemClock, Timestamp,
};
use assent_storage::{Database, IntentRepository};

use crate::error::IntentError;
use crate::intent::state_machine::validate_transition;
use crate::types::IntentArgs;

/// Creates, reads, expires and transitions pending intents.
pub struct PendingIntentManager {
    intents: IntentRepository,
    sanitizer: PreviewSanitizer,
    config: IntentConfig,
    clock: Arc<dyn Clock>,
}

impl PendingIntentManager {
    pub fn new(db: Arc<Database>, config: IntentConfig, sanitizer: PreviewSanitizer) -> Self {
        Self {
            intents: IntentRepository::new(db),
            sanitizer,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn sanitizer(&self) -> &PreviewSanitizer {
        &self.sanitizer
    }

    /// Configured TTL for a kind, in seconds.
    pub fn ttl_for(&self, kind: IntentKind) -> i64 {
        self.config.ttl_for(kind)
    }

    /// Create an intent from the Intent Producer's untyped request.
    pub fn create_pending_intent(
        &self,
        kind: &str,
        normalized_args: serde_json::Value,
        raw_preview_text: &str,
        owner_session_id: &str,
        ttl_secs: i64,
    ) -> Result<Uuid, IntentError> {
        let kind: IntentKind = kind
            .parse()
            .map_err(|_| IntentError::UnknownKind(kind.to_string()))?;
        self.create(kind, normalized_args, raw_preview_text, owner_session_id, ttl_secs)
    }

    /// Create a pending intent and return its id.
    ///
    /// The preview is sanitized before it is stored. The arguments must
    /// deserialize into the kind's argument type; they are stored verbatim.
    pub fn create(
        &self,
        kind: IntentKind,
        normalized_args: serde_json::Value,
        raw_preview_text: &str,
        owner_session_id: &str,
        ttl_secs: i64,
    ) -> Result<Uuid, IntentError> {
        let is_empty = match &normalized_args {
            serde_json::Value::Null => true,
            serde_json::Value::Object(map) => map.is_empty(),
            _ => false,
        };
        if is_empty {
            return Err(IntentError::InvalidArguments(
                "normalized_args must not be empty".to_string(),
            ));
        }
        if owner_session_id.trim().is_empty() {
            return Err(IntentError::InvalidArguments(
                "owner_session_id must not be empty".to_string(),
            ));
        }
        if ttl_secs <= 0 {
            return Err(IntentError::InvalidArguments(format!(
                "ttl must be positive, got {}",
                ttl_secs
            )));
        }
        IntentArgs::from_value(kind, &normalized_args).map_err(IntentError::InvalidArguments)?;

        let preview = self.sanitizer.sanitize_with_report(raw_preview_text);
        let now = self.clock.now();
        let intent = PendingIntent {
            intent_id: Uuid::new_v4(),
            kind,
            normalized_args,
            preview_text: preview.text,
            status: IntentStatus::Pending,
            created_at: now,
            expires_at: now.plus_secs(ttl_secs),
            resolved_at: None,
            resolution_note: None,
            owner_session_id: owner_session_id.to_string(),
            locked_at: None,
            attempts: 0,
        };
        self.intents.insert(&intent)?;

        info!(
            intent_id = %intent.intent_id,
            kind = %kind,
            session = %owner_session_id,
            ttl_secs,
            masked = preview.masked,
            truncated = preview.truncated,
            preview = %intent.preview_text,
            "Pending intent created"
        );
        Ok(intent.intent_id)
    }

    /// Create with the configured TTL for the kind.
    pub fn create_with_default_ttl(
        &self,
        kind: IntentKind,
        normalized_args: serde_json::Value,
        raw_preview_text: &str,
        owner_session_id: &str,
    ) -> Result<Uuid, IntentError> {
        let ttl = self.ttl_for(kind);
        self.create(kind, normalized_args, raw_preview_text, owner_session_id, ttl)
    }

    /// Fetch an intent, expiring it first if its deadline has passed.
    pub fn get(&self, intent_id: Uuid) -> Result<PendingIntent, IntentError> {
        let intent = self
            .intents
            .find_by_id(intent_id)?
            .ok_or(IntentError::NotFound(intent_id))?;

        let now = self.clock.now();
        if intent.status != IntentStatus::Pending || !intent.is_past_deadline(now) {
            return Ok(intent);
        }

        if self.intents.expire_if_due(intent_id, now)? {
            info!(intent_id = %intent_id, kind = %intent.kind, "Intent expired on read");
        }
        // Re-read: another writer may have moved the row first.
        self.intents
            .find_by_id(intent_id)?
            .ok_or(IntentError::NotFound(intent_id))
    }

    /// Pending intents of one kind for one session, oldest first.
    pub fn list_pending_by_kind_and_owner(
        &self,
        kind: IntentKind,
        owner_session_id: &str,
    ) -> Result<Vec<PendingIntent>, IntentError> {
        let now = self.clock.now();
        let expired = self
            .intents
            .expire_due_for_owner(kind, owner_session_id, now)?;
        if expired > 0 {
            debug!(kind = %kind, session = %owner_session_id, expired, "Expired intents on list");
        }
        Ok(self.intents.list_pending(kind, owner_session_id, now)?)
    }

    /// Atomically move `pending -> executing`.
    ///
    /// Exactly one of any number of concurrent callers gets `true`. An
    /// intent past its deadline is never locked; it is expired instead.
    pub fn try_lock(&self, intent_id: Uuid) -> Result<bool, IntentError> {
        validate_transition(IntentStatus::Pending, IntentStatus::Executing)?;
        let now = self.clock.now();
        if self.intents.lock(intent_id, now)? {
            debug!(intent_id = %intent_id, "Intent locked for execution");
            return Ok(true);
        }
        if self.intents.expire_if_due(intent_id, now)? {
            info!(intent_id = %intent_id, "Intent expired on lock attempt");
        }
        Ok(false)
    }

    /// `executing -> executed`. False if the row was not executing.
    pub fn mark_executed(&self, intent_id: Uuid, note: &str) -> Result<bool, IntentError> {
        self.transition(intent_id, IntentStatus::Executing, IntentStatus::Executed, note)
    }

    /// `executing -> pending` when `retryable`, else `executing -> cancelled`.
    pub fn mark_failed(
        &self,
        intent_id: Uuid,
        note: &str,
        retryable: bool,
    ) -> Result<bool, IntentError> {
        let to = if retryable {
            IntentStatus::Pending
        } else {
            IntentStatus::Cancelled
        };
        self.transition(intent_id, IntentStatus::Executing, to, note)
    }

    /// `pending -> cancelled`. False if the row was not pending or has expired.
    pub fn mark_cancelled(&self, intent_id: Uuid, note: &str) -> Result<bool, IntentError> {
        if self.intents.expire_if_due(intent_id, self.clock.now())? {
            return Ok(false);
        }
        self.transition(intent_id, IntentStatus::Pending, IntentStatus::Cancelled, note)
    }

    /// Expire every pending intent whose deadline is before `now`.
    pub fn sweep_expired(&self, now: Timestamp) -> Result<usize, IntentError> {
        let expired = self.intents.expire_all_due(now)?;
        if expired > 0 {
            info!(expired, "Swept expired intents");
        }
        Ok(expired)
    }

    /// All intents of a session, newest first.
    pub fn list_by_owner(
        &self,
        owner_session_id: &str,
        limit: u32,
    ) -> Result<Vec<PendingIntent>, IntentError> {
        Ok(self.intents.list_by_owner(owner_session_id, limit)?)
    }

    /// Intents locked more than `older_than_secs` ago and still executing.
    pub fn find_stuck_executing(
        &self,
        older_than_secs: i64,
    ) -> Result<Vec<PendingIntent>, IntentError> {
        let cutoff = self.clock.now().minus_secs(older_than_secs);
        Ok(self.intents.find_executing_locked_before(cutoff)?)
    }

    /// Close a stuck `executing` intent. It is never re-offered: the
    /// side effect may already have happened.
    pub fn cancel_stuck(&self, intent_id: Uuid, note: &str) -> Result<bool, IntentError> {
        let cancelled =
            self.transition(intent_id, IntentStatus::Executing, IntentStatus::Cancelled, note)?;
        if cancelled {
            warn!(intent_id = %intent_id, "Stuck intent cancelled");
        }
        Ok(cancelled)
    }

    /// Row counts per status.
    pub fn count_by_status(&self) -> Result<Vec<(IntentStatus, u64)>, IntentError> {
        Ok(self.intents.count_by_status()?)
    }

    fn transition(
        &self,
        intent_id: Uuid,
        from: IntentStatus,
        to: IntentStatus,
        note: &str,
    ) -> Result<bool, IntentError> {
        validate_transition(from, to)?;
        let note = self.sanitizer.sanitize(note);
        let moved = self
            .intents
            .transition(intent_id, from, to, self.clock.now(), &note)?;
        if moved {
            info!(intent_id = %intent_id, from = %from, to = %to, note = %note, "Intent transitioned");
        } else {
            debug!(intent_id = %intent_id, from = %from, to = %to, "Transition not applied");
        }
        Ok(moved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assent_core::types::ManualClock;
    use serde_json::json;

    fn make_manager() -> (PendingIntentManager, ManualClock) {
        let db = Arc::new(Database::in_memory().unwrap());
        let clock = ManualClock::new(Timestamp(1_700_000_000_000));
        let manager =
            PendingIntentManager::new(db, IntentConfig::default(), PreviewSanitizer::default())
                .with_clock(Arc::new(clock.clone()));
        (manager, clock)
    }

    fn email_args() -> serde_json::Value {
        json!({
            "to": ["ana.souza@example.com"],
            "subject": "Invoice 42",
            "body": "Attached."
        })
    }

    fn create_email(manager: &PendingIntentManager, owner: &str, ttl: i64) -> Uuid {
        manager
            .create(
                IntentKind::EmailSend,
                email_args(),
                "Send invoice to ana.souza@example.com",
                owner,
                ttl,
            )
            .unwrap()
    }

    // ========================================================================
    // create
    // ========================================================================

    #[test]
    fn test_create_starts_pending_with_future_deadline() {
        let (manager, clock) = make_manager();
        let id = create_email(&manager, "s1", 300);

        let intent = manager.get(id).unwrap();
        assert_eq!(intent.status, IntentStatus::Pending);
        assert_eq!(intent.created_at, clock.now());
        assert_eq!(intent.expires_at, clock.now().plus_secs(300));
        assert!(intent.expires_at > intent.created_at);
        assert_eq!(intent.attempts, 0);
    }

    #[test]
    fn test_create_sanitizes_preview() {
        let (manager, _) = make_manager();
        let id = create_email(&manager, "s1", 300);

        let intent = manager.get(id).unwrap();
        assert!(!intent.preview_text.contains("ana.souza@example.com"));
        assert!(intent.preview_text.contains("ana***@example.com"));
    }

    #[test]
    fn test_create_stores_args_verbatim() {
        let (manager, _) = make_manager();
        let id = create_email(&manager, "s1", 300);
        assert_eq!(manager.get(id).unwrap().normalized_args, email_args());
    }

    #[test]
    fn test_create_rejects_empty_args() {
        let (manager, _) = make_manager();
        for args in [json!({}), serde_json::Value::Null] {
            let err = manager
                .create(IntentKind::EmailSend, args, "preview", "s1", 300)
                .unwrap_err();
            assert!(matches!(err, IntentError::InvalidArguments(_)));
        }
    }

    #[test]
    fn test_create_rejects_args_of_other_kind() {
        let (manager, _) = make_manager();
        let err = manager
            .create(IntentKind::PaymentExecute, email_args(), "preview", "s1", 300)
            .unwrap_err();
        assert!(matches!(err, IntentError::InvalidArguments(_)));
    }

    #[test]
    fn test_create_rejects_non_positive_ttl() {
        let (manager, _) = make_manager();
        let err = manager
            .create(IntentKind::EmailSend, email_args(), "preview", "s1", 0)
            .unwrap_err();
        assert!(matches!(err, IntentError::InvalidArguments(_)));
    }

    #[test]
    fn test_create_pending_intent_unknown_kind() {
        let (manager, _) = make_manager();
        let err = manager
            .create_pending_intent("sms_send", email_args(), "preview", "s1", 300)
            .unwrap_err();
        assert!(matches!(err, IntentError::UnknownKind(ref k) if k == "sms_send"));
    }

    #[test]
    fn test_create_with_default_ttl_uses_config() {
        let (manager, clock) = make_manager();
        let args = json!({
            "payer_account": "0001-1",
            "payee_name": "ACME",
            "payee_tax_id": "12.345.678/0001-90",
            "amount_cents": 1000,
            "currency": "BRL"
        });
        let id = manager
            .create_with_default_ttl(IntentKind::PaymentExecute, args, "Pay ACME", "s1")
            .unwrap();
        let intent = manager.get(id).unwrap();
        assert_eq!(
            intent.expires_at,
            clock.now().plus_secs(manager.ttl_for(IntentKind::PaymentExecute))
        );
    }

    // ========================================================================
    // get / lazy expiry
    // ========================================================================

    #[test]
    fn test_get_missing_is_not_found() {
        let (manager, _) = make_manager();
        let id = Uuid::new_v4();
        assert!(matches!(manager.get(id), Err(IntentError::NotFound(x)) if x == id));
    }

    #[test]
    fn test_get_expires_lazily() {
        let (manager, clock) = make_manager();
        let id = create_email(&manager, "s1", 1);

        clock.advance_secs(2);
        let intent = manager.get(id).unwrap();
        assert_eq!(intent.status, IntentStatus::Expired);
        assert_eq!(
            intent.resolution_note.as_deref(),
            Some(assent_storage::EXPIRED_NOTE)
        );
        assert!(!manager.try_lock(id).unwrap());
    }

    #[test]
    fn test_try_lock_on_overdue_intent_expires_it() {
        let (manager, clock) = make_manager();
        let id = create_email(&manager, "s1", 1);

        clock.advance_secs(5);
        assert!(!manager.try_lock(id).unwrap());
        assert_eq!(manager.get(id).unwrap().status, IntentStatus::Expired);
    }

    #[test]
    fn test_list_pending_excludes_expired_and_others() {
        let (manager, clock) = make_manager();
        let short = create_email(&manager, "s1", 1);
        clock.advance_secs(1);
        let long = create_email(&manager, "s1", 600);
        create_email(&manager, "s2", 600);

        clock.advance_secs(1);
        let listed = manager
            .list_pending_by_kind_and_owner(IntentKind::EmailSend, "s1")
            .unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|i| i.intent_id).collect();
        assert_eq!(ids, vec![long]);
        assert_eq!(manager.get(short).unwrap().status, IntentStatus::Expired);
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    #[test]
    fn test_lock_then_execute() {
        let (manager, _) = make_manager();
        let id = create_email(&manager, "s1", 300);

        assert!(manager.try_lock(id).unwrap());
        assert!(!manager.try_lock(id).unwrap());
        assert!(manager.mark_executed(id, "sent successfully").unwrap());

        let intent = manager.get(id).unwrap();
        assert_eq!(intent.status, IntentStatus::Executed);
        assert_eq!(intent.resolution_note.as_deref(), Some("sent successfully"));
        assert_eq!(intent.attempts, 1);
    }

    #[test]
    fn test_mark_executed_requires_lock() {
        let (manager, _) = make_manager();
        let id = create_email(&manager, "s1", 300);
        assert!(!manager.mark_executed(id, "stray").unwrap());
        assert_eq!(manager.get(id).unwrap().status, IntentStatus::Pending);
    }

    #[test]
    fn test_retryable_failure_reoffers() {
        let (manager, _) = make_manager();
        let id = create_email(&manager, "s1", 300);

        assert!(manager.try_lock(id).unwrap());
        assert!(manager.mark_failed(id, "smtp timeout", true).unwrap());
        assert_eq!(manager.get(id).unwrap().status, IntentStatus::Pending);

        assert!(manager.try_lock(id).unwrap());
        assert_eq!(manager.get(id).unwrap().attempts, 2);
    }

    #[test]
    fn test_permanent_failure_cancels() {
        let (manager, _) = make_manager();
        let id = create_email(&manager, "s1", 300);

        assert!(manager.try_lock(id).unwrap());
        assert!(manager.mark_failed(id, "mailbox does not exist", false).unwrap());
        assert_eq!(manager.get(id).unwrap().status, IntentStatus::Cancelled);
    }

    #[test]
    fn test_failure_notes_are_sanitized() {
        let (manager, _) = make_manager();
        let id = create_email(&manager, "s1", 300);

        manager.try_lock(id).unwrap();
        manager
            .mark_failed(id, "rejected by bruno.lima@example.com", false)
            .unwrap();
        let note = manager.get(id).unwrap().resolution_note.unwrap();
        assert!(!note.contains("bruno.lima@example.com"));
    }

    #[test]
    fn test_cancel_only_from_pending() {
        let (manager, _) = make_manager();
        let id = create_email(&manager, "s1", 300);

        assert!(manager.mark_cancelled(id, "user cancelled").unwrap());
        assert!(!manager.mark_cancelled(id, "user cancelled").unwrap());

        let locked = create_email(&manager, "s1", 300);
        manager.try_lock(locked).unwrap();
        assert!(!manager.mark_cancelled(locked, "too late").unwrap());
    }

    #[test]
    fn test_cancel_overdue_intent_expires_instead() {
        let (manager, clock) = make_manager();
        let id = create_email(&manager, "s1", 1);
        clock.advance_secs(2);

        assert!(!manager.mark_cancelled(id, "user cancelled").unwrap());
        assert_eq!(manager.get(id).unwrap().status, IntentStatus::Expired);
    }

    #[test]
    fn test_terminal_states_are_idempotent() {
        let (manager, clock) = make_manager();

        let executed = create_email(&manager, "s1", 300);
        manager.try_lock(executed).unwrap();
        manager.mark_executed(executed, "sent").unwrap();

        let cancelled = create_email(&manager, "s1", 300);
        manager.mark_cancelled(cancelled, "no").unwrap();

        let expired = create_email(&manager, "s1", 1);
        clock.advance_secs(2);
        manager.get(expired).unwrap();

        for id in [executed, cancelled, expired] {
            let before = manager.get(id).unwrap();
            assert!(!manager.try_lock(id).unwrap());
            assert!(!manager.mark_cancelled(id, "again").unwrap());
            assert!(!manager.mark_executed(id, "again").unwrap());
            assert!(!manager.mark_failed(id, "again", true).unwrap());
            assert_eq!(manager.get(id).unwrap(), before);
        }
    }

    // ========================================================================
    // Maintenance
    // ========================================================================

    #[test]
    fn test_sweep_expired() {
        let (manager, clock) = make_manager();
        let a = create_email(&manager, "s1", 1);
        let b = create_email(&manager, "s2", 1);
        let fresh = create_email(&manager, "s1", 600);

        clock.advance_secs(2);
        assert_eq!(manager.sweep_expired(clock.now()).unwrap(), 2);
        assert_eq!(manager.sweep_expired(clock.now()).unwrap(), 0);

        let counts = manager.count_by_status().unwrap();
        assert!(counts.contains(&(IntentStatus::Expired, 2)));
        assert_eq!(manager.get(fresh).unwrap().status, IntentStatus::Pending);
        assert_eq!(manager.get(a).unwrap().status, IntentStatus::Expired);
        assert_eq!(manager.get(b).unwrap().status, IntentStatus::Expired);
    }

    #[test]
    fn test_find_and_cancel_stuck() {
        let (manager, clock) = make_manager();
        let id = create_email(&manager, "s1", 3_600);
        manager.try_lock(id).unwrap();

        clock.advance_secs(60);
        assert!(manager.find_stuck_executing(900).unwrap().is_empty());

        clock.advance_secs(900);
        let stuck = manager.find_stuck_executing(900).unwrap();
        assert_eq!(stuck.len(), 1);
        assert_eq!(stuck[0].intent_id, id);

        assert!(manager
            .cancel_stuck(id, "execution outcome unknown (stuck)")
            .unwrap());
        assert_eq!(manager.get(id).unwrap().status, IntentStatus::Cancelled);
        assert!(!manager.cancel_stuck(id, "again").unwrap());
    }

    #[test]
    fn test_list_by_owner_includes_all_statuses() {
        let (manager, clock) = make_manager();
        let a = create_email(&manager, "s1", 300);
        clock.advance_secs(1);
        let b = create_email(&manager, "s1", 300);
        manager.mark_cancelled(a, "no").unwrap();

        let listed = manager.list_by_owner("s1", 10).unwrap();
        let ids: Vec<Uuid> = listed.iter().map(|i| i.intent_id).collect();
        assert_eq!(ids, vec![b, a]);
    }
}
