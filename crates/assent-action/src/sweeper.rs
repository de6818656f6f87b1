//! Background maintenance for pending intents.
//!
//! Periodically expires overdue intents, purges expired choice prompts and
//! reports intents stuck in `executing`. Stuck intents are only cancelled
//! when configured to; they are never re-offered, because the side effect
//! may already have happened.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Notify;
use tracing::{error, info, warn};
use uuid::Uuid;

use assent_core::config::IntentConfig;
use assent_storage::ChoicePromptRepository;

use crate::error::IntentError;
use crate::intent::PendingIntentManager;

/// Note stored on stuck intents closed by the sweeper.
pub const STUCK_NOTE: &str = "execution outcome unknown (stuck)";

/// Counts from one maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub prompts_purged: usize,
    /// Intents found stuck in `executing`.
    pub stuck: Vec<Uuid>,
    /// How many of `stuck` were moved to `cancelled`.
    pub stuck_cancelled: usize,
}

/// Periodic expiry and stuck-intent reconciliation.
pub struct ExpirySweeper {
    manager: Arc<PendingIntentManager>,
    prompts: ChoicePromptRepository,
    config: IntentConfig,
    shutdown: Arc<Notify>,
}

impl ExpirySweeper {
    pub fn new(
        manager: Arc<PendingIntentManager>,
        prompts: ChoicePromptRepository,
        config: IntentConfig,
    ) -> Self {
        Self {
            manager,
            prompts,
            config,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Run a single maintenance pass.
    pub fn run_once(&self) -> Result<SweepReport, IntentError> {
        let now = self.manager.now();
        let mut report = SweepReport {
            expired: self.manager.sweep_expired(now)?,
            prompts_purged: self.prompts.purge_expired(now)?,
            ..SweepReport::default()
        };

        let stuck = self
            .manager
            .find_stuck_executing(self.config.stuck_executing_after_secs)?;
        for intent in &stuck {
            warn!(
                intent_id = %intent.intent_id,
                kind = %intent.kind,
                locked_at = ?intent.locked_at.map(|t| t.to_string()),
                "Intent stuck in executing"
            );
            if self.config.cancel_stuck_executing
                && self.manager.cancel_stuck(intent.intent_id, STUCK_NOTE)?
            {
                report.stuck_cancelled += 1;
            }
        }
        report.stuck = stuck.into_iter().map(|i| i.intent_id).collect();

        Ok(report)
    }

    /// Start the sweeper background loop.
    ///
    /// Runs a pass, then sleeps for `sweep_interval_secs`. Returns on
    /// shutdown signal.
    pub async fn run(&self) {
        let interval = Duration::from_secs(self.config.sweep_interval_secs.max(1));
        info!(interval_secs = interval.as_secs(), "Expiry sweeper started");
        loop {
            match self.run_once() {
                Ok(report) if report != SweepReport::default() => {
                    info!(
                        expired = report.expired,
                        prompts_purged = report.prompts_purged,
                        stuck = report.stuck.len(),
                        stuck_cancelled = report.stuck_cancelled,
                        "Sweep pass completed"
                    );
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "Sweep pass failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = self.shutdown.notified() => {
                    info!("Expiry sweeper stopped");
                    return;
                }
            }
        }
    }

    /// Signal the sweeper to shut down gracefully.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assent_core::Clock;
    use assent_core::preview::PreviewSanitizer;
    use assent_core::types::{ChoicePrompt, IntentKind, IntentStatus, ManualClock, Timestamp};
    use assent_storage::Database;
    use serde_json::json;

    struct Fixture {
        manager: Arc<PendingIntentManager>,
        db: Arc<Database>,
        clock: ManualClock,
    }

    fn fixture() -> Fixture {
        let db = Arc::new(Database::in_memory().unwrap());
        let clock = ManualClock::new(Timestamp(1_700_000_000_000));
        let manager = Arc::new(
            PendingIntentManager::new(
                db.clone(),
                IntentConfig::default(),
                PreviewSanitizer::default(),
            )
            .with_clock(Arc::new(clock.clone())),
        );
        Fixture { manager, db, clock }
    }

    fn sweeper(f: &Fixture, config: IntentConfig) -> ExpirySweeper {
        ExpirySweeper::new(
            f.manager.clone(),
            ChoicePromptRepository::new(f.db.clone()),
            config,
        )
    }

    fn email(manager: &PendingIntentManager, ttl: i64) -> Uuid {
        manager
            .create(
                IntentKind::EmailSend,
                json!({"to": ["a@example.com"], "subject": "s", "body": "b"}),
                "Send email",
                "s1",
                ttl,
            )
            .unwrap()
    }

    #[test]
    fn test_run_once_expires_and_purges() {
        let f = fixture();
        let due = email(&f.manager, 1);
        let fresh = email(&f.manager, 600);
        let prompts = ChoicePromptRepository::new(f.db.clone());
        prompts
            .upsert(&ChoicePrompt {
                owner_session_id: "s1".to_string(),
                kind: IntentKind::EmailSend,
                candidates: vec![due, fresh],
                created_at: f.clock.now(),
                expires_at: f.clock.now().plus_secs(1),
            })
            .unwrap();

        f.clock.advance_secs(5);
        let report = sweeper(&f, IntentConfig::default()).run_once().unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.prompts_purged, 1);
        assert!(report.stuck.is_empty());
        assert_eq!(f.manager.get(due).unwrap().status, IntentStatus::Expired);
        assert_eq!(f.manager.get(fresh).unwrap().status, IntentStatus::Pending);
    }

    #[test]
    fn test_stuck_intents_reported_not_touched_by_default() {
        let f = fixture();
        let id = email(&f.manager, 3_600);
        f.manager.try_lock(id).unwrap();
        f.clock.advance_secs(901);

        let report = sweeper(&f, IntentConfig::default()).run_once().unwrap();
        assert_eq!(report.stuck, vec![id]);
        assert_eq!(report.stuck_cancelled, 0);
        assert_eq!(f.manager.get(id).unwrap().status, IntentStatus::Executing);
    }

    #[test]
    fn test_stuck_intents_cancelled_when_configured() {
        let f = fixture();
        let id = email(&f.manager, 3_600);
        f.manager.try_lock(id).unwrap();
        f.clock.advance_secs(901);

        let config = IntentConfig {
            cancel_stuck_executing: true,
            ..IntentConfig::default()
        };
        let report = sweeper(&f, config).run_once().unwrap();
        assert_eq!(report.stuck_cancelled, 1);

        let intent = f.manager.get(id).unwrap();
        assert_eq!(intent.status, IntentStatus::Cancelled);
        assert_eq!(intent.resolution_note.as_deref(), Some(STUCK_NOTE));
    }

    #[tokio::test]
    async fn test_sweeper_shutdown() {
        let f = fixture();
        let sweeper = sweeper(&f, IntentConfig::default());

        sweeper.shutdown();

        tokio::time::timeout(std::time::Duration::from_secs(2), sweeper.run())
            .await
            .expect("Sweeper should shut down within timeout");
    }

    #[tokio::test]
    async fn test_sweeper_runs_pass_before_shutdown() {
        let f = fixture();
        let due = email(&f.manager, 1);
        f.clock.advance_secs(2);

        let sweeper = sweeper(&f, IntentConfig::default());
        sweeper.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(2), sweeper.run())
            .await
            .expect("Sweeper should shut down within timeout");

        let stored = assent_storage::IntentRepository::new(f.db.clone())
            .find_by_id(due)
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, IntentStatus::Expired);
    }
}
