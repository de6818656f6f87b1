//! Choice prompt store.
//!
//! One open numbered list per `(owner_session_id, kind)`. Re-prompting
//! replaces the row; consuming it deletes it.

use std::sync::Arc;

use uuid::Uuid;

use assent_core::error::AssentError;
use assent_core::types::{ChoicePrompt, IntentKind, Timestamp};

use crate::db::Database;

/// Repository for open disambiguation prompts.
pub struct ChoicePromptRepository {
    db: Arc<Database>,
}

impl ChoicePromptRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace the prompt for the prompt's session and kind.
    pub fn upsert(&self, prompt: &ChoicePrompt) -> Result<(), AssentError> {
        let candidates = serde_json::to_string(&prompt.candidates)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO choice_prompts
                    (owner_session_id, kind, candidates, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (owner_session_id, kind) DO UPDATE SET
                    candidates = excluded.candidates,
                    created_at = excluded.created_at,
                    expires_at = excluded.expires_at",
                rusqlite::params![
                    prompt.owner_session_id,
                    prompt.kind.as_str(),
                    candidates,
                    prompt.created_at.0,
                    prompt.expires_at.0,
                ],
            )
            .map_err(|e| AssentError::Storage(format!("Failed to save choice prompt: {}", e)))?;
            Ok(())
        })
    }

    /// The prompt for a session and kind, whether or not it has expired.
    pub fn get(
        &self,
        owner_session_id: &str,
        kind: IntentKind,
    ) -> Result<Option<ChoicePrompt>, AssentError> {
        let row = self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT candidates, created_at, expires_at FROM choice_prompts
                     WHERE owner_session_id = ?1 AND kind = ?2",
                )
                .map_err(|e| AssentError::Storage(e.to_string()))?;

            let mut rows = stmt
                .query_map(rusqlite::params![owner_session_id, kind.as_str()], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                })
                .map_err(|e| AssentError::Storage(e.to_string()))?;

            let first = rows
                .next()
                .transpose()
                .map_err(|e| AssentError::Storage(e.to_string()))?;
            Ok(first)
        })?;

        let Some((candidates, created_at, expires_at)) = row else {
            return Ok(None);
        };
        let candidates: Vec<Uuid> =
            serde_json::from_str(&candidates).map_err(|e| AssentError::CorruptRow {
                column: "candidates",
                value: e.to_string(),
            })?;

        Ok(Some(ChoicePrompt {
            owner_session_id: owner_session_id.to_string(),
            kind,
            candidates,
            created_at: Timestamp(created_at),
            expires_at: Timestamp(expires_at),
        }))
    }

    /// Delete the prompt. Returns whether a row existed.
    pub fn delete(&self, owner_session_id: &str, kind: IntentKind) -> Result<bool, AssentError> {
        self.db.with_conn(|conn| {
            let affected = conn
                .execute(
                    "DELETE FROM choice_prompts WHERE owner_session_id = ?1 AND kind = ?2",
                    rusqlite::params![owner_session_id, kind.as_str()],
                )
                .map_err(|e| AssentError::Storage(format!("Failed to delete choice prompt: {}", e)))?;
            Ok(affected == 1)
        })
    }

    /// Drop every prompt whose deadline has passed.
    pub fn purge_expired(&self, now: Timestamp) -> Result<usize, AssentError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM choice_prompts WHERE expires_at < ?1",
                rusqlite::params![now.0],
            )
            .map_err(|e| AssentError::Storage(format!("Failed to purge choice prompts: {}", e)))
        })
    }
}
