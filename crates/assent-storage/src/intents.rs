//! Intent Record Store.
//!
//! Pure data access over `pending_intents`. Every status change is a single
//! conditional `UPDATE ... WHERE status = <expected>` and reports whether it
//! affected the row, so concurrent writers (threads or processes sharing the
//! file) never overwrite each other's transitions.

use std::sync::Arc;

use uuid::Uuid;

use assent_core::error::AssentError;
use assent_core::types::{IntentKind, IntentStatus, PendingIntent, Timestamp};

use crate::db::Database;

/// Note written by lazy and swept expiry.
pub const EXPIRED_NOTE: &str = "expired automatically (TTL)";

const INTENT_COLUMNS: &str = "intent_id, kind, normalized_args, preview_text, status, \
     created_at, expires_at, resolved_at, resolution_note, owner_session_id, \
     locked_at, attempts";

/// Repository for pending intent rows.
pub struct IntentRepository {
    db: Arc<Database>,
}

impl IntentRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persist a freshly created intent.
    pub fn insert(&self, intent: &PendingIntent) -> Result<(), AssentError> {
        let args = serde_json::to_string(&intent.normalized_args)?;
        self.db.with_conn(|conn| {
            conn.execute(
                &format!(
                    "INSERT INTO pending_intents ({})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    INTENT_COLUMNS
                ),
                rusqlite::params![
                    intent.intent_id.to_string(),
                    intent.kind.as_str(),
                    args,
                    intent.preview_text,
                    intent.status.as_str(),
                    intent.created_at.0,
                    intent.expires_at.0,
                    intent.resolved_at.map(|t| t.0),
                    intent.resolution_note,
                    intent.owner_session_id,
                    intent.locked_at.map(|t| t.0),
                    intent.attempts,
                ],
            )
            .map_err(|e| AssentError::Storage(format!("Failed to insert intent: {}", e)))?;
            Ok(())
        })
    }

    /// Fetch a row exactly as stored.
    pub fn find_by_id(&self, intent_id: Uuid) -> Result<Option<PendingIntent>, AssentError> {
        self.db.with_conn(|conn| {
            let result = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM pending_intents WHERE intent_id = ?1",
                        INTENT_COLUMNS
                    ),
                    rusqlite::params![intent_id.to_string()],
                    |row| Ok(row_to_intent(row)),
                )
                .optional()
                .map_err(|e| AssentError::Storage(e.to_string()))?;

            result.transpose()
        })
    }

    /// `pending -> executing` if the row is pending and not past its deadline.
    ///
    /// Returns true only for the single caller whose update hit the row.
    pub fn lock(&self, intent_id: Uuid, now: Timestamp) -> Result<bool, AssentError> {
        self.db.with_conn(|conn| {
            let affected = conn
                .execute(
                    "UPDATE pending_intents
                     SET status = 'executing', locked_at = ?2, attempts = attempts + 1
                     WHERE intent_id = ?1 AND status = 'pending' AND expires_at >= ?2",
                    rusqlite::params![intent_id.to_string(), now.0],
                )
                .map_err(|e| AssentError::Storage(format!("Failed to lock intent: {}", e)))?;
            Ok(affected == 1)
        })
    }

    /// Move a row from `from` to `to`, recording when and why.
    ///
    /// A row moved back to `pending` is unresolved again: `resolved_at` is
    /// cleared and the note keeps the reason of the last failed attempt.
    pub fn transition(
        &self,
        intent_id: Uuid,
        from: IntentStatus,
        to: IntentStatus,
        now: Timestamp,
        note: &str,
    ) -> Result<bool, AssentError> {
        let resolved_at = (to != IntentStatus::Pending).then_some(now.0);
        self.db.with_conn(|conn| {
            let affected = conn
                .execute(
                    "UPDATE pending_intents
                     SET status = ?3, resolved_at = ?4, resolution_note = ?5
                     WHERE intent_id = ?1 AND status = ?2",
                    rusqlite::params![
                        intent_id.to_string(),
                        from.as_str(),
                        to.as_str(),
                        resolved_at,
                        note
                    ],
                )
                .map_err(|e| {
                    AssentError::Storage(format!("Failed to update intent status: {}", e))
                })?;
            Ok(affected == 1)
        })
    }

    /// Expire one row if it is pending and its deadline has passed.
    pub fn expire_if_due(&self, intent_id: Uuid, now: Timestamp) -> Result<bool, AssentError> {
        self.db.with_conn(|conn| {
            let affected = conn
                .execute(
                    "UPDATE pending_intents
                     SET status = 'expired', resolved_at = ?2, resolution_note = ?3
                     WHERE intent_id = ?1 AND status = 'pending' AND expires_at < ?2",
                    rusqlite::params![intent_id.to_string(), now.0, EXPIRED_NOTE],
                )
                .map_err(|e| AssentError::Storage(format!("Failed to expire intent: {}", e)))?;
            Ok(affected == 1)
        })
    }

    /// Expire every due pending row of one session and kind.
    pub fn expire_due_for_owner(
        &self,
        kind: IntentKind,
        owner_session_id: &str,
        now: Timestamp,
    ) -> Result<usize, AssentError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE pending_intents
                 SET status = 'expired', resolved_at = ?3, resolution_note = ?4
                 WHERE kind = ?1 AND owner_session_id = ?2
                   AND status = 'pending' AND expires_at < ?3",
                rusqlite::params![kind.as_str(), owner_session_id, now.0, EXPIRED_NOTE],
            )
            .map_err(|e| AssentError::Storage(format!("Failed to expire intents: {}", e)))
        })
    }

    /// Expire every due pending row. Returns the number of rows changed.
    pub fn expire_all_due(&self, now: Timestamp) -> Result<usize, AssentError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "UPDATE pending_intents
                 SET status = 'expired', resolved_at = ?1, resolution_note = ?2
                 WHERE status = 'pending' AND expires_at < ?1",
                rusqlite::params![now.0, EXPIRED_NOTE],
            )
            .map_err(|e| AssentError::Storage(format!("Failed to sweep intents: {}", e)))
        })
    }

    /// Pending, non-expired rows of one session and kind, oldest first.
    pub fn list_pending(
        &self,
        kind: IntentKind,
        owner_session_id: &str,
        now: Timestamp,
    ) -> Result<Vec<PendingIntent>, AssentError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM pending_intents
                     WHERE kind = ?1 AND owner_session_id = ?2
                       AND status = 'pending' AND expires_at >= ?3
                     ORDER BY created_at ASC, rowid ASC",
                    INTENT_COLUMNS
                ))
                .map_err(|e| AssentError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(
                    rusqlite::params![kind.as_str(), owner_session_id, now.0],
                    |row| Ok(row_to_intent(row)),
                )
                .map_err(|e| AssentError::Storage(e.to_string()))?;

            collect_intents(rows)
        })
    }

    /// Every row of a session regardless of status, newest first.
    pub fn list_by_owner(
        &self,
        owner_session_id: &str,
        limit: u32,
    ) -> Result<Vec<PendingIntent>, AssentError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM pending_intents
                     WHERE owner_session_id = ?1
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ?2",
                    INTENT_COLUMNS
                ))
                .map_err(|e| AssentError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![owner_session_id, limit], |row| {
                    Ok(row_to_intent(row))
                })
                .map_err(|e| AssentError::Storage(e.to_string()))?;

            collect_intents(rows)
        })
    }

    /// Rows still `executing` whose lock was taken before `cutoff`.
    pub fn find_executing_locked_before(
        &self,
        cutoff: Timestamp,
    ) -> Result<Vec<PendingIntent>, AssentError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM pending_intents
                     WHERE status = 'executing' AND COALESCE(locked_at, created_at) < ?1
                     ORDER BY locked_at ASC",
                    INTENT_COLUMNS
                ))
                .map_err(|e| AssentError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![cutoff.0], |row| Ok(row_to_intent(row)))
                .map_err(|e| AssentError::Storage(e.to_string()))?;

            collect_intents(rows)
        })
    }

    /// Row counts per status, for operator output.
    pub fn count_by_status(&self) -> Result<Vec<(IntentStatus, u64)>, AssentError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT status, COUNT(*) FROM pending_intents
                     GROUP BY status ORDER BY status",
                )
                .map_err(|e| AssentError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
                })
                .map_err(|e| AssentError::Storage(e.to_string()))?;

            let mut counts = Vec::new();
            for row in rows {
                let (status, count) = row.map_err(|e| AssentError::Storage(e.to_string()))?;
                let status: IntentStatus = status.parse().map_err(|_| AssentError::CorruptRow {
                    column: "status",
                    value: status.clone(),
                })?;
                counts.push((status, count as u64));
            }
            Ok(counts)
        })
    }
}

fn collect_intents<I>(rows: I) -> Result<Vec<PendingIntent>, AssentError>
where
    I: Iterator<Item = rusqlite::Result<Result<PendingIntent, AssentError>>>,
{
    let mut intents = Vec::new();
    for row in rows {
        let intent = row.map_err(|e| AssentError::Storage(e.to_string()))??;
        intents.push(intent);
    }
    Ok(intents)
}

// =============================================================================
// Row mapping
// =============================================================================

fn row_to_intent(row: &rusqlite::Row<'_>) -> Result<PendingIntent, AssentError> {
    let get_err = |e: rusqlite::Error| AssentError::Storage(e.to_string());

    let id_str: String = row.get(0).map_err(get_err)?;
    let kind_str: String = row.get(1).map_err(get_err)?;
    let args_str: String = row.get(2).map_err(get_err)?;
    let preview_text: String = row.get(3).map_err(get_err)?;
    let status_str: String = row.get(4).map_err(get_err)?;
    let created_at: i64 = row.get(5).map_err(get_err)?;
    let expires_at: i64 = row.get(6).map_err(get_err)?;
    let resolved_at: Option<i64> = row.get(7).map_err(get_err)?;
    let resolution_note: Option<String> = row.get(8).map_err(get_err)?;
    let owner_session_id: String = row.get(9).map_err(get_err)?;
    let locked_at: Option<i64> = row.get(10).map_err(get_err)?;
    let attempts: i64 = row.get(11).map_err(get_err)?;

    let intent_id = Uuid::parse_str(&id_str).map_err(|_| AssentError::CorruptRow {
        column: "intent_id",
        value: id_str.clone(),
    })?;
    let kind: IntentKind = kind_str.parse().map_err(|_| AssentError::CorruptRow {
        column: "kind",
        value: kind_str.clone(),
    })?;
    let status: IntentStatus = status_str.parse().map_err(|_| AssentError::CorruptRow {
        column: "status",
        value: status_str.clone(),
    })?;
    // The value is not echoed: stored args may hold sensitive data.
    let normalized_args = serde_json::from_str(&args_str).map_err(|e| AssentError::CorruptRow {
        column: "normalized_args",
        value: e.to_string(),
    })?;

    Ok(PendingIntent {
        intent_id,
        kind,
        normalized_args,
        preview_text,
        status,
        created_at: Timestamp(created_at),
        expires_at: Timestamp(expires_at),
        resolved_at: resolved_at.map(Timestamp),
        resolution_note,
        owner_session_id,
        locked_at: locked_at.map(Timestamp),
        attempts: u32::try_from(attempts).unwrap_or(0),
    })
}

/// Extension trait for rusqlite to support optional query results.
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
