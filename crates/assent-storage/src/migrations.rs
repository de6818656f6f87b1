//! Database schema migrations.
//!
//! Version 1 creates `pending_intents` (one row per proposed action, never
//! deleted) and `choice_prompts` (open disambiguation lists per session).

use rusqlite::Connection;
use tracing::info;

use assent_core::error::AssentError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), AssentError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| AssentError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| AssentError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: pending_intents");
    }

    Ok(())
}

/// Version 1: pending intents and choice prompts.
fn apply_v1(conn: &Connection) -> Result<(), AssentError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS pending_intents (
            intent_id         TEXT PRIMARY KEY NOT NULL,
            kind              TEXT NOT NULL
                              CHECK (kind IN ('email_send', 'declaration_create', 'payment_execute')),
            normalized_args   TEXT NOT NULL,
            preview_text      TEXT NOT NULL,
            status            TEXT NOT NULL DEFAULT 'pending'
                              CHECK (status IN ('pending', 'executing', 'executed', 'cancelled', 'expired')),
            created_at        INTEGER NOT NULL,
            expires_at        INTEGER NOT NULL,
            resolved_at       INTEGER,
            resolution_note   TEXT,
            owner_session_id  TEXT NOT NULL,
            locked_at         INTEGER,
            attempts          INTEGER NOT NULL DEFAULT 0,
            CHECK (expires_at > created_at)
        );

        CREATE INDEX IF NOT EXISTS idx_pending_intents_owner_kind
            ON pending_intents (owner_session_id, kind, status, created_at);

        CREATE INDEX IF NOT EXISTS idx_pending_intents_status_expiry
            ON pending_intents (status, expires_at);

        CREATE TABLE IF NOT EXISTS choice_prompts (
            owner_session_id  TEXT NOT NULL,
            kind              TEXT NOT NULL,
            candidates        TEXT NOT NULL,
            created_at        INTEGER NOT NULL,
            expires_at        INTEGER NOT NULL,
            PRIMARY KEY (owner_session_id, kind)
        );

        INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (1, 'pending_intents');
        ",
    )
    .map_err(|e| AssentError::Storage(format!("Failed to apply migration v1: {}", e)))?;

    Ok(())
}
