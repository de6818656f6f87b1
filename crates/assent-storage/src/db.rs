//! Database connection management.
//!
//! Wraps a single rusqlite Connection in a Mutex for thread-safe access.
//! Configures WAL mode, a busy timeout and recommended PRAGMAs on open.
//! Several `Database` handles (or processes) may point at the same file;
//! SQLite serializes their writers.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::info;

use assent_core::error::AssentError;

use crate::migrations;

/// Default wait for a locked database before a write fails.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5_000);

/// Thread-safe SQLite database wrapper.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) a database at the given path with the default busy timeout.
    pub fn new(path: &Path) -> Result<Self, AssentError> {
        Self::open(path, DEFAULT_BUSY_TIMEOUT)
    }

    /// Open (or create) a database at the given path.
    ///
    /// Configures WAL mode, synchronous=NORMAL, the busy timeout, and runs
    /// all pending migrations.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, AssentError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)
            .map_err(|e| AssentError::Storage(format!("Failed to open database: {}", e)))?;

        conn.busy_timeout(busy_timeout)
            .map_err(|e| AssentError::Storage(format!("Failed to set busy timeout: {}", e)))?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
        .map_err(|e| AssentError::Storage(format!("Failed to set pragmas: {}", e)))?;

        info!("Database opened at {}", path.display());

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, AssentError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AssentError::Storage(format!("Failed to open in-memory db: {}", e)))?;

        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| AssentError::Storage(format!("Failed to set pragmas: {}", e)))?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.with_conn(migrations::run_migrations)?;
        Ok(db)
    }

    /// Execute a closure with a reference to the underlying connection.
    ///
    /// The mutex is held for the duration of the closure.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T, AssentError>
    where
        F: FnOnce(&Connection) -> Result<T, AssentError>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AssentError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&conn)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish()
    }
}
