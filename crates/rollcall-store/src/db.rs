//! Connection handling and schema.

use crate::error::StoreError;
use rusqlite::Connection;
use std::path::Path;

/// Writers wait this long for a lock before the operation fails Busy.
const BUSY_TIMEOUT_MS: u64 = 5000;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS attendance (
    id   INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    date TEXT NOT NULL,
    hour INTEGER NOT NULL,
    UNIQUE(name, date, hour)
);
CREATE TABLE IF NOT EXISTS contacts (
    id    INTEGER PRIMARY KEY AUTOINCREMENT,
    name  TEXT NOT NULL UNIQUE,
    phone TEXT,
    email TEXT
);
";

/// Handle to the attendance database. One connection per handle; open a
/// handle per component instead of sharing one across threads.
pub struct Store {
    pub(crate) conn: Connection,
}

impl Store {
    /// Open (and initialize, if needed) the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self::init(conn)?;
        tracing::info!(path = %path.display(), "attendance store opened");
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}
