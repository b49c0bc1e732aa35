//! SQLite-backed record store.
//!
//! One `records` table keyed by `(kind, id)`; bodies are the tagged JSON of
//! [`Record`], so a decode always knows which schema it is reading.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use uuid::Uuid;

use super::{Record, RecordKind, RecordStore};
use crate::error::StoreError;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS records (
    kind       TEXT NOT NULL,
    id         TEXT NOT NULL,
    body       TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (kind, id)
);
";

/// Record store persisted in a single SQLite file.
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
}

impl SqliteRecordStore {
    /// Open (or create) the index at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
                message: format!("cannot create {}: {e}", parent.display()),
            })?;
        }
        debug!(path = %path.display(), "Opening SQLite record store");
        Self::with_connection(Connection::open(path)?)
    }

    /// Volatile index, mostly for tests.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Backend {
            message: "sqlite connection lock poisoned".into(),
        })
    }

    fn now() -> String {
        chrono::Utc::now().to_rfc3339()
    }
}

impl RecordStore for SqliteRecordStore {
    fn add(&self, record: Record) -> Result<String, StoreError> {
        let id = Uuid::new_v4().simple().to_string();
        let body = serde_json::to_string(&record)?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO records (kind, id, body, updated_at) VALUES (?1, ?2, ?3, ?4)",
            params![record.kind().as_str(), id, body, Self::now()],
        )?;
        Ok(id)
    }

    fn update(&self, id: &str, record: Record) -> Result<(), StoreError> {
        let kind = record.kind();
        let body = serde_json::to_string(&record)?;
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE records SET body = ?1, updated_at = ?2 WHERE kind = ?3 AND id = ?4",
            params![body, Self::now(), kind.as_str(), id],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                kind,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    fn get(&self, kind: RecordKind, id: &str) -> Result<Record, StoreError> {
        let body: Option<String> = {
            let conn = self.lock()?;
            conn.query_row(
                "SELECT body FROM records WHERE kind = ?1 AND id = ?2",
                params![kind.as_str(), id],
                |row| row.get(0),
            )
            .optional()?
        };
        let body = body.ok_or_else(|| StoreError::NotFound {
            kind,
            id: id.to_string(),
        })?;
        let record: Record = serde_json::from_str(&body)?;
        if record.kind() != kind {
            return Err(StoreError::KindMismatch {
                expected: kind,
                found: record.kind(),
            });
        }
        Ok(record)
    }

    fn get_all(&self, kind: RecordKind) -> Result<Vec<String>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id FROM records WHERE kind = ?1 ORDER BY rowid")?;
        let ids = stmt
            .query_map(params![kind.as_str()], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}
