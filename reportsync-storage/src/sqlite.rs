//! SQLite-backed store: a single `kv` table shared by every writer.

use crate::error::StorageResult;
use crate::kv::KvStore;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Persists keys as rows of a `kv` table.
///
/// Several processes may open the same database file; each write is a single
/// upsert statement and SQLite serializes them.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Opens or creates a store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let _mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        initialize_kv_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_kv_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Returns the last write time (unix millis) for `key`.
    pub fn updated_at(&self, key: &str) -> StorageResult<Option<i64>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let ts = conn
            .query_row(
                "SELECT updated_at FROM kv WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ts)
    }
}

impl KvStore for SqliteStore {
    fn read(&self, key: &str) -> StorageResult<Option<Vec<u8>>> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get::<_, Vec<u8>>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn write(&self, key: &str, bytes: &[u8]) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute(
            r#"
            INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
            params![key, bytes, chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        conn.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }
}

fn initialize_kv_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value BLOB NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )?;
    Ok(())
}
