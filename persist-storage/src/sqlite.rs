//! SQLite storage backend.
//!
//! Keeps every store snapshot as JSON text in one `kv` table, so a whole
//! application's persistent stores live in a single side file.

use crate::adapter::StorageAdapter;
use crate::error::{StorageError, StorageResult};
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Storage adapter backed by SQLite.
#[derive(Clone)]
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStorage {
    /// Opens (or creates) a storage file at the given path.
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        debug!("opened sqlite storage at {} (journal_mode={mode})", path.as_ref().display());
        Self::with_connection(conn)
    }

    /// Opens an in-memory storage (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> StorageResult<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Backend("sqlite connection lock poisoned".into()))
    }
}

impl StorageAdapter for SqliteStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        let conn = self.conn()?;
        let raw: Option<String> = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        raw.map(|text| serde_json::from_str(&text).map_err(Into::into))
            .transpose()
    }

    fn set_item(&self, key: &str, value: Value) -> StorageResult<()> {
        let text = serde_json::to_string(&value)?;
        self.conn()?.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, text],
        )?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.conn()?
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn clear_all(&self) -> StorageResult<()> {
        self.conn()?.execute("DELETE FROM kv", [])?;
        Ok(())
    }

    fn get_all(&self) -> StorageResult<Map<String, Value>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM kv ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut all = Map::new();
        for row in rows {
            let (key, text) = row?;
            all.insert(key, serde_json::from_str(&text)?);
        }
        Ok(all)
    }

    fn flush_to_disk(&self) -> StorageResult<()> {
        // Returns (busy, log, checkpointed); in-memory databases report -1 for both counts.
        self.conn()?
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }
}
