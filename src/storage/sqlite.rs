//! SQLite-backed sink implementations
//!
//! Records and blobs are stored as JSON text. The connection sits behind a
//! mutex so a single sink can be shared across pool tasks.

use crate::storage::{Dataset, KeyValueStore, StorageResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;

const DATASET_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS dataset_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    payload TEXT NOT NULL,
    created_at TEXT NOT NULL
);
"#;

const KV_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_entries (
    key TEXT PRIMARY KEY,
    payload TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
"#;

fn open_connection(path: &Path) -> StorageResult<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;
    ",
    )?;
    Ok(conn)
}

/// Dataset persisted to a SQLite file
pub struct SqliteDataset {
    conn: Mutex<Connection>,
}

impl SqliteDataset {
    /// Opens or creates the dataset database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = open_connection(path)?;
        conn.execute_batch(DATASET_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory dataset (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(DATASET_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Dataset for SqliteDataset {
    fn push(&self, value: Value) -> StorageResult<()> {
        let payload = serde_json::to_string(&value)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO dataset_records (payload, created_at) VALUES (?1, ?2)",
            params![payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn push_all(&self, values: Vec<Value>) -> StorageResult<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx
                .prepare("INSERT INTO dataset_records (payload, created_at) VALUES (?1, ?2)")?;
            let now = Utc::now().to_rfc3339();
            for value in values {
                let payload = serde_json::to_string(&value)?;
                stmt.execute(params![payload, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn get_all(&self) -> StorageResult<Vec<Value>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT payload FROM dataset_records ORDER BY id")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for payload in rows {
            records.push(serde_json::from_str(&payload?)?);
        }
        Ok(records)
    }

    fn len(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM dataset_records", [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }
}

/// Key-value store persisted to a SQLite file
pub struct SqliteKeyValueStore {
    conn: Mutex<Connection>,
}

impl SqliteKeyValueStore {
    /// Opens or creates the store database at `path`
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = open_connection(path)?;
        conn.execute_batch(KV_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory store (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(KV_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        let payload = serde_json::to_string(&value)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO kv_entries (key, payload, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET payload = ?2, updated_at = ?3",
            params![key, payload, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        let conn = self.conn.lock().unwrap();
        let payload: Option<String> = conn
            .query_row(
                "SELECT payload FROM kv_entries WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM kv_entries WHERE key = ?1", params![key])?;
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT key FROM kv_entries ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut keys = Vec::new();
        for key in rows {
            keys.push(key?);
        }
        Ok(keys)
    }
}
