//! Result sinks for crawl output
//!
//! Two sink shapes cover most crawl output: an append-only dataset for
//! extracted records and a key-value store for named blobs (snapshots,
//! checkpoints, reports). Values cross the boundary as `serde_json::Value`;
//! backends decide how to persist them.
//!
//! Both traits are object safe and `Send + Sync`, so handlers running on
//! pool tasks can share one sink behind an `Arc`.

mod memory;
mod sqlite;

pub use memory::{MemoryDataset, MemoryKeyValueStore};
pub use sqlite::{SqliteDataset, SqliteKeyValueStore};

use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during sink operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for sink operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Append-only collection of extracted records
pub trait Dataset: Send + Sync {
    /// Appends one record
    fn push(&self, value: Value) -> StorageResult<()>;

    /// Appends several records in order
    fn push_all(&self, values: Vec<Value>) -> StorageResult<()> {
        for value in values {
            self.push(value)?;
        }
        Ok(())
    }

    /// Returns all records in insertion order
    fn get_all(&self) -> StorageResult<Vec<Value>>;

    /// Number of records stored
    fn len(&self) -> StorageResult<usize>;

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Named-blob store for snapshots and checkpoints
pub trait KeyValueStore: Send + Sync {
    /// Sets a value, replacing any previous value under the key
    fn set(&self, key: &str, value: Value) -> StorageResult<()>;

    /// Gets a value, or `None` when the key is absent
    fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Removes a key; absent keys are not an error
    fn delete(&self, key: &str) -> StorageResult<()>;

    /// Returns all keys, sorted
    fn keys(&self) -> StorageResult<Vec<String>>;
}
