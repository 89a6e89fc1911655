//! In-memory sink implementations
//!
//! Default sinks for runs that do not need persistence; contents are lost
//! when the process exits.

use crate::storage::{Dataset, KeyValueStore, StorageResult};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Dataset backed by a vector
#[derive(Default)]
pub struct MemoryDataset {
    records: Mutex<Vec<Value>>,
}

impl MemoryDataset {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Dataset for MemoryDataset {
    fn push(&self, value: Value) -> StorageResult<()> {
        self.records.lock().unwrap().push(value);
        Ok(())
    }

    fn get_all(&self) -> StorageResult<Vec<Value>> {
        Ok(self.records.lock().unwrap().clone())
    }

    fn len(&self) -> StorageResult<usize> {
        Ok(self.records.lock().unwrap().len())
    }
}

/// Key-value store backed by an ordered map
#[derive(Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        self.entries.lock().unwrap().insert(key.to_string(), value);
        Ok(())
    }

    fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    fn delete(&self, key: &str) -> StorageResult<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.lock().unwrap().keys().cloned().collect())
    }
}
