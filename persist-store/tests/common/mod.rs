#![allow(dead_code)]

use persist_storage::{MemoryStorage, StorageAdapter, StorageError, StorageResult};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Memory storage that records every `set_item` call.
#[derive(Default)]
pub struct CountingStorage {
    inner: MemoryStorage,
    writes: Mutex<Vec<(String, Value)>>,
}

impl CountingStorage {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn write_count(&self) -> usize {
        self.writes.lock().unwrap().len()
    }

    pub fn last_write(&self) -> Option<(String, Value)> {
        self.writes.lock().unwrap().last().cloned()
    }

    pub fn writes(&self) -> Vec<(String, Value)> {
        self.writes.lock().unwrap().clone()
    }

    /// Seeds a value without counting it as a write.
    pub fn seed(&self, key: &str, value: Value) {
        self.inner.set_item(key, value).unwrap();
    }
}

impl StorageAdapter for CountingStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: Value) -> StorageResult<()> {
        self.writes.lock().unwrap().push((key.to_string(), value.clone()));
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.inner.remove_item(key)
    }

    fn clear_all(&self) -> StorageResult<()> {
        self.inner.clear_all()
    }

    fn get_all(&self) -> StorageResult<Map<String, Value>> {
        self.inner.get_all()
    }
}

/// Storage whose reads and/or writes can be made to fail.
#[derive(Default)]
pub struct FailingStorage {
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    inner: MemoryStorage,
}

impl FailingStorage {
    pub fn failing_reads() -> Arc<Self> {
        let storage = Self::default();
        storage.fail_reads.store(true, Ordering::SeqCst);
        Arc::new(storage)
    }

    pub fn failing_writes() -> Arc<Self> {
        let storage = Self::default();
        storage.fail_writes.store(true, Ordering::SeqCst);
        Arc::new(storage)
    }
}

impl StorageAdapter for FailingStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("read refused".into()));
        }
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: Value) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("write refused".into()));
        }
        self.inner.set_item(key, value)
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.inner.remove_item(key)
    }

    fn clear_all(&self) -> StorageResult<()> {
        self.inner.clear_all()
    }

    fn get_all(&self) -> StorageResult<Map<String, Value>> {
        self.inner.get_all()
    }
}

/// Builds a template map from a `json!` object literal.
pub fn template(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("template must be an object, got {other}"),
    }
}

/// Sleeps on the (paused) tokio clock.
pub async fn advance_ms(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
