//! In-process storage backend.

use crate::adapter::StorageAdapter;
use crate::error::StorageResult;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Storage adapter backed by a single in-process map.
///
/// All operations are synchronous. Values are cloned in and out, so a caller
/// holding a returned value never aliases the stored one.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: Mutex<HashMap<String, Value>>,
}

impl MemoryStorage {
    /// Creates an empty memory storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.items().len()
    }

    /// Returns true if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    fn items(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        // A poisoned map is still a consistent map: every write is a single insert/remove.
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StorageAdapter for MemoryStorage {
    fn get_item(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.items().get(key).cloned())
    }

    fn set_item(&self, key: &str, value: Value) -> StorageResult<()> {
        self.items().insert(key.to_string(), value);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> StorageResult<()> {
        self.items().remove(key);
        Ok(())
    }

    fn clear_all(&self) -> StorageResult<()> {
        self.items().clear();
        Ok(())
    }

    fn get_all(&self) -> StorageResult<Map<String, Value>> {
        Ok(self
            .items()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}
