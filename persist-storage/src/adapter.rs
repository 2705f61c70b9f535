//! Storage adapter abstraction trait.

use crate::error::StorageResult;
use serde_json::{Map, Value};

/// Durable key-value boundary consumed by persistent stores.
///
/// Implementations own their own synchronization; every method takes `&self`
/// so one adapter can be shared by several stores behind an `Arc`.
pub trait StorageAdapter: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent.
    fn get_item(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set_item(&self, key: &str, value: Value) -> StorageResult<()>;

    /// Removes `key`. Removing a missing key is not an error.
    fn remove_item(&self, key: &str) -> StorageResult<()>;

    /// Removes every key.
    fn clear_all(&self) -> StorageResult<()>;

    /// Returns every stored key-value pair.
    fn get_all(&self) -> StorageResult<Map<String, Value>>;

    /// Forces buffered writes to durable media.
    ///
    /// Backends without buffering keep the default no-op.
    fn flush_to_disk(&self) -> StorageResult<()> {
        Ok(())
    }
}
