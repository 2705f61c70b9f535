//! The reactive store core.
//!
//! A [`PersistStore`] owns a JSON record and writes the whole record to its
//! storage adapter a short quiet period after the last mutation. Reads never
//! touch the adapter or the timer.

use crate::config::PersistOptions;
use crate::effector::{Effector, FieldsEffector};
use crate::error::{StoreError, StoreResult, json_kind};
use crate::scheduler::{FlushScheduler, FlushStats};
use persist_storage::{MemoryStorage, StorageAdapter};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// Hook run on every committed mutation with the key and the value about to
/// be stored (`None` for a delete).
pub type BeforeSetKv = Arc<dyn Fn(&str, Option<&Value>) + Send + Sync>;

/// Handle to a named persistent record.
///
/// Cheap to clone; all clones share one record and one flush timer. Dropping
/// the last handle stops the background flusher and writes a pending
/// snapshot synchronously instead of waiting out the quiet period.
#[derive(Clone)]
pub struct PersistStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    name: String,
    record: Mutex<Map<String, Value>>,
    fields: Mutex<FieldsEffector>,
    storage: Arc<dyn StorageAdapter>,
    before_set_kv: Option<BeforeSetKv>,
    scheduler: Arc<FlushScheduler>,
    flusher: JoinHandle<()>,
}

impl PersistStore {
    /// Builds a store and starts its flusher on the current tokio runtime.
    ///
    /// With `from_storage` enabled, a snapshot previously written under the
    /// store name is shallow-merged over the template (snapshot values win).
    /// If there is none, the template is written straight away as a baseline.
    pub fn new(options: PersistOptions) -> StoreResult<Self> {
        let runtime = Handle::try_current().map_err(|_| StoreError::NoRuntime)?;
        let PersistOptions {
            name,
            template,
            config,
            storage,
            before_set_kv,
        } = options;
        let storage = storage.unwrap_or_else(|| Arc::new(MemoryStorage::new()));

        let mut record = template.clone();
        if config.from_storage {
            match storage.get_item(&name)? {
                Some(Value::Object(snapshot)) => {
                    for (key, value) in snapshot {
                        if config.prune_stale_keys && !template.contains_key(&key) {
                            debug!("[{name}] pruning stale key `{key}` from snapshot");
                            continue;
                        }
                        record.insert(key, value);
                    }
                }
                None | Some(Value::Null) => {
                    info!("[{name}] no snapshot found, persisting template as baseline");
                    storage.set_item(&name, Value::Object(record.clone()))?;
                }
                Some(other) => {
                    return Err(StoreError::InvalidSnapshot {
                        name,
                        found: json_kind(&other),
                    });
                }
            }
        }

        let scheduler = Arc::new(FlushScheduler::new(config.persist_debounce()));
        let initial_effector = schedule_on_change(&scheduler);
        let fields = FieldsEffector::new(record.keys().cloned(), initial_effector);

        let inner = Arc::new_cyclic(|weak: &Weak<StoreInner>| StoreInner {
            name,
            record: Mutex::new(record),
            fields: Mutex::new(fields),
            storage,
            before_set_kv,
            scheduler: scheduler.clone(),
            flusher: runtime.spawn(run_flusher(weak.clone(), scheduler.clone())),
        });

        // Initial pass: the resolved state is written once even if nothing is set.
        inner.scheduler.schedule();
        debug!(
            "[{}] store ready ({} fields, debounce {:?})",
            inner.name,
            inner.record().len(),
            inner.scheduler.debounce()
        );

        Ok(Self { inner })
    }

    /// The store name, which is also its storage key.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    // ── Reads ────────────────────────────────────────────────────

    /// Returns a copy of the field's value.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.record().get(key).cloned()
    }

    /// Deserializes the field's value into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        self.get(key)
            .map(|value| serde_json::from_value(value).map_err(Into::into))
            .transpose()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.record().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.inner.record().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.record().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.record().is_empty()
    }

    /// A full copy of the record.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.inner.record().clone()
    }

    /// Runs `f` against the record without copying it.
    ///
    /// `f` must not call back into this store.
    pub fn with_record<R>(&self, f: impl FnOnce(&Map<String, Value>) -> R) -> R {
        f(&self.inner.record())
    }

    /// True if the field is covered by a change-tracking registration.
    pub fn is_tracked(&self, key: &str) -> bool {
        self.inner.fields().is_tracked_field(key)
    }

    // ── Writes ───────────────────────────────────────────────────

    /// Assigns a top-level field and schedules a flush.
    pub fn set(&self, key: impl Into<String>, value: Value) {
        let key = key.into();
        self.inner.ensure_tracked(&key);
        self.inner.call_hook(&key, Some(&value));
        self.inner.record().insert(key.clone(), value);
        self.inner.notify(&key);
    }

    /// Serializes `value` and assigns it to a top-level field.
    pub fn set_as<T: Serialize + ?Sized>(&self, key: impl Into<String>, value: &T) -> StoreResult<()> {
        let value = serde_json::to_value(value)?;
        self.set(key, value);
        Ok(())
    }

    /// Mutates an existing field and schedules a flush.
    ///
    /// This is how nested objects are changed: the whole field counts as
    /// modified. `f` runs on a copy of the field; the hook sees the new
    /// value while the record still holds the old one, then the copy is
    /// committed. Returns `None` (and schedules nothing) if the field is
    /// absent.
    pub fn update<R>(&self, key: &str, f: impl FnOnce(&mut Value) -> R) -> Option<R> {
        let mut next = self.get(key)?;
        let result = f(&mut next);
        self.inner.commit_field(key, next).then_some(result)
    }

    /// Sets a nested value addressed by a JSON pointer below `key`.
    ///
    /// The parent of the pointer target must already exist. Objects gain the
    /// last segment as a new property; arrays accept an in-range index or
    /// `-` to append. An empty pointer replaces the whole field. Returns
    /// false, without scheduling a flush, when the target cannot be reached.
    pub fn set_in(&self, key: &str, pointer: &str, value: Value) -> bool {
        let Some(mut next) = self.get(key) else {
            return false;
        };
        if !assign_pointer(&mut next, pointer, value) {
            return false;
        }
        self.inner.commit_field(key, next)
    }

    /// Removes a nested value addressed by a JSON pointer below `key`.
    pub fn remove_in(&self, key: &str, pointer: &str) -> Option<Value> {
        let mut next = self.get(key)?;
        let removed = remove_pointer(&mut next, pointer)?;
        self.inner.commit_field(key, next).then_some(removed)
    }

    /// Deletes a top-level field.
    ///
    /// The field's runtime registration is disposed and the key is absent
    /// from every later snapshot. Deleting a missing key does nothing.
    pub fn delete(&self, key: &str) -> Option<Value> {
        let removed = {
            let mut record = self.inner.record();
            if !record.contains_key(key) {
                return None;
            }
            self.inner.fields().remove_effector(key);
            record.remove(key)
        };
        self.inner.call_hook(key, None);
        self.inner.scheduler.schedule();
        removed
    }

    // ── Persistence ──────────────────────────────────────────────

    /// Writes the record now, cancelling any pending debounced write, then
    /// asks the adapter to flush to disk.
    pub fn flush_now(&self) -> StoreResult<()> {
        self.inner.scheduler.cancel();
        self.inner.write_snapshot()?;
        self.inner.storage.flush_to_disk()?;
        Ok(())
    }

    /// True while a debounced write is waiting for its quiet period.
    pub fn has_pending_flush(&self) -> bool {
        self.inner.scheduler.is_pending()
    }

    pub fn stats(&self) -> FlushStats {
        self.inner.scheduler.stats()
    }

    /// The adapter this store writes to.
    pub fn storage(&self) -> &Arc<dyn StorageAdapter> {
        &self.inner.storage
    }
}

impl fmt::Debug for PersistStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistStore")
            .field("name", &self.inner.name)
            .field("record", &*self.inner.record())
            .field("stats", &self.stats())
            .finish()
    }
}

impl StoreInner {
    fn record(&self) -> MutexGuard<'_, Map<String, Value>> {
        self.record
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn fields(&self) -> MutexGuard<'_, FieldsEffector> {
        self.fields
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_tracked(&self, key: &str) {
        let mut fields = self.fields();
        if !fields.is_tracked_field(key) {
            debug!("[{}] tracking new field `{key}`", self.name);
            fields.add_effector(key, schedule_on_change(&self.scheduler));
        }
    }

    fn notify(&self, key: &str) {
        if !self.fields().notify(key) {
            // Untracked keys still get persisted.
            self.scheduler.schedule();
        }
    }

    /// Runs the hook with a recomputed field value, then swaps it in.
    ///
    /// Returns false if the field was deleted meanwhile; nothing is written.
    fn commit_field(&self, key: &str, next: Value) -> bool {
        self.call_hook(key, Some(&next));
        match self.record().get_mut(key) {
            Some(slot) => *slot = next,
            None => return false,
        }
        self.notify(key);
        true
    }

    fn call_hook(&self, key: &str, value: Option<&Value>) {
        if let Some(hook) = &self.before_set_kv {
            hook(key, value);
        }
    }

    fn write_snapshot(&self) -> StoreResult<()> {
        let snapshot = Value::Object(self.record().clone());
        match self.storage.set_item(&self.name, snapshot) {
            Ok(()) => {
                self.scheduler.record_written();
                debug!("[{}] snapshot persisted", self.name);
                Ok(())
            }
            Err(e) => {
                self.scheduler.record_failed();
                Err(e.into())
            }
        }
    }
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        self.flusher.abort();
        self.fields().dispose_all();
        if self.scheduler.is_pending() {
            self.scheduler.cancel();
            debug!("[{}] dropped with a pending flush, writing now", self.name);
            if let Err(e) = self.write_snapshot() {
                error!("[{}] failed to persist snapshot on drop: {e}", self.name);
            }
        }
    }
}

fn schedule_on_change(scheduler: &Arc<FlushScheduler>) -> Effector {
    let scheduler = Arc::clone(scheduler);
    Effector::with_subscriber(move |_key| scheduler.schedule())
}

async fn run_flusher(store: Weak<StoreInner>, scheduler: Arc<FlushScheduler>) {
    loop {
        scheduler.wait_due().await;
        let Some(inner) = store.upgrade() else {
            return;
        };
        if let Err(e) = inner.write_snapshot() {
            error!("[{}] failed to persist snapshot: {e}", inner.name);
        }
    }
}

// ── JSON pointer helpers ─────────────────────────────────────────

fn split_pointer(pointer: &str) -> Option<(&str, String)> {
    let idx = pointer.rfind('/')?;
    let token = pointer[idx + 1..].replace("~1", "/").replace("~0", "~");
    Some((&pointer[..idx], token))
}

fn assign_pointer(root: &mut Value, pointer: &str, value: Value) -> bool {
    if pointer.is_empty() {
        *root = value;
        return true;
    }
    let Some((parent, token)) = split_pointer(pointer) else {
        return false;
    };
    match root.pointer_mut(parent) {
        Some(Value::Object(map)) => {
            map.insert(token, value);
            true
        }
        Some(Value::Array(items)) if token == "-" => {
            items.push(value);
            true
        }
        Some(Value::Array(items)) => match token.parse::<usize>() {
            Ok(index) if index < items.len() => {
                items[index] = value;
                true
            }
            _ => false,
        },
        _ => false,
    }
}

fn remove_pointer(root: &mut Value, pointer: &str) -> Option<Value> {
    let (parent, token) = split_pointer(pointer)?;
    match root.pointer_mut(parent)? {
        Value::Object(map) => map.remove(&token),
        Value::Array(items) => {
            let index = token.parse::<usize>().ok()?;
            (index < items.len()).then(|| items.remove(index))
        }
        _ => None,
    }
}
