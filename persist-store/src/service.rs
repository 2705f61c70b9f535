//! Typed service façade over a persistent store.
//!
//! Application services own one [`StoreServiceBase`] each. Besides the store
//! itself, the base carries a single replaceable before-set hook that other
//! components install for validation, auditing or change notification.

use crate::config::{PersistConfig, PersistOptions};
use crate::error::{StoreError, StoreResult, json_kind};
use crate::store::PersistStore;
use persist_storage::StorageAdapter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, RwLock};
use tracing::{debug, warn};

/// Externally installed before-set hook. Errors are logged, never propagated.
pub type BeforeSetKvHook = Arc<dyn Fn(&str, Option<&Value>) -> anyhow::Result<()> + Send + Sync>;

/// Deferred cleanup action.
pub type Disposer = Box<dyn FnOnce() + Send>;

/// Caller-owned list of cleanup actions.
#[derive(Default)]
pub struct DisposeBag {
    disposers: Vec<Disposer>,
}

impl DisposeBag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, disposer: Disposer) {
        self.disposers.push(disposer);
    }

    pub fn len(&self) -> usize {
        self.disposers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.disposers.is_empty()
    }

    /// Runs every disposer in insertion order and empties the bag.
    pub fn dispose_all(&mut self) {
        for disposer in self.disposers.drain(..) {
            disposer();
        }
    }
}

impl fmt::Debug for DisposeBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposeBag")
            .field("len", &self.disposers.len())
            .finish()
    }
}

/// Storage settings for a service-owned store.
#[derive(Clone, Default)]
pub struct ServiceOptions {
    pub config: PersistConfig,
    /// Backend. `None` selects a fresh `MemoryStorage`.
    pub storage: Option<Arc<dyn StorageAdapter>>,
}

impl ServiceOptions {
    pub fn with_storage(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            config: PersistConfig::default(),
            storage: Some(storage),
        }
    }
}

#[derive(Default)]
struct HookSlot {
    generation: u64,
    hook: Option<BeforeSetKvHook>,
}

/// A named, typed store plus one installable before-set hook.
pub struct StoreServiceBase<T> {
    name: String,
    store: PersistStore,
    slot: Arc<RwLock<HookSlot>>,
    _shape: PhantomData<fn() -> T>,
}

impl<T> StoreServiceBase<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Builds the service store from a typed template.
    ///
    /// `template` must serialize to a JSON object; `Option` fields that are
    /// `None` become declared-but-unset (`null`) fields.
    pub fn new(name: impl Into<String>, template: &T, options: ServiceOptions) -> StoreResult<Self> {
        let name = name.into();
        let template = match serde_json::to_value(template)? {
            Value::Object(map) => map,
            other => {
                return Err(StoreError::InvalidTemplate {
                    name,
                    found: json_kind(&other),
                });
            }
        };

        let slot = Arc::new(RwLock::new(HookSlot::default()));
        let hook_name = name.clone();
        let hook_slot = Arc::clone(&slot);

        let mut persist = PersistOptions::new(name.clone())
            .with_template(template)
            .with_config(options.config)
            .with_before_set_kv(Arc::new(move |key: &str, value: Option<&Value>| {
                run_hook(&hook_name, &hook_slot, key, value)
            }));
        persist.storage = options.storage;

        Ok(Self {
            store: PersistStore::new(persist)?,
            name,
            slot,
            _shape: PhantomData,
        })
    }

    /// The whole record, deserialized as `T`.
    pub fn state(&self) -> StoreResult<T> {
        Ok(serde_json::from_value(Value::Object(self.store.snapshot()))?)
    }
}

impl<T> StoreServiceBase<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying store, for direct field reads and writes.
    pub fn store(&self) -> &PersistStore {
        &self.store
    }

    /// Runs the installed hook with failures contained.
    ///
    /// A hook that errors or panics is logged with the store name; the
    /// mutation that triggered it proceeds regardless.
    pub fn on_before_set_kv(&self, key: &str, value: Option<&Value>) {
        run_hook(&self.name, &self.slot, key, value);
    }

    /// Installs `hook` as the single active before-set hook, replacing any
    /// previous one, and pushes a disposer for it onto `dispose_bag`.
    ///
    /// The disposer only clears the hook it was created for; once a later
    /// call has replaced that hook, running it does nothing.
    pub fn set_before_set_kv<F>(&self, hook: F, dispose_bag: &mut DisposeBag)
    where
        F: Fn(&str, Option<&Value>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let generation = {
            let mut slot = write_slot(&self.slot);
            slot.generation += 1;
            slot.hook = Some(Arc::new(hook));
            slot.generation
        };
        debug!("[{}] before-set hook installed (generation {generation})", self.name);

        let slot = Arc::clone(&self.slot);
        let name = self.name.clone();
        dispose_bag.push(Box::new(move || {
            let mut slot = write_slot(&slot);
            if slot.generation == generation && slot.hook.take().is_some() {
                debug!("[{name}] before-set hook disposed");
            }
        }));
    }

    /// Removes the active hook, if any.
    pub fn clear_before_set_kv(&self) {
        write_slot(&self.slot).hook = None;
    }

    pub fn has_before_set_kv(&self) -> bool {
        read_hook(&self.slot).is_some()
    }
}

impl<T> fmt::Debug for StoreServiceBase<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreServiceBase")
            .field("name", &self.name)
            .field("store", &self.store)
            .field("has_hook", &self.has_before_set_kv())
            .finish()
    }
}

fn run_hook(name: &str, slot: &RwLock<HookSlot>, key: &str, value: Option<&Value>) {
    // Cloned out so the hook may itself install or clear hooks.
    let Some(hook) = read_hook(slot) else {
        return;
    };
    match catch_unwind(AssertUnwindSafe(|| hook(key, value))) {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("[{name}] before-set hook failed for key `{key}`: {e:#}"),
        Err(payload) => warn!(
            "[{name}] before-set hook panicked for key `{key}`: {}",
            panic_message(payload.as_ref())
        ),
    }
}

fn read_hook(slot: &RwLock<HookSlot>) -> Option<BeforeSetKvHook> {
    slot.read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .hook
        .clone()
}

fn write_slot(slot: &RwLock<HookSlot>) -> std::sync::RwLockWriteGuard<'_, HookSlot> {
    slot.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}
