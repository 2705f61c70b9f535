//! Store configuration.

use crate::store::BeforeSetKv;
use persist_storage::StorageAdapter;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default quiet period before a flush, in milliseconds.
pub const DEFAULT_PERSIST_DEBOUNCE_MS: u64 = 1000;

/// Persistence behaviour of a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistConfig {
    /// Overlay a previously persisted snapshot on the template at construction.
    pub from_storage: bool,
    /// Quiet period after the last mutation before the record is written (ms).
    pub persist_debounce_ms: u64,
    /// Drop snapshot keys the template no longer declares.
    pub prune_stale_keys: bool,
}

impl Default for PersistConfig {
    fn default() -> Self {
        Self {
            from_storage: true,
            persist_debounce_ms: DEFAULT_PERSIST_DEBOUNCE_MS,
            prune_stale_keys: false,
        }
    }
}

impl PersistConfig {
    /// The debounce window as a `Duration`.
    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }
}

/// Everything needed to construct a [`PersistStore`](crate::PersistStore).
#[derive(Clone)]
pub struct PersistOptions {
    /// Store name; also the storage key of its snapshot.
    pub name: String,
    /// Default shape of the record.
    pub template: Map<String, Value>,
    /// Persistence behaviour.
    pub config: PersistConfig,
    /// Backend. `None` selects a fresh `MemoryStorage`.
    pub storage: Option<Arc<dyn StorageAdapter>>,
    /// Called on every committed mutation, before the value lands.
    pub before_set_kv: Option<BeforeSetKv>,
}

impl PersistOptions {
    /// Options for an empty template with default config.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            template: Map::new(),
            config: PersistConfig::default(),
            storage: None,
            before_set_kv: None,
        }
    }

    pub fn with_template(mut self, template: Map<String, Value>) -> Self {
        self.template = template;
        self
    }

    pub fn with_config(mut self, config: PersistConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn StorageAdapter>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_before_set_kv(mut self, hook: BeforeSetKv) -> Self {
        self.before_set_kv = Some(hook);
        self
    }

    /// Shorthand for toggling `config.from_storage`.
    pub fn from_storage(mut self, enabled: bool) -> Self {
        self.config.from_storage = enabled;
        self
    }

    /// Shorthand for setting `config.persist_debounce_ms`.
    pub fn persist_debounce_ms(mut self, ms: u64) -> Self {
        self.config.persist_debounce_ms = ms;
        self
    }
}

impl fmt::Debug for PersistOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistOptions")
            .field("name", &self.name)
            .field("template", &self.template)
            .field("config", &self.config)
            .field("storage", &self.storage.as_ref().map(|_| "<adapter>"))
            .field("before_set_kv", &self.before_set_kv.as_ref().map(|_| "<hook>"))
            .finish()
    }
}
