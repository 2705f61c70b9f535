//! Reactive persistent stores.
//!
//! A persistent store is a named JSON record that writes itself to a
//! [`StorageAdapter`](persist_storage::StorageAdapter) whenever it changes.
//! Consumers never call "save": every mutation goes through the store's own
//! entry points, which track the touched field and re-arm a debounce timer.
//! When the timer fires, the *whole* record is written under the store name.
//!
//! # Architecture
//!
//! - **FieldsEffector**: which fields are tracked; the construction shape
//!   shares one registration, runtime-added fields get one each
//! - **PersistStore**: the record, its read/write/delete entry points and the
//!   flusher task
//! - **Debounce**: trailing edge; a burst of mutations produces one write
//! - **StoreServiceBase**: typed façade with one replaceable before-set hook
//!
//! # Example
//!
//! ```
//! use persist_store::{PersistOptions, PersistStore};
//! use serde_json::{json, Map};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> persist_store::StoreResult<()> {
//! let mut template = Map::new();
//! template.insert("locale".into(), json!("en"));
//!
//! let store = PersistStore::new(
//!     PersistOptions::new("preference")
//!         .with_template(template)
//!         .persist_debounce_ms(500),
//! )?;
//!
//! store.set("locale", json!("de"));
//! assert_eq!(store.get("locale"), Some(json!("de")));
//! store.flush_now()?;
//! # Ok(())
//! # }
//! ```

mod config;
mod effector;
mod error;
mod scheduler;
mod service;
mod store;

pub use config::{DEFAULT_PERSIST_DEBOUNCE_MS, PersistConfig, PersistOptions};
pub use effector::{Effector, FieldsEffector, Subscriber};
pub use error::{StoreError, StoreResult};
pub use scheduler::FlushStats;
pub use service::{BeforeSetKvHook, DisposeBag, Disposer, ServiceOptions, StoreServiceBase};
pub use store::{BeforeSetKv, PersistStore};

pub use persist_storage::{MemoryStorage, SqliteStorage, StorageAdapter, StorageError};

/// Creates a persistent store from `options`.
///
/// Equivalent to [`PersistStore::new`].
pub fn create_persist_store(options: PersistOptions) -> StoreResult<PersistStore> {
    PersistStore::new(options)
}
