//! Key-value storage adapters for persistent stores.
//!
//! A persistent store keeps one JSON snapshot per store name. This crate
//! defines the boundary those snapshots are written through and ships two
//! backends:
//!
//! - [`MemoryStorage`]: in-process map, the default backend and the one used
//!   by deterministic tests
//! - [`SqliteStorage`]: a single key-value table in a SQLite file
//!
//! Any other backend (encrypted device storage, a remote cache) plugs in by
//! implementing [`StorageAdapter`].

mod adapter;
mod error;
mod memory;
mod sqlite;

pub use adapter::StorageAdapter;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStorage;
pub use sqlite::SqliteStorage;
