//! Error types for persistent stores.

use persist_storage::StorageError;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The storage adapter failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A persisted snapshot exists but is not a JSON object.
    #[error("invalid snapshot for store {name}: expected object, found {found}")]
    InvalidSnapshot { name: String, found: &'static str },

    /// A typed template did not serialize to a JSON object.
    #[error("invalid template for store {name}: expected object, found {found}")]
    InvalidTemplate { name: String, found: &'static str },

    /// Store constructed outside a tokio runtime.
    #[error("persistent stores must be created inside a tokio runtime")]
    NoRuntime,
}

/// Short name of a JSON value's kind, for error messages.
pub(crate) fn json_kind(value: &serde_json::Value) -> &'static str {
    use serde_json::Value;
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
