//! Record store - persisted tables of device documents
//!
//! The reconciler only needs three primitives: find one document by exact
//! field equality, insert a document and learn its identity, and replace the
//! document stored under an identity. Documents are untyped JSON objects;
//! typing happens in [`crate::state::record_from_stored`].

mod memory;
mod sled_store;

pub use memory::{MemoryRecordStore, StoreCalls};
pub use sled_store::SledRecordStore;

use serde_json::{Map, Value};
use thiserror::Error;

/// Name of the table holding driver status documents
pub const DEFAULT_TABLE: &str = "leds";

/// Field under which stores keep the identity they assigned
pub const ID_FIELD: &str = "id";

/// Errors reported by a record store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("failed to encode or decode a stored document: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("record must be a JSON object")]
    NotAnObject,
    #[error("store is unavailable")]
    Unavailable,
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Exact-equality criteria on named document fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Criteria {
    fields: Map<String, Value>,
}

impl Criteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field` to equal `value`
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    /// Whether a document satisfies every criterion
    ///
    /// An empty criteria set matches any object.
    pub fn matches(&self, record: &Value) -> bool {
        let Some(object) = record.as_object() else {
            return false;
        };
        self.fields
            .iter()
            .all(|(field, expected)| object.get(field) == Some(expected))
    }
}

/// Persisted table access used by the reconciler
///
/// Calls are synchronous and return caller-visible errors; implementations
/// never retry internally.
pub trait RecordStore: Send + Sync {
    /// Create the table if it does not exist yet
    fn ensure_table(&self, table: &str) -> Result<(), StoreError>;

    /// Return one document matching `criteria`, if any
    fn get_record(&self, table: &str, criteria: &Criteria) -> Result<Option<Value>, StoreError>;

    /// Insert a new document and return the identity assigned to it
    fn insert_record(&self, table: &str, record: &Value) -> Result<String, StoreError>;

    /// Replace the document stored under `id`
    fn update_record(&self, table: &str, id: &str, record: &Value) -> Result<(), StoreError>;

    /// Make previous writes durable
    fn flush(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Copy `record` with the store identity stamped on it
pub(crate) fn with_identity(record: &Value, id: &str) -> Result<Value, StoreError> {
    let mut object = record.as_object().cloned().ok_or(StoreError::NotAnObject)?;
    object.remove("ID");
    object.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
    Ok(Value::Object(object))
}
