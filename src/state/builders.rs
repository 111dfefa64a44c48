//! Builders that turn untyped store results into device records
//!
//! The status table hands back loosely-typed JSON documents. Full records are
//! decoded by [`record_from_stored`]; identity and topic lookups read the raw
//! object. Both accept the `id`/`ID` and `topic`/`Topic` spellings of older
//! schema generations.

use super::types::DeviceRecord;
use serde_json::Value;
use thiserror::Error;

/// Failure to interpret a stored document as a device record
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("stored record is not an object (got {0})")]
    NotAnObject(&'static str),
    #[error("stored record has invalid fields: {0}")]
    Invalid(#[from] serde_json::Error),
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Decode a stored document into a [`DeviceRecord`]
///
/// An empty identity string is normalized to `None`.
pub fn record_from_stored(value: Value) -> Result<DeviceRecord, DecodeError> {
    if !value.is_object() {
        return Err(DecodeError::NotAnObject(kind_of(&value)));
    }

    let mut record: DeviceRecord = serde_json::from_value(value)?;
    if record.persisted_id().is_none() {
        record.id = None;
    }
    Ok(record)
}

/// Persisted identity of a stored document (`id`, or legacy `ID`)
///
/// Read from the raw object so a document with odd field values still
/// resolves to the row it is.
pub fn identity_from_stored(value: &Value) -> Option<String> {
    field_text(value, &["id", "ID"])
}

/// Transport topic of a stored document (`topic`, or legacy `Topic`)
pub fn topic_from_stored(value: &Value) -> Option<String> {
    field_text(value, &["topic", "Topic"])
}

fn field_text(value: &Value, names: &[&str]) -> Option<String> {
    let object = value.as_object()?;
    names
        .iter()
        .filter_map(|name| object.get(*name))
        .find_map(|field| match field {
            Value::String(text) if !text.is_empty() => Some(text.clone()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        })
}
