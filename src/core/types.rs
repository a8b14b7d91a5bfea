use super::error::{ExpiryError, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field holding the record identity.
pub const ID_FIELD: &str = "_id";
/// Field whose mutations drive deadline recomputation.
pub const STATUS_FIELD: &str = "status";
/// Field holding the absolute expiration deadline.
pub const EXPIRE_AT_FIELD: &str = "expireAt";

/// A stored record: a JSON object keyed by field name.
pub type Document = Map<String, Value>;

/// Opaque unique key of a record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random identity.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads the identity out of a document's `_id` field.
    pub fn from_document(document: &Document) -> Result<Option<Self>> {
        match document.get(ID_FIELD) {
            None => Ok(None),
            Some(Value::String(id)) if !id.is_empty() => Ok(Some(Self(id.clone()))),
            Some(other) => Err(ExpiryError::InvalidDocument(format!(
                "{} must be a non-empty string, got {}",
                ID_FIELD, other
            ))),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::String(self.0.clone())
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for RecordId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Encodes a deadline the way it is stored in documents: RFC 3339, UTC, millisecond precision.
pub fn encode_deadline(deadline: DateTime<Utc>) -> Value {
    Value::String(deadline.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Decodes a stored deadline. Values that are not RFC 3339 strings yield `None`.
pub fn decode_deadline(value: &Value) -> Option<DateTime<Utc>> {
    value
        .as_str()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}
