use crate::core::{ExpiryError, RecordId, Result};
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Position of an event in a collection's change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeToken(u64);

impl ResumeToken {
    pub fn new(sequence: u64) -> Self {
        Self(sequence)
    }

    pub fn sequence(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ResumeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationType {
    Insert,
    Update,
    Replace,
    Delete,
    /// The feed was reset by the store; no further events follow on this stream.
    Invalidate,
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::Delete => "delete",
            Self::Invalidate => "invalidate",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDescription {
    pub updated_fields: Map<String, Value>,
    #[serde(default)]
    pub removed_fields: Vec<String>,
}

/// One mutation notification from the change feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeEvent {
    #[serde(rename = "_id")]
    pub token: ResumeToken,
    pub operation_type: OperationType,
    pub document_key: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_description: Option<UpdateDescription>,
}

impl ChangeEvent {
    /// New value of `field` if this event is an update that set it.
    pub fn updated_field(&self, field: &str) -> Option<&Value> {
        if self.operation_type != OperationType::Update {
            return None;
        }
        self.update_description
            .as_ref()
            .and_then(|description| description.updated_fields.get(field))
    }
}

/// Ordered event stream for one collection. An `Err` item ends the subscription.
pub type ChangeStream = BoxStream<'static, Result<ChangeEvent>>;

pub(crate) fn lagged(skipped: u64) -> ExpiryError {
    ExpiryError::FeedInterrupted(format!("subscriber fell behind by {} events", skipped))
}
