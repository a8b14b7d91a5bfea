//! The document store this crate drives.
//!
//! [`DocumentStore`] is the whole dependency surface: single-document CRUD with
//! field-level `$set`/`$unset`, index management with expire-after semantics, and an
//! ordered, resumable change feed scoped to one collection. [`memory`] provides an
//! in-process implementation.

pub mod change;
pub mod memory;
pub mod sweeper;

pub use change::{ChangeEvent, ChangeStream, OperationType, ResumeToken, UpdateDescription};
pub use memory::{MemoryCollection, MemoryDatabase};
pub use sweeper::{ExpirationSweeper, spawn_expiration_sweeper};

use crate::core::{Document, RecordId, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Field-level update applied to a single document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpdateSpec {
    #[serde(rename = "$set", default, skip_serializing_if = "BTreeMap::is_empty")]
    pub set: BTreeMap<String, Value>,
    #[serde(rename = "$unset", default, skip_serializing_if = "BTreeSet::is_empty")]
    pub unset: BTreeSet<String>,
}

impl UpdateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: Value) -> Self {
        let field = field.into();
        self.unset.remove(&field);
        self.set.insert(field, value);
        self
    }

    pub fn unset(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.set.remove(&field);
        self.unset.insert(field);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }
}

/// Outcome counts of an `update_one`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateResult {
    pub matched: u64,
    pub modified: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexDirection {
    Ascending,
    Descending,
}

/// Single-field index definition.
///
/// With `expire_after_secs` set, the store deletes a document once the timestamp in
/// `field` plus that many seconds has passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub name: String,
    pub field: String,
    pub direction: IndexDirection,
    pub expire_after_secs: Option<u64>,
}

impl IndexSpec {
    pub fn ascending(field: impl Into<String>) -> Self {
        let field = field.into();
        Self {
            name: format!("{}_1", field),
            field,
            direction: IndexDirection::Ascending,
            expire_after_secs: None,
        }
    }

    pub fn expire_after_secs(mut self, secs: u64) -> Self {
        self.expire_after_secs = Some(secs);
        self
    }

    pub fn is_ttl(&self) -> bool {
        self.expire_after_secs.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Created,
    AlreadyExists,
}

/// Store operations used by the consumer, the index manager and the lifecycle API.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    fn collection_name(&self) -> &str;

    /// Inserts a document, assigning an `_id` when it has none.
    async fn insert_one(&self, document: Document) -> Result<RecordId>;

    async fn update_one(&self, id: &RecordId, update: UpdateSpec) -> Result<UpdateResult>;

    async fn find_one(&self, id: &RecordId) -> Result<Option<Document>>;

    async fn delete_one(&self, id: &RecordId) -> Result<bool>;

    /// Creates an index. Creating an identical index again is not an error.
    async fn create_index(&self, spec: IndexSpec) -> Result<IndexOutcome>;

    async fn list_indexes(&self) -> Result<Vec<IndexSpec>>;

    /// Opens the change feed, optionally resuming strictly after `resume_after`.
    async fn watch(&self, resume_after: Option<ResumeToken>) -> Result<ChangeStream>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_update_spec_last_write_wins() {
        let spec = UpdateSpec::new()
            .set("expireAt", json!("2026-01-01T00:00:00.000Z"))
            .unset("expireAt");
        assert!(spec.set.is_empty());
        assert!(spec.unset.contains("expireAt"));

        let spec = UpdateSpec::new().unset("expireAt").set("expireAt", json!(1));
        assert!(spec.unset.is_empty());
        assert_eq!(spec.set.get("expireAt"), Some(&json!(1)));
    }

    #[test]
    fn test_update_spec_wire_shape() {
        let spec = UpdateSpec::new().unset("expireAt");
        assert_eq!(
            serde_json::to_value(&spec).unwrap(),
            json!({"$unset": ["expireAt"]})
        );
    }

    #[test]
    fn test_index_spec_naming() {
        let spec = IndexSpec::ascending("expireAt").expire_after_secs(0);
        assert_eq!(spec.name, "expireAt_1");
        assert!(spec.is_ttl());
    }
}
