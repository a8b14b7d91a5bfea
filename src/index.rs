//! Keeps the deadline index in place so the store reclaims expired records itself.

use crate::core::{EXPIRE_AT_FIELD, Result};
use crate::store::{DocumentStore, IndexOutcome, IndexSpec};
use log::info;

/// The sweep-eligible index on `expireAt`: ascending, zero grace period.
pub fn expiration_index_spec() -> IndexSpec {
    IndexSpec::ascending(EXPIRE_AT_FIELD).expire_after_secs(0)
}

/// Ensures the expiration index exists. Safe to call any number of times.
pub async fn ensure_expiration_index(store: &dyn DocumentStore) -> Result<IndexOutcome> {
    let spec = expiration_index_spec();
    let outcome = store.create_index(spec.clone()).await?;
    match outcome {
        IndexOutcome::Created => info!(
            "expiration index '{}' created on {}",
            spec.name,
            store.collection_name()
        ),
        IndexOutcome::AlreadyExists => info!(
            "expiration index '{}' already present on {}",
            spec.name,
            store.collection_name()
        ),
    }
    Ok(outcome)
}
