//! Direct deadline management for callers outside the change-event path.

use crate::core::{
    Clock, Document, EXPIRE_AT_FIELD, ExpiryError, RecordId, Result, decode_deadline,
    encode_deadline,
};
use crate::store::{DocumentStore, UpdateSpec};
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use std::sync::Arc;

/// Result of a deadline override or clear.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpirationChange {
    Updated,
    /// The record exists and already had the requested deadline.
    Unchanged,
    RecordNotFound,
}

/// Insert-with-TTL, override and clear operations on record deadlines.
#[derive(Clone)]
pub struct RecordLifecycle {
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
}

impl RecordLifecycle {
    pub fn new(store: Arc<dyn DocumentStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Inserts `document` with `expireAt = now + ttl_secs`, replacing any deadline it carried.
    pub async fn insert_with_ttl(&self, mut document: Document, ttl_secs: u64) -> Result<RecordId> {
        let deadline = i64::try_from(ttl_secs)
            .ok()
            .and_then(Duration::try_seconds)
            .and_then(|ttl| self.clock.now().checked_add_signed(ttl))
            .ok_or_else(|| {
                ExpiryError::InvalidDocument(format!("ttl of {} seconds is out of range", ttl_secs))
            })?;
        document.insert(EXPIRE_AT_FIELD.to_string(), encode_deadline(deadline));

        let id = self.store.insert_one(document).await?;
        info!("record {} inserted, expires at {}", id, deadline);
        Ok(id)
    }

    /// Sets the deadline of `id`, or removes it when `deadline` is `None`.
    pub async fn set_expiration(
        &self,
        id: &RecordId,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<ExpirationChange> {
        let update = match deadline {
            Some(deadline) => UpdateSpec::new().set(EXPIRE_AT_FIELD, encode_deadline(deadline)),
            None => UpdateSpec::new().unset(EXPIRE_AT_FIELD),
        };
        let result = self.store.update_one(id, update).await?;

        if result.matched == 0 {
            warn!("record {} not found, expiration left unset", id);
            return Ok(ExpirationChange::RecordNotFound);
        }
        if result.modified == 0 {
            return Ok(ExpirationChange::Unchanged);
        }
        Ok(ExpirationChange::Updated)
    }

    /// Removes the deadline; the record stays until a later status change sets one again.
    pub async fn clear_expiration(&self, id: &RecordId) -> Result<ExpirationChange> {
        self.set_expiration(id, None).await
    }

    /// Current deadline of `id`. `Ok(None)` covers both "no deadline" and "no record".
    pub async fn expiration_of(&self, id: &RecordId) -> Result<Option<DateTime<Utc>>> {
        let document = self.store.find_one(id).await?;
        Ok(document
            .as_ref()
            .and_then(|document| document.get(EXPIRE_AT_FIELD))
            .and_then(decode_deadline))
    }
}
