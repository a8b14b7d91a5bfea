use crate::config::ExpiryConfig;
use crate::consumer::{ConsumerHandle, ConsumerStatsSnapshot, ExpirationConsumer};
use crate::core::{Clock, ExpiryError, Result};
use crate::index::ensure_expiration_index;
use crate::lifecycle::RecordLifecycle;
use crate::store::DocumentStore;
use log::info;
use std::sync::Arc;

/// Everything needed to run status-driven expiration on one collection.
///
/// `start` ensures the expiration index, spawns the consumer and hands out a
/// [`RecordLifecycle`] for direct deadline management.
pub struct ExpiryService {
    lifecycle: RecordLifecycle,
    consumer: ConsumerHandle,
}

impl ExpiryService {
    pub async fn start(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        config: &ExpiryConfig,
    ) -> Result<Self> {
        config.validate()?;
        if store.collection_name() != config.collection {
            return Err(ExpiryError::InvalidConfig(format!(
                "store is bound to '{}' but configuration names '{}'",
                store.collection_name(),
                config.collection
            )));
        }

        ensure_expiration_index(store.as_ref()).await?;
        let consumer = ExpirationConsumer::from_config(store.clone(), clock.clone(), config).spawn();
        info!(
            "expiry service started on {} with {} policy rules",
            config.collection,
            config.policy.len()
        );

        Ok(Self {
            lifecycle: RecordLifecycle::new(store, clock),
            consumer,
        })
    }

    pub fn lifecycle(&self) -> &RecordLifecycle {
        &self.lifecycle
    }

    pub fn stats(&self) -> ConsumerStatsSnapshot {
        self.consumer.stats()
    }

    /// True when the consumer has stopped on a fatal feed error.
    pub fn consumer_finished(&self) -> bool {
        self.consumer.is_finished()
    }

    pub async fn shutdown(self) -> Result<()> {
        self.consumer.shutdown().await
    }
}
