use super::DocumentStore;
use super::memory::MemoryCollection;
use crate::config::SweeperConfig;
use crate::core::Result;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Duration as TokioDuration, MissedTickBehavior, interval};
use tracing::{Level, event};

/// Background task that reclaims expired documents of one collection.
pub struct ExpirationSweeper {
    stop_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<()>>,
}

impl ExpirationSweeper {
    /// Signals the sweeper to stop and waits for it to finish.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(join_handle) = self.join_handle.take() {
            join_handle.await?;
        }
        Ok(())
    }
}

impl Drop for ExpirationSweeper {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }
        if let Some(join_handle) = self.join_handle.take() {
            join_handle.abort();
        }
    }
}

/// Spawns a sweeper ticking every `config.interval_ms`.
pub fn spawn_expiration_sweeper(
    collection: Arc<MemoryCollection>,
    config: &SweeperConfig,
) -> ExpirationSweeper {
    let interval_ms = config.interval_ms.max(10);
    let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

    let join_handle = tokio::spawn(async move {
        let mut ticker = interval(TokioDuration::from_millis(interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    break;
                }
                _ = ticker.tick() => {
                    match collection.sweep_expired().await {
                        Ok(0) => {}
                        Ok(removed) => event!(
                            Level::DEBUG,
                            collection = %collection.collection_name(),
                            removed,
                            "expired documents swept"
                        ),
                        Err(err) => event!(
                            Level::WARN,
                            collection = %collection.collection_name(),
                            error = %err,
                            "expiration sweep failed"
                        ),
                    }
                }
            }
        }
    });

    ExpirationSweeper {
        stop_tx: Some(stop_tx),
        join_handle: Some(join_handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Clock, ManualClock, encode_deadline};
    use crate::store::{IndexSpec, MemoryDatabase};
    use chrono::{Duration, Utc};
    use serde_json::json;

    #[tokio::test]
    async fn test_sweeper_reclaims_and_stops() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let db = MemoryDatabase::new(clock.clone());
        let collection = db.collection("connections");
        collection
            .create_index(IndexSpec::ascending("expireAt").expire_after_secs(0))
            .await
            .unwrap();
        let deadline = clock.now() + Duration::seconds(5);
        collection
            .insert_one(
                json!({"_id": "a", "expireAt": encode_deadline(deadline)})
                    .as_object()
                    .cloned()
                    .unwrap(),
            )
            .await
            .unwrap();

        let sweeper = spawn_expiration_sweeper(collection.clone(), &SweeperConfig { interval_ms: 10 });
        tokio::time::sleep(TokioDuration::from_millis(50)).await;
        assert_eq!(collection.len().await, 1);

        clock.advance(Duration::seconds(5));
        let mut remaining = collection.len().await;
        for _ in 0..100 {
            if remaining == 0 {
                break;
            }
            tokio::time::sleep(TokioDuration::from_millis(10)).await;
            remaining = collection.len().await;
        }
        assert_eq!(remaining, 0);

        sweeper.stop().await.unwrap();
    }
}
