use crate::core::RecordId;
use futures::future::join_all;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{Level, event};

/// Runs jobs concurrently across records while keeping each record's jobs in
/// arrival order.
///
/// The newest job of a record waits for the record's previous job before it starts,
/// so jobs form one chain per record. A semaphore bounds how many jobs exist at once;
/// `dispatch` waits for a slot, which holds back the caller when the store is slow.
pub(crate) struct KeyedDispatcher {
    chains: HashMap<RecordId, JoinHandle<()>>,
    permits: Arc<Semaphore>,
}

impl KeyedDispatcher {
    pub(crate) fn new(max_inflight: usize) -> Self {
        Self {
            chains: HashMap::new(),
            permits: Arc::new(Semaphore::new(max_inflight.max(1))),
        }
    }

    pub(crate) async fn dispatch<F>(&mut self, key: RecordId, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.prune();
        let permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => Some(permit),
            // The semaphore is never closed; run unbounded rather than drop the job.
            Err(_) => None,
        };

        let previous = self.chains.remove(&key);
        let handle = tokio::spawn(async move {
            if let Some(previous) = previous {
                // A panicked predecessor still counts as finished.
                let _ = previous.await;
            }
            job.await;
            drop(permit);
        });
        self.chains.insert(key, handle);
    }

    /// Number of records with unfinished jobs.
    pub(crate) fn pending_records(&self) -> usize {
        self.chains.values().filter(|handle| !handle.is_finished()).count()
    }

    fn prune(&mut self) {
        self.chains.retain(|_, handle| !handle.is_finished());
    }

    /// Waits for every dispatched job. Jobs still running after `timeout` are aborted.
    pub(crate) async fn drain(&mut self, timeout: Option<Duration>) {
        let handles: Vec<JoinHandle<()>> = self.chains.drain().map(|(_, handle)| handle).collect();
        if handles.is_empty() {
            return;
        }
        let abort_handles: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let pending = handles.len();

        let joined = match timeout {
            Some(limit) => tokio::time::timeout(limit, join_all(handles)).await.ok(),
            None => Some(join_all(handles).await),
        };

        match joined {
            Some(results) => {
                let panicked = results.iter().filter(|result| result.is_err()).count();
                if panicked > 0 {
                    event!(Level::ERROR, panicked, "expiration jobs panicked during drain");
                }
            }
            None => {
                for abort in abort_handles {
                    abort.abort();
                }
                event!(
                    Level::WARN,
                    pending,
                    "drain timed out, aborting remaining expiration jobs"
                );
            }
        }
    }
}
