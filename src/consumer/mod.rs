//! Change-event consumer: keeps each record's `expireAt` in step with its `status`.
//!
//! The consumer reads one collection's change feed. Every update that sets `status`
//! is turned into a single-field write of `expireAt` according to the
//! [`PolicyTable`]. Writes for the same record are applied in feed order, while
//! writes for different records run concurrently. A failed write is reported and
//! logged; it never stops the feed. A broken feed is reopened from the last
//! dispatched position with exponential backoff.

mod dispatcher;
mod stats;

pub use stats::{ConsumerStats, ConsumerStatsSnapshot};

use crate::config::{ConsumerConfig, ExpiryConfig};
use crate::core::{Clock, EXPIRE_AT_FIELD, ExpiryError, RecordId, Result, STATUS_FIELD, encode_deadline};
use crate::policy::{ExpirationOutcome, PolicyTable};
use crate::store::{ChangeEvent, ChangeStream, DocumentStore, OperationType, ResumeToken, UpdateSpec};
use chrono::{DateTime, Utc};
use dispatcher::KeyedDispatcher;
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, Level, event, info_span};

/// The write a relevant event resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadlineWrite {
    Set(DateTime<Utc>),
    Clear,
}

impl DeadlineWrite {
    fn to_update(self) -> UpdateSpec {
        match self {
            Self::Set(deadline) => UpdateSpec::new().set(EXPIRE_AT_FIELD, encode_deadline(deadline)),
            Self::Clear => UpdateSpec::new().unset(EXPIRE_AT_FIELD),
        }
    }
}

/// Why an event needed no write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotAnUpdate(OperationType),
    StatusNotChanged,
    MissingDocumentKey,
    NonTextStatus,
    /// The status has no policy entry; any existing deadline is left as is.
    NoPolicy(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Applied(DeadlineWrite),
    Skipped(SkipReason),
    Failed(ExpiryError),
}

/// Outcome of one processed event, as delivered on the report channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventReport {
    pub token: ResumeToken,
    pub record_id: Option<RecordId>,
    pub outcome: EventOutcome,
}

/// Record identity and new status of an event that may need a deadline write.
fn status_change(event: &ChangeEvent) -> std::result::Result<(&RecordId, &str), SkipReason> {
    if event.operation_type != OperationType::Update {
        return Err(SkipReason::NotAnUpdate(event.operation_type));
    }
    let status = event
        .updated_field(STATUS_FIELD)
        .ok_or(SkipReason::StatusNotChanged)?;
    let id = event
        .document_key
        .as_ref()
        .ok_or(SkipReason::MissingDocumentKey)?;
    match status {
        Value::String(status) => Ok((id, status.as_str())),
        _ => Err(SkipReason::NonTextStatus),
    }
}

/// Ending of one subscription.
enum StreamEnd {
    /// Shutdown was requested; the subscription is handed back so it outlives the drain.
    Shutdown(ChangeStream),
    Interrupted(ExpiryError),
}

/// A dispatched deadline write that has not reported its outcome yet.
///
/// If the job is dropped before completing (aborted by a drain timeout, or a panic),
/// the event is reported as failed instead of vanishing.
struct InflightWrite {
    consumer: ExpirationConsumer,
    token: ResumeToken,
    record_id: Option<RecordId>,
    completed: bool,
}

impl InflightWrite {
    fn complete(mut self, outcome: EventOutcome) {
        self.completed = true;
        self.consumer.record(self.token, self.record_id.take(), outcome);
    }
}

impl Drop for InflightWrite {
    fn drop(&mut self) {
        if !self.completed {
            self.consumer.record(
                self.token,
                self.record_id.take(),
                EventOutcome::Failed(ExpiryError::Worker(
                    "deadline write abandoned before completion".to_string(),
                )),
            );
        }
    }
}

#[derive(Clone)]
pub struct ExpirationConsumer {
    store: Arc<dyn DocumentStore>,
    policy: Arc<PolicyTable>,
    clock: Arc<dyn Clock>,
    config: ConsumerConfig,
    stats: Arc<ConsumerStats>,
    reports: Option<mpsc::UnboundedSender<EventReport>>,
    start_after: Option<ResumeToken>,
}

impl ExpirationConsumer {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        policy: PolicyTable,
        clock: Arc<dyn Clock>,
        config: ConsumerConfig,
    ) -> Self {
        Self {
            store,
            policy: Arc::new(policy),
            clock,
            config,
            stats: Arc::new(ConsumerStats::default()),
            reports: None,
            start_after: None,
        }
    }

    pub fn from_config(
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
        config: &ExpiryConfig,
    ) -> Self {
        Self::new(store, config.policy.clone(), clock, config.consumer.clone())
    }

    /// Sends an [`EventReport`] for every processed event to `reports`.
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<EventReport>) -> Self {
        self.reports = Some(reports);
        self
    }

    /// Starts reading the feed strictly after `token` instead of from now.
    pub fn resume_after(mut self, token: ResumeToken) -> Self {
        self.start_after = Some(token);
        self
    }

    pub fn policy(&self) -> &PolicyTable {
        &self.policy
    }

    pub fn stats(&self) -> ConsumerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Applies the policy to a single event and performs the resulting write.
    ///
    /// Never fails: store errors come back as [`EventOutcome::Failed`], and an update
    /// that matches no record as `Failed(RecordNotFound)`.
    pub async fn process_event(&self, event: &ChangeEvent) -> EventOutcome {
        let (id, status) = match status_change(event) {
            Ok(change) => change,
            Err(reason) => return EventOutcome::Skipped(reason),
        };

        let write = match self.policy.resolve(status, self.clock.now()) {
            ExpirationOutcome::Noop => {
                return EventOutcome::Skipped(SkipReason::NoPolicy(status.to_string()));
            }
            ExpirationOutcome::Clear => DeadlineWrite::Clear,
            ExpirationOutcome::Set(deadline) => DeadlineWrite::Set(deadline),
        };

        match self.store.update_one(id, write.to_update()).await {
            Ok(result) if result.matched == 0 => {
                EventOutcome::Failed(ExpiryError::RecordNotFound(id.to_string()))
            }
            Ok(_) => EventOutcome::Applied(write),
            Err(err) => EventOutcome::Failed(err),
        }
    }

    fn record(&self, token: ResumeToken, record_id: Option<RecordId>, outcome: EventOutcome) {
        let id = record_id.as_ref().map(RecordId::as_str).unwrap_or("-");
        match &outcome {
            EventOutcome::Applied(write) => {
                self.stats.record_applied();
                event!(
                    Level::INFO,
                    token = %token,
                    record_id = id,
                    write = ?write,
                    "expiration deadline applied"
                );
            }
            EventOutcome::Skipped(reason) => {
                self.stats.record_skipped();
                event!(
                    Level::DEBUG,
                    token = %token,
                    record_id = id,
                    reason = ?reason,
                    "change event skipped"
                );
            }
            EventOutcome::Failed(err) => {
                self.stats.record_failed();
                event!(
                    Level::WARN,
                    token = %token,
                    record_id = id,
                    error = %err,
                    "expiration update failed"
                );
            }
        }

        if let Some(reports) = &self.reports {
            let _ = reports.send(EventReport {
                token,
                record_id,
                outcome,
            });
        }
    }

    /// Starts the consumer on the current tokio runtime.
    pub fn spawn(self) -> ConsumerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let stats = self.stats.clone();
        let span = info_span!(
            "expiration.consumer",
            collection = %self.store.collection_name()
        );
        let join_handle = tokio::spawn(self.run(shutdown_rx).instrument(span));
        ConsumerHandle {
            shutdown_tx,
            join_handle,
            stats,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut dispatcher = KeyedDispatcher::new(self.config.max_inflight);
        let drain_timeout = self.config.drain_timeout_ms.map(Duration::from_millis);
        let mut resume_after = self.start_after;
        let mut failures: u32 = 0;
        let mut subscription: Option<ChangeStream> = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let interruption = match self.store.watch(resume_after).await {
                Ok(stream) => {
                    event!(Level::INFO, resume_after = ?resume_after, "change feed subscribed");
                    match self
                        .consume(stream, &mut dispatcher, &mut resume_after, &mut failures, &mut shutdown)
                        .await
                    {
                        StreamEnd::Shutdown(stream) => {
                            subscription = Some(stream);
                            break;
                        }
                        StreamEnd::Interrupted(err) => err,
                    }
                }
                // Without a position to drop, a refusal is an ordinary failure.
                Err(ExpiryError::ResumeUnavailable(reason)) if resume_after.is_some() => {
                    event!(
                        Level::WARN,
                        reason = %reason,
                        "resume position lost, resubscribing from now"
                    );
                    resume_after = None;
                    continue;
                }
                Err(err) => err,
            };

            event!(
                Level::WARN,
                error = %interruption,
                pending_records = dispatcher.pending_records(),
                "change feed interrupted"
            );
            // Every dispatched event must finish before resuming past it.
            dispatcher.drain(None).await;

            failures += 1;
            if failures > self.config.retry.max_attempts {
                event!(
                    Level::ERROR,
                    attempts = failures - 1,
                    error = %interruption,
                    "giving up on change feed"
                );
                return Err(interruption);
            }

            self.stats.record_resubscription();
            let backoff = self.config.retry.backoff_for(failures);
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tokio::time::sleep(backoff) => {}
            }
        }

        event!(
            Level::INFO,
            pending_records = dispatcher.pending_records(),
            "consumer stopping, draining in-flight writes"
        );
        dispatcher.drain(drain_timeout).await;
        drop(subscription);
        event!(Level::INFO, "consumer stopped");
        Ok(())
    }

    async fn consume(
        &self,
        mut stream: ChangeStream,
        dispatcher: &mut KeyedDispatcher,
        resume_after: &mut Option<ResumeToken>,
        failures: &mut u32,
        shutdown: &mut watch::Receiver<bool>,
    ) -> StreamEnd {
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return StreamEnd::Shutdown(stream);
                    }
                }
                next = stream.next() => {
                    let change = match next {
                        None => {
                            return StreamEnd::Interrupted(ExpiryError::FeedInterrupted(
                                "change feed closed by store".to_string(),
                            ));
                        }
                        Some(Err(err)) => return StreamEnd::Interrupted(err),
                        Some(Ok(change)) => change,
                    };

                    *failures = 0;
                    self.stats.record_received();

                    if change.operation_type == OperationType::Invalidate {
                        // An invalidated feed cannot be resumed.
                        *resume_after = None;
                        return StreamEnd::Interrupted(ExpiryError::FeedInterrupted(
                            "change feed invalidated".to_string(),
                        ));
                    }

                    let token = change.token;
                    self.dispatch(change, dispatcher).await;
                    *resume_after = Some(token);
                }
            }
        }
    }

    async fn dispatch(&self, change: ChangeEvent, dispatcher: &mut KeyedDispatcher) {
        let key = match status_change(&change) {
            Ok((id, _)) => id.clone(),
            Err(reason) => {
                self.record(change.token, change.document_key.clone(), EventOutcome::Skipped(reason));
                return;
            }
        };

        let write = InflightWrite {
            consumer: self.clone(),
            token: change.token,
            record_id: Some(key.clone()),
            completed: false,
        };
        dispatcher
            .dispatch(key, async move {
                let outcome = write.consumer.process_event(&change).await;
                write.complete(outcome);
            })
            .await;
    }
}

/// Control handle of a spawned [`ExpirationConsumer`].
///
/// Dropping the handle also stops the consumer gracefully.
pub struct ConsumerHandle {
    shutdown_tx: watch::Sender<bool>,
    join_handle: JoinHandle<Result<()>>,
    stats: Arc<ConsumerStats>,
}

impl ConsumerHandle {
    pub fn stats(&self) -> ConsumerStatsSnapshot {
        self.stats.snapshot()
    }

    /// True once the consumer has stopped, either by shutdown or a fatal feed error.
    pub fn is_finished(&self) -> bool {
        self.join_handle.is_finished()
    }

    /// Stops reading the feed, waits for in-flight writes and releases the subscription.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        self.join_handle.await?
    }

    /// Waits for the consumer to end on its own. Only a fatal feed error ends it.
    pub async fn join(self) -> Result<()> {
        let Self {
            shutdown_tx,
            join_handle,
            ..
        } = self;
        let result = join_handle.await?;
        drop(shutdown_tx);
        result
    }
}
