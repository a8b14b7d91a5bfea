use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use futures::StreamExt;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio::time::{sleep, timeout};
use ttlpolicy::{
    ChangeStream, Clock, ConsumerConfig, DeadlineWrite, Document, DocumentStore, EventOutcome,
    EventReport, ExpirationConsumer, ExpiryError, IndexOutcome, IndexSpec, ManualClock,
    MemoryCollection, MemoryDatabase, OperationType, PolicyTable, RecordId, ResumeToken,
    RetryPolicy, SkipReason, UpdateResult, UpdateSpec, decode_deadline,
};

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn fixed_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2026, 7, 1, 12, 0, 0).unwrap(),
    ))
}

fn fast_retry() -> ConsumerConfig {
    ConsumerConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
        },
        ..ConsumerConfig::default()
    }
}

async fn set_status(collection: &MemoryCollection, id: &str, status: &str) {
    collection
        .update_one(&RecordId::new(id), UpdateSpec::new().set("status", json!(status)))
        .await
        .unwrap();
}

/// Waits for the next report that satisfies `pred`.
async fn wait_for<F>(reports: &mut UnboundedReceiver<EventReport>, pred: F) -> EventReport
where
    F: Fn(&EventReport) -> bool,
{
    timeout(Duration::from_secs(5), async {
        loop {
            let report = reports.recv().await.expect("report channel closed");
            if pred(&report) {
                return report;
            }
        }
    })
    .await
    .expect("no matching report within 5s")
}

fn applied_to(id: &str) -> impl Fn(&EventReport) -> bool + '_ {
    move |report: &EventReport| {
        report.record_id.as_ref().map(RecordId::as_str) == Some(id)
            && matches!(report.outcome, EventOutcome::Applied(_))
    }
}

/// Store wrapper that injects failures, delays and feed cuts.
struct ScriptedStore {
    inner: Arc<MemoryCollection>,
    failing_ids: Mutex<HashSet<RecordId>>,
    set_delay: Option<Duration>,
    cut_first_feed_after: Option<usize>,
    refuse_resume: bool,
    watch_calls: Mutex<Vec<Option<ResumeToken>>>,
    writes: AtomicUsize,
    completed_writes: Arc<AtomicUsize>,
    /// Completed write count observed each time a feed was dropped.
    released_at: Arc<Mutex<Vec<usize>>>,
}

/// Rides along with a feed and records when the consumer lets go of it.
struct FeedRelease {
    completed_writes: Arc<AtomicUsize>,
    released_at: Arc<Mutex<Vec<usize>>>,
}

impl Drop for FeedRelease {
    fn drop(&mut self) {
        let completed = self.completed_writes.load(Ordering::SeqCst);
        self.released_at.lock().unwrap().push(completed);
    }
}

impl ScriptedStore {
    fn new(inner: Arc<MemoryCollection>) -> Self {
        Self {
            inner,
            failing_ids: Mutex::new(HashSet::new()),
            set_delay: None,
            cut_first_feed_after: None,
            refuse_resume: false,
            watch_calls: Mutex::new(Vec::new()),
            writes: AtomicUsize::new(0),
            completed_writes: Arc::new(AtomicUsize::new(0)),
            released_at: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl DocumentStore for ScriptedStore {
    fn collection_name(&self) -> &str {
        self.inner.collection_name()
    }

    async fn insert_one(&self, document: Document) -> ttlpolicy::Result<RecordId> {
        self.inner.insert_one(document).await
    }

    async fn update_one(&self, id: &RecordId, update: UpdateSpec) -> ttlpolicy::Result<UpdateResult> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        if self.failing_ids.lock().unwrap().contains(id) {
            return Err(ExpiryError::StoreUnavailable("injected write failure".to_string()));
        }
        if let Some(delay) = self.set_delay {
            if !update.set.is_empty() {
                sleep(delay).await;
            }
        }
        let result = self.inner.update_one(id, update).await;
        self.completed_writes.fetch_add(1, Ordering::SeqCst);
        result
    }

    async fn find_one(&self, id: &RecordId) -> ttlpolicy::Result<Option<Document>> {
        self.inner.find_one(id).await
    }

    async fn delete_one(&self, id: &RecordId) -> ttlpolicy::Result<bool> {
        self.inner.delete_one(id).await
    }

    async fn create_index(&self, spec: IndexSpec) -> ttlpolicy::Result<IndexOutcome> {
        self.inner.create_index(spec).await
    }

    async fn list_indexes(&self) -> ttlpolicy::Result<Vec<IndexSpec>> {
        self.inner.list_indexes().await
    }

    async fn watch(&self, resume_after: Option<ResumeToken>) -> ttlpolicy::Result<ChangeStream> {
        let first_call = {
            let mut calls = self.watch_calls.lock().unwrap();
            calls.push(resume_after);
            calls.len() == 1
        };
        if self.refuse_resume {
            return Err(ExpiryError::ResumeUnavailable("history trimmed".to_string()));
        }
        let stream = self.inner.watch(resume_after).await?;
        let stream = match self.cut_first_feed_after {
            Some(limit) if first_call => stream
                .take(limit)
                .chain(futures::stream::once(async {
                    Err(ExpiryError::FeedInterrupted("injected cut".to_string()))
                }))
                .boxed(),
            _ => stream,
        };
        let release = FeedRelease {
            completed_writes: self.completed_writes.clone(),
            released_at: self.released_at.clone(),
        };
        Ok(stream
            .map(move |item| {
                let _release = &release;
                item
            })
            .boxed())
    }
}

#[tokio::test]
async fn temporary_status_writes_exactly_one_deadline() {
    let clock = fixed_clock();
    let db = MemoryDatabase::new(clock.clone());
    let collection = db.collection("connections");
    collection
        .insert_one(doc(json!({"_id": "conn-1", "status": "Active", "name": "my-connection"})))
        .await
        .unwrap();

    let (tx, mut reports) = unbounded_channel();
    let start = collection.current_token().await;
    let mut observer = collection.watch(Some(start)).await.unwrap();
    let handle = ExpirationConsumer::new(
        collection.clone(),
        PolicyTable::default(),
        clock.clone(),
        ConsumerConfig::default(),
    )
    .with_reports(tx)
    .resume_after(start)
    .spawn();

    set_status(&collection, "conn-1", "Temporary").await;
    let report = wait_for(&mut reports, applied_to("conn-1")).await;
    let expected = clock.now() + ChronoDuration::days(10);
    assert_eq!(report.outcome, EventOutcome::Applied(DeadlineWrite::Set(expected)));

    // The consumer's own write comes back through the feed and must be skipped.
    timeout(Duration::from_secs(5), async {
        while handle.stats().skipped < 1 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(handle.stats().applied, 1);
    handle.shutdown().await.unwrap();

    let mut deadline_writes = Vec::new();
    while let Ok(Some(event)) = timeout(Duration::from_millis(100), observer.next()).await {
        let event = event.unwrap();
        if let Some(value) = event.updated_field("expireAt") {
            deadline_writes.push(decode_deadline(value));
        }
    }
    assert_eq!(deadline_writes, vec![Some(expected)]);
}

#[tokio::test]
async fn active_after_temporary_removes_deadline() {
    let clock = fixed_clock();
    let db = MemoryDatabase::new(clock.clone());
    let collection = db.collection("connections");
    collection
        .insert_one(doc(json!({"_id": "conn-1", "status": "Active"})))
        .await
        .unwrap();

    let (tx, mut reports) = unbounded_channel();
    let handle = ExpirationConsumer::new(
        collection.clone(),
        PolicyTable::default(),
        clock.clone(),
        ConsumerConfig::default(),
    )
    .with_reports(tx)
    .resume_after(collection.current_token().await)
    .spawn();

    set_status(&collection, "conn-1", "Temporary").await;
    wait_for(&mut reports, applied_to("conn-1")).await;
    let stored = collection.find_one(&RecordId::new("conn-1")).await.unwrap().unwrap();
    assert!(stored.contains_key("expireAt"));

    set_status(&collection, "conn-1", "Active").await;
    let report = wait_for(&mut reports, applied_to("conn-1")).await;
    assert_eq!(report.outcome, EventOutcome::Applied(DeadlineWrite::Clear));

    let stored = collection.find_one(&RecordId::new("conn-1")).await.unwrap().unwrap();
    assert!(!stored.contains_key("expireAt"));
    assert_eq!(stored.get("status"), Some(&json!("Active")));

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn unrelated_field_update_writes_nothing() {
    let clock = fixed_clock();
    let db = MemoryDatabase::new(clock.clone());
    let collection = db.collection("connections");
    collection
        .insert_one(doc(json!({"_id": "conn-1", "status": "Temporary"})))
        .await
        .unwrap();
    let store = Arc::new(ScriptedStore::new(collection.clone()));

    let (tx, mut reports) = unbounded_channel();
    let consumer = ExpirationConsumer::new(
        store.clone(),
        PolicyTable::default(),
        clock.clone(),
        ConsumerConfig::default(),
    )
    .with_reports(tx)
    .resume_after(collection.current_token().await);
    let handle = consumer.spawn();

    collection
        .update_one(
            &RecordId::new("conn-1"),
            UpdateSpec::new().set("name", json!("renamed")),
        )
        .await
        .unwrap();
    let report = wait_for(&mut reports, |_| true).await;
    assert_eq!(report.outcome, EventOutcome::Skipped(SkipReason::StatusNotChanged));

    handle.shutdown().await.unwrap();
    assert_eq!(store.writes.load(Ordering::SeqCst), 0);
    let stored = collection.find_one(&RecordId::new("conn-1")).await.unwrap().unwrap();
    assert!(!stored.contains_key("expireAt"));
}

#[tokio::test]
async fn same_record_flips_apply_in_feed_order() {
    let clock = fixed_clock();
    let db = MemoryDatabase::new(clock.clone());
    let collection = db.collection("connections");
    collection
        .insert_one(doc(json!({"_id": "conn-1", "status": "Active"})))
        .await
        .unwrap();

    // Set-writes are slow, clear-writes are instant: only ordering keeps Clear last.
    let mut scripted = ScriptedStore::new(collection.clone());
    scripted.set_delay = Some(Duration::from_millis(50));
    let store = Arc::new(scripted);

    let (tx, mut reports) = unbounded_channel();
    let handle = ExpirationConsumer::new(
        store,
        PolicyTable::default(),
        clock.clone(),
        ConsumerConfig::default(),
    )
    .with_reports(tx)
    .resume_after(collection.current_token().await)
    .spawn();

    set_status(&collection, "conn-1", "Temporary").await;
    set_status(&collection, "conn-1", "Active").await;

    let first = wait_for(&mut reports, applied_to("conn-1")).await;
    let second = wait_for(&mut reports, applied_to("conn-1")).await;
    assert!(matches!(first.outcome, EventOutcome::Applied(DeadlineWrite::Set(_))));
    assert_eq!(second.outcome, EventOutcome::Applied(DeadlineWrite::Clear));
    assert!(first.token < second.token);

    handle.shutdown().await.unwrap();
    let stored = collection.find_one(&RecordId::new("conn-1")).await.unwrap().unwrap();
    assert!(!stored.contains_key("expireAt"));
}

#[tokio::test]
async fn many_records_end_on_their_last_status() {
    let clock = fixed_clock();
    let db = MemoryDatabase::new(clock.clone());
    let collection = db.collection("connections");
    let ids: Vec<String> = (0..10).map(|n| format!("conn-{}", n)).collect();
    for id in &ids {
        collection
            .insert_one(doc(json!({"_id": id, "status": "Active"})))
            .await
            .unwrap();
    }

    let (tx, mut reports) = unbounded_channel();
    let handle = ExpirationConsumer::new(
        collection.clone(),
        PolicyTable::default(),
        clock.clone(),
        ConsumerConfig {
            max_inflight: 4,
            ..ConsumerConfig::default()
        },
    )
    .with_reports(tx)
    .resume_after(collection.current_token().await)
    .spawn();

    for status in ["Temporary", "Inactive", "Active", "Inactive"] {
        for id in &ids {
            set_status(&collection, id, status).await;
        }
    }

    let mut applied = 0;
    while applied < ids.len() * 4 {
        wait_for(&mut reports, |report| {
            matches!(report.outcome, EventOutcome::Applied(_))
        })
        .await;
        applied += 1;
    }
    handle.shutdown().await.unwrap();

    let expected = clock.now() + ChronoDuration::days(7);
    for id in &ids {
        let stored = collection.find_one(&RecordId::new(id.as_str())).await.unwrap().unwrap();
        assert_eq!(
            stored.get("expireAt").and_then(decode_deadline),
            Some(expected),
            "record {}",
            id
        );
    }
}

#[tokio::test]
async fn failed_write_does_not_stop_the_consumer() {
    let clock = fixed_clock();
    let db = MemoryDatabase::new(clock.clone());
    let collection = db.collection("connections");
    for id in ["bad", "good"] {
        collection
            .insert_one(doc(json!({"_id": id, "status": "Active"})))
            .await
            .unwrap();
    }
    let store = Arc::new(ScriptedStore::new(collection.clone()));
    store.failing_ids.lock().unwrap().insert(RecordId::new("bad"));

    let (tx, mut reports) = unbounded_channel();
    let handle = ExpirationConsumer::new(
        store,
        PolicyTable::default(),
        clock.clone(),
        ConsumerConfig::default(),
    )
    .with_reports(tx)
    .resume_after(collection.current_token().await)
    .spawn();

    set_status(&collection, "bad", "Inactive").await;
    let failure = wait_for(&mut reports, |report| {
        matches!(report.outcome, EventOutcome::Failed(_))
    })
    .await;
    assert_eq!(failure.record_id, Some(RecordId::new("bad")));
    assert_eq!(
        failure.outcome,
        EventOutcome::Failed(ExpiryError::StoreUnavailable("injected write failure".to_string()))
    );

    set_status(&collection, "good", "Inactive").await;
    wait_for(&mut reports, applied_to("good")).await;
    assert!(!handle.is_finished());

    let stats = handle.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.applied, 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn interrupted_feed_resumes_after_last_dispatched_event() {
    let clock = fixed_clock();
    let db = MemoryDatabase::new(clock.clone());
    let collection = db.collection("connections");
    let ids = ["a", "b", "c", "d"];
    for id in ids {
        collection
            .insert_one(doc(json!({"_id": id, "status": "Active"})))
            .await
            .unwrap();
    }
    let start = collection.current_token().await;
    for id in ids {
        set_status(&collection, id, "Temporary").await;
    }

    let mut scripted = ScriptedStore::new(collection.clone());
    scripted.cut_first_feed_after = Some(2);
    let store = Arc::new(scripted);

    let (tx, mut reports) = unbounded_channel();
    let handle = ExpirationConsumer::new(store.clone(), PolicyTable::default(), clock.clone(), fast_retry())
        .with_reports(tx)
        .resume_after(start)
        .spawn();

    for id in ids {
        wait_for(&mut reports, applied_to(id)).await;
    }
    assert_eq!(handle.stats().resubscriptions, 1);
    handle.shutdown().await.unwrap();

    let calls = store.watch_calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![Some(start), Some(ResumeToken::new(start.sequence() + 2))]
    );
}

#[tokio::test]
async fn slow_write_survives_feed_cut_despite_drain_timeout() {
    let clock = fixed_clock();
    let db = MemoryDatabase::new(clock.clone());
    let collection = db.collection("connections");
    collection
        .insert_one(doc(json!({"_id": "a", "status": "Active"})))
        .await
        .unwrap();
    let start = collection.current_token().await;
    set_status(&collection, "a", "Temporary").await;

    let mut scripted = ScriptedStore::new(collection.clone());
    scripted.cut_first_feed_after = Some(1);
    scripted.set_delay = Some(Duration::from_millis(200));
    let store = Arc::new(scripted);

    let (tx, mut reports) = unbounded_channel();
    let config = ConsumerConfig {
        drain_timeout_ms: Some(20),
        ..fast_retry()
    };
    let handle = ExpirationConsumer::new(store.clone(), PolicyTable::default(), clock.clone(), config)
        .with_reports(tx)
        .resume_after(start)
        .spawn();

    let report = wait_for(&mut reports, applied_to("a")).await;
    let expected = clock.now() + ChronoDuration::days(10);
    assert_eq!(report.outcome, EventOutcome::Applied(DeadlineWrite::Set(expected)));
    let stats = handle.stats();
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.resubscriptions, 1);
    handle.shutdown().await.unwrap();

    let stored = collection.find_one(&RecordId::new("a")).await.unwrap().unwrap();
    assert_eq!(stored.get("expireAt").and_then(decode_deadline), Some(expected));
    let calls = store.watch_calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![Some(start), Some(ResumeToken::new(start.sequence() + 1))]
    );
}

#[tokio::test]
async fn shutdown_timeout_reports_abandoned_write_as_failed() {
    let clock = fixed_clock();
    let db = MemoryDatabase::new(clock.clone());
    let collection = db.collection("connections");
    collection
        .insert_one(doc(json!({"_id": "conn-1", "status": "Active"})))
        .await
        .unwrap();

    let mut scripted = ScriptedStore::new(collection.clone());
    scripted.set_delay = Some(Duration::from_secs(5));
    let store = Arc::new(scripted);

    let (tx, mut reports) = unbounded_channel();
    let config = ConsumerConfig {
        drain_timeout_ms: Some(20),
        ..ConsumerConfig::default()
    };
    let handle = ExpirationConsumer::new(store.clone(), PolicyTable::default(), clock.clone(), config)
        .with_reports(tx)
        .resume_after(collection.current_token().await)
        .spawn();

    set_status(&collection, "conn-1", "Inactive").await;
    timeout(Duration::from_secs(5), async {
        while store.writes.load(Ordering::SeqCst) == 0 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    timeout(Duration::from_secs(1), handle.shutdown())
        .await
        .expect("shutdown should honour the drain timeout")
        .unwrap();

    let report = timeout(Duration::from_secs(1), reports.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(report.record_id, Some(RecordId::new("conn-1")));
    assert!(matches!(report.outcome, EventOutcome::Failed(ExpiryError::Worker(_))));
    let stored = collection.find_one(&RecordId::new("conn-1")).await.unwrap().unwrap();
    assert!(!stored.contains_key("expireAt"));
}

#[tokio::test]
async fn refused_fresh_subscription_backs_off_and_gives_up() {
    let clock = fixed_clock();
    let db = MemoryDatabase::new(clock.clone());
    let collection = db.collection("connections");
    let start = collection.current_token().await;

    let mut scripted = ScriptedStore::new(collection.clone());
    scripted.refuse_resume = true;
    let store = Arc::new(scripted);

    let handle = ExpirationConsumer::new(store.clone(), PolicyTable::default(), clock.clone(), fast_retry())
        .resume_after(start)
        .spawn();

    let result = timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("consumer should give up");
    assert!(matches!(result, Err(ExpiryError::ResumeUnavailable(_))));

    // One attempt drops the stale position, then max_attempts + 1 tries from now.
    let calls = store.watch_calls.lock().unwrap().clone();
    assert_eq!(calls, vec![Some(start), None, None, None, None]);
}

#[tokio::test]
async fn invalidated_feed_resubscribes_from_now() {
    let clock = fixed_clock();
    let db = MemoryDatabase::new(clock.clone());
    let collection = db.collection("connections");
    collection
        .insert_one(doc(json!({"_id": "conn-1", "status": "Active"})))
        .await
        .unwrap();

    let (tx, mut reports) = unbounded_channel();
    let handle = ExpirationConsumer::new(
        collection.clone(),
        PolicyTable::default(),
        clock.clone(),
        fast_retry(),
    )
    .with_reports(tx)
    .resume_after(collection.current_token().await)
    .spawn();

    collection.invalidate_feed().await.unwrap();

    // The new subscription starts "now", so keep flipping until one is observed.
    let mut observed = None;
    for round in 0..100 {
        let status = if round % 2 == 0 { "Temporary" } else { "Inactive" };
        set_status(&collection, "conn-1", status).await;
        if let Ok(Some(report)) = timeout(Duration::from_millis(50), reports.recv()).await {
            if matches!(report.outcome, EventOutcome::Applied(_)) {
                observed = Some(report);
                break;
            }
        }
    }
    assert!(observed.is_some());
    assert!(handle.stats().resubscriptions >= 1);
    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn closed_store_is_fatal_after_retries() {
    let clock = fixed_clock();
    let db = MemoryDatabase::new(clock.clone());
    let collection = db.collection("connections");

    let handle = ExpirationConsumer::new(
        collection.clone(),
        PolicyTable::default(),
        clock.clone(),
        fast_retry(),
    )
    .resume_after(collection.current_token().await)
    .spawn();

    db.close().await;
    let result = timeout(Duration::from_secs(5), handle.join())
        .await
        .expect("consumer should give up");
    assert!(matches!(result, Err(ExpiryError::StoreUnavailable(_))));
}

#[tokio::test]
async fn shutdown_waits_for_inflight_writes() {
    let clock = fixed_clock();
    let db = MemoryDatabase::new(clock.clone());
    let collection = db.collection("connections");
    collection
        .insert_one(doc(json!({"_id": "conn-1", "status": "Active"})))
        .await
        .unwrap();

    let mut scripted = ScriptedStore::new(collection.clone());
    scripted.set_delay = Some(Duration::from_millis(100));
    let store = Arc::new(scripted);

    let (tx, mut reports) = unbounded_channel();
    let handle = ExpirationConsumer::new(
        store.clone(),
        PolicyTable::default(),
        clock.clone(),
        ConsumerConfig::default(),
    )
    .with_reports(tx)
    .resume_after(collection.current_token().await)
    .spawn();

    set_status(&collection, "conn-1", "Inactive").await;
    // Wait until the write has started, then shut down while it is sleeping.
    timeout(Duration::from_secs(5), async {
        while store.writes.load(Ordering::SeqCst) == 0 {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    handle.shutdown().await.unwrap();

    // The feed is released only after the in-flight write finished.
    assert_eq!(*store.released_at.lock().unwrap(), vec![1]);
    let stored = collection.find_one(&RecordId::new("conn-1")).await.unwrap().unwrap();
    assert_eq!(
        stored.get("expireAt").and_then(decode_deadline),
        Some(clock.now() + ChronoDuration::days(7))
    );
    let report = reports.recv().await.unwrap();
    assert!(matches!(report.outcome, EventOutcome::Applied(_)));
}

#[tokio::test]
async fn insert_and_delete_events_are_skipped() {
    let clock = fixed_clock();
    let db = MemoryDatabase::new(clock.clone());
    let collection = db.collection("connections");

    let (tx, mut reports) = unbounded_channel();
    let handle = ExpirationConsumer::new(
        collection.clone(),
        PolicyTable::default(),
        clock.clone(),
        ConsumerConfig::default(),
    )
    .with_reports(tx)
    .resume_after(collection.current_token().await)
    .spawn();

    collection
        .insert_one(doc(json!({"_id": "conn-1", "status": "Temporary"})))
        .await
        .unwrap();
    collection.delete_one(&RecordId::new("conn-1")).await.unwrap();

    let insert = wait_for(&mut reports, |_| true).await;
    let delete = wait_for(&mut reports, |_| true).await;
    assert_eq!(
        insert.outcome,
        EventOutcome::Skipped(SkipReason::NotAnUpdate(OperationType::Insert))
    );
    assert_eq!(
        delete.outcome,
        EventOutcome::Skipped(SkipReason::NotAnUpdate(OperationType::Delete))
    );

    handle.shutdown().await.unwrap();
}
