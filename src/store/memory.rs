use super::change::{self, ChangeEvent, ChangeStream, OperationType, ResumeToken, UpdateDescription};
use super::{DocumentStore, IndexOutcome, IndexSpec, UpdateResult, UpdateSpec};
use crate::core::{Clock, Document, ExpiryError, ID_FIELD, RecordId, Result, decode_deadline};
use async_trait::async_trait;
use chrono::Duration;
use futures::StreamExt;
use futures::stream;
use serde_json::Map;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};

/// Change events retained per collection for resumption.
pub const DEFAULT_FEED_HISTORY: usize = 1024;

/// An in-process document database made of named collections.
///
/// Collections are created on first access and shared: asking for the same name twice
/// returns the same handle.
pub struct MemoryDatabase {
    clock: Arc<dyn Clock>,
    closed: Arc<AtomicBool>,
    feed_history: usize,
    collections: StdMutex<HashMap<String, Arc<MemoryCollection>>>,
}

impl MemoryDatabase {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            closed: Arc::new(AtomicBool::new(false)),
            feed_history: DEFAULT_FEED_HISTORY,
            collections: StdMutex::new(HashMap::new()),
        }
    }

    /// Sets how many change events each new collection keeps for resumption.
    pub fn with_feed_history(mut self, events: usize) -> Self {
        self.feed_history = events.max(1);
        self
    }

    pub fn collection(&self, name: &str) -> Arc<MemoryCollection> {
        let mut collections = self
            .collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        collections
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(MemoryCollection::new(
                    name,
                    self.clock.clone(),
                    self.closed.clone(),
                    self.feed_history,
                ))
            })
            .clone()
    }

    pub fn collection_names(&self) -> Vec<String> {
        let collections = self
            .collections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        names
    }

    /// Shuts the database down: every later operation fails with `StoreUnavailable`
    /// and open change feeds end.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let collections: Vec<Arc<MemoryCollection>> = {
            let guard = self
                .collections
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.values().cloned().collect()
        };
        for collection in collections {
            collection.state.lock().await.feed = None;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct CollectionState {
    documents: BTreeMap<RecordId, Document>,
    indexes: Vec<IndexSpec>,
    history: VecDeque<ChangeEvent>,
    history_limit: usize,
    next_sequence: u64,
    feed: Option<broadcast::Sender<ChangeEvent>>,
}

impl CollectionState {
    fn publish(
        &mut self,
        operation_type: OperationType,
        document_key: Option<RecordId>,
        update_description: Option<UpdateDescription>,
    ) {
        let event = ChangeEvent {
            token: ResumeToken::new(self.next_sequence),
            operation_type,
            document_key,
            update_description,
        };
        self.next_sequence += 1;

        if self.history.len() == self.history_limit {
            self.history.pop_front();
        }
        self.history.push_back(event.clone());

        if let Some(feed) = &self.feed {
            // No receivers is fine; the event stays in history.
            let _ = feed.send(event);
        }
    }

    /// Events strictly after `token`, or an error when that position was never issued
    /// or has already been evicted.
    fn events_after(&self, token: ResumeToken) -> Result<Vec<ChangeEvent>> {
        let last_issued = self.next_sequence - 1;
        if token.sequence() > last_issued {
            return Err(ExpiryError::ResumeUnavailable(format!(
                "token {} was never issued (last is {})",
                token, last_issued
            )));
        }
        let oldest_resumable = self
            .history
            .front()
            .map(|event| event.token.sequence() - 1)
            .unwrap_or(last_issued);
        if token.sequence() < oldest_resumable {
            return Err(ExpiryError::ResumeUnavailable(format!(
                "token {} is older than retained history",
                token
            )));
        }
        Ok(self
            .history
            .iter()
            .filter(|event| event.token > token)
            .cloned()
            .collect())
    }
}

/// A single collection of a [`MemoryDatabase`].
pub struct MemoryCollection {
    name: String,
    clock: Arc<dyn Clock>,
    closed: Arc<AtomicBool>,
    state: Mutex<CollectionState>,
}

impl MemoryCollection {
    fn new(name: &str, clock: Arc<dyn Clock>, closed: Arc<AtomicBool>, history_limit: usize) -> Self {
        let (feed, _) = broadcast::channel(history_limit);
        Self {
            name: name.to_string(),
            clock,
            closed,
            state: Mutex::new(CollectionState {
                documents: BTreeMap::new(),
                indexes: Vec::new(),
                history: VecDeque::with_capacity(history_limit),
                history_limit,
                next_sequence: 1,
                feed: Some(feed),
            }),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ExpiryError::StoreUnavailable(format!(
                "database closed (collection '{}')",
                self.name
            )));
        }
        Ok(())
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Position of the latest event; watching after it yields only future events.
    pub async fn current_token(&self) -> ResumeToken {
        ResumeToken::new(self.state.lock().await.next_sequence - 1)
    }

    pub async fn ids(&self) -> Vec<RecordId> {
        self.state.lock().await.documents.keys().cloned().collect()
    }

    /// Resets the change feed. Open streams receive an `invalidate` event and end.
    pub async fn invalidate_feed(&self) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        state.publish(OperationType::Invalidate, None, None);
        Ok(())
    }

    /// Deletes every document whose TTL-indexed field is past its deadline.
    ///
    /// Without a TTL index nothing is deleted. Returns the number of removed documents.
    pub async fn sweep_expired(&self) -> Result<usize> {
        self.ensure_open()?;
        let now = self.clock.now();
        let mut state = self.state.lock().await;

        let ttl_indexes: Vec<(String, Duration)> = state
            .indexes
            .iter()
            .filter_map(|index| {
                let grace = i64::try_from(index.expire_after_secs?).ok()?;
                Some((index.field.clone(), Duration::try_seconds(grace)?))
            })
            .collect();
        if ttl_indexes.is_empty() {
            return Ok(0);
        }

        let expired: Vec<RecordId> = state
            .documents
            .iter()
            .filter(|(_, document)| {
                ttl_indexes.iter().any(|(field, grace)| {
                    document
                        .get(field)
                        .and_then(decode_deadline)
                        .and_then(|deadline| deadline.checked_add_signed(*grace))
                        .is_some_and(|due| due <= now)
                })
            })
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            state.documents.remove(id);
            state.publish(OperationType::Delete, Some(id.clone()), None);
        }
        Ok(expired.len())
    }
}

#[async_trait]
impl DocumentStore for MemoryCollection {
    fn collection_name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, mut document: Document) -> Result<RecordId> {
        self.ensure_open()?;
        let id = match RecordId::from_document(&document)? {
            Some(id) => id,
            None => {
                let id = RecordId::generate();
                document.insert(ID_FIELD.to_string(), id.to_value());
                id
            }
        };

        let mut state = self.state.lock().await;
        if state.documents.contains_key(&id) {
            return Err(ExpiryError::DuplicateIdentity(id.to_string()));
        }
        state.documents.insert(id.clone(), document);
        state.publish(OperationType::Insert, Some(id.clone()), None);
        Ok(id)
    }

    async fn update_one(&self, id: &RecordId, update: UpdateSpec) -> Result<UpdateResult> {
        self.ensure_open()?;
        if update.set.contains_key(ID_FIELD) || update.unset.contains(ID_FIELD) {
            return Err(ExpiryError::InvalidDocument(format!(
                "{} cannot be modified",
                ID_FIELD
            )));
        }

        let mut state = self.state.lock().await;
        let Some(document) = state.documents.get_mut(id) else {
            return Ok(UpdateResult::default());
        };

        let mut updated_fields = Map::new();
        for (field, value) in update.set {
            if document.get(&field) != Some(&value) {
                document.insert(field.clone(), value.clone());
                updated_fields.insert(field, value);
            }
        }
        let mut removed_fields = Vec::new();
        for field in update.unset {
            if document.remove(&field).is_some() {
                removed_fields.push(field);
            }
        }

        let modified = !updated_fields.is_empty() || !removed_fields.is_empty();
        if modified {
            state.publish(
                OperationType::Update,
                Some(id.clone()),
                Some(UpdateDescription {
                    updated_fields,
                    removed_fields,
                }),
            );
        }
        Ok(UpdateResult {
            matched: 1,
            modified: u64::from(modified),
        })
    }

    async fn find_one(&self, id: &RecordId) -> Result<Option<Document>> {
        self.ensure_open()?;
        Ok(self.state.lock().await.documents.get(id).cloned())
    }

    async fn delete_one(&self, id: &RecordId) -> Result<bool> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        if state.documents.remove(id).is_none() {
            return Ok(false);
        }
        state.publish(OperationType::Delete, Some(id.clone()), None);
        Ok(true)
    }

    async fn create_index(&self, spec: IndexSpec) -> Result<IndexOutcome> {
        self.ensure_open()?;
        let mut state = self.state.lock().await;
        let clash = state.indexes.iter().find(|existing| {
            existing.name == spec.name
                || (existing.field == spec.field && existing.direction == spec.direction)
        });
        match clash {
            Some(existing) if *existing == spec => Ok(IndexOutcome::AlreadyExists),
            Some(existing) => Err(ExpiryError::IndexConflict(format!(
                "index '{}' on '{}' exists with different options",
                existing.name, existing.field
            ))),
            None => {
                state.indexes.push(spec);
                Ok(IndexOutcome::Created)
            }
        }
    }

    async fn list_indexes(&self) -> Result<Vec<IndexSpec>> {
        self.ensure_open()?;
        Ok(self.state.lock().await.indexes.clone())
    }

    async fn watch(&self, resume_after: Option<ResumeToken>) -> Result<ChangeStream> {
        self.ensure_open()?;
        let state = self.state.lock().await;
        let Some(feed) = &state.feed else {
            return Err(ExpiryError::StoreUnavailable(format!(
                "change feed closed for '{}'",
                self.name
            )));
        };
        // Subscribing under the state lock means no event falls between backlog and live.
        let receiver = feed.subscribe();
        let backlog = match resume_after {
            Some(token) => state.events_after(token)?,
            None => Vec::new(),
        };
        drop(state);

        let live = stream::unfold(Some(receiver), |receiver| async move {
            let mut receiver = receiver?;
            match receiver.recv().await {
                Ok(event) if event.operation_type == OperationType::Invalidate => {
                    Some((Ok(event), None))
                }
                Ok(event) => Some((Ok(event), Some(receiver))),
                Err(RecvError::Lagged(skipped)) => Some((Err(change::lagged(skipped)), None)),
                Err(RecvError::Closed) => None,
            }
        });
        Ok(stream::iter(backlog.into_iter().map(Ok)).chain(live).boxed())
    }
}
