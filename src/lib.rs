// ============================================================================
// ttlpolicy Library
// ============================================================================
//
// Status-driven expiration for document stores. A change-feed consumer watches
// `status` mutations and keeps each record's `expireAt` deadline in step with a
// configurable policy; the store's sweeper deletes records once the deadline passes.

pub mod config;
pub mod consumer;
pub mod core;
pub mod index;
pub mod lifecycle;
pub mod policy;
pub mod prelude;
pub mod service;
pub mod store;

// Re-export main types for convenience
pub use config::{ConsumerConfig, ExpiryConfig, RetryPolicy, SweeperConfig};
pub use consumer::{
    ConsumerHandle, ConsumerStatsSnapshot, DeadlineWrite, EventOutcome, EventReport,
    ExpirationConsumer, SkipReason,
};
pub use crate::core::{
    Clock, Document, EXPIRE_AT_FIELD, ExpiryError, ID_FIELD, ManualClock, RecordId, Result,
    STATUS_FIELD, SystemClock, decode_deadline, encode_deadline,
};
pub use index::{ensure_expiration_index, expiration_index_spec};
pub use lifecycle::{ExpirationChange, RecordLifecycle};
pub use policy::{ExpirationOutcome, PolicyRule, PolicyTable};
pub use service::ExpiryService;
pub use store::{
    ChangeEvent, ChangeStream, DocumentStore, ExpirationSweeper, IndexDirection, IndexOutcome,
    IndexSpec, MemoryCollection, MemoryDatabase, OperationType, ResumeToken, UpdateDescription,
    UpdateResult, UpdateSpec, spawn_expiration_sweeper,
};
