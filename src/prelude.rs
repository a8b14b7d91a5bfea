//! Recommended imports grouped by role.
//!
//! `app` covers wiring a service against a store. `store` is for implementing
//! [`DocumentStore`](crate::store::DocumentStore) over another backend.

pub mod app {
    //! Start a service, manage deadlines directly, tune the policy.
    pub use crate::{
        Clock, ExpirationChange, ExpiryConfig, ExpiryService, PolicyRule, PolicyTable, RecordId,
        RecordLifecycle, SystemClock,
    };
}

pub mod store {
    //! Contract types for store adapters.
    pub use crate::store::{
        ChangeEvent, ChangeStream, DocumentStore, IndexDirection, IndexOutcome, IndexSpec,
        OperationType, ResumeToken, UpdateDescription, UpdateResult, UpdateSpec,
    };
    pub use crate::{Document, ExpiryError, RecordId, Result};
}
