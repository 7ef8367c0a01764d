// crates/jobs/src/store/mod.rs
//! The Job Store contract consumed by the tracker.

pub mod memory;

pub use memory::MemoryJobStore;

use async_trait::async_trait;
use thiserror::Error;

use datadict_types::{ImportJob, JobId, JobUpdate, NewImportJob, ProcessRequest};

/// Errors returned by a [`JobStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached (connection refused, timeout, ...).
    #[error("job store unreachable: {0}")]
    Unavailable(String),

    #[error("import job not found: {0}")]
    NotFound(JobId),

    /// The store answered but refused the request.
    #[error("job store rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed job store response: {0}")]
    Decode(String),
}

impl StoreError {
    /// Whether retrying the same request later may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Rejected { status, .. } => *status >= 500,
            StoreError::NotFound(_) | StoreError::Decode(_) => false,
        }
    }
}

/// Persistence for import job records.
///
/// Implementations:
/// - `HttpJobStore` (datadict-client): the backend's `/import-jobs` resource
/// - [`MemoryJobStore`]: in-process, for tests and dry runs
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Create a job record. The returned job is `pending` with no progress.
    async fn create(&self, job: NewImportJob) -> Result<ImportJob, StoreError>;

    /// Fetch a job; `Ok(None)` when the store has no such record.
    async fn get(&self, id: JobId) -> Result<Option<ImportJob>, StoreError>;

    /// The user's `pending`/`in_progress` jobs, newest first.
    async fn list_active(&self, user_id: &str) -> Result<Vec<ImportJob>, StoreError>;

    /// Apply a partial update and return the resulting record.
    async fn update(&self, id: JobId, update: JobUpdate) -> Result<ImportJob, StoreError>;

    /// Ask the worker to start processing a created job. Resolves once the
    /// request is acknowledged, not when processing finishes.
    async fn trigger_processing(&self, id: JobId, request: ProcessRequest) -> Result<(), StoreError>;

    /// Store name for logging (e.g. "http", "memory").
    fn name(&self) -> &str;
}
