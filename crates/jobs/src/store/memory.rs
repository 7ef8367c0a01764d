// crates/jobs/src/store/memory.rs
//! In-process Job Store.
//!
//! Holds records in a `RwLock`ed vector and plays both sides: the
//! [`JobStore`] methods are what the tracker calls, while the
//! `record_*` / `touch` / `finish` helpers stand in for the external
//! worker.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use datadict_types::{ImportJob, JobId, JobStatus, JobUpdate, NewImportJob, ProcessRequest};

use super::{JobStore, StoreError};
use crate::clock::{Clock, SystemClock};

#[derive(Default)]
struct Inner {
    /// Insertion order; listing sorts by `created_at` on top of it.
    jobs: Vec<ImportJob>,
    available: bool,
    updates: Vec<(JobId, JobUpdate)>,
    processing: Vec<(JobId, ProcessRequest)>,
}

impl Inner {
    fn find_mut(&mut self, id: JobId) -> Option<&mut ImportJob> {
        self.jobs.iter_mut().find(|job| job.id == id)
    }
}

pub struct MemoryJobStore {
    clock: Arc<dyn Clock>,
    inner: RwLock<Inner>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            inner: RwLock::new(Inner {
                available: true,
                ..Inner::default()
            }),
        }
    }

    /// Simulate the store going offline (`false`) or coming back (`true`).
    /// While offline every [`JobStore`] call fails with `Unavailable`.
    pub fn set_available(&self, available: bool) {
        if let Some(mut inner) = self.write_unchecked() {
            inner.available = available;
        }
    }

    /// Seed a record as-is, e.g. a job whose worker died hours ago.
    pub fn insert(&self, job: ImportJob) {
        if let Some(mut inner) = self.write_unchecked() {
            inner.jobs.retain(|existing| existing.id != job.id);
            inner.jobs.push(job);
        }
    }

    /// Current record, bypassing availability.
    pub fn job(&self, id: JobId) -> Option<ImportJob> {
        self.read_unchecked()?
            .jobs
            .iter()
            .find(|job| job.id == id)
            .cloned()
    }

    /// Every `update` call received, in order.
    pub fn update_log(&self) -> Vec<(JobId, JobUpdate)> {
        self.read_unchecked()
            .map(|inner| inner.updates.clone())
            .unwrap_or_default()
    }

    /// Every `trigger_processing` call received, in order.
    pub fn processing_requests(&self) -> Vec<(JobId, ProcessRequest)> {
        self.read_unchecked()
            .map(|inner| inner.processing.clone())
            .unwrap_or_default()
    }

    // -- Worker side ----------------------------------------------------------

    /// One more table imported.
    pub fn record_imported(&self, id: JobId) -> Option<ImportJob> {
        self.worker_update(id, |job| {
            job.status = JobStatus::InProgress;
            job.imported_tables = (job.imported_tables + 1).min(job.total_tables);
        })
    }

    pub fn record_failed(&self, id: JobId, table: impl Into<String>) -> Option<ImportJob> {
        let table = table.into();
        self.worker_update(id, move |job| {
            job.status = JobStatus::InProgress;
            job.failed_tables.push(table);
        })
    }

    /// Bump `updated_at` without other changes (a heartbeat).
    pub fn touch(&self, id: JobId) -> Option<ImportJob> {
        self.worker_update(id, |_| {})
    }

    /// Move the job to a terminal status.
    pub fn finish(
        &self,
        id: JobId,
        status: JobStatus,
        error_message: Option<String>,
    ) -> Option<ImportJob> {
        self.worker_update(id, move |job| {
            job.status = status;
            if error_message.is_some() {
                job.error_message = error_message;
            }
        })
    }

    fn worker_update<F>(&self, id: JobId, f: F) -> Option<ImportJob>
    where
        F: FnOnce(&mut ImportJob),
    {
        let now = self.clock.now();
        let mut inner = self.write_unchecked()?;
        let job = inner.find_mut(id)?;
        if job.is_terminal() {
            tracing::debug!(job_id = %id, status = %job.status, "ignoring worker update on terminal job");
            return Some(job.clone());
        }
        f(job);
        settle(job, now);
        Some(job.clone())
    }

    // -- Locking --------------------------------------------------------------

    fn read(&self) -> Result<RwLockReadGuard<'_, Inner>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Unavailable(format!("memory store lock poisoned: {e}")))?;
        if !inner.available {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(inner)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Inner>, StoreError> {
        let inner = self
            .inner
            .write()
            .map_err(|e| StoreError::Unavailable(format!("memory store lock poisoned: {e}")))?;
        if !inner.available {
            return Err(StoreError::Unavailable("memory store offline".into()));
        }
        Ok(inner)
    }

    fn read_unchecked(&self) -> Option<RwLockReadGuard<'_, Inner>> {
        match self.inner.read() {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::error!("RwLock poisoned reading memory store: {e}");
                None
            }
        }
    }

    fn write_unchecked(&self) -> Option<RwLockWriteGuard<'_, Inner>> {
        match self.inner.write() {
            Ok(guard) => Some(guard),
            Err(e) => {
                tracing::error!("RwLock poisoned writing memory store: {e}");
                None
            }
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Stamp `updated_at` and keep `completed_at` in line with the status.
fn settle(job: &mut ImportJob, now: DateTime<Utc>) {
    job.updated_at = now;
    if job.is_terminal() {
        job.completed_at.get_or_insert(now);
    } else {
        job.completed_at = None;
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, new_job: NewImportJob) -> Result<ImportJob, StoreError> {
        let now = self.clock.now();
        let job = ImportJob {
            id: Uuid::new_v4(),
            user_id: new_job.user_id,
            config: new_job.config,
            status: JobStatus::Pending,
            total_tables: new_job.total_tables,
            imported_tables: 0,
            failed_tables: Vec::new(),
            error_message: None,
            database_id: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };
        self.write()?.jobs.push(job.clone());
        Ok(job)
    }

    async fn get(&self, id: JobId) -> Result<Option<ImportJob>, StoreError> {
        Ok(self.read()?.jobs.iter().find(|job| job.id == id).cloned())
    }

    async fn list_active(&self, user_id: &str) -> Result<Vec<ImportJob>, StoreError> {
        let inner = self.read()?;
        let mut active: Vec<ImportJob> = inner
            .jobs
            .iter()
            .rev()
            .filter(|job| job.user_id == user_id && job.is_active())
            .cloned()
            .collect();
        // Stable sort keeps later insertions first among equal timestamps.
        active.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(active)
    }

    async fn update(&self, id: JobId, update: JobUpdate) -> Result<ImportJob, StoreError> {
        let now = self.clock.now();
        let mut inner = self.write()?;
        inner.updates.push((id, update.clone()));
        let job = inner.find_mut(id).ok_or(StoreError::NotFound(id))?;
        if job.is_terminal() {
            tracing::debug!(job_id = %id, status = %job.status, "update on terminal job left untouched");
            return Ok(job.clone());
        }

        if let Some(status) = update.status {
            job.status = status;
        }
        if let Some(imported) = update.imported_tables {
            job.imported_tables = imported.min(job.total_tables);
        }
        if let Some(failed) = update.failed_tables {
            job.failed_tables = failed;
        }
        if let Some(message) = update.error_message {
            job.error_message = Some(message);
        }
        if let Some(database_id) = update.database_id {
            job.database_id = Some(database_id);
        }
        if let Some(completed_at) = update.completed_at {
            job.completed_at = Some(completed_at);
        }
        settle(job, now);
        Ok(job.clone())
    }

    async fn trigger_processing(&self, id: JobId, request: ProcessRequest) -> Result<(), StoreError> {
        let now = self.clock.now();
        let mut inner = self.write()?;
        let job = inner.find_mut(id).ok_or(StoreError::NotFound(id))?;
        if job.status == JobStatus::Pending {
            job.status = JobStatus::InProgress;
            settle(job, now);
        }
        inner.processing.push((id, request));
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
