// crates/jobs/src/tracker/types.rs
//! Types for the job tracker.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use datadict_types::{ImportJob, JobId};

use crate::store::StoreError;

/// Errors returned by [`super::JobTracker`] operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("no signed-in user; sign in before starting an import")]
    Unauthenticated,

    #[error("job store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("job tracker has shut down")]
    TrackerClosed,
}

/// Notification surfaced to the user.
///
/// Sent on a broadcast channel; a receiver that falls behind loses the
/// oldest events rather than slowing the tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrackerEvent {
    /// A job became the tracked job, either freshly started or resumed.
    Adopted { job: ImportJob, resumed: bool },
    /// A poll observed a changed record.
    Progress { job: ImportJob },
    /// The job has not been updated for longer than the stale threshold.
    StaleWarning { job_id: JobId, idle_secs: u64, grace_secs: u64 },
    /// A stale job was updated again; the pending auto-cancel is dropped.
    StaleCleared { job_id: JobId },
    /// The job stayed stale through the grace period and was cancelled.
    AutoCancelled { job_id: JobId },
    Completed { job: ImportJob, summary: String },
    Failed { job: ImportJob, error_message: Option<String> },
    Cancelled { job_id: JobId },
    CancelFailed { job_id: JobId, error: String },
    StartFailed { error: String },
    /// Watching stopped at the polling ceiling; the job was left alone.
    PollingTimedOut { job_id: JobId, watched_secs: u64 },
    /// The session ended; the job keeps running server-side.
    ContinuesInBackground { job_id: JobId },
}

impl TrackerEvent {
    pub fn job_id(&self) -> Option<JobId> {
        match self {
            TrackerEvent::Adopted { job, .. }
            | TrackerEvent::Progress { job }
            | TrackerEvent::Completed { job, .. }
            | TrackerEvent::Failed { job, .. } => Some(job.id),
            TrackerEvent::StaleWarning { job_id, .. }
            | TrackerEvent::StaleCleared { job_id }
            | TrackerEvent::AutoCancelled { job_id }
            | TrackerEvent::Cancelled { job_id }
            | TrackerEvent::CancelFailed { job_id, .. }
            | TrackerEvent::PollingTimedOut { job_id, .. }
            | TrackerEvent::ContinuesInBackground { job_id } => Some(*job_id),
            TrackerEvent::StartFailed { .. } => None,
        }
    }

    /// Whether the tracker stopped watching the job with this event.
    pub fn ends_watch(&self) -> bool {
        matches!(
            self,
            TrackerEvent::Completed { .. }
                | TrackerEvent::Failed { .. }
                | TrackerEvent::Cancelled { .. }
                | TrackerEvent::CancelFailed { .. }
                | TrackerEvent::AutoCancelled { .. }
                | TrackerEvent::PollingTimedOut { .. }
                | TrackerEvent::ContinuesInBackground { .. }
        )
    }

    /// One-line user-facing text.
    pub fn message(&self) -> String {
        match self {
            TrackerEvent::Adopted { job, resumed: true } => {
                format!("Resumed tracking import job {} ({})", job.id, job.summary())
            }
            TrackerEvent::Adopted { job, resumed: false } => format!(
                "Started import job {} for {} tables",
                job.id, job.total_tables
            ),
            TrackerEvent::Progress { job } => job.summary(),
            TrackerEvent::StaleWarning {
                job_id,
                idle_secs,
                grace_secs,
            } => format!(
                "Import job {job_id} has made no progress for {} minutes; it will be cancelled in {} minutes unless it resumes",
                idle_secs / 60,
                grace_secs / 60
            ),
            TrackerEvent::StaleCleared { job_id } => {
                format!("Import job {job_id} is making progress again")
            }
            TrackerEvent::AutoCancelled { job_id } => {
                format!("Import job {job_id} was stuck and has been cancelled automatically")
            }
            TrackerEvent::Completed { summary, .. } => format!("Import completed: {summary}"),
            TrackerEvent::Failed { error_message, .. } => format!(
                "Import failed: {}",
                error_message.as_deref().unwrap_or("unknown error")
            ),
            TrackerEvent::Cancelled { job_id } => format!("Import job {job_id} cancelled"),
            TrackerEvent::CancelFailed { job_id, error } => {
                format!("Could not cancel import job {job_id}: {error}")
            }
            TrackerEvent::StartFailed { error } => format!("Could not start import: {error}"),
            TrackerEvent::PollingTimedOut {
                job_id,
                watched_secs,
            } => format!(
                "Stopped watching import job {job_id} after {} hours; it may still be running",
                watched_secs / 3600
            ),
            TrackerEvent::ContinuesInBackground { job_id } => {
                format!("Signed out; import job {job_id} continues in the background")
            }
        }
    }
}

/// UI-facing tracker state.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerSnapshot {
    /// Last known record of the tracked job.
    pub job: Option<ImportJob>,
    pub polling: bool,
    pub stale: bool,
    /// When the tracker adopted the job; `None` once polling stops.
    pub polling_since: Option<DateTime<Utc>>,
}

pub(crate) type Reply<T> = oneshot::Sender<Result<T, TrackerError>>;

pub(crate) enum Command {
    Resume {
        reply: Reply<Option<ImportJob>>,
    },
    Start {
        config: serde_json::Value,
        unit_names: Vec<String>,
        reply: Reply<JobId>,
    },
    Cancel {
        job_id: JobId,
        reply: Reply<()>,
    },
    Shutdown,
}
