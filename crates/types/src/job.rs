// crates/types/src/job.rs
//! The import job record as persisted by the Job Store.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use ts_rs::TS;
use uuid::Uuid;

/// Unique identifier of an import job.
pub type JobId = Uuid;

/// Identity of the user owning a job.
pub type UserId = String;

/// Lifecycle state of an import job.
///
/// `Pending` and `InProgress` are active; the other three are terminal and
/// a job never leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../bindings/"))]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Statuses the tracker treats as active, in the order the backend
    /// filter expects them.
    pub const ACTIVE: [JobStatus; 2] = [JobStatus::Pending, JobStatus::InProgress];

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn is_active(self) -> bool {
        !self.is_terminal()
    }

    /// Wire name, e.g. `in_progress`.
    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in_progress",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown job status: {0}")]
pub struct ParseStatusError(pub String);

impl FromStr for JobStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "in_progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// One import run, tracked end-to-end by status and progress counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../bindings/"))]
pub struct ImportJob {
    #[ts(type = "string")]
    pub id: JobId,
    pub user_id: UserId,
    /// Connection parameters, passed through unevaluated.
    #[ts(type = "Record<string, unknown>")]
    pub config: serde_json::Value,
    pub status: JobStatus,
    pub total_tables: u32,
    #[serde(default)]
    pub imported_tables: u32,
    /// Table names that failed to import, in the order they failed.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub failed_tables: Vec<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    #[ts(type = "string | null")]
    pub database_id: Option<Uuid>,
    #[serde(with = "crate::timestamp::utc")]
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    /// Last mutation time; the worker's liveness signal.
    #[serde(with = "crate::timestamp::utc")]
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
    #[serde(default, with = "crate::timestamp::utc_option")]
    #[ts(type = "string | null")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl ImportJob {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Time since the record was last touched. Clock skew that puts
    /// `updated_at` in the future counts as zero.
    pub fn idle_for(&self, now: DateTime<Utc>) -> Duration {
        (now - self.updated_at).to_std().unwrap_or(Duration::ZERO)
    }

    /// Whether an active job has gone without an update for longer than
    /// `threshold`. Terminal jobs are never stale.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        self.is_active() && self.idle_for(now) > threshold
    }

    /// Human-readable progress line, e.g. `Imported 3/3 tables with 1 failed`.
    pub fn summary(&self) -> String {
        let mut line = format!(
            "Imported {}/{} tables",
            self.imported_tables, self.total_tables
        );
        if !self.failed_tables.is_empty() {
            line.push_str(&format!(" with {} failed", self.failed_tables.len()));
        }
        line
    }
}

fn null_as_empty<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(d)?.unwrap_or_default())
}
