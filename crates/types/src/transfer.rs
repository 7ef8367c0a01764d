// crates/types/src/transfer.rs
//! Request bodies sent to the Job Store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::job::{JobStatus, UserId};

/// Body of `create`: a new job always starts `pending` with zero progress.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../bindings/"))]
pub struct NewImportJob {
    pub user_id: UserId,
    #[ts(type = "Record<string, unknown>")]
    pub config: serde_json::Value,
    pub total_tables: u32,
}

/// Partial update of a job record. Absent fields are left untouched by the
/// store and omitted from the JSON body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../bindings/"))]
pub struct JobUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imported_tables: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_tables: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub database_id: Option<Uuid>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::timestamp::utc_option"
    )]
    #[ts(type = "string | null")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobUpdate {
    /// The update the tracker sends to cancel a job.
    pub fn cancel(now: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Cancelled),
            completed_at: Some(now),
            ..Self::default()
        }
    }

    /// Mark a job failed with a summary message.
    pub fn fail(message: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            error_message: Some(message.into()),
            completed_at: Some(now),
            ..Self::default()
        }
    }
}

/// Body of the processing trigger: the connection config plus the tables
/// the worker should import.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "codegen", ts(export, export_to = "../../../bindings/"))]
pub struct ProcessRequest {
    #[ts(type = "Record<string, unknown>")]
    pub config: serde_json::Value,
    pub selected_tables: Vec<String>,
}
