// crates/types/src/lib.rs
//! Wire types shared by the import job tracker, its stores and the CLI.
//!
//! Field names and status strings match the `/import-jobs` REST resource of
//! the data-dictionary backend.

pub mod job;
pub mod timestamp;
pub mod transfer;

pub use job::{ImportJob, JobId, JobStatus, ParseStatusError, UserId};
pub use transfer::{JobUpdate, NewImportJob, ProcessRequest};
