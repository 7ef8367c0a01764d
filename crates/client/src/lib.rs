// crates/client/src/lib.rs
//! HTTP access to the backend's `/import-jobs` resource.
//!
//! [`HttpJobStore`] implements [`datadict_jobs::JobStore`] so the tracker can
//! run against the real backend; [`ClientConfig`] says where it lives.

pub mod config;
pub mod http;

pub use config::{ClientConfig, ClientError};
pub use http::HttpJobStore;
