// crates/jobs/src/lib.rs
//! Import job tracking for the data-dictionary importer.
//!
//! Provides:
//! - `JobStore`: the contract of the external store holding job records
//! - `MemoryJobStore`: in-process store for tests and dry runs
//! - `IdentityProvider` / `SessionIdentity`: ambient signed-in user
//! - `JobTracker`: polls one active job, detects stalls, auto-cancels
//!   after a grace period and follows session changes

pub mod clock;
pub mod config;
pub mod identity;
pub mod store;
pub mod timer;
pub mod tracker;

pub use clock::{Clock, SystemClock, TokioClock};
pub use config::{ConfigError, TrackerConfig};
pub use identity::{IdentityProvider, SessionIdentity};
pub use store::{JobStore, MemoryJobStore, StoreError};
pub use tracker::{JobTracker, TrackerError, TrackerEvent, TrackerSnapshot};

pub use datadict_types::{ImportJob, JobId, JobStatus, JobUpdate, NewImportJob, ProcessRequest, UserId};
