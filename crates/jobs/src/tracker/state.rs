// crates/jobs/src/tracker/state.rs
//! State of the single tracked job and how observations change it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use datadict_types::ImportJob;

/// Change to the stale flag caused by one observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StaleChange {
    Unchanged,
    Raised,
    Cleared,
}

/// Result of applying a freshly fetched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Observation {
    /// The record was not applied.
    Ignored(&'static str),
    /// The job is still active.
    Active { changed: bool, stale: StaleChange },
    /// The job reached a terminal status with this observation.
    Terminal,
}

/// The job the tracker currently holds.
#[derive(Debug, Clone)]
pub(crate) struct TrackedJob {
    pub job: ImportJob,
    /// Stale warning raised for the current stale period.
    pub stale_warned: bool,
    pub polling: bool,
    /// Wall-clock adoption time, published in the snapshot.
    pub polling_since: DateTime<Utc>,
    /// Monotonic adoption time, for measuring how long the job was watched.
    pub adopted_at: Instant,
}

impl TrackedJob {
    pub fn new(job: ImportJob, polling_since: DateTime<Utc>) -> Self {
        Self {
            job,
            stale_warned: false,
            polling: true,
            polling_since,
            adopted_at: Instant::now(),
        }
    }

    /// Re-evaluate the stale flag against the held record.
    pub fn check_stale(&mut self, now: DateTime<Utc>, threshold: Duration) -> StaleChange {
        let stale = self.job.is_stale(now, threshold);
        match (stale, self.stale_warned) {
            (true, false) => {
                self.stale_warned = true;
                StaleChange::Raised
            }
            (false, true) => {
                self.stale_warned = false;
                StaleChange::Cleared
            }
            _ => StaleChange::Unchanged,
        }
    }

    /// Apply a record fetched from the store.
    ///
    /// A terminal record is final: later observations are ignored. An active
    /// record that would move `imported_tables` backwards keeps the held
    /// count but is otherwise applied, so its `updated_at` still counts as
    /// liveness.
    pub fn observe(
        &mut self,
        mut fresh: ImportJob,
        now: DateTime<Utc>,
        threshold: Duration,
    ) -> Observation {
        if fresh.id != self.job.id {
            return Observation::Ignored("record belongs to another job");
        }
        if self.job.is_terminal() {
            return Observation::Ignored("job already terminal");
        }
        if fresh.is_active() && fresh.imported_tables < self.job.imported_tables {
            fresh.imported_tables = self.job.imported_tables;
        }

        let changed = fresh != self.job;
        self.job = fresh;

        if self.job.is_terminal() {
            self.stale_warned = false;
            return Observation::Terminal;
        }
        let stale = self.check_stale(now, threshold);
        Observation::Active { changed, stale }
    }
}
