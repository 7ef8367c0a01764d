// crates/jobs/tests/common/mod.rs
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast::{self, error::TryRecvError};
use uuid::Uuid;

use datadict_jobs::{
    Clock, ImportJob, JobStatus, JobTracker, MemoryJobStore, SessionIdentity, TokioClock,
    TrackerConfig, TrackerEvent,
};

pub const STALE_THRESHOLD: Duration = Duration::from_secs(2 * 60 * 60);
pub const GRACE_PERIOD: Duration = Duration::from_secs(15 * 60);

pub struct Harness {
    pub store: Arc<MemoryJobStore>,
    pub identity: Arc<SessionIdentity>,
    pub clock: Arc<TokioClock>,
    pub config: TrackerConfig,
}

impl Harness {
    /// Store and identity with nothing tracked yet. Call inside a
    /// paused-time runtime so the clock follows tokio's time.
    pub fn new(user: Option<&str>) -> Self {
        let clock = Arc::new(TokioClock::starting_at(Utc::now()));
        Self {
            store: Arc::new(MemoryJobStore::with_clock(clock.clone())),
            identity: Arc::new(SessionIdentity::new(user.map(str::to_string))),
            clock,
            config: TrackerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn spawn(&self) -> (JobTracker, broadcast::Receiver<TrackerEvent>) {
        JobTracker::spawn_with_clock(
            self.store.clone(),
            self.identity.clone(),
            self.clock.clone(),
            self.config.clone(),
        )
    }

    /// Seed an in-progress job last updated `idle` ago.
    pub fn seed_job(&self, user: &str, idle: Duration) -> ImportJob {
        let updated_at = self.clock.now() - chrono::Duration::from_std(idle).unwrap();
        let job = ImportJob {
            id: Uuid::new_v4(),
            user_id: user.to_string(),
            config: serde_json::json!({"type": "mssql", "database": "sales"}),
            status: JobStatus::InProgress,
            total_tables: 5,
            imported_tables: 2,
            failed_tables: Vec::new(),
            error_message: None,
            database_id: None,
            created_at: updated_at - chrono::Duration::minutes(5),
            updated_at,
            completed_at: None,
        };
        self.store.insert(job.clone());
        job
    }

    /// Seed a job that is already past the stale threshold.
    pub fn seed_stale_job(&self, user: &str) -> ImportJob {
        self.seed_job(user, STALE_THRESHOLD + Duration::from_secs(60))
    }
}

/// Let the tracker task run until it is idle without reaching its next poll.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

pub fn drain(rx: &mut broadcast::Receiver<TrackerEvent>) -> Vec<TrackerEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}

pub fn count<F>(events: &[TrackerEvent], pred: F) -> usize
where
    F: Fn(&TrackerEvent) -> bool,
{
    events.iter().filter(|event| pred(event)).count()
}

pub fn tables(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}
