// crates/jobs/src/tracker/mod.rs
//! Client-side tracker for one import job at a time.
//!
//! Provides:
//! - `JobTracker`: cloneable handle: start, resume, cancel, observe
//! - `TrackerEvent`: user-facing notifications (broadcast)
//! - `TrackerSnapshot`: UI-facing state (watch)
//!
//! The tracker polls the store on a fixed interval, raises a single stale
//! warning when `updated_at` stops moving, and auto-cancels the job if it is
//! still stale when the grace period runs out. Losing the session only stops
//! local watching; the job keeps running server-side.

mod runner;
mod state;
pub mod types;

pub use types::{TrackerError, TrackerEvent, TrackerSnapshot};

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch};

use datadict_types::{ImportJob, JobId};

use crate::clock::{Clock, SystemClock};
use crate::config::TrackerConfig;
use crate::identity::IdentityProvider;
use crate::store::JobStore;
use runner::TrackerRunner;
use types::Command;

/// Handle to a running tracker task.
///
/// Every clone talks to the same task. The task stops on [`JobTracker::shutdown`]
/// or when the last handle is dropped; all of its timers go with it.
#[derive(Clone)]
pub struct JobTracker {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<TrackerEvent>,
    snapshot: watch::Receiver<TrackerSnapshot>,
}

impl JobTracker {
    /// Spawn a tracker using the system clock. Must be called inside a
    /// tokio runtime.
    ///
    /// The task immediately resumes the signed-in user's active job, if any.
    /// The returned receiver is subscribed before the task starts, so it sees
    /// that adoption on any runtime flavor.
    pub fn spawn(
        store: Arc<dyn JobStore>,
        identity: Arc<dyn IdentityProvider>,
        config: TrackerConfig,
    ) -> (Self, broadcast::Receiver<TrackerEvent>) {
        Self::spawn_with_clock(store, identity, Arc::new(SystemClock), config)
    }

    pub fn spawn_with_clock(
        store: Arc<dyn JobStore>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        config: TrackerConfig,
    ) -> (Self, broadcast::Receiver<TrackerEvent>) {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (events, first_rx) = broadcast::channel(256);
        let (snapshot_tx, snapshot_rx) = watch::channel(TrackerSnapshot::default());

        let runner = TrackerRunner::new(
            store,
            identity,
            clock,
            config,
            events.clone(),
            snapshot_tx,
        );
        tokio::spawn(runner.run(commands_rx));

        let tracker = Self {
            commands: commands_tx,
            events,
            snapshot: snapshot_rx,
        };
        (tracker, first_rx)
    }

    /// Adopt the signed-in user's newest active job, if there is one.
    ///
    /// Returns the adopted job; `Ok(None)` when there is no identity or no
    /// active job, in which case nothing changes.
    pub async fn resume_active_job(&self) -> Result<Option<ImportJob>, TrackerError> {
        self.request(|reply| Command::Resume { reply }).await
    }

    /// Create a job for `unit_names`, trigger processing and start watching
    /// it. Replaces whatever job was tracked before.
    pub async fn start_job(
        &self,
        config: serde_json::Value,
        unit_names: Vec<String>,
    ) -> Result<JobId, TrackerError> {
        self.request(|reply| Command::Start {
            config,
            unit_names,
            reply,
        })
        .await
    }

    /// Cancel any job by id. Stops local watching at once if it is the
    /// job being polled, even when the store call fails. A finished job's
    /// retained record is kept.
    pub async fn cancel_job(&self, job_id: JobId) -> Result<(), TrackerError> {
        self.request(|reply| Command::Cancel { job_id, reply }).await
    }

    /// Current UI-facing state.
    pub fn snapshot(&self) -> TrackerSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn watch(&self) -> watch::Receiver<TrackerSnapshot> {
        self.snapshot.clone()
    }

    /// Subscribe to notifications from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
        self.events.subscribe()
    }

    /// Stop the tracker task. The tracked job is left as it is in the store.
    pub async fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown).await;
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<Result<T, TrackerError>>) -> Command,
    ) -> Result<T, TrackerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| TrackerError::TrackerClosed)?;
        reply_rx.await.map_err(|_| TrackerError::TrackerClosed)?
    }
}
