// crates/jobs/src/tracker/runner.rs
//! The tracker task: one `select!` loop that owns every piece of state.
//!
//! Commands, identity changes and the three deadlines (poll, grace,
//! ceiling) are handled one at a time, and store calls are awaited inside
//! the handler, so polls never overlap and transitions apply in
//! poll-response order.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};

use datadict_types::{ImportJob, JobId, JobStatus, JobUpdate, NewImportJob, ProcessRequest, UserId};

use super::state::{Observation, StaleChange, TrackedJob};
use super::types::{Command, TrackerError, TrackerEvent, TrackerSnapshot};
use crate::clock::Clock;
use crate::config::TrackerConfig;
use crate::identity::IdentityProvider;
use crate::store::JobStore;
use crate::timer::Deadline;

pub(crate) struct TrackerRunner {
    store: Arc<dyn JobStore>,
    identity: Arc<dyn IdentityProvider>,
    clock: Arc<dyn Clock>,
    config: TrackerConfig,
    slot: Option<TrackedJob>,
    poll_timer: Deadline,
    grace_timer: Deadline,
    ceiling_timer: Deadline,
    events: broadcast::Sender<TrackerEvent>,
    snapshot: watch::Sender<TrackerSnapshot>,
}

impl TrackerRunner {
    pub fn new(
        store: Arc<dyn JobStore>,
        identity: Arc<dyn IdentityProvider>,
        clock: Arc<dyn Clock>,
        config: TrackerConfig,
        events: broadcast::Sender<TrackerEvent>,
        snapshot: watch::Sender<TrackerSnapshot>,
    ) -> Self {
        Self {
            store,
            identity,
            clock,
            config,
            slot: None,
            poll_timer: Deadline::disarmed(),
            grace_timer: Deadline::disarmed(),
            ceiling_timer: Deadline::disarmed(),
            events,
            snapshot,
        }
    }

    pub async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let mut identity_rx = self.identity.subscribe();
        let mut identity_open = true;

        if let Err(e) = self.resume().await {
            tracing::warn!(store = self.store.name(), error = %e, "initial job resume failed");
        }

        loop {
            tokio::select! {
                cmd = commands.recv() => match cmd {
                    Some(Command::Shutdown) | None => break,
                    Some(cmd) => self.handle_command(cmd).await,
                },
                changed = identity_rx.changed(), if identity_open => match changed {
                    Ok(()) => {
                        let user = identity_rx.borrow_and_update().clone();
                        self.on_identity_changed(user).await;
                    }
                    Err(_) => identity_open = false,
                },
                _ = self.poll_timer.expired() => self.poll_once().await,
                _ = self.grace_timer.expired() => self.on_grace_expired().await,
                _ = self.ceiling_timer.expired() => self.on_ceiling_reached(),
            }
        }

        self.clear_timers();
        tracing::debug!("job tracker stopped");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Resume { reply } => {
                let _ = reply.send(self.resume().await);
            }
            Command::Start {
                config,
                unit_names,
                reply,
            } => {
                let _ = reply.send(self.start(config, unit_names).await);
            }
            Command::Cancel { job_id, reply } => {
                let _ = reply.send(self.cancel(job_id, false).await);
            }
            Command::Shutdown => {}
        }
    }

    // -- Operations -----------------------------------------------------------

    async fn resume(&mut self) -> Result<Option<ImportJob>, TrackerError> {
        let Some(user_id) = self.identity.current() else {
            tracing::debug!("no session identity; nothing to resume");
            return Ok(None);
        };

        let jobs = self.store.list_active(&user_id).await.map_err(|e| {
            tracing::warn!(user_id = %user_id, error = %e, "failed to list active import jobs");
            e
        })?;
        let Some(job) = jobs
            .into_iter()
            .filter(ImportJob::is_active)
            .max_by_key(|job| job.created_at)
        else {
            tracing::debug!(user_id = %user_id, "no active import job to resume");
            return Ok(None);
        };

        if self.polling_job_id() == Some(job.id) {
            tracing::debug!(job_id = %job.id, "job already tracked; refreshing");
            self.apply(job.clone());
            return Ok(Some(job));
        }

        tracing::info!(job_id = %job.id, user_id = %user_id, "resuming import job");
        self.adopt(job.clone(), true);
        Ok(Some(job))
    }

    async fn start(
        &mut self,
        config: serde_json::Value,
        unit_names: Vec<String>,
    ) -> Result<JobId, TrackerError> {
        let Some(user_id) = self.identity.current() else {
            tracing::warn!("refusing to start import job without a session identity");
            self.emit(TrackerEvent::StartFailed {
                error: TrackerError::Unauthenticated.to_string(),
            });
            return Err(TrackerError::Unauthenticated);
        };

        let new_job = NewImportJob {
            user_id: user_id.clone(),
            config: config.clone(),
            total_tables: u32::try_from(unit_names.len()).unwrap_or(u32::MAX),
        };
        let job = match self.store.create(new_job).await {
            Ok(job) => job,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "failed to create import job");
                self.emit(TrackerEvent::StartFailed {
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let request = ProcessRequest {
            config,
            selected_tables: unit_names,
        };
        if let Err(e) = self.store.trigger_processing(job.id, request).await {
            tracing::error!(job_id = %job.id, error = %e, "failed to trigger import processing");
            let update = JobUpdate::fail(
                format!("Failed to start processing: {e}"),
                self.clock.now(),
            );
            if let Err(mark_err) = self.store.update(job.id, update).await {
                tracing::warn!(job_id = %job.id, error = %mark_err, "failed to mark unstarted job as failed");
            }
            self.emit(TrackerEvent::StartFailed {
                error: e.to_string(),
            });
            return Err(e.into());
        }

        tracing::info!(
            job_id = %job.id,
            user_id = %user_id,
            total_tables = job.total_tables,
            "import job started"
        );
        let job_id = job.id;
        self.adopt(job, false);
        Ok(job_id)
    }

    /// Cancel `job_id` in the store. If it is the job being polled, local
    /// tracking stops first, whatever the store says. A retained final
    /// record is left alone.
    async fn cancel(&mut self, job_id: JobId, auto: bool) -> Result<(), TrackerError> {
        if self.polling_job_id() == Some(job_id) {
            self.slot = None;
            self.clear_timers();
            self.publish();
        }

        match self
            .store
            .update(job_id, JobUpdate::cancel(self.clock.now()))
            .await
        {
            Ok(job) if job.status == JobStatus::Cancelled => {
                tracing::info!(job_id = %job_id, auto, "import job cancelled");
                self.emit(if auto {
                    TrackerEvent::AutoCancelled { job_id }
                } else {
                    TrackerEvent::Cancelled { job_id }
                });
                Ok(())
            }
            Ok(job) => {
                tracing::info!(
                    job_id = %job_id,
                    status = %job.status,
                    auto,
                    "store kept import job status; cancel had no effect"
                );
                Ok(())
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, auto, "failed to cancel import job");
                self.emit(TrackerEvent::CancelFailed {
                    job_id,
                    error: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    // -- Timers ---------------------------------------------------------------

    async fn poll_once(&mut self) {
        let Some(job_id) = self.polling_job_id() else {
            self.poll_timer.disarm();
            return;
        };

        match self.store.get(job_id).await {
            Ok(Some(job)) => self.apply(job),
            Ok(None) => tracing::warn!(job_id = %job_id, "tracked import job not found; skipping poll"),
            Err(e) => tracing::warn!(
                job_id = %job_id,
                error = %e,
                transient = e.is_transient(),
                "import job poll failed; will retry"
            ),
        }

        if self.polling_job_id() == Some(job_id) {
            self.poll_timer.arm(self.config.poll_interval);
        }
    }

    async fn on_grace_expired(&mut self) {
        self.grace_timer.disarm();
        let Some(job_id) = self.polling_job_id() else {
            return;
        };

        let fresh = match self.store.get(job_id).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                tracing::warn!(job_id = %job_id, "stale job not found on re-check; retrying");
                self.grace_timer.arm(self.config.poll_interval);
                return;
            }
            Err(e) => {
                tracing::warn!(job_id = %job_id, error = %e, "stale job re-check failed; retrying");
                self.grace_timer.arm(self.config.poll_interval);
                return;
            }
        };
        let fresh_is_stale = fresh.is_stale(self.clock.now(), self.config.stale_threshold);
        self.apply(fresh);

        let still_stale = fresh_is_stale
            && self
                .slot
                .as_ref()
                .is_some_and(|t| t.polling && t.job.id == job_id && t.stale_warned);
        if still_stale {
            tracing::warn!(job_id = %job_id, "import job still stale after grace period; cancelling");
            let _ = self.cancel(job_id, true).await;
        } else {
            tracing::debug!(job_id = %job_id, "grace period ended without auto-cancel");
        }
    }

    fn on_ceiling_reached(&mut self) {
        self.ceiling_timer.disarm();
        let Some(tracked) = self.slot.as_mut() else {
            return;
        };
        if !tracked.polling {
            return;
        }
        tracked.polling = false;
        let job_id = tracked.job.id;
        let watched_secs = tracked.adopted_at.elapsed().as_secs();

        self.clear_timers();
        tracing::warn!(job_id = %job_id, watched_secs, "polling ceiling reached; no longer watching import job");
        self.emit(TrackerEvent::PollingTimedOut {
            job_id,
            watched_secs,
        });
        self.publish();
    }

    async fn on_identity_changed(&mut self, user: Option<UserId>) {
        let owner_changed = self
            .slot
            .as_ref()
            .is_some_and(|t| Some(&t.job.user_id) != user.as_ref());
        if owner_changed {
            self.forget();
        }

        match user {
            Some(user_id) if self.slot.is_none() => {
                tracing::info!(user_id = %user_id, "session identity available; resuming");
                if let Err(e) = self.resume().await {
                    tracing::warn!(error = %e, "job resume after sign-in failed");
                }
            }
            _ => {}
        }
    }

    // -- State transitions ----------------------------------------------------

    fn adopt(&mut self, job: ImportJob, resumed: bool) {
        if let Some(previous) = &self.slot {
            if previous.polling && previous.job.id != job.id {
                tracing::warn!(
                    previous_job_id = %previous.job.id,
                    job_id = %job.id,
                    "replacing a tracked import job that is still active"
                );
            }
        }

        let mut tracked = TrackedJob::new(job, self.clock.now());
        let stale = tracked.check_stale(self.clock.now(), self.config.stale_threshold);
        let idle_secs = tracked.job.idle_for(self.clock.now()).as_secs();
        let job_id = tracked.job.id;
        let adopted = tracked.job.clone();
        self.slot = Some(tracked);

        self.clear_timers();
        self.poll_timer.arm(self.config.poll_interval);
        self.ceiling_timer.arm(self.config.max_polling_duration);
        self.emit(TrackerEvent::Adopted {
            job: adopted,
            resumed,
        });

        if stale == StaleChange::Raised {
            self.raise_stale_warning(job_id, idle_secs);
        }
        self.publish();
    }

    /// Apply a fetched record to the tracked job.
    fn apply(&mut self, fresh: ImportJob) {
        let now = self.clock.now();
        let threshold = self.config.stale_threshold;
        let Some(tracked) = self.slot.as_mut() else {
            return;
        };
        let job_id = tracked.job.id;
        let observation = tracked.observe(fresh, now, threshold);
        let job = tracked.job.clone();

        match observation {
            Observation::Ignored(reason) => {
                tracing::debug!(job_id = %job_id, reason, "ignoring job observation");
                return;
            }
            Observation::Active { changed, stale } => {
                if changed {
                    tracing::debug!(
                        job_id = %job_id,
                        status = %job.status,
                        imported = job.imported_tables,
                        failed = job.failed_tables.len(),
                        "import job progressed"
                    );
                    self.emit(TrackerEvent::Progress { job: job.clone() });
                }
                match stale {
                    StaleChange::Raised => {
                        self.raise_stale_warning(job_id, job.idle_for(now).as_secs());
                    }
                    StaleChange::Cleared => {
                        tracing::info!(job_id = %job_id, "import job resumed progress");
                        self.grace_timer.disarm();
                        self.emit(TrackerEvent::StaleCleared { job_id });
                    }
                    StaleChange::Unchanged => {}
                }
            }
            Observation::Terminal => self.finish(job),
        }
        self.publish();
    }

    fn raise_stale_warning(&mut self, job_id: JobId, idle_secs: u64) {
        tracing::warn!(
            job_id = %job_id,
            idle_secs,
            grace_secs = self.config.grace_period.as_secs(),
            "import job appears stuck"
        );
        self.grace_timer.arm(self.config.grace_period);
        self.emit(TrackerEvent::StaleWarning {
            job_id,
            idle_secs,
            grace_secs: self.config.grace_period.as_secs(),
        });
    }

    /// Terminal transition: stop watching, keep the final record.
    fn finish(&mut self, job: ImportJob) {
        if let Some(tracked) = self.slot.as_mut() {
            tracked.polling = false;
        }
        self.clear_timers();

        match job.status {
            JobStatus::Completed => {
                tracing::info!(
                    job_id = %job.id,
                    imported = job.imported_tables,
                    total = job.total_tables,
                    failed = job.failed_tables.len(),
                    "import job completed"
                );
                let summary = job.summary();
                self.emit(TrackerEvent::Completed { job, summary });
            }
            JobStatus::Failed => {
                tracing::warn!(job_id = %job.id, error = ?job.error_message, "import job failed");
                let error_message = job.error_message.clone();
                self.emit(TrackerEvent::Failed { job, error_message });
            }
            JobStatus::Cancelled => {
                tracing::info!(job_id = %job.id, "import job was cancelled");
                self.emit(TrackerEvent::Cancelled { job_id: job.id });
            }
            JobStatus::Pending | JobStatus::InProgress => {}
        }
    }

    /// Drop the tracked job without touching the store.
    fn forget(&mut self) {
        let Some(tracked) = self.slot.take() else {
            return;
        };
        self.clear_timers();
        if tracked.polling {
            tracing::info!(job_id = %tracked.job.id, "session ended; import job continues in background");
            self.emit(TrackerEvent::ContinuesInBackground {
                job_id: tracked.job.id,
            });
        }
        self.publish();
    }

    // -- Helpers --------------------------------------------------------------

    fn polling_job_id(&self) -> Option<JobId> {
        self.slot
            .as_ref()
            .filter(|t| t.polling)
            .map(|t| t.job.id)
    }

    fn clear_timers(&mut self) {
        self.poll_timer.disarm();
        self.grace_timer.disarm();
        self.ceiling_timer.disarm();
    }

    fn emit(&self, event: TrackerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        let snapshot = match &self.slot {
            Some(tracked) => TrackerSnapshot {
                job: Some(tracked.job.clone()),
                polling: tracked.polling,
                stale: tracked.stale_warned,
                polling_since: tracked.polling.then_some(tracked.polling_since),
            },
            None => TrackerSnapshot::default(),
        };
        self.snapshot.send_replace(snapshot);
    }
}
