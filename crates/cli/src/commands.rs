// crates/cli/src/commands.rs
//! Subcommand handlers.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast::{self, error::RecvError};
use uuid::Uuid;

use datadict_client::{ClientConfig, HttpJobStore};
use datadict_jobs::{
    JobId, JobStore, JobTracker, SessionIdentity, TrackerConfig, TrackerError, TrackerEvent,
};

use crate::cli::{Cli, Commands, USER_ENV};
use crate::input::load_import_request;
use crate::output::{Outcome, Reporter};

/// Everything a command needs, built once from flags and environment.
pub struct App {
    pub store: Arc<dyn JobStore>,
    pub user: Option<String>,
    pub tracker_config: TrackerConfig,
    pub reporter: Reporter,
}

impl App {
    pub fn from_cli(cli: &Cli) -> Result<Self> {
        let mut client_config =
            ClientConfig::from_env().context("invalid HTTP client configuration")?;
        client_config.base_url = ClientConfig::new(cli.api_url.as_str()).base_url;
        client_config.api_token = cli.token.clone().filter(|t| !t.is_empty());

        let store = HttpJobStore::new(client_config).context("failed to set up HTTP client")?;
        let tracker_config = TrackerConfig::from_env().context("invalid tracker configuration")?;

        Ok(Self {
            store: Arc::new(store),
            user: cli.user.clone().filter(|u| !u.trim().is_empty()),
            tracker_config,
            reporter: Reporter::new(cli.json),
        })
    }

    /// Spawn a tracker along with a receiver that already sees its first
    /// events.
    fn spawn_tracker(&self) -> (JobTracker, broadcast::Receiver<TrackerEvent>) {
        JobTracker::spawn(
            self.store.clone(),
            Arc::new(SessionIdentity::new(self.user.clone())),
            self.tracker_config.clone(),
        )
    }

    fn require_user(&self) -> Option<&str> {
        if self.user.is_none() {
            eprintln!("error: no user given; pass --user or set {USER_ENV}");
        }
        self.user.as_deref()
    }
}

pub async fn run(cli: Cli) -> Result<Outcome> {
    let mut ctx = match App::from_cli(&cli) {
        Ok(ctx) => ctx,
        Err(e) => return Ok(usage_error(e)),
    };
    match cli.command {
        Commands::Start { config, tables } => {
            let request = match load_import_request(&config, tables) {
                Ok(request) => request,
                Err(e) => return Ok(usage_error(e)),
            };
            if ctx.require_user().is_none() {
                return Ok(Outcome::Usage);
            }
            start(&mut ctx, request.config, request.tables).await
        }
        Commands::Watch => {
            if ctx.require_user().is_none() {
                return Ok(Outcome::Usage);
            }
            watch(&mut ctx).await
        }
        Commands::Status { job_id } => status(&ctx, job_id).await,
        Commands::List => {
            let Some(user) = ctx.require_user() else {
                return Ok(Outcome::Usage);
            };
            let jobs = ctx
                .store
                .list_active(user)
                .await
                .context("failed to list import jobs")?;
            ctx.reporter.jobs(&jobs);
            Ok(Outcome::Success)
        }
        Commands::Cancel { job_id } => cancel(&mut ctx, job_id).await,
    }
}

fn usage_error(e: anyhow::Error) -> Outcome {
    eprintln!("error: {e:#}");
    Outcome::Usage
}

async fn start(ctx: &mut App, config: serde_json::Value, tables: Vec<String>) -> Result<Outcome> {
    let (tracker, mut events) = ctx.spawn_tracker();

    let job_id = match tracker.start_job(config, tables).await {
        Ok(job_id) => job_id,
        Err(TrackerError::Unauthenticated) => return Ok(Outcome::Usage),
        Err(e) => return Err(e).context("failed to start import job"),
    };
    let outcome = follow(ctx, &tracker, &mut events, job_id).await;
    tracker.shutdown().await;
    outcome
}

async fn watch(ctx: &mut App) -> Result<Outcome> {
    let (tracker, mut events) = ctx.spawn_tracker();

    let resumed = tracker
        .resume_active_job()
        .await
        .context("failed to look up the active import job")?;
    let outcome = match resumed {
        Some(job) => follow(ctx, &tracker, &mut events, job.id).await,
        None => {
            ctx.reporter.message("no active import job");
            Ok(Outcome::Success)
        }
    };
    tracker.shutdown().await;
    outcome
}

/// Render events for `job_id` until the tracker stops watching it or the
/// user interrupts.
async fn follow(
    ctx: &mut App,
    tracker: &JobTracker,
    events: &mut broadcast::Receiver<TrackerEvent>,
    job_id: JobId,
) -> Result<Outcome> {
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) if event.job_id() == Some(job_id) => {
                    ctx.reporter.event(&event);
                    if event.ends_watch() {
                        return Ok(Outcome::of(&event));
                    }
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "event receiver lagged");
                }
                Err(RecvError::Closed) => anyhow::bail!("job tracker stopped unexpectedly"),
            },
            _ = tokio::signal::ctrl_c() => {
                ctx.reporter.detach(tracker.snapshot().job.as_ref());
                return Ok(Outcome::Success);
            }
        }
    }
}

async fn status(ctx: &App, job_id: Uuid) -> Result<Outcome> {
    match ctx
        .store
        .get(job_id)
        .await
        .with_context(|| format!("failed to fetch import job {job_id}"))?
    {
        Some(job) => {
            ctx.reporter.job(&job);
            Ok(Outcome::Success)
        }
        None => anyhow::bail!("import job {job_id} not found"),
    }
}

async fn cancel(ctx: &mut App, job_id: Uuid) -> Result<Outcome> {
    let (tracker, mut events) = ctx.spawn_tracker();
    let result = tracker.cancel_job(job_id).await;

    let mut reported = false;
    while let Ok(event) = events.try_recv() {
        if matches!(
            event,
            TrackerEvent::Cancelled { .. } | TrackerEvent::CancelFailed { .. }
        ) && event.job_id() == Some(job_id)
        {
            ctx.reporter.event(&event);
            reported = true;
        }
    }
    tracker.shutdown().await;

    result.with_context(|| format!("failed to cancel import job {job_id}"))?;
    if !reported {
        ctx.reporter
            .message(&format!("import job {job_id} already finished; nothing to cancel"));
    }
    Ok(Outcome::Success)
}
