// crates/jobs/tests/tracker_lifecycle.rs
mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio::time::sleep;

use common::{count, drain, settle, tables, Harness};
use datadict_jobs::{
    Clock, ImportJob, JobId, JobStatus, JobStore, JobTracker, JobUpdate, MemoryJobStore, NewImportJob,
    ProcessRequest, StoreError, TrackerConfig, TrackerError, TrackerEvent, TrackerSnapshot,
};

#[tokio::test(start_paused = true)]
async fn test_end_to_end_import() {
    let h = Harness::new(Some("alice"));
    let (tracker, mut events) = h.spawn();

    let config = serde_json::json!({"type": "postgres", "database": "sales"});
    let started_at = h.clock.now();
    let job_id = tracker
        .start_job(config.clone(), tables(&["t1", "t2", "t3"]))
        .await
        .unwrap();

    let adopted = drain(&mut events);
    match adopted.as_slice() {
        [TrackerEvent::Adopted { job, resumed: false }] => {
            assert_eq!(job.id, job_id);
            assert_eq!(job.total_tables, 3);
            assert_eq!(job.status, JobStatus::Pending);
        }
        other => panic!("unexpected events: {other:?}"),
    }
    assert_eq!(
        h.store.processing_requests(),
        vec![(
            job_id,
            ProcessRequest {
                config,
                selected_tables: tables(&["t1", "t2", "t3"]),
            }
        )]
    );

    // Poll 1 at t=2s.
    sleep(Duration::from_secs(1)).await;
    h.store.record_imported(job_id);
    sleep(Duration::from_secs(2)).await;
    let snap = tracker.snapshot();
    assert!(snap.polling);
    assert_eq!(snap.polling_since, Some(started_at));
    assert_eq!(snap.job.as_ref().unwrap().status, JobStatus::InProgress);
    assert_eq!(snap.job.as_ref().unwrap().imported_tables, 1);

    // Poll 2 at t=4s.
    h.store.record_imported(job_id);
    h.store.record_failed(job_id, "t2");
    sleep(Duration::from_secs(2)).await;
    let snap = tracker.snapshot();
    assert_eq!(snap.job.as_ref().unwrap().imported_tables, 2);
    assert_eq!(snap.job.as_ref().unwrap().failed_tables, tables(&["t2"]));

    // Poll 3 at t=6s.
    h.store.record_imported(job_id);
    h.store.finish(job_id, JobStatus::Completed, None);
    sleep(Duration::from_secs(2)).await;

    let received = drain(&mut events);
    let progress: Vec<u32> = received
        .iter()
        .filter_map(|event| match event {
            TrackerEvent::Progress { job } => Some(job.imported_tables),
            _ => None,
        })
        .collect();
    assert_eq!(progress, vec![1, 2]);

    let summary = received.iter().find_map(|event| match event {
        TrackerEvent::Completed { summary, .. } => Some(summary.clone()),
        _ => None,
    });
    assert_eq!(summary.as_deref(), Some("Imported 3/3 tables with 1 failed"));

    let snap = tracker.snapshot();
    assert!(!snap.polling);
    assert_eq!(snap.polling_since, None);
    assert_eq!(snap.job.as_ref().unwrap().status, JobStatus::Completed);

    // Nothing more happens once the job is terminal.
    sleep(Duration::from_secs(60)).await;
    assert!(drain(&mut events).is_empty());
    assert_eq!(tracker.snapshot(), snap);
}

#[tokio::test(start_paused = true)]
async fn test_start_requires_identity() {
    let h = Harness::new(None);
    let (tracker, mut events) = h.spawn();

    let err = tracker
        .start_job(serde_json::json!({}), tables(&["t1"]))
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::Unauthenticated));
    assert!(h.store.processing_requests().is_empty());
    assert!(h.store.update_log().is_empty());
    assert_eq!(
        count(&drain(&mut events), |e| matches!(e, TrackerEvent::StartFailed { .. })),
        1
    );
    assert_eq!(tracker.snapshot(), TrackerSnapshot::default());
}

#[tokio::test(start_paused = true)]
async fn test_start_with_store_offline_fails() {
    let h = Harness::new(Some("alice"));
    let (tracker, mut events) = h.spawn();
    settle().await;
    h.store.set_available(false);

    let err = tracker
        .start_job(serde_json::json!({}), tables(&["t1"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TrackerError::StoreUnavailable(StoreError::Unavailable(_))
    ));
    assert!(matches!(
        drain(&mut events).as_slice(),
        [TrackerEvent::StartFailed { .. }]
    ));
    assert!(tracker.snapshot().job.is_none());
}

/// Store whose processing trigger is always refused.
struct NoWorkerStore(MemoryJobStore);

#[async_trait]
impl JobStore for NoWorkerStore {
    async fn create(&self, job: NewImportJob) -> Result<ImportJob, StoreError> {
        self.0.create(job).await
    }

    async fn get(&self, id: JobId) -> Result<Option<ImportJob>, StoreError> {
        self.0.get(id).await
    }

    async fn list_active(&self, user_id: &str) -> Result<Vec<ImportJob>, StoreError> {
        self.0.list_active(user_id).await
    }

    async fn update(&self, id: JobId, update: JobUpdate) -> Result<ImportJob, StoreError> {
        self.0.update(id, update).await
    }

    async fn trigger_processing(&self, _id: JobId, _request: ProcessRequest) -> Result<(), StoreError> {
        Err(StoreError::Rejected {
            status: 503,
            message: "worker pool exhausted".into(),
        })
    }

    fn name(&self) -> &str {
        "no-worker"
    }
}

#[tokio::test(start_paused = true)]
async fn test_trigger_failure_marks_job_failed() {
    let store = Arc::new(NoWorkerStore(MemoryJobStore::new()));
    let identity = Arc::new(datadict_jobs::SessionIdentity::signed_in("alice"));
    let (tracker, _events) = JobTracker::spawn(store.clone(), identity, TrackerConfig::default());

    let err = tracker
        .start_job(serde_json::json!({}), tables(&["t1", "t2"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TrackerError::StoreUnavailable(StoreError::Rejected { status: 503, .. })
    ));

    let log = store.0.update_log();
    assert_eq!(log.len(), 1);
    let failed = store.0.job(log[0].0).unwrap();
    assert_eq!(failed.status, JobStatus::Failed);
    assert!(failed
        .error_message
        .unwrap()
        .contains("worker pool exhausted"));
    assert!(failed.completed_at.is_some());
    assert!(tracker.snapshot().job.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_explicit_cancel_stops_tracking() {
    let h = Harness::new(Some("alice"));
    let (tracker, mut events) = h.spawn();
    let job_id = tracker
        .start_job(serde_json::json!({}), tables(&["t1", "t2"]))
        .await
        .unwrap();

    tracker.cancel_job(job_id).await.unwrap();

    assert_eq!(tracker.snapshot(), TrackerSnapshot::default());
    let job = h.store.job(job_id).unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.completed_at.is_some());
    let events = drain(&mut events);
    assert!(matches!(events.last(), Some(TrackerEvent::Cancelled { job_id: id }) if *id == job_id));

    // Cancelling again still reaches the store and changes nothing.
    tracker.cancel_job(job_id).await.unwrap();
    assert_eq!(h.store.update_log().len(), 2);
    assert_eq!(h.store.job(job_id).unwrap(), job);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_after_completion_keeps_final_record() {
    let h = Harness::new(Some("alice"));
    let (tracker, mut events) = h.spawn();
    let job_id = tracker
        .start_job(serde_json::json!({}), tables(&["t1"]))
        .await
        .unwrap();
    h.store.record_imported(job_id);
    h.store.finish(job_id, JobStatus::Completed, None);
    sleep(Duration::from_secs(3)).await;
    let finished = tracker.snapshot();
    assert_eq!(finished.job.as_ref().unwrap().status, JobStatus::Completed);
    drain(&mut events);

    tracker.cancel_job(job_id).await.unwrap();

    assert_eq!(tracker.snapshot(), finished);
    assert_eq!(h.store.job(job_id).unwrap().status, JobStatus::Completed);
    assert_eq!(h.store.update_log().len(), 1);
    let events = drain(&mut events);
    assert_eq!(
        count(&events, |e| matches!(e, TrackerEvent::Cancelled { .. })),
        0
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancel_other_job_keeps_tracking() {
    let h = Harness::new(Some("alice"));
    let other = h.seed_job("bob", Duration::from_secs(30));
    let (tracker, _events) = h.spawn();
    let job_id = tracker
        .start_job(serde_json::json!({}), tables(&["t1"]))
        .await
        .unwrap();

    tracker.cancel_job(other.id).await.unwrap();

    assert_eq!(h.store.job(other.id).unwrap().status, JobStatus::Cancelled);
    let snap = tracker.snapshot();
    assert!(snap.polling);
    assert_eq!(snap.job.unwrap().id, job_id);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_failure_still_stops_local_tracking() {
    let h = Harness::new(Some("alice"));
    let (tracker, mut events) = h.spawn();
    let job_id = tracker
        .start_job(serde_json::json!({}), tables(&["t1"]))
        .await
        .unwrap();
    h.store.set_available(false);

    let err = tracker.cancel_job(job_id).await.unwrap_err();
    assert!(matches!(err, TrackerError::StoreUnavailable(_)));
    assert_eq!(tracker.snapshot(), TrackerSnapshot::default());
    assert!(matches!(
        drain(&mut events).last(),
        Some(TrackerEvent::CancelFailed { .. })
    ));

    h.store.set_available(true);
    assert_eq!(h.store.job(job_id).unwrap().status, JobStatus::InProgress);
}

#[tokio::test(start_paused = true)]
async fn test_poll_failures_do_not_change_state() {
    let h = Harness::new(Some("alice"));
    let (tracker, mut events) = h.spawn();
    let job_id = tracker
        .start_job(serde_json::json!({}), tables(&["t1"]))
        .await
        .unwrap();
    drain(&mut events);
    let before = tracker.snapshot();

    h.store.set_available(false);
    h.store.record_imported(job_id);
    sleep(Duration::from_secs(30)).await;
    assert_eq!(tracker.snapshot(), before);
    assert!(drain(&mut events).is_empty());

    h.store.set_available(true);
    h.store.finish(job_id, JobStatus::Completed, None);
    sleep(Duration::from_secs(3)).await;
    assert!(matches!(
        drain(&mut events).last(),
        Some(TrackerEvent::Completed { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn test_failed_job_surfaces_error_message() {
    let h = Harness::new(Some("alice"));
    let (tracker, mut events) = h.spawn();
    let job_id = tracker
        .start_job(serde_json::json!({}), tables(&["t1"]))
        .await
        .unwrap();

    h.store.finish(
        job_id,
        JobStatus::Failed,
        Some("Failed to create database: login timeout".into()),
    );
    sleep(Duration::from_secs(3)).await;

    let failed = drain(&mut events).into_iter().find_map(|event| match event {
        TrackerEvent::Failed { error_message, .. } => Some(error_message),
        _ => None,
    });
    assert_eq!(
        failed,
        Some(Some("Failed to create database: login timeout".to_string()))
    );
    assert!(!tracker.snapshot().polling);
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_observed_from_elsewhere() {
    let h = Harness::new(Some("alice"));
    let (tracker, mut events) = h.spawn();
    let job_id = tracker
        .start_job(serde_json::json!({}), tables(&["t1"]))
        .await
        .unwrap();

    h.store.finish(job_id, JobStatus::Cancelled, None);
    sleep(Duration::from_secs(3)).await;

    assert!(matches!(
        drain(&mut events).last(),
        Some(TrackerEvent::Cancelled { .. })
    ));
    let snap = tracker.snapshot();
    assert!(!snap.polling);
    assert_eq!(snap.job.unwrap().status, JobStatus::Cancelled);
    assert!(h.store.update_log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_polling_ceiling_stops_without_cancel() {
    let h = Harness::new(Some("alice")).with_config(TrackerConfig {
        max_polling_duration: Duration::from_secs(60),
        ..TrackerConfig::default()
    });
    let (tracker, mut events) = h.spawn();
    let job_id = tracker
        .start_job(serde_json::json!({}), tables(&["t1", "t2"]))
        .await
        .unwrap();

    sleep(Duration::from_secs(61)).await;

    let events = drain(&mut events);
    assert_eq!(
        count(&events, |e| matches!(e, TrackerEvent::PollingTimedOut { watched_secs: 60, .. })),
        1
    );
    let snap = tracker.snapshot();
    assert!(!snap.polling);
    assert_eq!(snap.job.unwrap().id, job_id);
    assert!(h.store.update_log().is_empty());
    assert_eq!(h.store.job(job_id).unwrap().status, JobStatus::InProgress);
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_ceiling_keeps_tracker_alive() {
    let h = Harness::new(Some("alice")).with_config(TrackerConfig {
        max_polling_duration: Duration::from_secs(u64::MAX),
        ..TrackerConfig::default()
    });
    let (tracker, mut events) = h.spawn();
    let job_id = tracker
        .start_job(serde_json::json!({}), tables(&["t1", "t2"]))
        .await
        .unwrap();

    h.store.record_imported(job_id);
    sleep(Duration::from_secs(3)).await;
    let snap = tracker.snapshot();
    assert!(snap.polling);
    assert_eq!(snap.job.unwrap().imported_tables, 1);

    sleep(Duration::from_secs(60 * 60)).await;
    assert_eq!(
        count(&drain(&mut events), |e| matches!(e, TrackerEvent::PollingTimedOut { .. })),
        0
    );
    tracker.cancel_job(job_id).await.unwrap();
    assert_eq!(h.store.job(job_id).unwrap().status, JobStatus::Cancelled);
}

#[tokio::test(start_paused = true)]
async fn test_start_replaces_tracked_job_without_cancelling_it() {
    let h = Harness::new(Some("alice"));
    let (tracker, _events) = h.spawn();
    let first = tracker
        .start_job(serde_json::json!({}), tables(&["t1"]))
        .await
        .unwrap();
    let second = tracker
        .start_job(serde_json::json!({}), tables(&["t2"]))
        .await
        .unwrap();

    assert_eq!(tracker.snapshot().job.unwrap().id, second);
    assert_eq!(h.store.job(first).unwrap().status, JobStatus::InProgress);
    assert!(h.store.update_log().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_closes_tracker() {
    let h = Harness::new(Some("alice"));
    let (tracker, _events) = h.spawn();
    tracker.shutdown().await;
    settle().await;

    let err = tracker.resume_active_job().await.unwrap_err();
    assert!(matches!(err, TrackerError::TrackerClosed));
}
