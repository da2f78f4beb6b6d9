//! Integration tests for placement submission, monitoring and retrieval.
//!
//! These tests validate that:
//! - monitor never polls without a time budget and never moves a unit's
//!   status backward across repeated calls
//! - transient poll failures do not abort monitoring
//! - retrieve refuses before anything completed and skips units it already
//!   retrieved

mod common;

use common::{CLUSTER, Failure, ScriptedAccessPoint, connect, description};
use placer_core::domain::status::{JobId, JobStatus};
use placer_workflow::{
    MonitorOutcome, Placement, PlacementStore, RetrieveError, StateError, SubmitError,
};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use JobStatus::{Completed, Held, Queued, Running};

const POLL: Duration = Duration::from_millis(20);

async fn submitted(ap: &Arc<ScriptedAccessPoint>, procs: u32) -> Placement {
    let connection = connect(ap).await;
    Placement::submit(&connection, &description(procs), true)
        .await
        .unwrap()
        .with_poll_interval(POLL)
}

#[tokio::test]
async fn test_submit_assigns_one_id_per_unit() {
    let ap = Arc::new(ScriptedAccessPoint::new(3));
    let placement = submitted(&ap, 3).await;

    assert_eq!(placement.cluster(), CLUSTER);
    assert_eq!(
        placement.ids(),
        &[JobId::new(CLUSTER, 0), JobId::new(CLUSTER, 1), JobId::new(CLUSTER, 2)]
    );
    assert!(placement.statuses().values().all(|s| *s == Queued));
    assert_eq!(placement.job_ids_label(), "Placement has job IDs 42.0 - 42.2");
}

#[tokio::test]
async fn test_single_unit_label() {
    let ap = Arc::new(ScriptedAccessPoint::new(1));
    let placement = submitted(&ap, 1).await;
    assert_eq!(placement.job_ids_label(), "Placement has job ID 42");
}

#[tokio::test]
async fn test_submit_rejection() {
    let ap = Arc::new(ScriptedAccessPoint::new(1).fail_submit(Failure::Rejected));
    let connection = connect(&ap).await;

    let err = Placement::submit(&connection, &description(1), true)
        .await
        .unwrap_err();
    assert!(matches!(err, SubmitError::SubmitFailed { .. }));
}

#[tokio::test]
async fn test_monitor_without_budget_does_not_poll() {
    let ap = Arc::new(ScriptedAccessPoint::new(1));
    ap.push_polls([Ok(vec![Completed])]);
    let mut placement = submitted(&ap, 1).await;

    for minutes in [0.0, -1.0, f64::NAN] {
        let outcome = placement.monitor(minutes).await;
        assert!(outcome.is_timed_out());
        assert_eq!(outcome.statuses()[&JobId::new(CLUSTER, 0)], Queued);
    }
    assert_eq!(ScriptedAccessPoint::count(&ap.status_calls), 0);
}

#[tokio::test]
async fn test_monitor_until_all_terminal() {
    let ap = Arc::new(ScriptedAccessPoint::new(2));
    ap.push_polls([
        Ok(vec![Queued, Queued]),
        Ok(vec![Running, Running]),
        Ok(vec![Completed, Held]),
    ]);
    let mut placement = submitted(&ap, 2).await;

    let outcome = placement.monitor(1.0).await;
    match outcome {
        MonitorOutcome::AllTerminal(statuses) => {
            assert_eq!(statuses[&JobId::new(CLUSTER, 0)], Completed);
            assert_eq!(statuses[&JobId::new(CLUSTER, 1)], Held);
        }
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(ScriptedAccessPoint::count(&ap.status_calls), 3);

    // already terminal: answered without polling
    assert!(!placement.monitor(1.0).await.is_timed_out());
    assert_eq!(ScriptedAccessPoint::count(&ap.status_calls), 3);
}

#[tokio::test]
async fn test_released_held_unit_is_seen_completed() {
    let dir = TempDir::new().unwrap();
    let ap = Arc::new(ScriptedAccessPoint::new(1));
    ap.push_polls([Ok(vec![Held]), Ok(vec![Completed])]);
    let mut placement = submitted(&ap, 1).await;
    let id = JobId::new(CLUSTER, 0);

    // held stops monitoring
    let outcome = placement.monitor(1.0).await;
    assert_eq!(outcome, MonitorOutcome::AllTerminal([(id, Held)].into()));

    // but a later refresh still asks about it
    assert!(placement.refresh(true).await.unwrap());
    assert_eq!(placement.status(id), Some(Completed));
    assert_eq!(ScriptedAccessPoint::count(&ap.status_calls), 2);

    let report = placement.retrieve(dir.path()).await.unwrap();
    assert_eq!(report.retrieved, vec![id]);

    // nothing left that can change
    assert!(!placement.refresh(true).await.unwrap());
    assert_eq!(ScriptedAccessPoint::count(&ap.status_calls), 2);
}

#[tokio::test]
async fn test_monitor_times_out_and_resumes_without_regression() {
    let ap = Arc::new(ScriptedAccessPoint::new(1));
    ap.push_polls([Ok(vec![Running])]);
    let mut placement = submitted(&ap, 1).await;
    let id = JobId::new(CLUSTER, 0);

    // about 120ms of budget
    let outcome = placement.monitor(0.002).await;
    assert!(outcome.is_timed_out());
    assert_eq!(placement.status(id), Some(Running));
    let polls = ScriptedAccessPoint::count(&ap.status_calls);
    assert!(polls >= 2);

    // a stale answer does not move the unit back
    ap.push_polls([Ok(vec![Queued]), Ok(vec![Queued])]);
    let outcome = placement.monitor(0.001).await;
    assert!(outcome.is_timed_out());
    assert_eq!(placement.status(id), Some(Running));

    ap.push_polls([Ok(vec![Completed])]);
    let outcome = placement.monitor(1.0).await;
    assert_eq!(outcome, MonitorOutcome::AllTerminal([(id, Completed)].into()));
}

#[tokio::test]
async fn test_hanging_poll_does_not_outlast_budget() {
    let ap = Arc::new(ScriptedAccessPoint::new(1));
    ap.stall_status(Duration::from_secs(30));
    let mut placement = submitted(&ap, 1)
        .await
        .with_poll_interval(Duration::from_secs(10));

    let started = tokio::time::Instant::now();
    let outcome = placement.monitor(0.002).await;
    assert!(outcome.is_timed_out());
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(placement.status(JobId::new(CLUSTER, 0)), Some(Queued));
}

#[tokio::test]
async fn test_monitor_survives_poll_failures() {
    let ap = Arc::new(ScriptedAccessPoint::new(1));
    ap.push_polls([
        Err(Failure::Unavailable),
        Err(Failure::Unavailable),
        Ok(vec![Running]),
        Err(Failure::Unavailable),
        Ok(vec![Completed]),
    ]);
    let mut placement = submitted(&ap, 1).await.with_stale_warning(Duration::from_millis(10));

    let outcome = placement.monitor(1.0).await;
    assert!(!outcome.is_timed_out());
    assert_eq!(placement.status(JobId::new(CLUSTER, 0)), Some(Completed));
    assert_eq!(ScriptedAccessPoint::count(&ap.status_calls), 5);
}

#[tokio::test]
async fn test_units_missing_from_answer_keep_their_status() {
    let ap = Arc::new(ScriptedAccessPoint::new(2));
    ap.push_polls([Ok(vec![Running, Running]), Ok(vec![Completed])]);
    let mut placement = submitted(&ap, 2).await;

    assert!(placement.refresh(true).await.unwrap());
    assert!(placement.refresh(true).await.unwrap());
    assert_eq!(placement.status(JobId::new(CLUSTER, 0)), Some(Completed));
    assert_eq!(placement.status(JobId::new(CLUSTER, 1)), Some(Running));
    assert!(!placement.is_terminal());
    assert_eq!(placement.summary().in_progress(), 1);
}

#[tokio::test]
async fn test_refresh_is_throttled_unless_forced() {
    let ap = Arc::new(ScriptedAccessPoint::new(1));
    ap.push_polls([Ok(vec![Running])]);
    let connection = connect(&ap).await;
    let mut placement = Placement::submit(&connection, &description(1), true)
        .await
        .unwrap()
        .with_poll_interval(Duration::from_secs(60));

    assert!(placement.refresh(false).await.unwrap());
    assert!(!placement.refresh(false).await.unwrap());
    assert!(placement.refresh(true).await.unwrap());
    assert_eq!(ScriptedAccessPoint::count(&ap.status_calls), 2);
    assert!(placement.last_update().is_some());
}

#[tokio::test]
async fn test_retrieve_before_completion_is_not_ready() {
    let dir = TempDir::new().unwrap();
    let ap = Arc::new(ScriptedAccessPoint::new(1));
    ap.push_polls([Ok(vec![Running])]);
    let mut placement = submitted(&ap, 1).await;
    placement.refresh(true).await.unwrap();

    let err = placement.retrieve(dir.path()).await.unwrap_err();
    assert!(matches!(err, RetrieveError::NotReady { cluster: CLUSTER }));
    assert_eq!(ScriptedAccessPoint::count(&ap.transfer_calls), 0);
}

#[tokio::test]
async fn test_retrieve_skips_units_already_retrieved() {
    let dir = TempDir::new().unwrap();
    let ap = Arc::new(ScriptedAccessPoint::new(2));
    ap.push_polls([Ok(vec![Completed, Running]), Ok(vec![Completed, Completed])]);
    let mut placement = submitted(&ap, 2).await;

    placement.refresh(true).await.unwrap();
    let first = placement.retrieve(dir.path()).await.unwrap();
    assert_eq!(first.retrieved, vec![JobId::new(CLUSTER, 0)]);
    assert!(first.skipped.is_empty());
    assert_eq!(
        std::fs::read_to_string(dir.path().join("out.0")).unwrap(),
        "unit 42.0\n"
    );

    placement.refresh(true).await.unwrap();
    let second = placement.retrieve(dir.path()).await.unwrap();
    assert_eq!(second.retrieved, vec![JobId::new(CLUSTER, 1)]);
    assert_eq!(second.skipped, vec![JobId::new(CLUSTER, 0)]);

    let third = placement.retrieve(dir.path()).await.unwrap();
    assert!(third.retrieved.is_empty());
    assert_eq!(third.skipped.len(), 2);
    assert_eq!(
        ap.transferred(),
        vec![vec![JobId::new(CLUSTER, 0)], vec![JobId::new(CLUSTER, 1)]]
    );
}

#[tokio::test]
async fn test_failed_retrieve_can_be_retried() {
    let dir = TempDir::new().unwrap();
    let ap = Arc::new(ScriptedAccessPoint::new(1));
    ap.push_polls([Ok(vec![Completed])]);
    ap.fail_next_transfer(Failure::Unavailable);
    let mut placement = submitted(&ap, 1).await;
    placement.refresh(true).await.unwrap();

    let err = placement.retrieve(dir.path()).await.unwrap_err();
    assert!(matches!(err, RetrieveError::RetrieveFailed { .. }));
    assert!(placement.retrieved().is_empty());

    let report = placement.retrieve(dir.path()).await.unwrap();
    assert_eq!(report.retrieved, vec![JobId::new(CLUSTER, 0)]);
    assert_eq!(report.files, vec![dir.path().join("out.0")]);
}

#[tokio::test]
async fn test_unspooled_placement_cannot_be_retrieved() {
    let dir = TempDir::new().unwrap();
    let ap = Arc::new(ScriptedAccessPoint::new(1));
    ap.push_polls([Ok(vec![Completed])]);
    let connection = connect(&ap).await;
    let mut placement = Placement::submit(&connection, &description(1), false)
        .await
        .unwrap();
    placement.refresh(true).await.unwrap();

    let err = placement.retrieve(dir.path()).await.unwrap_err();
    assert!(matches!(err, RetrieveError::RetrieveFailed { .. }));
    assert_eq!(ScriptedAccessPoint::count(&ap.transfer_calls), 0);
}

#[tokio::test]
async fn test_record_round_trip_keeps_progress() {
    let dir = TempDir::new().unwrap();
    let ap = Arc::new(ScriptedAccessPoint::new(2));
    ap.push_polls([Ok(vec![Completed, Running])]);
    let mut placement = submitted(&ap, 2).await;
    placement.refresh(true).await.unwrap();
    placement.retrieve(&dir.path().join("results")).await.unwrap();

    let store = PlacementStore::new(dir.path().join("state"));
    store.save(&placement.to_record()).unwrap();
    let record = store.load("ap1", CLUSTER).unwrap();

    let restored = Placement::restore(connect(&ap).await, record).unwrap();
    assert_eq!(restored.statuses(), placement.statuses());
    assert_eq!(restored.retrieved(), placement.retrieved());
    assert!(restored.spool());
    assert_eq!(restored.last_update(), placement.last_update());
}

#[tokio::test]
async fn test_restore_on_other_access_point_is_refused() {
    let ap = Arc::new(ScriptedAccessPoint::new(1));
    let placement = submitted(&ap, 1).await;
    let mut record = placement.to_record();
    record.access_point = "ap9".to_string();

    let err = Placement::restore(connect(&ap).await, record).unwrap_err();
    assert!(matches!(err, StateError::WrongAccessPoint { .. }));
}
