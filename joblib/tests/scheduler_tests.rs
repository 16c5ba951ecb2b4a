mod common;

use common::{params, Harness};
use joblib::config::SchedulerConfig;
use joblib::errors::JobError;
use joblib::{CancelOutcome, JobStatus};

#[tokio::test]
async fn third_job_waits_for_a_free_slot() {
    let harness = Harness::new(2);
    let first = harness.submit().await;
    let second = harness.submit().await;
    let third = harness.submit().await;

    assert_eq!(harness.status(first).status, JobStatus::Running);
    assert_eq!(harness.status(second).status, JobStatus::Running);
    assert_eq!(harness.status(third).status, JobStatus::Pending);
    assert_eq!(harness.invoker.started(), vec![first, second]);

    let stats = harness.api.coordinator().stats().await.unwrap();
    assert_eq!((stats.running, stats.queued), (2, 1));

    let mut worker = harness.invoker.control(first);
    worker.progress("Writing DXF", 90);
    worker.exit(0);
    harness.wait_for(first, JobStatus::Completed).await;
    harness.wait_for(third, JobStatus::Running).await;
    assert_eq!(harness.status(second).status, JobStatus::Running);

    for job_id in [second, third] {
        harness.invoker.control(job_id).exit(0);
    }
    for job_id in [first, second, third] {
        let snapshot = harness.wait_for(job_id, JobStatus::Completed).await;
        assert_eq!(snapshot.progress, 100);
    }
}

#[tokio::test]
async fn create_reports_admission() {
    let harness = Harness::new(1);
    let running = harness.api.create(params()).await.unwrap();
    let queued = harness.api.create(params()).await.unwrap();
    assert_eq!(running.status, JobStatus::Running);
    assert_eq!(queued.status, JobStatus::Pending);

    let harness = Harness::new(1);
    harness.invoker.fail_spawns(true);
    let created = harness.api.create(params()).await.unwrap();
    assert_eq!(created.status, JobStatus::Running);
    assert_eq!(harness.status(created.job_id).status, JobStatus::Error);
}

#[tokio::test]
async fn queued_jobs_start_in_submission_order() {
    let harness = Harness::new(1);
    let mut submitted = Vec::new();
    for _ in 0..4 {
        submitted.push(harness.submit().await);
    }

    for job_id in submitted.clone() {
        harness.wait_for(job_id, JobStatus::Running).await;
        harness.invoker.control(job_id).exit(0);
        harness.wait_for(job_id, JobStatus::Completed).await;
    }
    assert_eq!(harness.invoker.started(), submitted);
}

#[tokio::test]
async fn running_jobs_never_exceed_the_limit() {
    let harness = Harness::new(2);
    let mut submitted = Vec::new();
    for _ in 0..6 {
        submitted.push(harness.submit().await);
    }

    for job_id in submitted {
        harness.wait_for(job_id, JobStatus::Running).await;
        assert!(harness.running_count() <= 2);
        let stats = harness.api.coordinator().stats().await.unwrap();
        assert!(stats.running <= 2);

        harness.invoker.control(job_id).exit(0);
        harness.wait_for(job_id, JobStatus::Completed).await;
        assert!(harness.running_count() <= 2);
    }
    let stats = harness.api.coordinator().stats().await.unwrap();
    assert_eq!((stats.running, stats.queued), (0, 0));
}

#[tokio::test]
async fn cancelled_queued_job_never_starts() {
    let harness = Harness::new(1);
    let first = harness.submit().await;
    let queued = harness.submit().await;

    let outcome = harness.api.coordinator().cancel(queued).await.unwrap();
    assert_eq!(outcome, CancelOutcome::Dequeued);
    let snapshot = harness.status(queued);
    assert_eq!(snapshot.status, JobStatus::Cancelled);
    assert!(harness.api.record(queued).unwrap().cancel_requested);

    harness.invoker.control(first).exit(0);
    harness.wait_for(first, JobStatus::Completed).await;
    let stats = harness.api.coordinator().stats().await.unwrap();
    assert_eq!((stats.running, stats.queued), (0, 0));
    assert_eq!(harness.invoker.started(), vec![first]);
}

#[tokio::test]
async fn cancelling_a_running_job_kills_its_worker() {
    let harness = Harness::new(1);
    let job_id = harness.submit().await;
    let mut worker = harness.invoker.control(job_id);
    worker.progress("Fetching OSM data", 30);
    harness.wait_for_progress(job_id, 30).await;

    let outcome = harness.api.coordinator().cancel(job_id).await.unwrap();
    assert_eq!(outcome, CancelOutcome::Signalled);
    worker.wait_killed().await;
    // killed workers usually exit with a signal; it must not read as a failure
    worker.die(9);

    let snapshot = harness.wait_for(job_id, JobStatus::Cancelled).await;
    assert_eq!(snapshot.progress, 30);
    assert_eq!(worker.kills(), 1);
    assert!(harness.api.artifact(job_id).is_err());
}

#[tokio::test]
async fn cancellation_wins_over_a_clean_exit_after_the_kill() {
    let harness = Harness::new(1);
    let job_id = harness.submit().await;
    let mut worker = harness.invoker.control(job_id);

    harness.api.cancel(job_id).await.unwrap();
    worker.wait_killed().await;
    worker.exit(0);

    harness.wait_for(job_id, JobStatus::Cancelled).await;
}

#[tokio::test]
async fn cancelling_a_finished_job_is_not_accepted() {
    let harness = Harness::new(1);
    let job_id = harness.submit().await;
    harness.invoker.control(job_id).exit(0);
    harness.wait_for(job_id, JobStatus::Completed).await;

    let accepted = harness.api.cancel(job_id).await.unwrap();
    assert!(!accepted.accepted);
    assert_eq!(harness.status(job_id).status, JobStatus::Completed);
}

#[tokio::test]
async fn repeated_cancels_kill_once() {
    let harness = Harness::new(1);
    let job_id = harness.submit().await;
    let mut worker = harness.invoker.control(job_id);

    for _ in 0..3 {
        assert!(harness.api.cancel(job_id).await.unwrap().accepted);
    }
    worker.wait_killed().await;
    worker.die(15);
    harness.wait_for(job_id, JobStatus::Cancelled).await;
    assert_eq!(worker.kills(), 1);
}

#[tokio::test]
async fn failed_worker_reports_its_stderr() {
    let harness = Harness::new(1);
    let job_id = harness.submit().await;
    let mut worker = harness.invoker.control(job_id);
    worker.progress("Fetching OSM data", 10);
    worker.stderr("Traceback (most recent call last):");
    worker.stderr("RuntimeError: overpass timeout");
    worker.exit(2);

    let snapshot = harness.wait_for(job_id, JobStatus::Error).await;
    assert_eq!(
        snapshot.message,
        "worker exited with code 2: RuntimeError: overpass timeout"
    );
    assert_eq!(snapshot.progress, 10);
    let record = harness.api.record(job_id).unwrap();
    assert!(record.output_artifact_path.is_none());
    assert_eq!(record.log_lines.len(), 3);
    assert!(matches!(
        harness.api.artifact(job_id),
        Err(JobError::NotFound)
    ));
}

#[tokio::test]
async fn worker_killed_by_a_signal_fails_the_job() {
    let harness = Harness::new(1);
    let job_id = harness.submit().await;
    harness.invoker.control(job_id).die(9);

    let snapshot = harness.wait_for(job_id, JobStatus::Error).await;
    assert_eq!(snapshot.message, "worker terminated by signal 9");
}

#[tokio::test]
async fn spawn_failure_fails_the_job_and_keeps_the_queue_moving() {
    let harness = Harness::new(1);
    let first = harness.submit().await;
    harness.invoker.fail_spawns(true);
    let broken = harness.submit().await;
    let after = harness.submit().await;
    assert_eq!(harness.status(broken).status, JobStatus::Pending);

    harness.invoker.control(first).exit(0);
    let snapshot = harness.wait_for(broken, JobStatus::Error).await;
    assert!(snapshot.message.starts_with("failed to start worker:"));
    // the spawn failure must not have held on to the slot
    let snapshot = harness.wait_for(after, JobStatus::Error).await;
    assert!(snapshot.message.contains("worker binary missing"));

    harness.invoker.fail_spawns(false);
    let last = harness.submit().await;
    assert_eq!(harness.status(last).status, JobStatus::Running);
}

#[tokio::test]
async fn full_queue_rejects_new_jobs() {
    let harness = Harness::with_config(SchedulerConfig {
        max_concurrent_jobs: 1,
        max_queue_depth: Some(1),
        ..SchedulerConfig::default()
    });
    let running = harness.submit().await;
    let _queued = harness.submit().await;

    let rejected = harness.api.create(params()).await;
    assert!(matches!(rejected, Err(JobError::Capacity { depth: 1 })));
    assert_eq!(harness.api.list(10).len(), 2);

    harness.invoker.control(running).exit(0);
    harness.wait_for(running, JobStatus::Completed).await;
    let stats = harness.api.coordinator().stats().await.unwrap();
    assert_eq!(stats.queued, 0);
    harness.submit().await;
}

#[tokio::test]
async fn invalid_parameters_create_nothing() {
    let harness = Harness::new(2);
    let mut parameters = params();
    parameters.radius = -5.0;

    let rejected = harness.api.create(parameters).await;
    assert!(matches!(rejected, Err(JobError::Validation(_))));
    assert!(harness.api.list(10).is_empty());
    assert!(harness.invoker.started().is_empty());
}

#[tokio::test]
async fn unknown_jobs_are_not_found() {
    let harness = Harness::new(2);
    let missing = uuid::Uuid::new_v4();

    assert!(matches!(harness.api.status(missing), Err(JobError::NotFound)));
    assert!(matches!(harness.api.artifact(missing), Err(JobError::NotFound)));
    assert!(matches!(
        harness.api.cancel(missing).await,
        Err(JobError::NotFound)
    ));
    assert!(matches!(
        harness.api.stream(missing).await,
        Err(JobError::NotFound)
    ));
}
