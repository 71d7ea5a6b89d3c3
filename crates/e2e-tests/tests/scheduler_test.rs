//! Scheduled runs: single-flight and registry reporting.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use archiver_scheduler::jobs::register_backup_job;
use archiver_scheduler::{
    FireOutcome, JobLocks, JobRegistry, JobResult, SchedulerConfig, SchedulerService,
};
use e2e_tests::{backup_job, TestHarness};

async fn wait_for(registry: &JobRegistry, job_id: &str, check: impl Fn(u64) -> bool) {
    for _ in 0..500 {
        if let Some(status) = registry.get_status(job_id) {
            if check(status.run_count) {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} did not reach the expected state", job_id);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_overlapping_backup_firing_is_skipped() {
    let harness = TestHarness::new().await;
    // One slow, empty window per run keeps the first run busy.
    harness.mount_empty_fallback(Duration::from_millis(300)).await;

    let job = backup_job(24);
    let job_id = job.job_id();
    let scheduler = SchedulerService::new(
        SchedulerConfig::default(),
        JobLocks::from_ids([job_id.clone()]),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    register_backup_job(&scheduler, Arc::new(harness.backup_service()), job)
        .await
        .unwrap();

    let registry = scheduler.registry();
    assert_eq!(scheduler.trigger(&job_id).unwrap(), FireOutcome::Started);
    assert_eq!(scheduler.trigger(&job_id).unwrap(), FireOutcome::Skipped);

    wait_for(&registry, &job_id, |runs| runs == 1).await;

    let status = registry.get_status(&job_id).unwrap();
    assert_eq!(status.skip_count, 1);
    assert_eq!(status.run_count, 1);
    assert_eq!(status.last_result, Some(JobResult::Success));
    assert_eq!(status.last_run_metadata["documents"], "0");
    assert_eq!(status.cron_expr, "0 0 1 * * *");

    // Guard released once the run's task has finished: the next firing proceeds.
    for _ in 0..100 {
        if scheduler.in_flight() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(scheduler.trigger(&job_id).unwrap(), FireOutcome::Started);
    wait_for(&registry, &job_id, |runs| runs == 2).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_cancels_in_flight_backup() {
    let harness = TestHarness::new().await;
    harness.mount_empty_fallback(Duration::from_secs(30)).await;

    let job = backup_job(24);
    let job_id = job.job_id();
    let mut scheduler = SchedulerService::new(
        SchedulerConfig {
            shutdown_timeout_secs: 5,
            ..Default::default()
        },
        JobLocks::from_ids([job_id.clone()]),
        CancellationToken::new(),
    )
    .await
    .unwrap();

    register_backup_job(&scheduler, Arc::new(harness.backup_service()), job)
        .await
        .unwrap();
    scheduler.start().await.unwrap();

    let registry = scheduler.registry();
    scheduler.trigger(&job_id).unwrap();
    for _ in 0..100 {
        if registry.is_running(&job_id) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let started = std::time::Instant::now();
    scheduler.shutdown().await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    let status = registry.get_status(&job_id).unwrap();
    assert!(!status.is_running);
    match status.last_result {
        Some(JobResult::Failed(message)) => assert!(message.contains("cancelled")),
        other => panic!("Expected cancelled failure, got {:?}", other),
    }
}
