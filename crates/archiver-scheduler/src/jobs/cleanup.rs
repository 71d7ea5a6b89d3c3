//! Scheduled retention cleanup job.

use std::sync::Arc;

use tracing::info;

use archiver_backup::CleanupService;
use archiver_types::CleanupJob;

use crate::{JobOutput, SchedulerError, SchedulerService};

pub async fn register_cleanup_job(
    scheduler: &SchedulerService,
    service: Arc<CleanupService>,
    job: CleanupJob,
) -> Result<(), SchedulerError> {
    let job_id = job.job_id();
    let schedule = job.schedule.clone();
    let job = Arc::new(job);

    scheduler
        .register_job(&job_id, &schedule, move |cancel| {
            let service = service.clone();
            let job = job.clone();
            async move {
                service
                    .cleanup(&job, &cancel)
                    .await
                    .map(|deleted| {
                        JobOutput::new()
                            .with_deleted(deleted)
                            .with_metadata("retention_days", job.retention_days)
                    })
                    .map_err(|e| e.to_string())
            }
        })
        .await?;

    info!(job = %job_id, schedule = %schedule, "Registered cleanup job");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use archiver_search::MockSearchIndex;
    use tokio_util::sync::CancellationToken;

    use crate::{FireOutcome, JobLocks, JobResult, SchedulerConfig};

    #[tokio::test(flavor = "multi_thread")]
    async fn test_cleanup_job_reports_deleted() {
        let job = CleanupJob {
            index_name: "logs".to_string(),
            retention_days: 30,
            schedule: "0 3 * * *".to_string(),
        };
        let scheduler = SchedulerService::new(
            SchedulerConfig::default(),
            JobLocks::from_ids([job.job_id()]),
            CancellationToken::new(),
        )
        .await
        .unwrap();
        let service = Arc::new(CleanupService::new(Arc::new(
            MockSearchIndex::new().with_deleted(7),
        )));

        register_cleanup_job(&scheduler, service, job).await.unwrap();
        assert_eq!(scheduler.trigger("cleanup:logs").unwrap(), FireOutcome::Started);

        let registry = scheduler.registry();
        for _ in 0..200 {
            if registry.get_status("cleanup:logs").unwrap().run_count == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let status = registry.get_status("cleanup:logs").unwrap();
        assert_eq!(status.last_result, Some(JobResult::Success));
        assert_eq!(status.last_run_metadata["deleted"], "7");
        assert_eq!(status.last_run_metadata["retention_days"], "30");
        assert_eq!(status.cron_expr, "0 0 3 * * *");
    }
}
