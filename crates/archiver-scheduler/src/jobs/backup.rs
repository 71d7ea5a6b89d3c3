//! Scheduled backup job.

use std::sync::Arc;

use tracing::info;

use archiver_backup::{yesterday, BackupOutcome, BackupService};
use archiver_types::BackupJob;

use crate::{JobOutput, SchedulerError, SchedulerService};

/// Registry metadata describing a finished backup.
pub fn backup_output(outcome: &BackupOutcome) -> JobOutput {
    match outcome {
        BackupOutcome::NoData {
            windows,
            failed_windows,
        } => JobOutput::new()
            .with_documents(0)
            .with_metadata("windows", windows)
            .with_metadata("failed_windows", failed_windows.len()),
        BackupOutcome::Uploaded {
            key,
            documents,
            windows_archived,
            failed_windows,
            attempts,
            bytes,
        } => JobOutput::new()
            .with_documents(*documents)
            .with_object_key(key)
            .with_metadata("windows_archived", windows_archived)
            .with_metadata("failed_windows", failed_windows.len())
            .with_metadata("upload_attempts", attempts)
            .with_metadata("bytes", bytes),
    }
}

/// Register `job` to archive the previous UTC day on every firing.
pub async fn register_backup_job(
    scheduler: &SchedulerService,
    service: Arc<BackupService>,
    job: BackupJob,
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
                    .run(&job, yesterday(), &cancel)
                    .await
                    .map(|outcome| backup_output(&outcome))
                    .map_err(|e| e.to_string())
            }
        })
        .await?;

    info!(job = %job_id, schedule = %schedule, "Registered backup job");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_output_uploaded() {
        let outcome = BackupOutcome::Uploaded {
            key: "archives/03-01-24-logs.json.gz".to_string(),
            documents: 15,
            windows_archived: 2,
            failed_windows: vec![5],
            attempts: 3,
            bytes: 512,
        };
        let output = backup_output(&outcome);
        assert_eq!(output.metadata["documents"], "15");
        assert_eq!(output.metadata["object_key"], "archives/03-01-24-logs.json.gz");
        assert_eq!(output.metadata["failed_windows"], "1");
        assert_eq!(output.metadata["upload_attempts"], "3");
    }

    #[test]
    fn test_backup_output_no_data() {
        let outcome = BackupOutcome::NoData {
            windows: 12,
            failed_windows: vec![],
        };
        let output = backup_output(&outcome);
        assert_eq!(output.metadata["documents"], "0");
        assert!(!output.metadata.contains_key("object_key"));
    }
}
