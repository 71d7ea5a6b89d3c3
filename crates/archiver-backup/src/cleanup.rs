//! Retention cleanup.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use archiver_search::SearchIndex;
use archiver_types::CleanupJob;

use crate::BackupError;

/// Deletes documents past their retention period.
pub struct CleanupService {
    search: Arc<dyn SearchIndex>,
}

impl CleanupService {
    pub fn new(search: Arc<dyn SearchIndex>) -> Self {
        Self { search }
    }

    /// Issue a single delete-by-query for `job` and return the deleted count.
    ///
    /// No retry: a failure ends this run and the next firing tries again.
    pub async fn cleanup(
        &self,
        job: &CleanupJob,
        cancel: &CancellationToken,
    ) -> Result<u64, BackupError> {
        info!(
            index = %job.index_name,
            retention_days = job.retention_days,
            "Starting cleanup for index {}",
            job.index_name
        );

        let deleted = self
            .search
            .delete_older_than(&job.index_name, job.retention_days, cancel)
            .await
            .map_err(BackupError::DeleteByQuery)?;

        info!(
            index = %job.index_name,
            deleted,
            "Cleanup completed for {}: deleted {} documents",
            job.index_name,
            deleted
        );
        Ok(deleted)
    }
}
