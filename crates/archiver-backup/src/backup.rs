//! One backup run: plan, extract, merge, compress, upload.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{NaiveDate, TimeDelta, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use archiver_search::SearchIndex;
use archiver_storage::DurableUploader;
use archiver_types::BackupJob;

use crate::artifact::{compressed_file_name, day_file_name};
use crate::{
    compress_artifact, extract_windows, merge_artifacts, plan_windows, validate_interval,
    BackupError, RunContext,
};

/// The day before today, in UTC. Default target of a scheduled run.
pub fn yesterday() -> NaiveDate {
    (Utc::now() - TimeDelta::days(1)).date_naive()
}

/// How a backup run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    /// Every window was empty or failed; nothing was uploaded
    NoData {
        windows: usize,
        failed_windows: Vec<usize>,
    },
    Uploaded {
        key: String,
        documents: u64,
        windows_archived: usize,
        failed_windows: Vec<usize>,
        attempts: u32,
        bytes: u64,
    },
}

impl BackupOutcome {
    pub fn documents(&self) -> u64 {
        match self {
            BackupOutcome::NoData { .. } => 0,
            BackupOutcome::Uploaded { documents, .. } => *documents,
        }
    }
}

/// Runs backup jobs against a search index and an uploader.
pub struct BackupService {
    search: Arc<dyn SearchIndex>,
    uploader: DurableUploader,
    work_dir: PathBuf,
}

impl BackupService {
    pub fn new(
        search: Arc<dyn SearchIndex>,
        uploader: DurableUploader,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            search,
            uploader,
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &std::path::Path {
        &self.work_dir
    }

    /// Archive `day` of `job.index_name`.
    ///
    /// Window failures are skipped. Merge, compression and upload failures
    /// fail the run. Temporary files are removed before returning.
    pub async fn run(
        &self,
        job: &BackupJob,
        day: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<BackupOutcome, BackupError> {
        validate_interval(job.interval_hours)?;
        tokio::fs::create_dir_all(&self.work_dir)
            .await
            .map_err(|e| BackupError::io(&self.work_dir, e))?;

        info!(index = %job.index_name, date = %day, "Starting backup for index {}", job.index_name);

        let mut ctx = RunContext::new(job.job_id(), day, cancel.clone());
        let windows = plan_windows(day, job.interval_hours);

        let extraction =
            extract_windows(self.search.as_ref(), job, &windows, &self.work_dir, &mut ctx)
                .await?;

        if extraction.artifacts.is_empty() {
            warn!(index = %job.index_name, date = %day, "No data downloaded for {}", job.index_name);
            return Ok(BackupOutcome::NoData {
                windows: windows.len(),
                failed_windows: extraction.failed_windows,
            });
        }

        let day_file = day_file_name(day, &job.index_name);
        ctx.track(self.work_dir.join(&day_file));
        ctx.track(self.work_dir.join(compressed_file_name(&day_file)));

        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }

        let paths: Vec<PathBuf> = extraction.artifacts.iter().map(|a| a.path.clone()).collect();
        let work_dir = self.work_dir.clone();
        let index = job.index_name.clone();
        let merged =
            tokio::task::spawn_blocking(move || merge_artifacts(&paths, &work_dir, &index, day))
                .await??;

        let probed = extraction.probed_documents();
        if merged.total_documents != probed {
            warn!(
                index = %job.index_name,
                probed,
                merged = merged.total_documents,
                "Merged document count differs from probed count"
            );
        }

        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }

        let merged_path = merged.path.clone();
        let compressed =
            tokio::task::spawn_blocking(move || compress_artifact(&merged_path)).await??;
        ctx.remove(&merged.path);

        let file_name = compressed
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| compressed_file_name(&day_file));
        let key = job.object_key(&file_name);

        let receipt = self
            .uploader
            .upload(&compressed, &key, merged.total_documents, cancel)
            .await?;

        info!(
            index = %job.index_name,
            key = %receipt.key,
            documents = merged.total_documents,
            "Backup completed for {}",
            job.index_name
        );

        Ok(BackupOutcome::Uploaded {
            key: receipt.key,
            documents: merged.total_documents,
            windows_archived: merged.artifact_count,
            failed_windows: extraction.failed_windows,
            attempts: receipt.attempts,
            bytes: receipt.bytes,
        })
    }
}
