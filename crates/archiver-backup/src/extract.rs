//! Count probe and extraction of individual windows.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use archiver_search::SearchIndex;
use archiver_types::{BackupJob, TimeWindow};

use crate::artifact::window_file_name;
use crate::{BackupError, RunContext};

/// A window that produced documents, written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowArtifact {
    pub window: TimeWindow,
    pub path: PathBuf,
    /// Count reported by the probe
    pub documents: u64,
}

/// Result of extracting every planned window of a day.
#[derive(Debug, Default)]
pub struct Extraction {
    /// Artifacts in window order
    pub artifacts: Vec<WindowArtifact>,
    pub empty_windows: usize,
    /// Sequence numbers of windows skipped after a failure
    pub failed_windows: Vec<usize>,
}

impl Extraction {
    pub fn probed_documents(&self) -> u64 {
        self.artifacts.iter().map(|a| a.documents).sum()
    }
}

/// Probe and extract `windows` of the context's day one after another.
///
/// A window whose probe, search or write fails is logged and skipped.
/// Between windows the run pauses for the job's pacing interval. Only
/// cancellation of the run aborts the loop.
pub async fn extract_windows(
    search: &dyn SearchIndex,
    job: &BackupJob,
    windows: &[TimeWindow],
    work_dir: &Path,
    ctx: &mut RunContext,
) -> Result<Extraction, BackupError> {
    let mut extraction = Extraction::default();
    let pacing = job.pacing();
    let day = ctx.day();
    let cancel = ctx.cancel().clone();

    for (position, window) in windows.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(BackupError::Cancelled);
        }

        info!(index = %job.index_name, window = %window, "Downloading period {}", window.sequence);

        match extract_window(search, job, day, window, work_dir, ctx, &cancel).await {
            Ok(Some(artifact)) => extraction.artifacts.push(artifact),
            Ok(None) => extraction.empty_windows += 1,
            Err(e) if e.is_cancelled() => return Err(BackupError::Cancelled),
            Err(e) => {
                error!(
                    index = %job.index_name,
                    window = window.sequence,
                    error = %e,
                    "Failed to download period {}",
                    window.sequence
                );
                extraction.failed_windows.push(window.sequence);
            }
        }

        let is_last = position + 1 == windows.len();
        if !is_last && !pacing.is_zero() {
            info!(
                index = %job.index_name,
                seconds = pacing.as_secs(),
                "Waiting before next request"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BackupError::Cancelled),
                _ = tokio::time::sleep(pacing) => {}
            }
        }
    }

    Ok(extraction)
}

async fn extract_window(
    search: &dyn SearchIndex,
    job: &BackupJob,
    day: NaiveDate,
    window: &TimeWindow,
    work_dir: &Path,
    ctx: &mut RunContext,
    cancel: &CancellationToken,
) -> Result<Option<WindowArtifact>, BackupError> {
    let count = search.count(&job.index_name, window, cancel).await?;
    if count == 0 {
        info!(index = %job.index_name, window = window.sequence, "No documents found");
        return Ok(None);
    }
    info!(
        index = %job.index_name,
        window = window.sequence,
        documents = count,
        "Found {} documents",
        count
    );

    let payload = search.search(&job.index_name, window, count, cancel).await?;

    let path = ctx.track(work_dir.join(window_file_name(day, &job.index_name, window.sequence)));
    let mut body = Vec::with_capacity(payload.len() + 1);
    body.extend_from_slice(&payload);
    body.push(b'\n');
    tokio::fs::write(&path, body)
        .await
        .map_err(|e| BackupError::io(&path, e))?;

    Ok(Some(WindowArtifact {
        window: *window,
        path,
        documents: count,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use archiver_search::{MockCall, MockSearchIndex};
    use tokio::time::Instant;

    use crate::plan_windows;

    fn job(interval_hours: u32, pacing_secs: u64) -> BackupJob {
        BackupJob {
            index_name: "logs".to_string(),
            schedule: "0 1 * * *".to_string(),
            interval_hours,
            s3_path: String::new(),
            request_interval_seconds: pacing_secs,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    #[tokio::test]
    async fn test_only_non_empty_windows_produce_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let search = MockSearchIndex::new()
            .with_documents(3, 10)
            .with_documents(7, 5);
        let job = job(2, 0);
        let windows = plan_windows(day(), job.interval_hours);
        let mut ctx = RunContext::new(job.job_id(), day(), CancellationToken::new());

        let extraction = extract_windows(&search, &job, &windows, dir.path(), &mut ctx)
            .await
            .unwrap();

        let sequences: Vec<_> = extraction.artifacts.iter().map(|a| a.window.sequence).collect();
        assert_eq!(sequences, vec![3, 7]);
        assert_eq!(extraction.empty_windows, 10);
        assert!(extraction.failed_windows.is_empty());
        assert_eq!(extraction.probed_documents(), 15);

        let first = &extraction.artifacts[0];
        assert_eq!(first.path, dir.path().join("03-01-24-logs-3.json"));
        let written = std::fs::read(&first.path).unwrap();
        let mut expected = MockSearchIndex::payload_for("logs", &windows[2], 10).to_vec();
        expected.push(b'\n');
        assert_eq!(written, expected);

        let searches = search
            .calls()
            .into_iter()
            .filter(|c| matches!(c, MockCall::Search { .. }))
            .count();
        assert_eq!(searches, 2);
    }

    #[tokio::test]
    async fn test_failed_windows_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let search = MockSearchIndex::new()
            .with_documents(1, 4)
            .with_documents(2, 4)
            .with_documents(3, 4)
            .fail_count_on(1)
            .fail_search_on(2);
        let job = job(6, 0);
        let windows = plan_windows(day(), job.interval_hours);
        let mut ctx = RunContext::new(job.job_id(), day(), CancellationToken::new());

        let extraction = extract_windows(&search, &job, &windows, dir.path(), &mut ctx)
            .await
            .unwrap();

        assert_eq!(extraction.failed_windows, vec![1, 2]);
        assert_eq!(extraction.artifacts.len(), 1);
        assert_eq!(extraction.artifacts[0].window.sequence, 3);
        assert_eq!(extraction.empty_windows, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing_between_windows_only() {
        let dir = tempfile::tempdir().unwrap();
        let search = MockSearchIndex::new();
        let job = job(6, 30);
        let windows = plan_windows(day(), job.interval_hours);
        let mut ctx = RunContext::new(job.job_id(), day(), CancellationToken::new());
        let started = Instant::now();

        extract_windows(&search, &job, &windows, dir.path(), &mut ctx)
            .await
            .unwrap();

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(90));
        assert!(elapsed < Duration::from_secs(91));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_pacing_aborts_run() {
        let dir = tempfile::tempdir().unwrap();
        let search = MockSearchIndex::new().with_documents(1, 1);
        let job = job(12, 600);
        let windows = plan_windows(day(), job.interval_hours);
        let cancel = CancellationToken::new();
        let mut ctx = RunContext::new(job.job_id(), day(), cancel.clone());

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            canceller.cancel();
        });

        let result = extract_windows(&search, &job, &windows, dir.path(), &mut ctx).await;

        assert!(matches!(result, Err(BackupError::Cancelled)));
        assert_eq!(search.calls().len(), 2);
    }
}
