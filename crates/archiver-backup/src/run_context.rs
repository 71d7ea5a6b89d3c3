//! Per-run state: target day, cancellation and temporary artifacts.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One execution of a backup job.
///
/// Files tracked here are removed when the context is dropped. Dropping
/// happens on success, failure and cancellation alike, so no artifact
/// outlives the run that produced it.
#[derive(Debug)]
pub struct RunContext {
    job_id: String,
    day: NaiveDate,
    cancel: CancellationToken,
    artifacts: Vec<PathBuf>,
}

impl RunContext {
    pub fn new(job_id: impl Into<String>, day: NaiveDate, cancel: CancellationToken) -> Self {
        Self {
            job_id: job_id.into(),
            day,
            cancel,
            artifacts: Vec::new(),
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    /// Day being archived.
    pub fn day(&self) -> NaiveDate {
        self.day
    }

    /// Token cancelled on process shutdown.
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Take ownership of `path`. The file does not need to exist yet.
    pub fn track(&mut self, path: impl Into<PathBuf>) -> PathBuf {
        let path = path.into();
        self.artifacts.push(path.clone());
        path
    }

    pub fn artifacts(&self) -> &[PathBuf] {
        &self.artifacts
    }

    /// Remove one tracked file now and stop tracking it.
    pub fn remove(&mut self, path: &Path) {
        self.artifacts.retain(|tracked| tracked != path);
        remove_quietly(path);
    }

    /// Remove every tracked file now.
    pub fn reclaim(&mut self) {
        for path in self.artifacts.drain(..) {
            remove_quietly(&path);
        }
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        if !self.artifacts.is_empty() {
            debug!(
                job = %self.job_id,
                date = %self.day,
                files = self.artifacts.len(),
                "Reclaiming run artifacts"
            );
        }
        self.reclaim();
    }
}

fn remove_quietly(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed temporary file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temporary file"),
    }
}
