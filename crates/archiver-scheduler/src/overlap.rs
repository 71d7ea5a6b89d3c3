//! Single-flight guards keyed by job identity.
//!
//! Every configured job owns one [`OverlapGuard`]. A firing acquires it with
//! a non-blocking try; if the previous run of the same job still holds it,
//! the firing is skipped. Different jobs never contend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use archiver_types::JobDefinition;

/// Tracks whether a job is currently running.
#[derive(Debug, Default)]
pub struct OverlapGuard {
    is_running: Arc<AtomicBool>,
}

impl OverlapGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to mark the job as running.
    ///
    /// Returns `None` when a previous run still holds the guard.
    pub fn try_acquire(&self) -> Option<RunGuard> {
        self.is_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| RunGuard {
                flag: self.is_running.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

/// Releases the running flag when dropped, including on panic.
#[derive(Debug)]
pub struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// One guard per job identity, built once from the static job list.
#[derive(Debug, Default, Clone)]
pub struct JobLocks {
    guards: HashMap<String, Arc<OverlapGuard>>,
}

impl JobLocks {
    pub fn from_jobs(jobs: &[JobDefinition]) -> Self {
        Self::from_ids(jobs.iter().map(|job| job.job_id()))
    }

    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let guards = ids
            .into_iter()
            .map(|id| (id.into(), Arc::new(OverlapGuard::new())))
            .collect();
        Self { guards }
    }

    pub fn get(&self, job_id: &str) -> Option<Arc<OverlapGuard>> {
        self.guards.get(job_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }
}
