//! Job registry for tracking execution status.
//!
//! Thread-safe per-job status: last run, duration, result, counters and the
//! metadata reported by the last run (documents archived, object key,
//! documents deleted).

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of a job firing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum JobResult {
    Success,
    /// Run failed; carries the error chain as text
    Failed(String),
    /// Firing skipped because the previous run was still active
    Skipped(String),
}

/// Metadata a job reports back on success.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobOutput {
    pub metadata: HashMap<String, String>,
}

impl JobOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.metadata.insert(key.into(), value.to_string());
        self
    }

    pub fn with_documents(self, count: u64) -> Self {
        self.with_metadata("documents", count)
    }

    pub fn with_deleted(self, count: u64) -> Self {
        self.with_metadata("deleted", count)
    }

    pub fn with_object_key(self, key: &str) -> Self {
        self.with_metadata("object_key", key)
    }
}

/// Status of a registered job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobStatus {
    pub job_id: String,
    /// Normalised 6-field cron expression
    pub cron_expr: String,
    /// When the last completed run finished
    pub last_run: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub last_result: Option<JobResult>,
    /// Completed runs, successful or failed
    pub run_count: u64,
    pub error_count: u64,
    pub skip_count: u64,
    pub is_running: bool,
    #[serde(default)]
    pub last_run_metadata: HashMap<String, String>,
}

impl JobStatus {
    pub fn new(job_id: String, cron_expr: String) -> Self {
        Self {
            job_id,
            cron_expr,
            last_run: None,
            last_duration_ms: None,
            last_result: None,
            run_count: 0,
            error_count: 0,
            skip_count: 0,
            is_running: false,
            last_run_metadata: HashMap::new(),
        }
    }
}

/// Registry of job statuses, shared between the scheduler and its firings.
///
/// ```
/// use archiver_scheduler::{JobRegistry, JobResult};
///
/// let registry = JobRegistry::new();
/// registry.register("backup:logs", "0 0 1 * * *");
///
/// registry.record_start("backup:logs");
/// assert!(registry.is_running("backup:logs"));
///
/// registry.record_complete("backup:logs", JobResult::Success, 1500);
/// assert!(!registry.is_running("backup:logs"));
/// ```
#[derive(Default)]
pub struct JobRegistry {
    jobs: RwLock<HashMap<String, JobStatus>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job, replacing any previous status under the same id.
    pub fn register(&self, job_id: &str, cron_expr: &str) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        jobs.insert(
            job_id.to_string(),
            JobStatus::new(job_id.to_string(), cron_expr.to_string()),
        );
    }

    pub fn record_start(&self, job_id: &str) {
        self.update(job_id, |status| status.is_running = true);
    }

    pub fn record_complete(&self, job_id: &str, result: JobResult, duration_ms: u64) {
        self.record_complete_with_metadata(job_id, result, duration_ms, HashMap::new());
    }

    pub fn record_complete_with_metadata(
        &self,
        job_id: &str,
        result: JobResult,
        duration_ms: u64,
        metadata: HashMap<String, String>,
    ) {
        self.update(job_id, |status| {
            status.is_running = false;
            status.last_run = Some(Utc::now());
            status.last_duration_ms = Some(duration_ms);
            status.run_count += 1;
            if matches!(result, JobResult::Failed(_)) {
                status.error_count += 1;
            }
            status.last_result = Some(result);
            status.last_run_metadata = metadata;
        });
    }

    /// Record a skipped firing. The running run's state is left untouched.
    pub fn record_skipped(&self, job_id: &str, reason: &str) {
        self.update(job_id, |status| {
            status.skip_count += 1;
            status.last_result = Some(JobResult::Skipped(reason.to_string()));
        });
    }

    pub fn get_status(&self, job_id: &str) -> Option<JobStatus> {
        self.read().get(job_id).cloned()
    }

    /// All statuses, ordered by job id.
    pub fn get_all_status(&self) -> Vec<JobStatus> {
        let mut all: Vec<_> = self.read().values().cloned().collect();
        all.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        all
    }

    pub fn is_running(&self, job_id: &str) -> bool {
        self.read().get(job_id).map(|s| s.is_running).unwrap_or(false)
    }

    pub fn is_registered(&self, job_id: &str) -> bool {
        self.read().contains_key(job_id)
    }

    pub fn job_count(&self) -> usize {
        self.read().len()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, JobStatus>> {
        self.jobs.read().unwrap_or_else(|e| e.into_inner())
    }

    fn update(&self, job_id: &str, f: impl FnOnce(&mut JobStatus)) {
        let mut jobs = self.jobs.write().unwrap_or_else(|e| e.into_inner());
        if let Some(status) = jobs.get_mut(job_id) {
            f(status);
        }
    }
}
