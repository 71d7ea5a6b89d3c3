//! Scheduler service wrapper around tokio-cron-scheduler.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use chrono_tz::Tz;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::{JobLocks, JobOutput, JobRegistry, JobResult, OverlapGuard, RunGuard};
use crate::{SchedulerConfig, SchedulerError};

type JobFuture = Pin<Box<dyn Future<Output = Result<JobOutput, String>> + Send>>;
type JobFn = Arc<dyn Fn(CancellationToken) -> JobFuture + Send + Sync>;

/// Convert a classic 5-field cron expression to the 6-field form with seconds.
///
/// Any other field count is returned unchanged and left to validation.
///
/// ```
/// use archiver_scheduler::normalize_cron;
///
/// assert_eq!(normalize_cron("30 1 * * *"), "0 30 1 * * *");
/// assert_eq!(normalize_cron("0 30 1 * * *"), "0 30 1 * * *");
/// ```
pub fn normalize_cron(expr: &str) -> String {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    if parts.len() == 5 {
        format!("0 {}", parts.join(" "))
    } else {
        parts.join(" ")
    }
}

/// Validate a cron expression (5 or 6 fields).
///
/// ```
/// use archiver_scheduler::validate_cron_expression;
///
/// assert!(validate_cron_expression("0 1 * * *").is_ok());
/// assert!(validate_cron_expression("0 0 1 * * *").is_ok());
/// assert!(validate_cron_expression("every day").is_err());
/// assert!(validate_cron_expression("").is_err());
/// ```
pub fn validate_cron_expression(expr: &str) -> Result<(), SchedulerError> {
    let normalized = normalize_cron(expr);
    if normalized.is_empty() {
        return Err(SchedulerError::InvalidCron("empty expression".to_string()));
    }
    Job::new_async(normalized.as_str(), |_uuid, _lock| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| SchedulerError::InvalidCron(format!("'{}': {}", expr, e)))
}

/// What a single firing did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireOutcome {
    Started,
    /// The previous run of this job still holds its guard
    Skipped,
    /// Shutdown has begun; no new runs are accepted
    ShuttingDown,
}

/// One registered job: its guard, its body and the shared plumbing.
struct JobRunner {
    job_id: String,
    guard: Arc<OverlapGuard>,
    registry: Arc<JobRegistry>,
    tracker: TaskTracker,
    token: CancellationToken,
    job_fn: JobFn,
}

impl JobRunner {
    fn fire(self: &Arc<Self>) -> FireOutcome {
        if self.token.is_cancelled() {
            return FireOutcome::ShuttingDown;
        }

        let Some(run_guard) = self.guard.try_acquire() else {
            warn!(job = %self.job_id, "Job is already running, skipping this execution");
            self.registry
                .record_skipped(&self.job_id, "previous run still active");
            return FireOutcome::Skipped;
        };

        let runner = Arc::clone(self);
        self.tracker.spawn(async move { runner.execute(run_guard).await });
        FireOutcome::Started
    }

    async fn execute(&self, _run_guard: RunGuard) {
        info!(job = %self.job_id, "Job started");
        self.registry.record_start(&self.job_id);
        let start = Instant::now();

        let result = (self.job_fn)(self.token.clone()).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(output) => {
                info!(job = %self.job_id, duration_ms, "Job completed");
                self.registry.record_complete_with_metadata(
                    &self.job_id,
                    JobResult::Success,
                    duration_ms,
                    output.metadata,
                );
            }
            Err(message) => {
                error!(job = %self.job_id, duration_ms, error = %message, "Job failed");
                self.registry.record_complete(
                    &self.job_id,
                    JobResult::Failed(message),
                    duration_ms,
                );
            }
        }
    }
}

/// Cron driver with per-job single-flight and graceful shutdown.
pub struct SchedulerService {
    scheduler: JobScheduler,
    config: SchedulerConfig,
    shutdown_token: CancellationToken,
    tracker: TaskTracker,
    registry: Arc<JobRegistry>,
    locks: JobLocks,
    runners: RwLock<HashMap<String, Arc<JobRunner>>>,
    is_running: AtomicBool,
}

impl SchedulerService {
    /// Create a scheduler (not started).
    ///
    /// `locks` fixes the set of jobs that may be registered. `shutdown_token`
    /// is handed to every run and cancelled on shutdown.
    pub async fn new(
        config: SchedulerConfig,
        locks: JobLocks,
        shutdown_token: CancellationToken,
    ) -> Result<Self, SchedulerError> {
        config.parse_timezone()?;
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            config,
            shutdown_token,
            tracker: TaskTracker::new(),
            registry: Arc::new(JobRegistry::new()),
            locks,
            runners: RwLock::new(HashMap::new()),
            is_running: AtomicBool::new(false),
        })
    }

    pub async fn start(&self) -> Result<(), SchedulerError> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.scheduler.start().await?;
        info!(jobs = self.registry.job_count(), "Scheduler started");
        Ok(())
    }

    /// Stop firing, cancel in-flight runs and wait for them.
    ///
    /// Waits up to `shutdown_timeout_secs`; runs still active after that are
    /// reported and left to finish on their own.
    pub async fn shutdown(&mut self) -> Result<(), SchedulerError> {
        if !self.is_running.load(Ordering::SeqCst) {
            return Err(SchedulerError::NotRunning);
        }

        info!("Initiating scheduler shutdown");
        self.shutdown_token.cancel();

        if let Err(e) = self.scheduler.shutdown().await {
            warn!("Error during scheduler shutdown: {}", e);
        }

        self.tracker.close();
        let timeout = self.config.shutdown_timeout();
        if tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_err()
        {
            warn!(
                in_flight = self.tracker.len(),
                timeout_secs = timeout.as_secs(),
                "Shutdown timeout elapsed with jobs still running"
            );
        }

        self.is_running.store(false, Ordering::SeqCst);
        info!("Scheduler shutdown complete");
        Ok(())
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }

    pub fn registry(&self) -> Arc<JobRegistry> {
        self.registry.clone()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Number of runs currently in flight.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Register a job under `job_id` firing on `cron_expr`.
    ///
    /// `cron_expr` may have 5 or 6 fields. The job must have a lock in the
    /// scheduler's [`JobLocks`]. `job_fn` receives the shared shutdown token
    /// and reports either run metadata or an error message.
    pub async fn register_job<F, Fut>(
        &self,
        job_id: &str,
        cron_expr: &str,
        job_fn: F,
    ) -> Result<uuid::Uuid, SchedulerError>
    where
        F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<JobOutput, String>> + Send + 'static,
    {
        let tz: Tz = self.config.parse_timezone()?;
        validate_cron_expression(cron_expr)?;
        let cron = normalize_cron(cron_expr);

        let guard = self
            .locks
            .get(job_id)
            .ok_or_else(|| SchedulerError::UnknownJob(job_id.to_string()))?;

        if self.registry.is_registered(job_id) {
            return Err(SchedulerError::DuplicateJob(job_id.to_string()));
        }

        let job_fn: JobFn = Arc::new(move |token| Box::pin(job_fn(token)) as JobFuture);
        let runner = Arc::new(JobRunner {
            job_id: job_id.to_string(),
            guard,
            registry: self.registry.clone(),
            tracker: self.tracker.clone(),
            token: self.shutdown_token.clone(),
            job_fn,
        });

        let firing = runner.clone();
        let job = Job::new_async_tz(cron.as_str(), tz, move |_uuid, _lock| {
            let runner = firing.clone();
            Box::pin(async move {
                runner.fire();
            })
        })
        .map_err(|e| SchedulerError::InvalidCron(e.to_string()))?;

        let uuid = self.scheduler.add(job).await?;
        self.registry.register(job_id, &cron);
        self.runners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id.to_string(), runner);

        info!(job = %job_id, uuid = %uuid, cron = %cron, timezone = %tz.name(), "Job registered");
        Ok(uuid)
    }

    /// Fire a registered job now, outside its schedule.
    ///
    /// Subject to the same single-flight rule as scheduled firings.
    pub fn trigger(&self, job_id: &str) -> Result<FireOutcome, SchedulerError> {
        let runner = self
            .runners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(job_id)
            .cloned()
            .ok_or_else(|| SchedulerError::UnknownJob(job_id.to_string()))?;
        Ok(runner.fire())
    }

    pub fn parse_timezone(tz_str: &str) -> Result<Tz, SchedulerError> {
        tz_str
            .parse()
            .map_err(|_| SchedulerError::InvalidTimezone(tz_str.to_string()))
    }
}
