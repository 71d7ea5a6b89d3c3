//! Job scheduler for the index archiver.
//!
//! Wraps `tokio-cron-scheduler` with:
//! - 5-field cron normalisation and timezone-aware firing
//! - single-flight per job identity: a firing while the previous run of the
//!   same job is still active is skipped and recorded, never queued
//! - a [`JobRegistry`] with per-job status for observability
//! - graceful shutdown: cancel the shared token, stop firing, wait for
//!   in-flight runs up to a timeout
//!
//! # Example
//!
//! ```ignore
//! let locks = JobLocks::from_jobs(&settings.jobs());
//! let scheduler = SchedulerService::new(config, locks, shutdown.clone()).await?;
//!
//! scheduler
//!     .register_job("backup:logs", "0 1 * * *", |cancel| async move {
//!         run_backup(cancel).await
//!     })
//!     .await?;
//!
//! scheduler.start().await?;
//! ```

mod config;
mod error;
pub mod jobs;
mod overlap;
mod registry;
mod scheduler;

pub use config::SchedulerConfig;
pub use error::SchedulerError;
pub use overlap::{JobLocks, OverlapGuard, RunGuard};
pub use registry::{JobOutput, JobRegistry, JobResult, JobStatus};
pub use scheduler::{normalize_cron, validate_cron_expression, FireOutcome, SchedulerService};
