//! Job definitions.
//!
//! Jobs are loaded once from configuration and never mutated afterwards.
//! Each job targets a single index; its identity (`job_id`) combines the
//! job kind with the index name so a cleanup and a backup of the same index
//! are independent for single-flight purposes.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Kind of scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Cleanup,
    Backup,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::Cleanup => write!(f, "cleanup"),
            JobKind::Backup => write!(f, "backup"),
        }
    }
}

/// Purge documents older than `retention_days` from an index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupJob {
    pub index_name: String,
    pub retention_days: u32,
    /// Cron expression (5-field classic or 6-field with seconds)
    pub schedule: String,
}

impl CleanupJob {
    pub fn job_id(&self) -> String {
        format!("{}:{}", JobKind::Cleanup, self.index_name)
    }
}

/// Archive one day of an index to object storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupJob {
    pub index_name: String,
    /// Cron expression (5-field classic or 6-field with seconds)
    pub schedule: String,
    /// Size of each query window in hours (1..=24)
    pub interval_hours: u32,
    /// Key prefix inside the bucket
    #[serde(default)]
    pub s3_path: String,
    /// Pause between two window queries
    #[serde(default)]
    pub request_interval_seconds: u64,
}

impl BackupJob {
    pub fn job_id(&self) -> String {
        format!("{}:{}", JobKind::Backup, self.index_name)
    }

    /// Pause applied between consecutive window queries.
    pub fn pacing(&self) -> Duration {
        Duration::from_secs(self.request_interval_seconds)
    }

    /// Object key for an artifact file name under this job's prefix.
    ///
    /// ```
    /// use archiver_types::BackupJob;
    ///
    /// let job = BackupJob {
    ///     index_name: "logs".into(),
    ///     schedule: "0 1 * * *".into(),
    ///     interval_hours: 6,
    ///     s3_path: "/backups/logs/".into(),
    ///     request_interval_seconds: 0,
    /// };
    /// assert_eq!(job.object_key("01-02-24-logs.json.gz"), "backups/logs/01-02-24-logs.json.gz");
    /// ```
    pub fn object_key(&self, file_name: &str) -> String {
        let prefix = self.s3_path.trim_matches('/');
        if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", prefix, file_name)
        }
    }
}

/// A configured job of either kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobDefinition {
    Cleanup(CleanupJob),
    Backup(BackupJob),
}

impl JobDefinition {
    pub fn kind(&self) -> JobKind {
        match self {
            JobDefinition::Cleanup(_) => JobKind::Cleanup,
            JobDefinition::Backup(_) => JobKind::Backup,
        }
    }

    pub fn job_id(&self) -> String {
        match self {
            JobDefinition::Cleanup(job) => job.job_id(),
            JobDefinition::Backup(job) => job.job_id(),
        }
    }

    pub fn index_name(&self) -> &str {
        match self {
            JobDefinition::Cleanup(job) => &job.index_name,
            JobDefinition::Backup(job) => &job.index_name,
        }
    }

    pub fn schedule(&self) -> &str {
        match self {
            JobDefinition::Cleanup(job) => &job.schedule,
            JobDefinition::Backup(job) => &job.schedule,
        }
    }
}
