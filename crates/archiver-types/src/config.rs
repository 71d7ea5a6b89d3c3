//! Configuration loading for the index archiver.
//!
//! Layered config, later sources override earlier ones:
//! 1. Built-in defaults
//! 2. Default config file (`<config dir>/index-archiver/config.{yaml,toml,json}`)
//! 3. File named by `CONFIG_PATH`
//! 4. CLI-specified config file
//! 5. Connection variables (`OPENSEARCH_*`, `S3_*`)
//! 6. Prefixed environment (`ARCHIVER__S3__BUCKET`, `ARCHIVER__WORK_DIR`, ...)
//!
//! CLI flags are applied by the caller after loading.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use config::{Config, Environment, File};
use directories::ProjectDirs;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ConfigError;
use crate::job::{BackupJob, CleanupJob, JobDefinition};

/// Connection parameters for the search cluster.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    /// Node URLs, tried in order
    #[serde(default = "default_addresses")]
    pub addresses: Vec<String>,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<SecretString>,

    /// PEM bundle trusted for TLS connections to the cluster
    #[serde(default)]
    pub cert_path: Option<String>,

    /// Deadline for a single index request
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_addresses() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}

fn default_request_timeout() -> u64 {
    300
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            addresses: default_addresses(),
            username: None,
            password: None,
            cert_path: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl SearchSettings {
    /// Basic credentials, if a non-empty username is configured.
    pub fn credentials(&self) -> Option<(&str, Option<&str>)> {
        let username = self.username.as_deref().filter(|u| !u.is_empty())?;
        let password = self
            .password
            .as_ref()
            .map(|p| p.expose_secret())
            .filter(|p| !p.is_empty());
        Some((username, password))
    }

    pub fn cert_path(&self) -> Option<&str> {
        self.cert_path.as_deref().filter(|p| !p.is_empty())
    }
}

/// Connection parameters for S3-compatible object storage.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageSettings {
    /// Host (`minio:9000`) or full URL; empty means AWS S3
    #[serde(default)]
    pub endpoint: String,

    #[serde(default)]
    pub access_key_id: Option<String>,

    #[serde(default)]
    pub secret_access_key: Option<SecretString>,

    #[serde(default)]
    pub bucket: String,

    #[serde(default)]
    pub region: Option<String>,

    #[serde(default = "default_use_ssl")]
    pub use_ssl: bool,
}

fn default_use_ssl() -> bool {
    true
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// One JSON object per line (default)
    #[default]
    Json,
    /// Human-readable text
    Text,
}

/// Cron driver settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// IANA timezone the cron expressions are evaluated in
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Time in-flight runs get to observe cancellation on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

/// Retry settings for artifact uploads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Linear backoff unit: attempt `n` is followed by `n * base_delay_secs`
    #[serde(default = "default_base_delay")]
    pub base_delay_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> u64 {
    2
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub opensearch: SearchSettings,

    #[serde(default)]
    pub s3: StorageSettings,

    #[serde(default)]
    pub cleanup_jobs: Vec<CleanupJob>,

    #[serde(default)]
    pub backup_jobs: Vec<BackupJob>,

    /// Directory for temporary window/day artifacts
    #[serde(default = "default_work_dir")]
    pub work_dir: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub upload: UploadSettings,
}

fn default_work_dir() -> String {
    "/tmp/opensearch-backups".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            opensearch: SearchSettings::default(),
            s3: StorageSettings::default(),
            cleanup_jobs: Vec::new(),
            backup_jobs: Vec::new(),
            work_dir: default_work_dir(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            scheduler: SchedulerSettings::default(),
            upload: UploadSettings::default(),
        }
    }
}

/// Plain connection variables and the settings keys they override.
const CONNECTION_ENV: &[(&str, &str)] = &[
    ("OPENSEARCH_USERNAME", "opensearch.username"),
    ("OPENSEARCH_PASSWORD", "opensearch.password"),
    ("OPENSEARCH_CERT_PATH", "opensearch.cert_path"),
    ("S3_ENDPOINT", "s3.endpoint"),
    ("S3_ACCESS_KEY_ID", "s3.access_key_id"),
    ("S3_SECRET_ACCESS_KEY", "s3.secret_access_key"),
    ("S3_BUCKET", "s3.bucket"),
    ("S3_REGION", "s3.region"),
];

impl Settings {
    /// Load settings from the process environment and config files.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, ConfigError> {
        let env: HashMap<String, String> = std::env::vars().collect();
        Self::load_with_env(cli_config_path, env)
    }

    /// Load settings against an explicit environment snapshot.
    ///
    /// The snapshot replaces the process environment for every
    /// environment-derived source, which keeps loading deterministic.
    pub fn load_with_env(
        cli_config_path: Option<&str>,
        env: HashMap<String, String>,
    ) -> Result<Self, ConfigError> {
        let config_dir = ProjectDirs::from("", "", "index-archiver")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));
        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("work_dir", default_work_dir())?
            .set_default("log_level", default_log_level())?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = env.get("CONFIG_PATH").filter(|p| !p.is_empty()) {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // Connection variables sit below the prefixed environment.
        let mut connection: HashMap<String, String> = CONNECTION_ENV
            .iter()
            .filter_map(|(var, key)| {
                let value = env.get(*var).filter(|v| !v.is_empty())?;
                Some((env_key(key), value.clone()))
            })
            .collect();
        if let Some(addresses) = env.get("OPENSEARCH_ADDRESSES").filter(|v| !v.is_empty()) {
            connection.insert(
                env_key("opensearch.addresses"),
                split_list(addresses).join(","),
            );
        }
        builder = builder.add_source(
            Environment::default()
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("opensearch.addresses")
                .source(Some(connection)),
        );

        // Format: ARCHIVER__WORK_DIR, ARCHIVER__S3__BUCKET, ARCHIVER__OPENSEARCH__ADDRESSES=a,b
        builder = builder.add_source(
            Environment::with_prefix("ARCHIVER")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("opensearch.addresses")
                .source(Some(env)),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        Ok(settings)
    }

    /// Check everything the scheduler and pipeline rely on.
    ///
    /// Cron syntax is checked later, when jobs are registered.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.opensearch.addresses.iter().all(|a| a.trim().is_empty()) {
            return Err(ConfigError::invalid(
                "opensearch.addresses",
                "at least one address is required",
            ));
        }

        for (i, job) in self.cleanup_jobs.iter().enumerate() {
            let field = format!("cleanup_jobs[{}]", i);
            if job.index_name.trim().is_empty() {
                return Err(ConfigError::invalid(field, "index_name is empty"));
            }
            if job.retention_days == 0 {
                return Err(ConfigError::invalid(field, "retention_days must be > 0"));
            }
            if job.schedule.trim().is_empty() {
                return Err(ConfigError::invalid(field, "schedule is empty"));
            }
        }

        for (i, job) in self.backup_jobs.iter().enumerate() {
            let field = format!("backup_jobs[{}]", i);
            if job.index_name.trim().is_empty() {
                return Err(ConfigError::invalid(field, "index_name is empty"));
            }
            if !(1..=24).contains(&job.interval_hours) {
                return Err(ConfigError::invalid(
                    field,
                    format!("interval_hours must be 1..=24, got {}", job.interval_hours),
                ));
            }
            if job.schedule.trim().is_empty() {
                return Err(ConfigError::invalid(field, "schedule is empty"));
            }
        }

        if !self.backup_jobs.is_empty() && self.s3.bucket.trim().is_empty() {
            return Err(ConfigError::invalid(
                "s3.bucket",
                "a bucket is required when backup jobs are configured",
            ));
        }

        if self.upload.max_attempts == 0 {
            return Err(ConfigError::invalid(
                "upload.max_attempts",
                "must be at least 1",
            ));
        }

        let mut seen = HashSet::new();
        for job in self.jobs() {
            let id = job.job_id();
            if !seen.insert(id.clone()) {
                return Err(ConfigError::invalid(id, "job is configured twice"));
            }
        }

        Ok(())
    }

    /// All configured jobs, cleanup jobs first.
    pub fn jobs(&self) -> Vec<JobDefinition> {
        self.cleanup_jobs
            .iter()
            .cloned()
            .map(JobDefinition::Cleanup)
            .chain(self.backup_jobs.iter().cloned().map(JobDefinition::Backup))
            .collect()
    }

    pub fn backup_job(&self, index_name: &str) -> Option<&BackupJob> {
        self.backup_jobs.iter().find(|j| j.index_name == index_name)
    }

    pub fn cleanup_job(&self, index_name: &str) -> Option<&CleanupJob> {
        self.cleanup_jobs.iter().find(|j| j.index_name == index_name)
    }

    /// Effective configuration with secrets masked, for logging.
    pub fn redacted(&self) -> serde_json::Value {
        let mask = |present: bool| if present { "[REDACTED]" } else { "" };
        json!({
            "opensearch": {
                "addresses": self.opensearch.addresses,
                "username": self.opensearch.username,
                "password": mask(self.opensearch.password.is_some()),
                "cert_path": self.opensearch.cert_path,
                "request_timeout_secs": self.opensearch.request_timeout_secs,
            },
            "s3": {
                "endpoint": self.s3.endpoint,
                "access_key_id": self.s3.access_key_id,
                "secret_access_key": mask(self.s3.secret_access_key.is_some()),
                "bucket": self.s3.bucket,
                "region": self.s3.region,
                "use_ssl": self.s3.use_ssl,
            },
            "cleanup_jobs": self.cleanup_jobs,
            "backup_jobs": self.backup_jobs,
            "work_dir": self.work_dir,
            "log_level": self.log_level,
            "log_format": self.log_format,
            "scheduler": self.scheduler,
            "upload": self.upload,
        })
    }
}

/// `s3.bucket` -> `S3__BUCKET`
fn env_key(key: &str) -> String {
    key.replace('.', "__").to_uppercase()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_YAML: &str = r#"
opensearch:
  addresses: ["https://search-1:9200", "https://search-2:9200"]
  username: admin
  password: hunter2
s3:
  endpoint: minio:9000
  access_key_id: AKIA
  secret_access_key: shh
  bucket: archives
  use_ssl: false
cleanup_jobs:
  - index_name: logs-app
    retention_days: 30
    schedule: "0 3 * * *"
backup_jobs:
  - index_name: logs-app
    schedule: "0 1 * * *"
    interval_hours: 4
    s3_path: daily/logs-app
    request_interval_seconds: 10
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.work_dir, "/tmp/opensearch-backups");
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.log_format, LogFormat::Json);
        assert_eq!(settings.upload.max_attempts, 3);
        assert_eq!(settings.upload.base_delay_secs, 2);
        assert_eq!(settings.scheduler.timezone, "UTC");
        assert!(settings.s3.use_ssl);
    }

    #[test]
    fn test_load_from_yaml_file() {
        let file = write_config(SAMPLE_YAML);
        let path = file.path().to_string_lossy().to_string();

        let settings = Settings::load_with_env(Some(&path), HashMap::new()).unwrap();

        assert_eq!(settings.opensearch.addresses.len(), 2);
        assert_eq!(settings.opensearch.credentials(), Some(("admin", Some("hunter2"))));
        assert_eq!(settings.s3.bucket, "archives");
        assert!(!settings.s3.use_ssl);
        assert_eq!(settings.cleanup_jobs[0].retention_days, 30);
        assert_eq!(settings.backup_jobs[0].interval_hours, 4);
        assert_eq!(settings.backup_jobs[0].request_interval_seconds, 10);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_connection_env_overrides_file() {
        let file = write_config(SAMPLE_YAML);
        let path = file.path().to_string_lossy().to_string();
        let env = HashMap::from([
            ("OPENSEARCH_USERNAME".to_string(), "reader".to_string()),
            (
                "OPENSEARCH_ADDRESSES".to_string(),
                "https://a:9200, https://b:9200".to_string(),
            ),
            ("S3_BUCKET".to_string(), "other".to_string()),
            ("S3_REGION".to_string(), String::new()),
        ]);

        let settings = Settings::load_with_env(Some(&path), env).unwrap();

        assert_eq!(settings.opensearch.username.as_deref(), Some("reader"));
        assert_eq!(
            settings.opensearch.addresses,
            vec!["https://a:9200".to_string(), "https://b:9200".to_string()]
        );
        assert_eq!(settings.s3.bucket, "other");
        // Empty variables do not override
        assert_eq!(settings.s3.region, None);
    }

    #[test]
    fn test_prefixed_env_overrides() {
        let file = write_config(SAMPLE_YAML);
        let path = file.path().to_string_lossy().to_string();
        let env = HashMap::from([
            ("ARCHIVER__WORK_DIR".to_string(), "/var/tmp/arch".to_string()),
            ("ARCHIVER__UPLOAD__MAX_ATTEMPTS".to_string(), "5".to_string()),
        ]);

        let settings = Settings::load_with_env(Some(&path), env).unwrap();

        assert_eq!(settings.work_dir, "/var/tmp/arch");
        assert_eq!(settings.upload.max_attempts, 5);
    }

    #[test]
    fn test_prefixed_env_beats_connection_env() {
        let file = write_config(SAMPLE_YAML);
        let path = file.path().to_string_lossy().to_string();
        let env = HashMap::from([
            ("S3_BUCKET".to_string(), "from-plain".to_string()),
            ("ARCHIVER__S3__BUCKET".to_string(), "from-prefixed".to_string()),
            ("OPENSEARCH_PASSWORD".to_string(), "123456".to_string()),
        ]);

        let settings = Settings::load_with_env(Some(&path), env).unwrap();

        assert_eq!(settings.s3.bucket, "from-prefixed");
        assert_eq!(
            settings.opensearch.credentials(),
            Some(("admin", Some("123456")))
        );
    }

    #[test]
    fn test_missing_cli_file_is_an_error() {
        let result = Settings::load_with_env(Some("/nonexistent/archiver.yaml"), HashMap::new());
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_validate_rejects_bad_interval() {
        let mut settings = Settings::default();
        settings.s3.bucket = "archives".to_string();
        settings.backup_jobs.push(BackupJob {
            index_name: "idx".to_string(),
            schedule: "0 1 * * *".to_string(),
            interval_hours: 0,
            s3_path: String::new(),
            request_interval_seconds: 0,
        });
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::Invalid { .. })
        ));

        settings.backup_jobs[0].interval_hours = 25;
        assert!(settings.validate().is_err());

        settings.backup_jobs[0].interval_hours = 5;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_validate_requires_bucket_for_backups() {
        let mut settings = Settings::default();
        settings.backup_jobs.push(BackupJob {
            index_name: "idx".to_string(),
            schedule: "0 1 * * *".to_string(),
            interval_hours: 6,
            s3_path: String::new(),
            request_interval_seconds: 0,
        });
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("s3.bucket"));
    }

    #[test]
    fn test_validate_rejects_zero_retention_and_duplicates() {
        let mut settings = Settings::default();
        let job = CleanupJob {
            index_name: "idx".to_string(),
            retention_days: 0,
            schedule: "0 3 * * *".to_string(),
        };
        settings.cleanup_jobs.push(job.clone());
        assert!(settings.validate().is_err());

        settings.cleanup_jobs[0].retention_days = 7;
        settings.cleanup_jobs.push(CleanupJob {
            retention_days: 7,
            ..job
        });
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("cleanup:idx"));
    }

    #[test]
    fn test_redacted_hides_secrets() {
        let file = write_config(SAMPLE_YAML);
        let path = file.path().to_string_lossy().to_string();
        let settings = Settings::load_with_env(Some(&path), HashMap::new()).unwrap();

        let rendered = settings.redacted().to_string();
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("shh"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(rendered.contains("archives"));
    }

    #[test]
    fn test_jobs_lookup() {
        let file = write_config(SAMPLE_YAML);
        let path = file.path().to_string_lossy().to_string();
        let settings = Settings::load_with_env(Some(&path), HashMap::new()).unwrap();

        assert_eq!(settings.jobs().len(), 2);
        assert!(settings.backup_job("logs-app").is_some());
        assert!(settings.cleanup_job("logs-app").is_some());
        assert!(settings.backup_job("missing").is_none());
    }
}
