//! Command implementations for the index archiver.
//!
//! Handles:
//! - start: run the scheduler until a termination signal
//! - backup / cleanup: one-shot runs of a configured job
//! - plan: print the window plan of a day
//! - config: print the effective configuration

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use archiver_backup::{
    plan_windows, validate_interval, yesterday, BackupOutcome, BackupService, CleanupService,
};
use archiver_scheduler::jobs::{register_backup_job, register_cleanup_job};
use archiver_scheduler::{JobLocks, SchedulerConfig, SchedulerService};
use archiver_search::{OpenSearchClient, SearchIndex};
use archiver_storage::{DurableUploader, RetryPolicy, S3Sink};
use archiver_types::{LogFormat, Settings};

/// Load and validate settings, applying the CLI log level override.
pub fn load_settings(config_path: Option<&str>, log_level: Option<&str>) -> Result<Settings> {
    let mut settings = Settings::load(config_path).context("Failed to load configuration")?;
    if let Some(level) = log_level {
        settings.log_level = level.to_string();
    }
    settings.validate().context("Invalid configuration")?;
    Ok(settings)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_target(false)
            .try_init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };
    result.map_err(|e| anyhow::anyhow!("Failed to set tracing subscriber: {}", e))
}

fn work_dir(settings: &Settings) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&settings.work_dir).into_owned())
}

fn retry_policy(settings: &Settings) -> RetryPolicy {
    RetryPolicy::linear(
        settings.upload.max_attempts,
        Duration::from_secs(settings.upload.base_delay_secs),
    )
}

fn search_client(settings: &Settings) -> Result<Arc<dyn SearchIndex>> {
    let client =
        OpenSearchClient::new(&settings.opensearch).context("Failed to create OpenSearch client")?;
    Ok(Arc::new(client))
}

/// Build the backup service, probing the bucket once (warn-only).
async fn backup_service(
    settings: &Settings,
    search: Arc<dyn SearchIndex>,
) -> Result<Arc<BackupService>> {
    let sink = S3Sink::from_settings(&settings.s3).context("Failed to create S3 client")?;
    sink.log_bucket_status().await;

    let uploader = DurableUploader::new(Arc::new(sink), retry_policy(settings));
    let work_dir = work_dir(settings);
    std::fs::create_dir_all(&work_dir)
        .with_context(|| format!("Failed to create work directory {}", work_dir.display()))?;

    Ok(Arc::new(BackupService::new(search, uploader, work_dir)))
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}

/// Cancel `token` when a termination signal arrives.
fn cancel_on_signal(token: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        token.cancel();
    });
}

/// Run the scheduler until SIGINT/SIGTERM, then shut down gracefully.
pub async fn start_daemon(config_path: Option<&str>, log_level: Option<&str>) -> Result<()> {
    let settings = load_settings(config_path, log_level)?;
    init_logging(&settings.log_level, settings.log_format)?;

    info!("Index archiver starting...");
    info!(config = %settings.redacted(), "Effective configuration");

    let search = search_client(&settings)?;
    let cleanup = Arc::new(CleanupService::new(search.clone()));
    let backup = if settings.backup_jobs.is_empty() {
        None
    } else {
        Some(backup_service(&settings, search.clone()).await?)
    };

    let shutdown = CancellationToken::new();
    let mut scheduler = SchedulerService::new(
        SchedulerConfig::from(&settings.scheduler),
        JobLocks::from_jobs(&settings.jobs()),
        shutdown.clone(),
    )
    .await
    .context("Failed to create scheduler")?;

    for job in &settings.cleanup_jobs {
        register_cleanup_job(&scheduler, cleanup.clone(), job.clone())
            .await
            .with_context(|| format!("Failed to register cleanup job for {}", job.index_name))?;
    }
    if let Some(backup) = &backup {
        for job in &settings.backup_jobs {
            register_backup_job(&scheduler, backup.clone(), job.clone())
                .await
                .with_context(|| format!("Failed to register backup job for {}", job.index_name))?;
        }
    }

    if settings.cleanup_jobs.is_empty() && settings.backup_jobs.is_empty() {
        warn!("No jobs configured; the scheduler will stay idle");
    }

    scheduler.start().await.context("Failed to start scheduler")?;
    info!("Scheduler running. Press Ctrl+C to stop.");

    shutdown_signal().await;

    scheduler
        .shutdown()
        .await
        .context("Failed to shut down scheduler")?;
    info!("Index archiver stopped");
    Ok(())
}

/// Run the configured backup job of `index` once.
pub async fn run_backup(
    config_path: Option<&str>,
    log_level: Option<&str>,
    index: &str,
    date: Option<NaiveDate>,
) -> Result<()> {
    let settings = load_settings(config_path, log_level)?;
    init_logging(&settings.log_level, settings.log_format)?;

    let job = settings
        .backup_job(index)
        .with_context(|| format!("No backup job configured for index '{}'", index))?
        .clone();
    let day = date.unwrap_or_else(yesterday);

    let search = search_client(&settings)?;
    let service = backup_service(&settings, search).await?;

    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone());

    let outcome = service
        .run(&job, day, &cancel)
        .await
        .with_context(|| format!("Backup of {} for {} failed", index, day))?;

    match outcome {
        BackupOutcome::NoData { windows, .. } => {
            println!("No documents found for {} on {} ({} windows)", index, day, windows);
        }
        BackupOutcome::Uploaded {
            key,
            documents,
            failed_windows,
            ..
        } => {
            println!("Uploaded {} documents to {}", documents, key);
            if !failed_windows.is_empty() {
                println!("Skipped windows: {:?}", failed_windows);
            }
        }
    }
    Ok(())
}

/// Run the configured cleanup job of `index` once.
pub async fn run_cleanup(
    config_path: Option<&str>,
    log_level: Option<&str>,
    index: &str,
) -> Result<()> {
    let settings = load_settings(config_path, log_level)?;
    init_logging(&settings.log_level, settings.log_format)?;

    let job = settings
        .cleanup_job(index)
        .with_context(|| format!("No cleanup job configured for index '{}'", index))?
        .clone();

    let service = CleanupService::new(search_client(&settings)?);
    let cancel = CancellationToken::new();
    cancel_on_signal(cancel.clone());

    let deleted = service
        .cleanup(&job, &cancel)
        .await
        .with_context(|| format!("Cleanup of {} failed", index))?;

    println!("Deleted {} documents from {}", deleted, index);
    Ok(())
}

/// Print the window plan for a day.
pub fn show_plan(interval: u32, date: Option<NaiveDate>) -> Result<()> {
    validate_interval(interval)?;
    let day = date.unwrap_or_else(yesterday);

    println!("Windows for {} ({}h interval):", day, interval);
    for window in plan_windows(day, interval) {
        println!("  {}", window);
    }
    Ok(())
}

/// Print the effective configuration with secrets redacted.
pub fn show_config(config_path: Option<&str>) -> Result<()> {
    let settings = Settings::load(config_path).context("Failed to load configuration")?;
    let rendered = serde_json::to_string_pretty(&settings.redacted())
        .context("Failed to render configuration")?;
    println!("{}", rendered);

    if let Err(e) = settings.validate() {
        eprintln!("Warning: configuration is not valid: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use archiver_types::BackupJob;

    #[test]
    fn test_work_dir_expands_tilde() {
        let settings = Settings {
            work_dir: "~/archiver-work".to_string(),
            ..Default::default()
        };
        let dir = work_dir(&settings);
        assert!(!dir.to_string_lossy().starts_with('~'));
        assert!(dir.ends_with("archiver-work"));
    }

    #[test]
    fn test_retry_policy_from_settings() {
        let mut settings = Settings::default();
        settings.upload.max_attempts = 5;
        settings.upload.base_delay_secs = 1;
        let policy = retry_policy(&settings);
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.base_delay, Duration::from_secs(1));
    }

    #[test]
    fn test_show_plan_rejects_bad_interval() {
        assert!(show_plan(0, None).is_err());
        assert!(show_plan(25, None).is_err());
        assert!(show_plan(6, NaiveDate::from_ymd_opt(2024, 3, 1)).is_ok());
    }

    #[tokio::test]
    async fn test_backup_service_requires_bucket() {
        let mut settings = Settings::default();
        settings.backup_jobs.push(BackupJob {
            index_name: "logs".to_string(),
            schedule: "0 1 * * *".to_string(),
            interval_hours: 6,
            s3_path: String::new(),
            request_interval_seconds: 0,
        });
        let search = search_client(&settings).unwrap();
        let err = backup_service(&settings, search).await.err().unwrap();
        assert!(err.to_string().contains("S3"));
    }

    #[test]
    fn test_load_settings_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "cleanup_jobs:\n  - index_name: logs\n    retention_days: 30\n    schedule: \"0 3 * * *\"\n",
        )
        .unwrap();

        let settings = load_settings(path.to_str(), Some("debug")).unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.cleanup_jobs.len(), 1);
        assert_eq!(settings.cleanup_jobs[0].retention_days, 30);
    }
}
