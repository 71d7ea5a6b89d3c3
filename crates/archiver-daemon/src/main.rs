//! Index Archiver
//!
//! Scheduled windowed backups of OpenSearch indices to S3-compatible storage,
//! plus retention cleanup.
//!
//! # Usage
//!
//! ```bash
//! index-archiver start [--config PATH]
//! index-archiver backup --index logs [--date 2024-03-01]
//! index-archiver cleanup --index logs
//! index-archiver plan --interval 6
//! index-archiver config
//! ```
//!
//! # Configuration
//!
//! Loaded in order (later sources override earlier):
//! 1. Built-in defaults
//! 2. Config file (~/.config/index-archiver/config.yaml, CONFIG_PATH, --config)
//! 3. Environment variables (OPENSEARCH_*, S3_*, ARCHIVER__*)
//! 4. CLI flags

use anyhow::Result;
use clap::Parser;

use archiver_daemon::{
    run_backup, run_cleanup, show_config, show_plan, start_daemon, Cli, Commands,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();
    let log_level = cli.log_level.as_deref();

    match cli.command {
        Commands::Start => {
            start_daemon(config, log_level).await?;
        }
        Commands::Backup { index, date } => {
            run_backup(config, log_level, &index, date).await?;
        }
        Commands::Cleanup { index } => {
            run_cleanup(config, log_level, &index).await?;
        }
        Commands::Plan { interval, date } => {
            show_plan(interval, date)?;
        }
        Commands::Config => {
            show_config(config)?;
        }
    }

    Ok(())
}
