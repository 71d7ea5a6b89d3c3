//! CLI argument parsing for the index archiver.
//!
//! CLI flags override every other configuration source.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// OpenSearch backup and retention manager
///
/// Archives each day of an index to S3-compatible storage and purges
/// documents past their retention period, on cron schedules.
#[derive(Parser, Debug)]
#[command(name = "index-archiver")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to config file (overrides the default location and CONFIG_PATH)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Set log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scheduler until SIGINT or SIGTERM
    Start,

    /// Run one backup job now
    Backup {
        /// Index of a configured backup job
        #[arg(long)]
        index: String,

        /// Day to archive, YYYY-MM-DD (default: yesterday, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Run one cleanup job now
    Cleanup {
        /// Index of a configured cleanup job
        #[arg(long)]
        index: String,
    },

    /// Print the query windows for a day
    Plan {
        /// Window size in hours (1-24)
        #[arg(long)]
        interval: u32,

        /// Day to plan, YYYY-MM-DD (default: yesterday, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Print the effective configuration with secrets redacted
    Config,
}
