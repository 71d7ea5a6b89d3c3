//! Backup pipeline and retention cleanup.
//!
//! A backup run for one index and one day:
//! - plan the day into fixed-size windows ([`plan_windows`])
//! - probe and extract each window into its own artifact, skipping failures
//! - merge surviving artifacts into one day artifact
//! - gzip the day artifact and deliver it through the durable uploader
//!
//! Every file a run creates is owned by its [`RunContext`] and removed when
//! the run ends, whatever the outcome.

mod artifact;
mod backup;
mod cleanup;
mod compress;
mod error;
mod extract;
mod merge;
mod planner;
mod run_context;

pub use artifact::{compressed_file_name, day_file_name, day_label, window_file_name};
pub use backup::{yesterday, BackupOutcome, BackupService};
pub use cleanup::CleanupService;
pub use compress::compress_artifact;
pub use error::BackupError;
pub use extract::{extract_windows, Extraction, WindowArtifact};
pub use merge::{merge_artifacts, MergedArtifact};
pub use planner::{plan_windows, validate_interval, MAX_INTERVAL_HOURS};
pub use run_context::RunContext;
