//! # archiver-types
//!
//! Shared domain types for the index archiver.
//!
//! This crate defines the data structures used throughout the system:
//! - Settings: layered configuration (defaults, files, environment)
//! - Jobs: immutable cleanup and backup job definitions
//! - Windows: millisecond-precision time windows used to bound queries
//!
//! ## Usage
//!
//! ```rust
//! use archiver_types::{BackupJob, TimeWindow};
//! ```

pub mod config;
pub mod error;
pub mod job;
pub mod window;

pub use config::{
    LogFormat, SchedulerSettings, SearchSettings, Settings, StorageSettings, UploadSettings,
};
pub use error::ConfigError;
pub use job::{BackupJob, CleanupJob, JobDefinition, JobKind};
pub use window::TimeWindow;
