//! Error type for backup and cleanup runs.

use std::path::PathBuf;

use thiserror::Error;

use archiver_search::SearchError;
use archiver_storage::StorageError;

#[derive(Debug, Error)]
pub enum BackupError {
    #[error("Invalid interval: {0} hours (expected 1..=24)")]
    InvalidInterval(u32),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode JSON from {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to upload to S3: {0}")]
    Upload(#[from] StorageError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),

    #[error("delete by query failed: {0}")]
    DeleteByQuery(#[source] SearchError),

    #[error("Blocking task failed: {0}")]
    Task(String),

    #[error("Run cancelled")]
    Cancelled,
}

impl BackupError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            BackupError::Cancelled
                | BackupError::Search(SearchError::Cancelled)
                | BackupError::DeleteByQuery(SearchError::Cancelled)
                | BackupError::Upload(StorageError::Cancelled)
        )
    }
}

impl From<tokio::task::JoinError> for BackupError {
    fn from(err: tokio::task::JoinError) -> Self {
        BackupError::Task(err.to_string())
    }
}
