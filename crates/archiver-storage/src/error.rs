//! Error type for object storage operations.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Invalid storage configuration: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Object store error: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Object store rejected the write: {0}")]
    Rejected(String),

    #[error("failed to upload file after {attempts} attempts: {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: Box<StorageError>,
    },

    #[error("Upload cancelled")]
    Cancelled,
}

impl StorageError {
    /// Whether another attempt could succeed. Local file errors and bad keys
    /// fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            StorageError::Io { .. }
                | StorageError::InvalidKey { .. }
                | StorageError::Config(_)
                | StorageError::Cancelled
        )
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
