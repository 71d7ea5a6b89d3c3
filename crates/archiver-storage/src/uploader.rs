//! Durable upload of a local artifact.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::{ObjectSink, RetryError, RetryPolicy, StorageError};

/// Outcome of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub key: String,
    pub attempts: u32,
    pub bytes: u64,
    pub e_tag: Option<String>,
}

/// Content type derived from the artifact extension.
pub fn content_type_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("json") => "application/json",
        _ => "application/gzip",
    }
}

/// Uploads files through an [`ObjectSink`] under a [`RetryPolicy`].
///
/// Each attempt reads the file again from disk, so an interrupted read
/// never leaks into the next attempt.
pub struct DurableUploader {
    sink: Arc<dyn ObjectSink>,
    policy: RetryPolicy,
}

impl DurableUploader {
    pub fn new(sink: Arc<dyn ObjectSink>, policy: RetryPolicy) -> Self {
        Self { sink, policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Upload `path` under `key`. `document_count` is only used for logging.
    pub async fn upload(
        &self,
        path: &Path,
        key: &str,
        document_count: u64,
        cancel: &CancellationToken,
    ) -> Result<UploadReceipt, StorageError> {
        let size = tokio::fs::metadata(path)
            .await
            .map_err(|e| StorageError::io(path, e))?
            .len();
        let content_type = content_type_for(path);

        info!(
            path = %path.display(),
            documents = document_count,
            bytes = size,
            "Uploading to s3://{}/{}",
            self.sink.bucket(),
            key
        );

        let result = self
            .policy
            .run_if("upload", cancel, StorageError::is_retryable, |attempt| async move {
                let body = tokio::fs::read(path)
                    .await
                    .map_err(|e| StorageError::io(path, e))?;
                let receipt = self
                    .sink
                    .put_object(key, Bytes::from(body), content_type, cancel)
                    .await?;
                Ok::<_, StorageError>((attempt, receipt))
            })
            .await;

        match result {
            Ok((attempts, receipt)) => {
                info!(
                    documents = document_count,
                    attempts,
                    etag = receipt.e_tag.as_deref().unwrap_or(""),
                    "Successfully uploaded to {}/{}",
                    self.sink.bucket(),
                    key
                );
                Ok(UploadReceipt {
                    key: key.to_string(),
                    attempts,
                    bytes: size,
                    e_tag: receipt.e_tag,
                })
            }
            Err(RetryError::Exhausted { attempts, last, .. }) => Err(StorageError::Exhausted {
                attempts,
                source: Box::new(last),
            }),
            Err(RetryError::Permanent { last, .. }) => Err(last),
            Err(RetryError::Cancelled { .. }) => Err(StorageError::Cancelled),
        }
    }
}
