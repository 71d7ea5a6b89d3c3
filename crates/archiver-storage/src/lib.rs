//! Object storage delivery for archive artifacts.
//!
//! - [`ObjectSink`]: the put-object seam (bucket-scoped)
//! - [`S3Sink`]: `object_store`-backed implementation for S3 and MinIO
//! - [`RetryPolicy`]: bounded attempts with linear backoff, reusable by any
//!   collaborator call
//! - [`DurableUploader`]: uploads a local file through a sink under a policy

mod error;
mod mock;
mod retry;
mod s3;
mod uploader;

pub use error::StorageError;
pub use mock::{MockObjectSink, RecordedPut};
pub use retry::{LinearBackoff, RetryError, RetryPolicy};
pub use s3::S3Sink;
pub use uploader::{content_type_for, DurableUploader, UploadReceipt};

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

/// Acknowledgement of a successful object write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PutReceipt {
    pub e_tag: Option<String>,
    pub version: Option<String>,
}

/// Destination for archive objects inside one bucket.
#[async_trait]
pub trait ObjectSink: Send + Sync {
    /// Bucket (or container) objects are written to.
    fn bucket(&self) -> &str;

    /// Write `body` under `key`. The store is assumed to apply the write atomically.
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<PutReceipt, StorageError>;

    /// Probe that the bucket exists and is readable with the configured credentials.
    async fn check_bucket(&self) -> Result<(), StorageError>;
}
