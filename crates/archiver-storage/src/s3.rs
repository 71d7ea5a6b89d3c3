//! S3 / MinIO sink built on `object_store`.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use secrecy::ExposeSecret;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use archiver_types::StorageSettings;

use crate::{ObjectSink, PutReceipt, StorageError};

const DEFAULT_REGION: &str = "us-east-1";

/// Object sink writing into a single bucket.
pub struct S3Sink {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl S3Sink {
    /// Wrap an existing store (any `object_store` backend).
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    /// Build an S3 client from connection settings.
    ///
    /// An empty endpoint targets AWS S3. A bare `host:port` endpoint gets
    /// its scheme from `use_ssl`, and custom endpoints use path-style
    /// requests as MinIO expects.
    pub fn from_settings(settings: &StorageSettings) -> Result<Self, StorageError> {
        if settings.bucket.trim().is_empty() {
            return Err(StorageError::Config("bucket is not set".to_string()));
        }

        let region = settings
            .region
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or(DEFAULT_REGION);

        let mut builder = AmazonS3Builder::new()
            .with_bucket_name(&settings.bucket)
            .with_region(region);

        let endpoint = endpoint_url(&settings.endpoint, settings.use_ssl);
        if let Some(url) = &endpoint {
            builder = builder
                .with_endpoint(url)
                .with_virtual_hosted_style_request(false);
        }

        if !settings.use_ssl {
            builder = builder.with_allow_http(true);
        }

        if let Some(key_id) = settings.access_key_id.as_deref().filter(|k| !k.is_empty()) {
            builder = builder.with_access_key_id(key_id);
        }
        if let Some(secret) = &settings.secret_access_key {
            builder = builder.with_secret_access_key(secret.expose_secret());
        }

        let store = builder
            .build()
            .map_err(|e| StorageError::Config(format!("S3: {}", e)))?;

        info!(
            endpoint = endpoint.as_deref().unwrap_or("aws"),
            bucket = %settings.bucket,
            region,
            use_ssl = settings.use_ssl,
            "Initialized S3 client"
        );

        Ok(Self::new(Arc::new(store), settings.bucket.clone()))
    }

    /// Probe the bucket once, logging instead of failing.
    pub async fn log_bucket_status(&self) {
        match self.check_bucket().await {
            Ok(()) => info!(bucket = %self.bucket, "Successfully connected to bucket"),
            Err(e) => warn!(
                bucket = %self.bucket,
                error = %e,
                "Bucket does not exist or is not accessible"
            ),
        }
    }
}

fn endpoint_url(endpoint: &str, use_ssl: bool) -> Option<String> {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.is_empty() {
        return None;
    }
    if endpoint.contains("://") {
        Some(endpoint.to_string())
    } else {
        let scheme = if use_ssl { "https" } else { "http" };
        Some(format!("{}://{}", scheme, endpoint))
    }
}

#[async_trait]
impl ObjectSink for S3Sink {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        cancel: &CancellationToken,
    ) -> Result<PutReceipt, StorageError> {
        let location = ObjectPath::parse(key).map_err(|e| StorageError::InvalidKey {
            key: key.to_string(),
            reason: e.to_string(),
        })?;

        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, content_type.to_string().into());
        let options = PutOptions {
            attributes,
            ..Default::default()
        };

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(StorageError::Cancelled),
            result = self.store.put_opts(&location, PutPayload::from(body), options) => result?,
        };

        Ok(PutReceipt {
            e_tag: result.e_tag,
            version: result.version,
        })
    }

    async fn check_bucket(&self) -> Result<(), StorageError> {
        self.store.list_with_delimiter(None).await?;
        Ok(())
    }
}
