//! Scriptable object sink for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{ObjectSink, PutReceipt, StorageError};

/// A put attempt observed by [`MockObjectSink`].
#[derive(Debug, Clone)]
pub struct RecordedPut {
    pub key: String,
    pub content_type: String,
    pub length: usize,
    pub at: Instant,
    pub succeeded: bool,
}

/// Sink that fails a configured number of puts before accepting writes.
pub struct MockObjectSink {
    bucket: String,
    failures_remaining: Mutex<u32>,
    puts: Mutex<Vec<RecordedPut>>,
    objects: Mutex<HashMap<String, Bytes>>,
}

impl MockObjectSink {
    pub fn new() -> Self {
        Self::failing_first(0)
    }

    /// Reject the first `failures` puts.
    pub fn failing_first(failures: u32) -> Self {
        Self {
            bucket: "mock-bucket".to_string(),
            failures_remaining: Mutex::new(failures),
            puts: Mutex::new(Vec::new()),
            objects: Mutex::new(HashMap::new()),
        }
    }

    /// Reject every put.
    pub fn always_failing() -> Self {
        Self::failing_first(u32::MAX)
    }

    pub fn puts(&self) -> Vec<RecordedPut> {
        self.puts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn object(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).get(key).cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for MockObjectSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ObjectSink for MockObjectSink {
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
        if cancel.is_cancelled() {
            return Err(StorageError::Cancelled);
        }

        let attempt_number = self.puts.lock().unwrap_or_else(|e| e.into_inner()).len() + 1;
        let fail = {
            let mut remaining = self.failures_remaining.lock().unwrap_or_else(|e| e.into_inner());
            if *remaining > 0 {
                *remaining -= 1;
                true
            } else {
                false
            }
        };

        self.puts.lock().unwrap_or_else(|e| e.into_inner()).push(RecordedPut {
            key: key.to_string(),
            content_type: content_type.to_string(),
            length: body.len(),
            at: Instant::now(),
            succeeded: !fail,
        });

        if fail {
            return Err(StorageError::Rejected(format!(
                "injected failure on put #{}",
                attempt_number
            )));
        }

        self.objects.lock().unwrap_or_else(|e| e.into_inner()).insert(key.to_string(), body);
        Ok(PutReceipt {
            e_tag: Some(format!("etag-{}", attempt_number)),
            version: None,
        })
    }

    async fn check_bucket(&self) -> Result<(), StorageError> {
        Ok(())
    }
}
