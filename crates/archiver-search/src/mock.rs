//! Mock search index for testing.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use archiver_types::TimeWindow;

use crate::{SearchError, SearchIndex};

/// A call observed by [`MockSearchIndex`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Count { index: String, sequence: usize },
    Search { index: String, sequence: usize, size: u64 },
    Delete { index: String, retention_days: u32 },
}

/// Deterministic in-memory index keyed by window sequence number.
///
/// Windows without a configured count hold no documents. Search responses
/// are shaped like real OpenSearch responses (`hits.hits[]`), with one hit
/// per document stamped at the window start.
#[derive(Default)]
pub struct MockSearchIndex {
    counts: HashMap<usize, u64>,
    failing_counts: HashSet<usize>,
    failing_searches: HashSet<usize>,
    deleted: u64,
    fail_delete: bool,
    calls: Mutex<Vec<MockCall>>,
}

impl MockSearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place `count` documents in window `sequence`.
    pub fn with_documents(mut self, sequence: usize, count: u64) -> Self {
        self.counts.insert(sequence, count);
        self
    }

    /// Make the count probe of window `sequence` fail.
    pub fn fail_count_on(mut self, sequence: usize) -> Self {
        self.failing_counts.insert(sequence);
        self
    }

    /// Make the search of window `sequence` fail.
    pub fn fail_search_on(mut self, sequence: usize) -> Self {
        self.failing_searches.insert(sequence);
        self
    }

    /// Number of documents reported by delete-by-query.
    pub fn with_deleted(mut self, deleted: u64) -> Self {
        self.deleted = deleted;
        self
    }

    pub fn fail_delete(mut self) -> Self {
        self.fail_delete = true;
        self
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }

    /// Payload the mock returns for `window`.
    pub fn payload_for(index: &str, window: &TimeWindow, size: u64) -> Bytes {
        let hits: Vec<_> = (0..size)
            .map(|i| {
                json!({
                    "_index": index,
                    "_id": format!("{}-{}", window.sequence, i),
                    "_source": {
                        "@timestamp": window.start_rfc3339(),
                        "message": format!("document {} of window {}", i, window.sequence),
                    }
                })
            })
            .collect();
        let body = json!({
            "took": 1,
            "timed_out": false,
            "hits": {
                "total": { "value": size, "relation": "eq" },
                "hits": hits,
            }
        });
        Bytes::from(body.to_string())
    }
}

fn injected(operation: &str, sequence: usize) -> SearchError {
    SearchError::Status {
        status: 503,
        body: format!("injected {} failure for window {}", operation, sequence),
    }
}

#[async_trait]
impl SearchIndex for MockSearchIndex {
    async fn count(
        &self,
        index: &str,
        window: &TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<u64, SearchError> {
        self.record(MockCall::Count {
            index: index.to_string(),
            sequence: window.sequence,
        });
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        if self.failing_counts.contains(&window.sequence) {
            return Err(injected("count", window.sequence));
        }
        Ok(self.counts.get(&window.sequence).copied().unwrap_or(0))
    }

    async fn search(
        &self,
        index: &str,
        window: &TimeWindow,
        size: u64,
        cancel: &CancellationToken,
    ) -> Result<Bytes, SearchError> {
        self.record(MockCall::Search {
            index: index.to_string(),
            sequence: window.sequence,
            size,
        });
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        if self.failing_searches.contains(&window.sequence) {
            return Err(injected("search", window.sequence));
        }
        Ok(Self::payload_for(index, window, size))
    }

    async fn delete_older_than(
        &self,
        index: &str,
        retention_days: u32,
        cancel: &CancellationToken,
    ) -> Result<u64, SearchError> {
        self.record(MockCall::Delete {
            index: index.to_string(),
            retention_days,
        });
        if cancel.is_cancelled() {
            return Err(SearchError::Cancelled);
        }
        if self.fail_delete {
            return Err(SearchError::Status {
                status: 500,
                body: "injected delete failure".to_string(),
            });
        }
        Ok(self.deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn window(sequence: usize) -> TimeWindow {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        TimeWindow::new(sequence, start, start + Duration::hours(1))
    }

    #[tokio::test]
    async fn test_mock_counts_and_failures() {
        let mock = MockSearchIndex::new()
            .with_documents(2, 7)
            .fail_count_on(3);
        let cancel = CancellationToken::new();

        assert_eq!(mock.count("idx", &window(1), &cancel).await.unwrap(), 0);
        assert_eq!(mock.count("idx", &window(2), &cancel).await.unwrap(), 7);
        assert!(mock.count("idx", &window(3), &cancel).await.is_err());
        assert_eq!(mock.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_payload_has_requested_hits() {
        let mock = MockSearchIndex::new().with_documents(1, 4);
        let bytes = mock
            .search("idx", &window(1), 4, &CancellationToken::new())
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["hits"]["hits"].as_array().unwrap().len(), 4);
    }
}
