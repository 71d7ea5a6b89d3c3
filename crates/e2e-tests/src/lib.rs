//! End-to-end test infrastructure for the index archiver.
//!
//! Provides a shared TestHarness wiring the real OpenSearch REST client to a
//! wiremock server, the real S3 sink to an in-memory object store, and a
//! temporary work directory.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::NaiveDate;
use flate2::read::GzDecoder;
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use archiver_backup::{BackupService, CleanupService};
use archiver_search::query::{count_body, search_body};
use archiver_search::{MockSearchIndex, OpenSearchClient};
use archiver_storage::{DurableUploader, ObjectSink, RetryPolicy, S3Sink};
use archiver_types::{BackupJob, SearchSettings, TimeWindow};

/// Index used by the scenarios.
pub const INDEX: &str = "logs";

/// Key prefix the scenario jobs archive under.
pub const PREFIX: &str = "backups/logs";

/// Shared test harness for E2E tests.
pub struct TestHarness {
    /// Keeps temp dir alive for the lifetime of the harness
    pub _temp_dir: tempfile::TempDir,
    pub work_dir: PathBuf,
    /// Stands in for the OpenSearch cluster
    pub server: MockServer,
    /// Stands in for the bucket
    pub store: Arc<InMemory>,
    pub search: Arc<OpenSearchClient>,
}

impl TestHarness {
    pub async fn new() -> Self {
        let temp_dir = tempfile::TempDir::new().expect("Failed to create temp dir");
        let work_dir = temp_dir.path().join("opensearch-backups");

        let server = MockServer::start().await;
        let settings = SearchSettings {
            addresses: vec![server.uri()],
            request_timeout_secs: 10,
            ..Default::default()
        };
        let search =
            Arc::new(OpenSearchClient::new(&settings).expect("Failed to create search client"));

        Self {
            _temp_dir: temp_dir,
            work_dir,
            server,
            store: Arc::new(InMemory::new()),
            search,
        }
    }

    pub fn sink(&self) -> Arc<dyn ObjectSink> {
        Arc::new(S3Sink::new(self.store.clone(), "archives"))
    }

    /// Backup service over the harness index and bucket, with fast retries.
    pub fn backup_service(&self) -> BackupService {
        self.backup_service_with_sink(self.sink())
    }

    pub fn backup_service_with_sink(&self, sink: Arc<dyn ObjectSink>) -> BackupService {
        let uploader =
            DurableUploader::new(sink, RetryPolicy::linear(3, Duration::from_millis(10)));
        BackupService::new(self.search.clone(), uploader, &self.work_dir)
    }

    pub fn cleanup_service(&self) -> CleanupService {
        CleanupService::new(self.search.clone())
    }

    /// Serve `count` documents for `window`: both the count probe and the search.
    pub async fn mount_window(&self, window: &TimeWindow, count: u64) {
        Mock::given(method("POST"))
            .and(path(format!("/{}/_count", INDEX)))
            .and(body_partial_json(count_body(window)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "count": count })))
            .mount(&self.server)
            .await;

        Mock::given(method("POST"))
            .and(path(format!("/{}/_search", INDEX)))
            .and(body_partial_json(search_body(window, count)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(search_payload(window, count).to_vec(), "application/json"),
            )
            .mount(&self.server)
            .await;
    }

    /// Make the count probe of `window` fail with a server error.
    pub async fn mount_failing_window(&self, window: &TimeWindow) {
        Mock::given(method("POST"))
            .and(path(format!("/{}/_count", INDEX)))
            .and(body_partial_json(count_body(window)))
            .respond_with(ResponseTemplate::new(503).set_body_string("cluster overloaded"))
            .mount(&self.server)
            .await;
    }

    /// Report zero documents for every window not mounted explicitly.
    pub async fn mount_empty_fallback(&self, delay: Duration) {
        Mock::given(method("POST"))
            .and(path(format!("/{}/_count", INDEX)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "count": 0 }))
                    .set_delay(delay),
            )
            .with_priority(10)
            .mount(&self.server)
            .await;
    }

    /// Bytes stored under `key`, if any.
    pub async fn stored_object(&self, key: &str) -> Option<Bytes> {
        let result = self.store.get(&ObjectPath::from(key)).await.ok()?;
        result.bytes().await.ok()
    }

    /// Objects stored under [`PREFIX`].
    pub async fn object_count(&self) -> usize {
        self.store
            .list_with_delimiter(Some(&ObjectPath::from(PREFIX)))
            .await
            .map(|listing| listing.objects.len())
            .unwrap_or(0)
    }

    /// Files left in the work directory.
    pub fn leftover_files(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(&self.work_dir) {
            Ok(entries) => entries.filter_map(|e| e.ok().map(|e| e.path())).collect(),
            Err(_) => Vec::new(),
        }
    }
}

/// Search response the harness serves for `window`.
pub fn search_payload(window: &TimeWindow, count: u64) -> Bytes {
    MockSearchIndex::payload_for(INDEX, window, count)
}

/// A backup job of [`INDEX`] with the given interval.
pub fn backup_job(interval_hours: u32) -> BackupJob {
    BackupJob {
        index_name: INDEX.to_string(),
        schedule: "0 1 * * *".to_string(),
        interval_hours,
        s3_path: format!("/{}/", PREFIX),
        request_interval_seconds: 0,
    }
}

pub fn test_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date")
}

/// Decompress a gzip object, returning the payload and the embedded file name.
pub fn gunzip(data: &[u8]) -> (Vec<u8>, Option<String>) {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .expect("Failed to decompress object");
    let name = decoder
        .header()
        .and_then(|h| h.filename())
        .map(|n| String::from_utf8_lossy(n).into_owned());
    (out, name)
}
