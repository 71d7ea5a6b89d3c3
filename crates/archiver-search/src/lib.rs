//! Search index collaborator.
//!
//! The backup pipeline and the cleanup executor only talk to the index
//! through the [`SearchIndex`] trait:
//! - `count`: exact number of documents inside a time window
//! - `search`: one ascending-by-timestamp page of a window, returned raw
//! - `delete_older_than`: delete-by-query with a day-floored relative cutoff
//!
//! [`OpenSearchClient`] implements it over the REST API; [`MockSearchIndex`]
//! is a deterministic in-memory double for tests.
//!
//! Every call takes the run's `CancellationToken` and returns
//! `SearchError::Cancelled` as soon as it fires.

mod client;
mod error;
mod mock;
pub mod query;

pub use client::OpenSearchClient;
pub use error::SearchError;
pub use mock::{MockCall, MockSearchIndex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use archiver_types::TimeWindow;

/// Operations the archiver needs from a search index.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Count documents whose timestamp falls inside `window` (both ends inclusive).
    async fn count(
        &self,
        index: &str,
        window: &TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<u64, SearchError>;

    /// Retrieve up to `size` documents of `window`, sorted by timestamp ascending.
    ///
    /// Returns the response payload verbatim. No scroll or cursor is used, so
    /// `size` is bounded by the engine's result window limit.
    async fn search(
        &self,
        index: &str,
        window: &TimeWindow,
        size: u64,
        cancel: &CancellationToken,
    ) -> Result<Bytes, SearchError>;

    /// Delete every document older than `now - retention_days`, floored to the day.
    ///
    /// Returns the number of deleted documents reported by the index.
    async fn delete_older_than(
        &self,
        index: &str,
        retention_days: u32,
        cancel: &CancellationToken,
    ) -> Result<u64, SearchError>;
}
