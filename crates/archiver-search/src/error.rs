//! Error type for search index operations.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Invalid search client configuration: {0}")]
    Config(String),

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("No search node reachable ({tried} address(es) tried)")]
    Unreachable { tried: usize },

    #[error("Index returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to parse index response: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Request cancelled")]
    Cancelled,
}
