//! OpenSearch REST client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Certificate, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use archiver_types::{SearchSettings, TimeWindow};

use crate::query::{count_body, retention_body, search_body};
use crate::{SearchError, SearchIndex};

/// Longest slice of an error response body kept in `SearchError::Status`.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct DeleteByQueryResponse {
    deleted: u64,
    #[serde(default)]
    failures: Vec<Value>,
}

/// Search index client talking to one cluster over HTTP(S).
///
/// Addresses are tried in configuration order; a node that refuses the
/// connection or times out is skipped in favour of the next one. Any HTTP
/// response, successful or not, ends the attempt.
pub struct OpenSearchClient {
    http: Client,
    addresses: Vec<String>,
    username: Option<String>,
    password: Option<SecretString>,
}

impl OpenSearchClient {
    pub fn new(settings: &SearchSettings) -> Result<Self, SearchError> {
        let addresses: Vec<String> = settings
            .addresses
            .iter()
            .map(|a| a.trim().trim_end_matches('/').to_string())
            .filter(|a| !a.is_empty())
            .collect();
        if addresses.is_empty() {
            return Err(SearchError::Config("no addresses configured".to_string()));
        }

        let mut builder =
            Client::builder().timeout(Duration::from_secs(settings.request_timeout_secs));

        if let Some(path) = settings.cert_path() {
            let pem = std::fs::read(path).map_err(|e| {
                SearchError::Config(format!("failed to read certificate {}: {}", path, e))
            })?;
            let cert = Certificate::from_pem(&pem).map_err(|e| {
                SearchError::Config(format!("failed to parse certificate {}: {}", path, e))
            })?;
            builder = builder.add_root_certificate(cert);
        }

        let http = builder
            .build()
            .map_err(|e| SearchError::Config(e.to_string()))?;

        let (username, password) = match settings.credentials() {
            Some((user, pass)) => (
                Some(user.to_string()),
                pass.map(|p| SecretString::from(p.to_string())),
            ),
            None => (None, None),
        };

        info!(
            addresses = ?addresses,
            authenticated = username.is_some(),
            custom_ca = settings.cert_path().is_some(),
            "Initialized search client"
        );

        Ok(Self {
            http,
            addresses,
            username,
            password,
        })
    }

    /// POST a JSON body to `/<index>/<endpoint>`, honouring cancellation.
    async fn post(
        &self,
        index: &str,
        endpoint: &str,
        body: &Value,
        cancel: &CancellationToken,
    ) -> Result<Bytes, SearchError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(SearchError::Cancelled),
            result = self.post_any_node(index, endpoint, body) => result,
        }
    }

    async fn post_any_node(
        &self,
        index: &str,
        endpoint: &str,
        body: &Value,
    ) -> Result<Bytes, SearchError> {
        let mut last_error = None;

        for address in &self.addresses {
            let url = format!("{}/{}/{}", address, index, endpoint);
            let mut request = self.http.post(&url).json(body);
            if let Some(user) = &self.username {
                request = request.basic_auth(user, self.password.as_ref().map(|p| p.expose_secret()));
            }

            debug!(url = %url, "Sending index request");
            let response = match request.send().await {
                Ok(response) => response,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    warn!(url = %url, error = %e, "Search node unavailable, trying next address");
                    last_error = Some(SearchError::Transport { url, source: e });
                    continue;
                }
                Err(e) => return Err(SearchError::Transport { url, source: e }),
            };

            let status = response.status();
            let bytes = response
                .bytes()
                .await
                .map_err(|e| SearchError::Transport {
                    url: url.clone(),
                    source: e,
                })?;

            if !status.is_success() {
                let text = String::from_utf8_lossy(&bytes);
                return Err(SearchError::Status {
                    status: status.as_u16(),
                    body: truncate(&text, MAX_ERROR_BODY),
                });
            }

            return Ok(bytes);
        }

        Err(last_error.unwrap_or(SearchError::Unreachable {
            tried: self.addresses.len(),
        }))
    }
}

#[async_trait]
impl SearchIndex for OpenSearchClient {
    async fn count(
        &self,
        index: &str,
        window: &TimeWindow,
        cancel: &CancellationToken,
    ) -> Result<u64, SearchError> {
        let bytes = self.post(index, "_count", &count_body(window), cancel).await?;
        let response: CountResponse = serde_json::from_slice(&bytes)?;
        Ok(response.count)
    }

    async fn search(
        &self,
        index: &str,
        window: &TimeWindow,
        size: u64,
        cancel: &CancellationToken,
    ) -> Result<Bytes, SearchError> {
        self.post(index, "_search", &search_body(window, size), cancel)
            .await
    }

    async fn delete_older_than(
        &self,
        index: &str,
        retention_days: u32,
        cancel: &CancellationToken,
    ) -> Result<u64, SearchError> {
        let bytes = self
            .post(index, "_delete_by_query", &retention_body(retention_days), cancel)
            .await?;
        let response: DeleteByQueryResponse = serde_json::from_slice(&bytes)?;
        if !response.failures.is_empty() {
            warn!(
                index = %index,
                failures = response.failures.len(),
                "Delete-by-query reported failures"
            );
        }
        Ok(response.deleted)
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}
