//! Remote text retrieval.
//!
//! Used by the resolver to download kubeadm's `constants.go`. Requests to
//! raw.githubusercontent.com fail intermittently from some networks, so the
//! HTTP implementation can retry transient failures. The resolver itself never
//! retries.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::{debug, warn};

/// Fetch errors.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("{url} responded with status: {status}")]
    Status { url: String, status: u16 },

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// Returns true for failures worth retrying (connection errors, 5xx, 429).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            Self::Transport { .. } => true,
            Self::Client(_) => false,
        }
    }
}

/// Retrieves remote text documents.
#[async_trait]
pub trait TextFetcher: Send + Sync {
    /// Fetch the body at `url`. Anything other than `200 OK` is an error.
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// HTTP fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-request timeout.
    pub timeout: Duration,

    /// Extra attempts after a transient failure (0 disables retry).
    pub retries: u32,

    /// Delay before the first retry; grows linearly per attempt.
    pub retry_backoff: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retries: 3,
            retry_backoff: Duration::from_secs(2),
        }
    }
}

/// [`TextFetcher`] backed by reqwest.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    config: FetchConfig,
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("kmirror/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self { client, config })
    }

    async fn fetch_once(&self, url: &str) -> Result<String, FetchError> {
        let transport = |source| FetchError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "*/*")
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(transport)
    }
}

#[async_trait]
impl TextFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        let mut attempt = 0u32;
        loop {
            match self.fetch_once(url).await {
                Ok(body) => {
                    debug!(url = %url, bytes = body.len(), "Fetched remote document");
                    return Ok(body);
                }
                Err(e) if e.is_transient() && attempt < self.config.retries => {
                    attempt += 1;
                    let delay = self.config.retry_backoff * attempt;
                    warn!(
                        url = %url,
                        attempt,
                        max_retries = self.config.retries,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Fetch failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
