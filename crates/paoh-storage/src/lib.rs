//! Persistence and HTTP plumbing for PAOH: the shared fetch client, the spreadsheet contract and reconciliation.

use std::time::Duration;

use anyhow::Context;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::debug;

pub mod memory;
pub mod reconcile;
pub mod sheets;

pub use memory::{MemorySpreadsheet, RoundTrips};
pub use reconcile::{build_row_index, MergeReport, ReconciliationStore};
pub use sheets::{
    column_letter, GoogleSheetsService, SpreadsheetService, StoreError, Worksheet, DEFAULT_SHEETS_API_BASE,
};

pub const CRATE_NAME: &str = "paoh-storage";

#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            user_agent: None,
        }
    }
}

/// Build a reqwest client with the fixed user agent and default timeout.
pub fn build_client(config: &HttpClientConfig) -> anyhow::Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .gzip(true)
        .brotli(true)
        .timeout(config.timeout);

    if let Some(user_agent) = &config.user_agent {
        builder = builder.user_agent(user_agent.clone());
    }

    builder.build().context("building reqwest client")
}

/// Single-shot document fetcher. No retries: a failed fetch is reported once and the caller skips.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub status: StatusCode,
    pub final_url: String,
    pub content_type: Option<String>,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("timed out after {}s fetching {url}", .timeout.as_secs())]
    Timeout { url: String, timeout: Duration },
}

impl HttpFetcher {
    pub fn new(config: HttpClientConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(&config)?,
        })
    }

    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// Fetch `url` as text, bounding the whole exchange (headers and body) by `timeout`.
    pub async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<FetchedResponse, FetchError> {
        let exchange = async {
            let resp = self.client.get(url).send().await?;
            let status = resp.status();
            let final_url = resp.url().to_string();
            if !status.is_success() {
                return Err(FetchError::HttpStatus {
                    status: status.as_u16(),
                    url: final_url,
                });
            }
            let content_type = resp
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(ToString::to_string);
            let body = resp.text().await?;
            Ok(FetchedResponse {
                status,
                final_url,
                content_type,
                body,
            })
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(result) => {
                if let Ok(resp) = &result {
                    debug!(url, status = resp.status.as_u16(), bytes = resp.body.len(), "fetched document");
                }
                result
            }
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
                timeout,
            }),
        }
    }
}
