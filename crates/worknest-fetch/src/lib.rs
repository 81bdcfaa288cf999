//! Data-fetch collaborator: supplies shape-normalized listing snapshots.
//!
//! The catalog engine only ever consumes the latest completed snapshot, so
//! sources here own all network concerns (timeouts, retry, error surfacing)
//! and hand back plain `Vec<ListingRecord>` values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use tracing::info_span;
use uuid::Uuid;
use worknest_core::ListingRecord;

pub const CRATE_NAME: &str = "worknest-fetch";

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed after retries: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("decoding listings from {origin}: {source}")]
    Decode {
        origin: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("reading fixture {}: {source}", .path.display())]
    Fixture {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

/// A producer of listing snapshots. Implementations must return records in
/// the order the catalog should treat as canonical (newest first for the
/// marketplace feed).
#[async_trait]
pub trait RecordSource: Send + Sync {
    async fn fetch_records(&self, run_id: Uuid) -> Result<Vec<ListingRecord>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpSourceConfig {
    pub url: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
    pub backoff: BackoffPolicy,
}

impl HttpSourceConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(20),
            user_agent: None,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Fetches a JSON array of listing records from a remote endpoint, retrying
/// transient failures with exponential backoff.
#[derive(Debug)]
pub struct HttpRecordSource {
    client: reqwest::Client,
    url: String,
    backoff: BackoffPolicy,
}

impl HttpRecordSource {
    pub fn new(config: HttpSourceConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);
        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }
        let client = builder.build().context("building reqwest client")?;
        Ok(Self {
            client,
            url: config.url,
            backoff: config.backoff,
        })
    }
}

#[async_trait]
impl RecordSource for HttpRecordSource {
    async fn fetch_records(&self, run_id: Uuid) -> Result<Vec<ListingRecord>, FetchError> {
        let span = info_span!("record_fetch", %run_id, url = %self.url);
        let _guard = span.enter();

        let mut last_request_error: Option<reqwest::Error> = None;

        for attempt in 0..=self.backoff.max_retries {
            match self.client.get(&self.url).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let final_url = resp.url().to_string();

                    if status.is_success() {
                        let body = resp.bytes().await?;
                        return serde_json::from_slice(&body).map_err(|source| {
                            FetchError::Decode {
                                origin: final_url,
                                source,
                            }
                        });
                    }

                    if classify_status(status) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }

                    return Err(FetchError::HttpStatus {
                        status: status.as_u16(),
                        url: final_url,
                    });
                }
                Err(err) => {
                    if classify_reqwest_error(&err) == RetryDisposition::Retryable
                        && attempt < self.backoff.max_retries
                    {
                        last_request_error = Some(err);
                        tokio::time::sleep(self.backoff.delay_for_attempt(attempt)).await;
                        continue;
                    }
                    return Err(FetchError::Request(err));
                }
            }
        }

        Err(FetchError::Request(
            last_request_error.expect("retry loop should capture a request error"),
        ))
    }
}

/// Reads listing records from a local JSON fixture. Used when no remote
/// endpoint is configured and by tests.
#[derive(Debug, Clone)]
pub struct FixtureRecordSource {
    path: PathBuf,
}

impl FixtureRecordSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSource for FixtureRecordSource {
    async fn fetch_records(&self, run_id: Uuid) -> Result<Vec<ListingRecord>, FetchError> {
        let span = info_span!("fixture_fetch", %run_id, path = %self.path.display());
        let _guard = span.enter();

        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| FetchError::Fixture {
                path: self.path.clone(),
                source,
            })?;
        serde_json::from_slice(&bytes).map_err(|source| FetchError::Decode {
            origin: self.path.display().to_string(),
            source,
        })
    }
}
