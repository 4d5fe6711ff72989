//! HTTP client with per-request timeout and bounded retry.

use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("unexpected payload from {url}: {reason}")]
    Payload { url: String, reason: String },

    #[error("cannot read workbook {path}: {reason}")]
    Workbook { path: String, reason: String },
}

impl FetchError {
    /// Worth another attempt: timeouts, connection errors, 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request() || e.is_body(),
            FetchError::Status { status, .. } => *status == 429 || *status >= 500,
            FetchError::Payload { .. } | FetchError::Workbook { .. } => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

#[derive(Debug, Clone)]
pub struct Fetcher {
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl Fetcher {
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent("polmatrix-collector/0.1")
            .build()?;
        Ok(Self { client, retry })
    }

    /// GET `url` and decode the JSON body, retrying transient failures with
    /// a fixed backoff.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, FetchError> {
        let attempts = self.retry.attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.try_get(url, query).await {
                Ok(body) => return Ok(body),
                Err(e) if e.is_transient() && attempt < attempts => {
                    warn!(url, attempt, error = %e, "transient fetch failure, retrying");
                    sleep(self.retry.backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn try_get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, String)]) -> Result<T, FetchError> {
        debug!(url, "GET");
        let resp = self.client.get(url).query(query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let bytes = resp.bytes().await?;
        serde_json::from_slice(&bytes).map_err(|e| FetchError::Payload {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transience() {
        let status = |status| FetchError::Status {
            status,
            url: "https://example.org".into(),
        };
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(404).is_transient());
        assert!(!FetchError::Payload {
            url: "u".into(),
            reason: "r".into()
        }
        .is_transient());
    }
}
