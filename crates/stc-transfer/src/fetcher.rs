//! Resource fetching.
//!
//! `HttpFetcher` streams bodies with reqwest and reports byte progress as chunks
//! arrive. The announced size comes from `x-decompressed-content-length` when a
//! gateway serves compressed data, else from `content-length`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use tracing::debug;

use crate::error::TransferError;
use crate::tracker::ProgressSink;

pub type Payload = Arc<[u8]>;

const DECOMPRESSED_LENGTH_HEADER: &str = "x-decompressed-content-length";

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetches `url`, reporting `(loaded, total)` through `progress`.
    async fn fetch(&self, url: &str, progress: &ProgressSink) -> Result<Vec<u8>, TransferError>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, TransferError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("stc/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| TransferError::network("<client>", e))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

fn announced_total(headers: &HeaderMap, content_length: Option<u64>) -> Option<u64> {
    headers
        .get(DECOMPRESSED_LENGTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .or(content_length)
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, progress: &ProgressSink) -> Result<Vec<u8>, TransferError> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransferError::network(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransferError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                status_text: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let total = announced_total(response.headers(), response.content_length());
        debug!(url, ?total, "download started");
        progress.update(0, total);

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| TransferError::network(url, e))? {
            body.extend_from_slice(&chunk);
            progress.update(body.len() as u64, total);
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn decompressed_length_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert(DECOMPRESSED_LENGTH_HEADER, HeaderValue::from_static("2048"));
        assert_eq!(announced_total(&headers, Some(512)), Some(2048));
        assert_eq!(announced_total(&HeaderMap::new(), Some(512)), Some(512));
        assert_eq!(announced_total(&HeaderMap::new(), None), None);
    }
}
