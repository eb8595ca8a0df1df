use async_trait::async_trait;
use futures::stream::StreamExt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

use crate::engine::SourceReader;
use crate::feed::parser::{parse_feed, ParsedFeed};
use crate::model::RawEntry;

/// Errors that can occur while retrieving a syndication source.
///
/// The engine reports every variant as an invalid source for the channel.
#[derive(Debug, Error)]
pub enum FetchError {
    /// URL could not be parsed or does not use http(s)
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(String),
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Body could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Server returned 429 Too Many Requests after max retries
    #[error("Rate limited after {0} retries")]
    RateLimited(u32),
    /// Response body exceeded the size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Limits applied to every retrieval.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Per-attempt timeout, applied to the request and to reading the body.
    pub timeout: Duration,
    /// Retries after a 429, a 5xx, or a truncated body.
    pub max_retries: u32,
    /// First retry delay; doubles on each further retry.
    pub retry_backoff: Duration,
    pub max_feed_size: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_backoff: Duration::from_secs(1),
            max_feed_size: 10 * 1024 * 1024,
        }
    }
}

/// Retrieves RSS/Atom documents over HTTP.
#[derive(Debug, Clone)]
pub struct HttpSourceReader {
    client: reqwest::Client,
    options: FetchOptions,
}

impl HttpSourceReader {
    pub fn new(client: reqwest::Client, options: FetchOptions) -> Self {
        Self { client, options }
    }

    /// Download and parse the document at `url`.
    ///
    /// Rate limiting (429), server errors (5xx) and truncated bodies are retried
    /// with exponential backoff; other 4xx responses fail immediately.
    pub async fn fetch_feed(&self, url: &str) -> Result<ParsedFeed, FetchError> {
        let url = parse_url(url)?;
        let bytes = self.download(&url).await?;
        parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))
    }

    async fn download(&self, url: &Url) -> Result<Vec<u8>, FetchError> {
        let mut retry_count = 0;

        loop {
            let response = tokio::time::timeout(
                self.options.timeout,
                self.client.get(url.as_str()).send(),
            )
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

            let status = response.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if retry_count >= self.options.max_retries {
                    return Err(FetchError::RateLimited(self.options.max_retries));
                }
                let delay = self.backoff(retry_count);
                tracing::warn!(feed = %url, retry = retry_count, delay_ms = delay.as_millis() as u64, "Rate limited, backing off");
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            if status.is_server_error() {
                if retry_count >= self.options.max_retries {
                    return Err(FetchError::HttpStatus(status.as_u16()));
                }
                let delay = self.backoff(retry_count);
                tracing::warn!(
                    feed = %url,
                    status = %status,
                    retry = retry_count,
                    delay_ms = delay.as_millis() as u64,
                    "Server error, retrying after delay"
                );
                tokio::time::sleep(delay).await;
                retry_count += 1;
                continue;
            }

            if !status.is_success() {
                return Err(FetchError::HttpStatus(status.as_u16()));
            }

            let body = tokio::time::timeout(
                self.options.timeout,
                read_limited_bytes(response, self.options.max_feed_size),
            )
            .await
            .map_err(|_| FetchError::Timeout)?;

            match body {
                Ok(bytes) => return Ok(bytes),
                Err(FetchError::IncompleteResponse { expected, received }) => {
                    if retry_count >= self.options.max_retries {
                        return Err(FetchError::IncompleteResponse { expected, received });
                    }
                    let delay = self.backoff(retry_count);
                    tracing::debug!(
                        feed = %url,
                        expected,
                        received,
                        attempt = retry_count + 1,
                        "Retrying incomplete download"
                    );
                    tokio::time::sleep(delay).await;
                    retry_count += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn backoff(&self, retry_count: u32) -> Duration {
        self.options
            .retry_backoff
            .saturating_mul(2u32.saturating_pow(retry_count))
    }
}

#[async_trait]
impl SourceReader for HttpSourceReader {
    async fn fetch(&self, url: &str) -> Result<Vec<RawEntry>, FetchError> {
        let feed = self.fetch_feed(url).await?;
        tracing::debug!(feed = %url, entries = feed.entries.len(), "Parsed feed");
        Ok(feed.entries)
    }
}

fn parse_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw.trim()).map_err(|e| FetchError::InvalidUrl(format!("{raw}: {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(FetchError::InvalidUrl(format!(
            "{raw}: unsupported scheme '{scheme}'"
        ))),
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
