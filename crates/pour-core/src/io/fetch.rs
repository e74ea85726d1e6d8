//! Source archive fetching.
//!
//! Downloads are buffered in memory under a hard size ceiling. The fetcher
//! never retries on its own: retry policy belongs to the pipeline, which
//! keeps this primitive easy to reason about in tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use reqwest::{Client, redirect};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Default ceiling on a downloaded archive: 256 MiB.
pub const DEFAULT_MAX_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Error, Debug)]
pub enum FetchError {
    /// Connection, DNS, TLS, timeout or mid-stream transport failure.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// The server answered with a non-2xx status.
    #[error("HTTP status {0}")]
    HttpStatus(u16),

    /// The payload exceeds the configured ceiling.
    #[error("payload exceeds the {limit} byte limit")]
    TooLarge { limit: u64 },

    /// The caller cancelled the request; partial bytes were discarded.
    #[error("fetch cancelled")]
    Cancelled,

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Client(String),
}

impl FetchError {
    /// Whether the pipeline may try again.
    ///
    /// Transport failures, request timeouts, throttling and server errors are
    /// transient; other 4xx answers will not change on a second attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Unreachable(_) => true,
            Self::HttpStatus(code) => matches!(code, 408 | 429 | 500..=599),
            Self::TooLarge { .. } | Self::Cancelled | Self::Client(_) => false,
        }
    }
}

/// Progress callback: bytes received so far and the announced total.
pub type Progress<'a> = &'a (dyn Fn(u64, Option<u64>) + Send + Sync);

/// Anything that can turn a URL into archive bytes.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
        progress: Progress<'_>,
    ) -> Result<Bytes, FetchError>;
}

/// Limits applied to every request.
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub timeout: Duration,
    pub max_bytes: u64,
    pub max_redirects: usize,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_bytes: DEFAULT_MAX_BYTES,
            max_redirects: 10,
        }
    }
}

/// reqwest-backed [`Fetch`] implementation.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    max_bytes: u64,
}

impl HttpFetcher {
    pub fn new(options: FetchOptions) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(crate::USER_AGENT)
            .redirect(redirect::Policy::limited(options.max_redirects))
            .timeout(options.timeout)
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self {
            client,
            max_bytes: options.max_bytes,
        })
    }

    async fn download(&self, url: &str, progress: Progress<'_>) -> Result<Bytes, FetchError> {
        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let total = response.content_length();
        if total.is_some_and(|len| len > self.max_bytes) {
            return Err(FetchError::TooLarge {
                limit: self.max_bytes,
            });
        }

        let capacity = total.unwrap_or(0).min(self.max_bytes) as usize;
        let mut buf = BytesMut::with_capacity(capacity);
        let mut stream = response.bytes_stream();
        progress(0, total);

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(transport)?;
            if (buf.len() + chunk.len()) as u64 > self.max_bytes {
                return Err(FetchError::TooLarge {
                    limit: self.max_bytes,
                });
            }
            buf.extend_from_slice(&chunk);
            progress(buf.len() as u64, total);
        }

        Ok(buf.freeze())
    }
}

#[async_trait]
impl Fetch for HttpFetcher {
    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
        progress: Progress<'_>,
    ) -> Result<Bytes, FetchError> {
        tracing::debug!(url, "fetching");
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(FetchError::Cancelled),
            result = self.download(url, progress) => result,
        }
    }
}

fn transport(err: reqwest::Error) -> FetchError {
    if let Some(status) = err.status() {
        return FetchError::HttpStatus(status.as_u16());
    }
    FetchError::Unreachable(err.to_string())
}
