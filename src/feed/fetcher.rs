use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use super::xml::{XmlDocument, XmlError};
use crate::storage::{ContentStore, Source, SourceStatus};

/// Attempts per source per scan cycle.
pub const SOURCE_RETRY_LIMIT: u32 = 3;
/// Failed cycles after which a source is marked not responding.
pub const FAILURE_THRESHOLD: u32 = 3;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Errors from a single attempt to load a feed document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
    /// Body is not well-formed XML
    #[error("Invalid XML: {0}")]
    Xml(#[from] XmlError),
}

/// Loads feed documents and keeps source health up to date.
#[derive(Clone)]
pub struct FeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
    attempts: u32,
}

impl FeedFetcher {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            attempts: SOURCE_RETRY_LIMIT,
        }
    }

    /// One attempt: GET, require 2xx, read at most 10MB, parse as XML.
    pub async fn fetch_document(&self, url: &str) -> Result<XmlDocument, FetchError> {
        let response = tokio::time::timeout(self.timeout, self.client.get(url).send())
            .await
            .map_err(|_| FetchError::Timeout)??;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        let bytes = tokio::time::timeout(self.timeout, read_limited_bytes(response, MAX_FEED_SIZE))
            .await
            .map_err(|_| FetchError::Timeout)??;

        Ok(XmlDocument::parse(&bytes)?)
    }

    /// Load the source's feed into `source.latest_document`, trying up to
    /// three times without delay.
    ///
    /// Returns `true` on the first successful attempt, in which case the
    /// source's health is left untouched and nothing is persisted. When every
    /// attempt fails the failure count goes up by one, the source is marked
    /// [`SourceStatus::NotResponding`] once the count reaches
    /// [`FAILURE_THRESHOLD`], and the health is written back to the store.
    ///
    /// The failure count is never reset on success, so three failed cycles
    /// disable a source even when successful cycles came in between.
    pub async fn retrieve(&self, source: &mut Source, store: &dyn ContentStore) -> bool {
        let mut last_error = None;

        for attempt in 1..=self.attempts {
            match self.fetch_document(&source.feed_url).await {
                Ok(document) => {
                    source.latest_document = Some(document);
                    return true;
                }
                Err(e) => {
                    tracing::debug!(
                        source = %source.name,
                        url = %source.feed_url,
                        attempt = attempt,
                        error = %e,
                        "Feed fetch attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        source.latest_document = None;
        let disabled = record_failure(source);
        let last_error = last_error.map(|e| e.to_string()).unwrap_or_default();

        tracing::warn!(
            source = %source.name,
            url = %source.feed_url,
            attempts = self.attempts,
            failures = source.failed_get_count,
            error = %last_error,
            "Couldn't load feed"
        );
        if disabled {
            tracing::warn!(
                source = %source.name,
                failures = source.failed_get_count,
                "Source marked as not responding"
            );
        }

        if let Err(e) = store.update_source_health(source).await {
            tracing::error!(source = %source.name, error = %e, "Failed to save source health");
        }

        false
    }
}

/// Count one failed cycle. Returns `true` when this failure crossed the
/// threshold and changed the status.
pub(crate) fn record_failure(source: &mut Source) -> bool {
    source.failed_get_count = source.failed_get_count.saturating_add(1);
    if source.failed_get_count >= FAILURE_THRESHOLD
        && source.status != SourceStatus::NotResponding
    {
        source.status = SourceStatus::NotResponding;
        return true;
    }
    false
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len > limit as u64 {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
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
