//! HTTP fetcher implementation
//!
//! This module handles plain HTTP requests for the crawler, including:
//! - Building HTTP clients with the configured user agent and timeout
//! - Retry logic for transient failures
//! - Optional robots.txt checks
//! - Error classification

use crate::config::CrawlSettings;
use crate::crawler::request::{FetchRequest, Page};
use crate::robots::RobotsCache;
use crate::ConfigError;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// Delay before the first retry; later retries wait proportionally longer
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// A request failed after all retries
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fetching {url} failed: {reason}")]
pub struct TransportError {
    pub url: String,
    pub reason: String,
}

impl TransportError {
    pub fn new(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

/// Result of a fetch that did not fail
#[derive(Debug)]
pub enum FetchOutcome {
    Page(Page),

    /// robots.txt forbids the URL; nothing was fetched
    Disallowed,
}

/// Builds an HTTP client with proper configuration
///
/// # Arguments
///
/// * `settings` - The crawl settings (user agent and request timeout)
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(settings: &CrawlSettings) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(settings.user_agent.as_str())
        .timeout(Duration::from_secs(settings.request_timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Fetches plain HTTP requests with retries
pub struct Fetcher {
    client: Client,
    retry_times: u32,
    user_agent: String,
    robots: Option<RobotsCache>,
}

impl Fetcher {
    pub fn new(settings: &CrawlSettings) -> Result<Self, ConfigError> {
        let client = build_http_client(settings)
            .map_err(|e| ConfigError::Validation(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            retry_times: settings.retry_times,
            user_agent: settings.user_agent.clone(),
            robots: settings.obey_robots.then(RobotsCache::new),
        })
    }

    /// Fetches a request over HTTP
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | HTTP 2xx | Return the page |
    /// | HTTP 429 | Retry up to `retry_times` |
    /// | HTTP 5xx | Retry up to `retry_times` |
    /// | Other HTTP status | Immediate failure |
    /// | Timeout | Retry up to `retry_times` |
    /// | Connection error | Retry up to `retry_times` |
    /// | Other client error | Immediate failure |
    ///
    /// An exhausted request is reported as one [`TransportError`].
    pub async fn fetch(&self, request: &FetchRequest) -> Result<FetchOutcome, TransportError> {
        let url = &request.url;

        if let Some(robots) = &self.robots {
            if !robots.is_allowed(&self.client, url, &self.user_agent).await {
                return Ok(FetchOutcome::Disallowed);
            }
        }

        let mut attempt = 0;
        loop {
            match self.attempt(request).await {
                Ok(page) => return Ok(FetchOutcome::Page(page)),
                Err(Attempt::Retry(reason)) if attempt < self.retry_times => {
                    attempt += 1;
                    tracing::debug!(
                        "Retrying {} (attempt {}/{}): {}",
                        url,
                        attempt,
                        self.retry_times,
                        reason
                    );
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(Attempt::Retry(reason)) | Err(Attempt::Fail(reason)) => {
                    return Err(TransportError::new(url.as_str(), reason));
                }
            }
        }
    }

    async fn attempt(&self, request: &FetchRequest) -> Result<Page, Attempt> {
        let response = self
            .client
            .get(request.url.clone())
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        if !status.is_success() {
            let reason = format!("HTTP {}", status.as_u16());
            return Err(if is_retryable_status(status) {
                Attempt::Retry(reason)
            } else {
                Attempt::Fail(reason)
            });
        }

        let final_url = response.url().clone();
        let body = response.text().await.map_err(classify_error)?;

        Ok(Page::new(final_url, status.as_u16(), body))
    }
}

enum Attempt {
    Retry(String),
    Fail(String),
}

fn is_retryable_status(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

fn classify_error(e: reqwest::Error) -> Attempt {
    if e.is_timeout() {
        Attempt::Retry("Request timeout".to_string())
    } else if e.is_connect() {
        Attempt::Retry(format!("Connection failed: {}", e))
    } else {
        Attempt::Fail(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_http_client() {
        assert!(build_http_client(&CrawlSettings::default()).is_ok());
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
    }

    #[test]
    fn test_transport_error_display() {
        let error = TransportError::new("https://example.test/", "HTTP 500");
        assert_eq!(error.to_string(), "fetching https://example.test/ failed: HTTP 500");
    }

    // Retry behaviour against live responses is covered by the wiremock
    // tests under tests/integration/
}
