//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - Timed GET requests with a body size ceiling
//! - Outcome classification (success, redirect, transient, permanent)
//!
//! Redirects are never followed here. A 3xx comes back as
//! `FetchOutcome::Redirect` so the target goes through the frontier's dedup
//! check and its host's politeness slot like any other URL. Retrying is the
//! worker's job too; one call here is one attempt.

use crate::config::UserAgentConfig;
use crate::crawler::retry::parse_retry_after;
use chrono::Utc;
use reqwest::{header, redirect::Policy, Client, StatusCode};
use std::time::Duration;
use tracing::trace;
use url::Url;

/// Error string recorded when the body exceeds the ceiling
pub const TOO_LARGE: &str = "TooLarge";

/// A successful (2xx) response with its full body
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL the body was served from
    pub final_url: Url,
    pub status: u16,
    /// Content-Type header value, empty when absent
    pub content_type: String,
    pub body: Vec<u8>,
}

/// Result of one fetch attempt
#[derive(Debug)]
pub enum FetchOutcome {
    Success(FetchedPage),

    /// A 3xx with a usable Location, resolved against the requested URL
    Redirect { status: u16, location: Url },

    /// Worth retrying: timeouts, connection errors, 429 and 503
    Transient {
        error: String,
        /// Server-requested wait, from Retry-After
        retry_after: Option<Duration>,
    },

    /// Recorded once and never retried
    Permanent { error: String },
}

impl FetchOutcome {
    fn transient(error: impl Into<String>) -> Self {
        Self::Transient {
            error: error.into(),
            retry_after: None,
        }
    }

    fn permanent(error: impl Into<String>) -> Self {
        Self::Permanent {
            error: error.into(),
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// Automatic redirects are disabled; see [`FetchOutcome::Redirect`].
///
/// # Arguments
///
/// * `config` - The user agent configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
///
/// # Example
///
/// ```no_run
/// use sumi_archive::config::UserAgentConfig;
/// use sumi_archive::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "SumiArchive".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::none()) // Redirects go back through the frontier
        .gzip(true)
        .brotli(true)
        .build()
}

/// Performs one timed GET and classifies the outcome
///
/// | Condition | Outcome |
/// |-----------|---------|
/// | 2xx | Success |
/// | 3xx with a valid Location | Redirect |
/// | 429, 503 | Transient, honoring Retry-After |
/// | Timeout | Transient `Timeout` |
/// | Connection error | Transient `ConnectionError` |
/// | Other status, including 3xx without Location | Permanent `HTTP <code>` |
/// | Body over `max_body_size` | Permanent `TooLarge` |
///
/// The body is read chunk by chunk and abandoned as soon as it crosses the
/// ceiling; a Content-Length over the ceiling is rejected before reading.
///
/// # Arguments
///
/// * `client` - Client from [`build_http_client`]
/// * `url` - The URL to request
/// * `timeout` - Deadline for the whole attempt, body included
/// * `max_body_size` - Body ceiling in bytes
pub async fn fetch_page(
    client: &Client,
    url: &Url,
    timeout: Duration,
    max_body_size: u64,
) -> FetchOutcome {
    let mut response = match client.get(url.clone()).timeout(timeout).send().await {
        Ok(response) => response,
        Err(e) => return classify_error(&e),
    };

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::SERVICE_UNAVAILABLE {
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| parse_retry_after(v, Utc::now()));
        return FetchOutcome::Transient {
            error: format!("HTTP {}", status.as_u16()),
            retry_after,
        };
    }

    if status.is_redirection() {
        let location = response
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| url.join(v).ok());
        if let Some(location) = location {
            trace!("{} redirects to {}", url, location);
            return FetchOutcome::Redirect {
                status: status.as_u16(),
                location,
            };
        }
    }

    if !status.is_success() {
        return FetchOutcome::permanent(format!("HTTP {}", status.as_u16()));
    }

    if response.content_length().is_some_and(|len| len > max_body_size) {
        return FetchOutcome::permanent(TOO_LARGE);
    }

    let final_url = response.url().clone();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let mut body = Vec::new();
    loop {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                if (body.len() + chunk.len()) as u64 > max_body_size {
                    trace!("Aborting {} past {} bytes", url, max_body_size);
                    return FetchOutcome::permanent(TOO_LARGE);
                }
                body.extend_from_slice(&chunk);
            }
            Ok(None) => break,
            Err(e) => return classify_error(&e),
        }
    }

    FetchOutcome::Success(FetchedPage {
        final_url,
        status: status.as_u16(),
        content_type,
        body,
    })
}

fn classify_error(e: &reqwest::Error) -> FetchOutcome {
    if e.is_timeout() {
        FetchOutcome::transient("Timeout")
    } else if e.is_connect() || e.is_body() {
        FetchOutcome::transient("ConnectionError")
    } else {
        FetchOutcome::permanent(format!("Request: {}", e))
    }
}
