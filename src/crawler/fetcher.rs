//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building HTTP clients with proper user agent strings
//! - GET requests with a per-fetch timeout
//! - Error classification into [`FetchError`]
//!
//! Non-2xx statuses are not errors at this layer; the retry policy decides
//! what they mean.

use crate::config::UserAgentConfig;
use async_trait::async_trait;
use reqwest::{redirect::Policy, Client};
use std::error::Error as _;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Maximum redirect hops followed before giving up
pub const MAX_REDIRECTS: usize = 10;

/// Transport-level fetch failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("too many redirects")]
    TooManyRedirects,

    #[error("DNS resolution failed: {0}")]
    Dns(String),

    #[error("failed to read body: {0}")]
    Body(String),
}

/// A completed HTTP exchange
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// HTTP status code
    pub status: u16,

    /// URL after redirects
    pub final_url: Url,

    /// Response headers, names lowercased
    pub headers: Vec<(String, String)>,

    /// Raw body bytes
    pub body: Vec<u8>,
}

impl FetchResponse {
    /// Returns the first header with the given (case-insensitive) name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Raw Content-Type header, parameters included
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// True for any 2xx status
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Whether the body should be parsed for links
    ///
    /// A missing Content-Type is treated as HTML.
    pub fn is_html(&self) -> bool {
        self.content_type().map_or(true, |ct| {
            let ct = ct.to_ascii_lowercase();
            ct.contains("text/html") || ct.contains("application/xhtml")
        })
    }

    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// HTTP fetch capability
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs a GET of `url`, giving up after `timeout`
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchResponse, FetchError>;
}

/// Builds an HTTP client with proper configuration
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
/// use ripple_crawl::config::UserAgentConfig;
/// use ripple_crawl::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "RippleBot".to_string(),
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
        .timeout(Duration::from_secs(30))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()
}

/// [`Fetcher`] backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    /// Wraps an existing client
    ///
    /// # Arguments
    ///
    /// * `client` - Client built by [`build_http_client`], usually shared
    ///   with the robots source so both reuse one connection pool
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a fetcher with its own client
    ///
    /// # Returns
    ///
    /// * `Ok(HttpFetcher)` - Fetcher identifying itself with `config`
    /// * `Err(reqwest::Error)` - Failed to build the client
    pub fn from_config(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }

    /// Underlying client, for sharing its connection pool
    pub fn client(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, timeout: Duration) -> Result<FetchResponse, FetchError> {
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_error(&e))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Body(e.to_string())
            }
        })?;

        Ok(FetchResponse {
            status,
            final_url,
            headers,
            body: body.to_vec(),
        })
    }
}

/// Maps a reqwest error onto [`FetchError`]
fn classify_error(error: &reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout
    } else if error.is_redirect() {
        FetchError::TooManyRedirects
    } else if is_dns_failure(error) {
        FetchError::Dns(error.to_string())
    } else if error.is_body() || error.is_decode() {
        FetchError::Body(error.to_string())
    } else {
        FetchError::ConnectionFailed(error.to_string())
    }
}

/// Walks the source chain looking for the resolver's error
fn is_dns_failure(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(err) = source {
        let message = err.to_string().to_lowercase();
        if message.contains("dns error") || message.contains("failed to lookup address") {
            return true;
        }
        source = err.source();
    }
    false
}
