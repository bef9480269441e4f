//! Robots.txt handling module
//!
//! This module provides fetching, parsing and caching of robots.txt files.
//! The politeness gate consults a [`RobotsSource`] lazily, the first time a
//! host is seen and whenever its cached rules go stale.

mod cache;
mod parser;

pub use cache::CachedRobots;
pub use parser::ParsedRobots;

use crate::CrawlError;
use async_trait::async_trait;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Source of robots rules for a host
#[async_trait]
pub trait RobotsSource: Send + Sync {
    /// Returns the rules governing `url`'s origin
    ///
    /// An error means the rules could not be obtained; callers treat that as
    /// allow-all.
    async fn rules(&self, url: &Url) -> Result<ParsedRobots, CrawlError>;
}

/// Time limit on a robots.txt request when none is configured
pub const DEFAULT_ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);

/// Returns the robots.txt location for a URL's origin
pub fn robots_url(url: &Url) -> Result<Url, CrawlError> {
    Ok(url.join("/robots.txt")?)
}

/// Fetches robots.txt over HTTP
///
/// | Response | Rules |
/// |----------|-------|
/// | 2xx | parsed body |
/// | 4xx | allow all |
/// | 5xx or network error | error |
#[derive(Debug, Clone)]
pub struct HttpRobotsSource {
    client: Client,
    timeout: Duration,
}

impl HttpRobotsSource {
    /// Creates a source using an already configured client
    ///
    /// Requests give up after [`DEFAULT_ROBOTS_TIMEOUT`] unless
    /// [`HttpRobotsSource::with_timeout`] says otherwise.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            timeout: DEFAULT_ROBOTS_TIMEOUT,
        }
    }

    /// Sets the per-request time limit
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl RobotsSource for HttpRobotsSource {
    async fn rules(&self, url: &Url) -> Result<ParsedRobots, CrawlError> {
        let location = robots_url(url)?;
        let host = url.host_str().unwrap_or_default().to_string();

        let response = self
            .client
            .get(location.clone())
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            debug!("Fetched {} ({} bytes)", location, body.len());
            return Ok(ParsedRobots::from_content(&body));
        }

        if status.is_client_error() {
            debug!("No robots.txt at {} (HTTP {})", location, status.as_u16());
            return Ok(ParsedRobots::allow_all());
        }

        Err(CrawlError::Robots {
            host,
            message: format!("HTTP {}", status.as_u16()),
        })
    }
}

/// Serves fixed rules per host; unknown hosts are allowed everything
///
/// Useful for crawls of sites whose policy is known up front.
#[derive(Debug, Clone, Default)]
pub struct StaticRobotsSource {
    rules: HashMap<String, ParsedRobots>,
}

impl StaticRobotsSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers rules for a host key (as produced by [`crate::url::extract_host`])
    pub fn with_rules(mut self, host: impl Into<String>, rules: ParsedRobots) -> Self {
        self.rules.insert(host.into(), rules);
        self
    }
}

#[async_trait]
impl RobotsSource for StaticRobotsSource {
    async fn rules(&self, url: &Url) -> Result<ParsedRobots, CrawlError> {
        let rules = crate::url::extract_host(url)
            .and_then(|host| self.rules.get(&host).cloned())
            .unwrap_or_else(ParsedRobots::allow_all);
        Ok(rules)
    }
}
