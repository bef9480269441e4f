//! Robots.txt caching implementation
//!
//! Cached rules expire after a configurable TTL (24 hours by default) so
//! changes made by a site owner are picked up during long runs.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};

/// Cached robots.txt data for a host
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt content
    pub content: ParsedRobots,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,

    /// How long the entry stays fresh
    pub ttl: Duration,
}

impl CachedRobots {
    /// Creates a new entry stamped with the current time
    ///
    /// # Arguments
    ///
    /// * `content` - Rules parsed from the host's robots.txt
    /// * `ttl` - How long the rules stay fresh; values too large for chrono
    ///   never expire
    pub fn new(content: ParsedRobots, ttl: std::time::Duration) -> Self {
        Self {
            content,
            fetched_at: Utc::now(),
            ttl: Duration::from_std(ttl).unwrap_or(Duration::MAX),
        }
    }

    /// Checks if the cached robots.txt is older than its TTL
    pub fn is_stale(&self) -> bool {
        self.age() > self.ttl
    }

    /// Returns the age of the cached robots.txt
    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }

    /// Checks if a URL is allowed according to the cached robots.txt
    ///
    /// # Arguments
    ///
    /// * `url` - Full URL to check
    /// * `user_agent` - Product token matched against the robots groups
    ///
    /// # Returns
    ///
    /// * `true` - No matching rule forbids `url`
    /// * `false` - A disallow rule matches `url`
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        self.content.is_allowed(url, user_agent)
    }

    /// Gets the crawl delay from the cached robots.txt
    pub fn crawl_delay(&self, user_agent: &str) -> Option<std::time::Duration> {
        self.content.crawl_delay(user_agent)
    }
}
