use crate::robots::CachedRobots;
use std::time::Duration;
use tokio::time::Instant;

/// Tracks the politeness state of one host during crawling
///
/// A host is a lowercase host name plus a non-default port. Only the
/// politeness gate mutates this structure, always under the host's lock.
#[derive(Debug, Clone)]
pub struct HostState {
    /// Host key (see [`crate::url::extract_host`])
    pub host: String,

    /// Earliest instant the next fetch to this host may start
    pub next_allowed: Option<Instant>,

    /// Configured minimum spacing between fetch starts
    pub min_interval: Duration,

    /// Cached robots rules, absent until first fetched
    pub robots: Option<CachedRobots>,

    /// Fetches admitted and not yet released
    pub in_flight: u32,

    /// Fetches admitted over the whole run
    pub admitted: u64,
}

impl HostState {
    /// Creates a HostState with no history
    pub fn new(host: impl Into<String>, min_interval: Duration) -> Self {
        Self {
            host: host.into(),
            next_allowed: None,
            min_interval,
            robots: None,
            in_flight: 0,
            admitted: 0,
        }
    }

    /// Returns the spacing to enforce between fetch starts
    ///
    /// This is the configured interval, raised to the robots `Crawl-delay`
    /// when that is larger.
    pub fn effective_interval(&self, user_agent: &str) -> Duration {
        let crawl_delay = self
            .robots
            .as_ref()
            .and_then(|robots| robots.crawl_delay(user_agent))
            .unwrap_or_default();
        self.min_interval.max(crawl_delay)
    }

    /// Checks if a fetch may start at `now`
    pub fn can_request(&self, now: Instant) -> bool {
        self.time_until_next_request(now).is_none()
    }

    /// Calculates the time until the next fetch may start
    ///
    /// Returns None if a fetch may start now.
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        match self.next_allowed {
            Some(at) if at > now => Some(at - now),
            _ => None,
        }
    }

    /// Records an admitted fetch starting at `now`
    ///
    /// Advances the next allowed start by `interval` and counts the fetch as
    /// in flight.
    pub fn record_admission(&mut self, now: Instant, interval: Duration) {
        self.next_allowed = Some(now + interval);
        self.in_flight += 1;
        self.admitted += 1;
    }

    /// Records the end of an in-flight fetch
    pub fn release(&mut self) {
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    /// Checks if the robots cache is missing or stale
    pub fn is_robots_stale(&self) -> bool {
        self.robots.as_ref().map_or(true, CachedRobots::is_stale)
    }

    /// Checks a URL against the cached robots rules
    ///
    /// Allowed when no rules are cached.
    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        self.robots
            .as_ref()
            .map_or(true, |robots| robots.is_allowed(url, user_agent))
    }
}
