use std::fmt;
use tokio::time::Instant;
use url::Url;

/// A unit of crawl work: one canonical URL at a known depth
///
/// The canonical URL identifies the task; the Frontier never holds two tasks
/// with the same URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTask {
    /// Canonical URL (see [`crate::url::normalize_url`])
    pub url: Url,

    /// Link distance from the seed this task was discovered from
    pub depth: u32,

    /// When the task was first created
    pub enqueued_at: Instant,

    /// Number of failed fetch attempts so far
    pub retry_count: u32,

    /// The task must not be dispatched before this instant
    pub not_before: Option<Instant>,
}

impl UrlTask {
    /// Creates a depth-0 task
    pub fn seed(url: Url) -> Self {
        Self::at_depth(url, 0)
    }

    /// Creates a task at an explicit depth
    pub fn at_depth(url: Url, depth: u32) -> Self {
        Self {
            url,
            depth,
            enqueued_at: Instant::now(),
            retry_count: 0,
            not_before: None,
        }
    }

    /// Creates a task for a link found on this task's page
    pub fn child(&self, url: Url) -> Self {
        Self::at_depth(url, self.depth + 1)
    }

    /// Scheduling priority; lower values are dispatched first
    pub fn priority(&self) -> u32 {
        self.depth
    }

    /// Returns this task scheduled for another attempt after a failure
    pub fn retry_at(mut self, not_before: Instant) -> Self {
        self.retry_count += 1;
        self.not_before = Some(not_before);
        self
    }

    /// Returns this task deferred without counting an attempt
    ///
    /// Used when the politeness gate asks the worker to come back later.
    pub fn defer_until(mut self, not_before: Instant) -> Self {
        self.not_before = Some(not_before);
        self
    }

    /// Whether the task may be dispatched at `now`
    pub fn is_ready(&self, now: Instant) -> bool {
        self.not_before.map_or(true, |at| at <= now)
    }
}

impl fmt::Display for UrlTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (depth {})", self.url, self.depth)
    }
}
