//! Failure classification and retry policy
//!
//! | Condition | Action |
//! |-----------|--------|
//! | Timeout, connection failure, body read failure | Retry with backoff |
//! | HTTP 5xx, HTTP 429 | Retry with backoff |
//! | Other HTTP 4xx | Dead immediately |
//! | DNS failure, too many redirects | Dead immediately |
//! | Disallowed by robots.txt | Skipped |

use crate::config::CrawlerConfig;
use crate::crawler::FetchError;
use std::time::Duration;
use thiserror::Error;

/// Why a task did not produce a document
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CrawlFailure {
    /// Worth another attempt later
    #[error("transient fetch failure: {0}")]
    TransientFetch(String),

    /// Retrying cannot help
    #[error("permanent fetch failure: {0}")]
    PermanentFetch(String),

    /// The host's robots rules forbid the path
    #[error("disallowed by robots.txt")]
    PolicyDenied,

    /// The frontier no longer accepts work
    #[error("frontier is closed")]
    FrontierClosed,
}

impl CrawlFailure {
    /// Classifies a transport error
    ///
    /// Timeouts, connection failures and truncated bodies are transient;
    /// DNS failures and redirect loops are permanent.
    pub fn from_fetch_error(error: &FetchError) -> Self {
        match error {
            FetchError::Timeout | FetchError::ConnectionFailed(_) | FetchError::Body(_) => {
                Self::TransientFetch(error.to_string())
            }
            FetchError::TooManyRedirects | FetchError::Dns(_) => {
                Self::PermanentFetch(error.to_string())
            }
        }
    }

    /// Classifies a non-success HTTP status
    ///
    /// # Arguments
    ///
    /// * `status` - Final HTTP status after redirects
    ///
    /// # Returns
    ///
    /// * `None` - 2xx, the fetch succeeded
    /// * `Some(TransientFetch)` - 429 or 5xx
    /// * `Some(PermanentFetch)` - Any other status
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..=299 => None,
            429 | 500..=599 => Some(Self::TransientFetch(format!("HTTP {}", status))),
            _ => Some(Self::PermanentFetch(format!("HTTP {}", status))),
        }
    }

    /// Whether the retry policy may try the task again
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientFetch(_))
    }
}

/// Exponential backoff for transient failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RetryPolicy {
    /// Reads the retry limit and backoff bounds from `config`
    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base: config.backoff_base(),
            cap: config.backoff_cap(),
        }
    }

    /// Delay before retry number `attempt` (1-based)
    ///
    /// `base * 2^(attempt - 1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.cap)
            .min(self.cap)
    }

    /// Decides whether a task that has already been retried `retry_count`
    /// times gets another attempt after `failure`
    ///
    /// # Arguments
    ///
    /// * `failure` - Why the latest attempt failed
    /// * `retry_count` - Retries already spent on the task
    ///
    /// # Returns
    ///
    /// * `Some(delay)` - Requeue the task to run after `delay`
    /// * `None` - The failure is permanent or the retries are used up
    pub fn next_attempt(&self, failure: &CrawlFailure, retry_count: u32) -> Option<Duration> {
        if !failure.is_retryable() || retry_count >= self.max_retries {
            return None;
        }
        Some(self.backoff(retry_count + 1))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CrawlerConfig::default())
    }
}
