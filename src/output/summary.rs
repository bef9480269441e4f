//! Crawl summary data
//!
//! The coordinator fills a [`CrawlSummary`] as results arrive and hands it
//! back when the run terminates.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Why the run stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Every discovered task reached a terminal status
    Completed,

    /// The URL budget was spent
    UrlBudget,

    /// The byte budget was spent
    ByteBudget,

    /// The run was cancelled from outside
    Cancelled,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::UrlBudget => "url budget exhausted",
            Self::ByteBudget => "byte budget exhausted",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{}", s)
    }
}

/// A URL that will not be fetched again this run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadUrl {
    pub url: String,
    pub reason: String,
    pub retries: u32,
}

/// A URL that policy kept us from fetching
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedUrl {
    pub url: String,
    pub reason: String,
}

/// Summary of a complete crawl run
#[derive(Debug, Clone)]
pub struct CrawlSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration: Duration,
    pub config_hash: String,
    pub stop_reason: StopReason,

    /// Successful fetches, including duplicate bodies
    pub fetched: u64,
    pub failed: u64,
    pub skipped: u64,

    /// Novel URLs added to the frontier from fetched documents
    pub links_discovered: u64,
    pub duplicate_content: u64,
    pub bytes_fetched: u64,
    pub retries: u64,

    /// Tasks dropped while draining
    pub abandoned: u64,
    pub emit_failures: u64,

    /// Distinct hosts the politeness gate saw
    pub hosts_seen: usize,

    /// Successful fetches per depth
    pub depth_breakdown: BTreeMap<u32, u64>,

    pub dead: Vec<DeadUrl>,
    pub skipped_urls: Vec<SkippedUrl>,
}

impl CrawlSummary {
    /// Creates an empty summary stamped with the current time
    pub fn new(config_hash: impl Into<String>) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            duration: Duration::ZERO,
            config_hash: config_hash.into(),
            stop_reason: StopReason::Completed,
            fetched: 0,
            failed: 0,
            skipped: 0,
            links_discovered: 0,
            duplicate_content: 0,
            bytes_fetched: 0,
            retries: 0,
            abandoned: 0,
            emit_failures: 0,
            hosts_seen: 0,
            depth_breakdown: BTreeMap::new(),
            dead: Vec::new(),
            skipped_urls: Vec::new(),
        }
    }

    /// Tasks that reached a terminal status
    pub fn total_terminal(&self) -> u64 {
        self.fetched + self.failed + self.skipped
    }

    /// Percentage of attempted (non-skipped) URLs that were fetched
    pub fn success_rate(&self) -> f64 {
        let attempted = self.fetched + self.failed;
        if attempted == 0 {
            0.0
        } else {
            (self.fetched as f64 / attempted as f64) * 100.0
        }
    }

    /// Fetches per second over the whole run
    pub fn pages_per_second(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs == 0.0 {
            0.0
        } else {
            self.fetched as f64 / secs
        }
    }
}

/// Prints a summary to stdout
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Summary ===\n");

    println!("Overview:");
    println!("  Stopped: {}", summary.stop_reason);
    println!("  Duration: {:.1}s", summary.duration.as_secs_f64());
    println!("  Hosts: {}", summary.hosts_seen);
    println!();

    println!("Pages:");
    println!("  Fetched: {}", summary.fetched);
    println!("  Failed: {}", summary.failed);
    println!("  Skipped: {}", summary.skipped);
    println!("  Abandoned: {}", summary.abandoned);
    println!("  Success rate: {:.1}%", summary.success_rate());
    println!();

    println!("Discovery:");
    println!("  New links: {}", summary.links_discovered);
    println!("  Duplicate bodies: {}", summary.duplicate_content);
    println!("  Bytes fetched: {}", summary.bytes_fetched);
    println!("  Retries: {}", summary.retries);
    if summary.emit_failures > 0 {
        println!("  Emit failures: {}", summary.emit_failures);
    }
    println!();

    if !summary.dead.is_empty() {
        println!("Dead URLs ({}):", summary.dead.len());
        for dead in summary.dead.iter().take(20) {
            println!("  {} ({})", dead.url, dead.reason);
        }
        if summary.dead.len() > 20 {
            println!("  ... and {} more", summary.dead.len() - 20);
        }
        println!();
    }
}
