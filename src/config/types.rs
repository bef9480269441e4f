use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure for Ripple
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub output: OutputConfig,
    /// Seed URLs, in the order they should be dispatched
    #[serde(default)]
    pub seeds: Vec<String>,
}

/// Crawler behavior configuration
///
/// Durations are expressed in milliseconds (seconds for `robots-ttl`) in the
/// TOML file; use the accessor methods to get [`Duration`] values.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CrawlerConfig {
    /// Maximum link depth from a seed (seeds are depth 0)
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Number of concurrent fetch workers
    #[serde(rename = "worker-count")]
    pub worker_count: u32,

    /// Minimum time between fetch starts to the same host (milliseconds)
    #[serde(rename = "per-host-min-interval")]
    pub per_host_min_interval: u64,

    /// Per-fetch timeout (milliseconds)
    #[serde(rename = "fetch-timeout")]
    pub fetch_timeout: u64,

    /// Retries allowed for transient failures before a URL is declared dead
    #[serde(rename = "max-retries")]
    pub max_retries: u32,

    /// First retry delay (milliseconds), doubled for every further retry
    #[serde(rename = "backoff-base")]
    pub backoff_base: u64,

    /// Upper bound on the retry delay (milliseconds)
    #[serde(rename = "backoff-cap")]
    pub backoff_cap: u64,

    /// How long a fetched robots.txt stays fresh (seconds)
    #[serde(rename = "robots-ttl")]
    pub robots_ttl: u64,

    /// Optional cap on the total number of fetches in a run
    #[serde(rename = "url-budget")]
    pub url_budget: Option<u64>,

    /// Optional cap on the total number of body bytes fetched in a run
    #[serde(rename = "byte-budget")]
    pub byte_budget: Option<u64>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            worker_count: 50,
            per_host_min_interval: 1_000,
            fetch_timeout: 10_000,
            max_retries: 3,
            backoff_base: 2_000,
            backoff_cap: 60_000,
            robots_ttl: 24 * 60 * 60,
            url_budget: None,
            byte_budget: None,
        }
    }
}

impl CrawlerConfig {
    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.per_host_min_interval)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base)
    }

    pub fn backoff_cap(&self) -> Duration {
        Duration::from_millis(self.backoff_cap)
    }

    pub fn robots_ttl(&self) -> Duration {
        Duration::from_secs(self.robots_ttl)
    }
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the User-Agent header: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite outbox the fetched documents are published to
    #[serde(rename = "outbox-path")]
    pub outbox_path: String,

    /// Path to the markdown summary file
    #[serde(rename = "summary-path")]
    pub summary_path: String,
}
