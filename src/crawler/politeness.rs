//! Per-host politeness gate
//!
//! Each host has its own entry in a sharded map. Admission takes only that
//! host's lock, so workers fetching from different hosts never contend.
//! Robots rules are loaded lazily under a separate async lock per host, so
//! concurrent first encounters trigger a single robots fetch.

use crate::config::CrawlerConfig;
use crate::robots::{CachedRobots, ParsedRobots, RobotsSource};
use crate::state::HostState;
use crate::url::extract_host;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

/// Outcome of asking the gate for permission to fetch
#[derive(Debug)]
pub enum AdmitDecision {
    /// Fetch now; drop the lease when done
    Allow(HostLease),

    /// Too soon for this host; try again after `retry_after`
    Deny { retry_after: Duration },

    /// Robots rules forbid the path; never retry
    Disallowed,
}

#[derive(Debug)]
struct HostEntry {
    state: parking_lot::Mutex<HostState>,
    robots_refresh: tokio::sync::Mutex<()>,
}

/// Proof of an admitted fetch
///
/// Dropping the lease releases the host, whatever way the fetch ended.
#[derive(Debug)]
pub struct HostLease {
    host: String,
    entry: Arc<HostEntry>,
}

impl HostLease {
    /// Host this lease is held on
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Releases the host explicitly
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for HostLease {
    fn drop(&mut self) {
        self.entry.state.lock().release();
    }
}

/// Rate limiter and robots cache keyed by host
pub struct PolitenessGate {
    hosts: DashMap<String, Arc<HostEntry>>,
    robots: Arc<dyn RobotsSource>,
    user_agent: String,
    min_interval: Duration,
    robots_ttl: Duration,
    robots_timeout: Duration,
}

impl PolitenessGate {
    /// Creates a gate
    ///
    /// # Arguments
    ///
    /// * `robots` - Where robots rules come from
    /// * `config` - Supplies the default interval, the robots TTL and the
    ///   time limit on a robots lookup (the fetch timeout)
    /// * `user_agent` - Product token matched against robots groups
    pub fn new(
        robots: Arc<dyn RobotsSource>,
        config: &CrawlerConfig,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            hosts: DashMap::new(),
            robots,
            user_agent: user_agent.into(),
            min_interval: config.min_interval(),
            robots_ttl: config.robots_ttl(),
            robots_timeout: config.fetch_timeout(),
        }
    }

    /// Decides whether `url` may be fetched now
    ///
    /// Looks up robots rules for the host on first use or after the cached
    /// copy expires. A lookup that fails or outlives the fetch timeout
    /// falls back to allowing everything.
    ///
    /// # Arguments
    ///
    /// * `url` - Canonical URL about to be fetched
    ///
    /// # Returns
    ///
    /// * `AdmitDecision::Allow(lease)` - Fetch now; the host stays busy until
    ///   the lease is dropped
    /// * `AdmitDecision::Deny { retry_after }` - The host is busy or was hit
    ///   too recently; try again after `retry_after`
    /// * `AdmitDecision::Disallowed` - robots.txt forbids `url`, or it has no host
    pub async fn admit(&self, url: &Url) -> AdmitDecision {
        let Some(host) = extract_host(url) else {
            return AdmitDecision::Disallowed;
        };
        let entry = self.entry(&host);

        self.ensure_robots(&host, &entry, url).await;

        let now = Instant::now();
        let mut state = entry.state.lock();

        if !state.is_allowed(url.as_str(), &self.user_agent) {
            debug!("{} disallowed by robots.txt", url);
            return AdmitDecision::Disallowed;
        }

        if let Some(retry_after) = state.time_until_next_request(now) {
            return AdmitDecision::Deny { retry_after };
        }

        let interval = state.effective_interval(&self.user_agent);
        state.record_admission(now, interval);
        drop(state);

        AdmitDecision::Allow(HostLease { host, entry })
    }

    /// Returns a copy of a host's state, if the host has been seen
    ///
    /// # Arguments
    ///
    /// * `host` - Lowercased host name, with a `:port` suffix for
    ///   non-default ports
    pub fn host_state(&self, host: &str) -> Option<HostState> {
        self.hosts
            .get(host)
            .map(|entry| entry.value().state.lock().clone())
    }

    /// Number of distinct hosts seen
    pub fn host_count(&self) -> usize {
        self.hosts.len()
    }

    fn entry(&self, host: &str) -> Arc<HostEntry> {
        if let Some(entry) = self.hosts.get(host) {
            return entry.value().clone();
        }
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| {
                Arc::new(HostEntry {
                    state: parking_lot::Mutex::new(HostState::new(host, self.min_interval)),
                    robots_refresh: tokio::sync::Mutex::new(()),
                })
            })
            .value()
            .clone()
    }

    /// Loads or refreshes the host's robots rules if they are missing or stale
    async fn ensure_robots(&self, host: &str, entry: &HostEntry, url: &Url) {
        let stale = entry.state.lock().is_robots_stale();
        if !stale {
            return;
        }

        let _refresh = entry.robots_refresh.lock().await;

        // Another worker may have refreshed while we waited
        let stale = entry.state.lock().is_robots_stale();
        if !stale {
            return;
        }

        let rules = match tokio::time::timeout(self.robots_timeout, self.robots.rules(url)).await {
            Ok(Ok(rules)) => rules,
            Ok(Err(e)) => {
                warn!("Could not load robots.txt for {}, allowing all: {}", host, e);
                ParsedRobots::allow_all()
            }
            Err(_) => {
                warn!(
                    "robots.txt for {} did not answer within {:?}, allowing all",
                    host, self.robots_timeout
                );
                ParsedRobots::allow_all()
            }
        };

        debug!("Cached robots.txt for {}", host);
        entry.state.lock().robots = Some(CachedRobots::new(rules, self.robots_ttl));
    }
}
