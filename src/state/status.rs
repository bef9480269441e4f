/// Outcome and lifecycle states for a crawl
use std::fmt;

/// Terminal outcome of a single task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlStatus {
    /// Fetched and handed downstream
    Success,

    /// Gave up on the URL (permanent failure or retries exhausted)
    Failed,

    /// Not fetched because policy forbids it
    Skipped,
}

impl CrawlStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle phase of the crawl coordinator
///
/// Phases only move forward:
///
/// ```text
/// Seeding -> Running -> Draining -> Terminated
/// ```
///
/// Draining may also be entered straight from Seeding when no seed survives
/// or the run is cancelled before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CrawlPhase {
    Seeding,
    Running,
    Draining,
    Terminated,
}

impl CrawlPhase {
    /// Returns true if moving from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: CrawlPhase) -> bool {
        matches!(
            (self, next),
            (Self::Seeding, Self::Running)
                | (Self::Seeding, Self::Draining)
                | (Self::Running, Self::Draining)
                | (Self::Draining, Self::Terminated)
        )
    }

    /// Returns true once no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Seeding => "seeding",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Terminated => "terminated",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
