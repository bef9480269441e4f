//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `UrlTask`: one unit of crawl work (canonical URL, depth, retry bookkeeping)
//! - `HostState`: per-host politeness state (rate limiting, robots cache)
//! - `CrawlStatus`: terminal outcome of a task
//! - `CrawlPhase`: lifecycle of the coordinator

mod host_state;
mod status;
mod task;

// Re-export main types
pub use host_state::HostState;
pub use status::{CrawlPhase, CrawlStatus};
pub use task::UrlTask;
