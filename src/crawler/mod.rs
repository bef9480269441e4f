//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - The dedup index and the frontier of pending tasks
//! - Per-host politeness (rate limiting and robots.txt)
//! - HTTP fetching and failure classification
//! - HTML parsing and link extraction
//! - The worker pool and the coordinator that drives it

mod coordinator;
mod dedup;
mod extractor;
mod fetcher;
mod frontier;
mod politeness;
mod retry;
mod worker;

pub use coordinator::Coordinator;
pub use dedup::{DedupIndex, Fingerprint};
pub use extractor::{
    extract_links, resolve_link, DocumentParser, ExtractedLinks, HtmlParser, ParsedDocument,
};
pub use fetcher::{
    build_http_client, FetchError, FetchResponse, Fetcher, HttpFetcher, MAX_REDIRECTS,
};
pub use frontier::{Frontier, PushOutcome};
pub use politeness::{AdmitDecision, HostLease, PolitenessGate};
pub use retry::{CrawlFailure, RetryPolicy};
pub use worker::{CrawlResult, FetchedContent, WorkerEvent};
