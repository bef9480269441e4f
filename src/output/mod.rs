//! Output module for crawl summaries
//!
//! This module handles:
//! - The summary the coordinator produces at the end of a run
//! - Rendering it as markdown
//! - Printing it to the terminal

mod markdown;
mod summary;

pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use summary::{
    print_summary, CrawlSummary, DeadUrl, OutputError, OutputResult, SkippedUrl, StopReason,
};
