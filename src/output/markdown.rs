//! Markdown summary generation
//!
//! This module generates human-readable markdown summaries of crawl results,
//! including statistics, dead URLs and policy skips.

use crate::output::summary::{CrawlSummary, OutputResult};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Rows shown per URL table before truncating
const TABLE_LIMIT: usize = 50;

/// Writes a markdown summary to a file
///
/// # Arguments
///
/// * `summary` - The crawl summary data
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(summary: &CrawlSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a crawl summary as markdown
pub fn format_markdown_summary(summary: &CrawlSummary) -> String {
    let mut md = String::new();

    md.push_str("# Ripple Crawl Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    if let Some(finished) = &summary.finished_at {
        md.push_str(&format!("- **Finished**: {}\n", finished.to_rfc3339()));
    }
    md.push_str(&format!(
        "- **Duration**: {:.1} seconds ({:.2} minutes)\n",
        summary.duration.as_secs_f64(),
        summary.duration.as_secs_f64() / 60.0
    ));
    md.push_str(&format!("- **Stopped**: {}\n", summary.stop_reason));
    md.push_str(&format!("- **Config Hash**: {}\n\n", summary.config_hash));

    // Overall statistics
    md.push_str("## Overall Statistics\n\n");
    md.push_str("| Metric | Value |\n");
    md.push_str("|--------|-------|\n");
    md.push_str(&format!("| Fetched | {} |\n", summary.fetched));
    md.push_str(&format!("| Failed | {} |\n", summary.failed));
    md.push_str(&format!("| Skipped | {} |\n", summary.skipped));
    md.push_str(&format!("| Abandoned | {} |\n", summary.abandoned));
    md.push_str(&format!("| Links Discovered | {} |\n", summary.links_discovered));
    md.push_str(&format!("| Duplicate Content | {} |\n", summary.duplicate_content));
    md.push_str(&format!("| Bytes Fetched | {} |\n", summary.bytes_fetched));
    md.push_str(&format!("| Retries | {} |\n", summary.retries));
    md.push_str(&format!("| Emit Failures | {} |\n", summary.emit_failures));
    md.push_str(&format!("| Hosts | {} |\n", summary.hosts_seen));
    md.push_str(&format!("| Success Rate | {:.2}% |\n", summary.success_rate()));
    md.push_str(&format!(
        "| Pages/sec | {:.2} |\n\n",
        summary.pages_per_second()
    ));

    // Depth breakdown
    if !summary.depth_breakdown.is_empty() {
        md.push_str("## Depth Breakdown\n\n");
        md.push_str("| Depth | Pages |\n");
        md.push_str("|-------|-------|\n");
        for (depth, count) in &summary.depth_breakdown {
            md.push_str(&format!("| {} | {} |\n", depth, count));
        }
        md.push('\n');
    }

    if !summary.dead.is_empty() {
        md.push_str("## Dead URLs\n\n");
        md.push_str("| URL | Reason | Retries |\n");
        md.push_str("|-----|--------|---------|\n");
        for dead in summary.dead.iter().take(TABLE_LIMIT) {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                dead.url, dead.reason, dead.retries
            ));
        }
        push_truncation(&mut md, summary.dead.len());
    }

    if !summary.skipped_urls.is_empty() {
        md.push_str("## Skipped URLs\n\n");
        md.push_str("| URL | Reason |\n");
        md.push_str("|-----|--------|\n");
        for skipped in summary.skipped_urls.iter().take(TABLE_LIMIT) {
            md.push_str(&format!("| {} | {} |\n", skipped.url, skipped.reason));
        }
        push_truncation(&mut md, summary.skipped_urls.len());
    }

    md
}

fn push_truncation(md: &mut String, total: usize) {
    if total > TABLE_LIMIT {
        md.push_str(&format!("\n... and {} more\n\n", total - TABLE_LIMIT));
    } else {
        md.push('\n');
    }
}
