//! Ripple main entry point
//!
//! This is the command-line interface for the Ripple crawl core.

use anyhow::Context;
use clap::Parser;
use ripple_crawl::config::{load_config_with_hash, Config};
use ripple_crawl::output::{generate_markdown_summary, print_summary};
use ripple_crawl::sink::SqliteOutbox;
use ripple_crawl::Coordinator;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Ripple: a polite, concurrent web crawler
///
/// Ripple crawls outward from a set of seed URLs, respecting robots.txt and
/// per-host rate limits, and writes every fetched document to a SQLite
/// outbox for downstream consumers.
#[derive(Parser, Debug)]
#[command(name = "ripple")]
#[command(version = "1.0.0")]
#[command(about = "A polite, concurrent web crawler", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Additional seed URL (may be repeated)
    #[arg(long = "seed", value_name = "URL")]
    seeds: Vec<String>,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with = "pending")]
    dry_run: bool,

    /// Show the number of unacknowledged outbox records and exit
    #[arg(long, conflicts_with = "dry_run")]
    pending: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    let mut seeds = config.seeds.clone();
    seeds.extend(cli.seeds.iter().cloned());

    if cli.dry_run {
        handle_dry_run(&config, &seeds);
    } else if cli.pending {
        handle_pending(&config)?;
    } else {
        handle_crawl(&config, &config_hash, &seeds).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ripple_crawl=info,ripple=info,warn"),
            1 => EnvFilter::new("ripple_crawl=debug,ripple=debug,info"),
            2 => EnvFilter::new("ripple_crawl=trace,ripple=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --dry-run mode: shows the effective settings and seeds
fn handle_dry_run(config: &Config, seeds: &[String]) {
    let crawler = &config.crawler;

    println!("=== Ripple Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max depth: {}", crawler.max_depth);
    println!("  Workers: {}", crawler.worker_count);
    println!("  Per-host interval: {:?}", crawler.min_interval());
    println!("  Fetch timeout: {:?}", crawler.fetch_timeout());
    println!(
        "  Retries: {} (backoff {:?} .. {:?})",
        crawler.max_retries,
        crawler.backoff_base(),
        crawler.backoff_cap()
    );
    println!("  Robots TTL: {:?}", crawler.robots_ttl());
    match crawler.url_budget {
        Some(limit) => println!("  URL budget: {}", limit),
        None => println!("  URL budget: unlimited"),
    }
    match crawler.byte_budget {
        Some(limit) => println!("  Byte budget: {}", limit),
        None => println!("  Byte budget: unlimited"),
    }

    println!("\nUser Agent: {}", config.user_agent.header_value());

    println!("\nOutput:");
    println!("  Outbox: {}", config.output.outbox_path);
    println!("  Summary: {}", config.output.summary_path);

    println!("\nSeeds ({}):", seeds.len());
    for seed in seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the --pending mode: reports how much of the outbox is unconsumed
fn handle_pending(config: &Config) -> anyhow::Result<()> {
    let outbox = SqliteOutbox::open(Path::new(&config.output.outbox_path))
        .with_context(|| format!("failed to open outbox {}", config.output.outbox_path))?;
    let pending = outbox.pending_count()?;

    println!("Outbox: {}", config.output.outbox_path);
    println!("Pending records: {}", pending);

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: &Config, config_hash: &str, seeds: &[String]) -> anyhow::Result<()> {
    if seeds.is_empty() {
        tracing::warn!("No seed URLs configured; nothing to crawl");
    }

    let mut coordinator = Coordinator::from_config(config, config_hash)
        .context("failed to set up the crawler")?;

    let cancel = coordinator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, draining in-flight fetches");
            cancel.cancel();
        }
    });

    let summary = coordinator.run(seeds).await.context("crawl failed")?;

    let summary_path = Path::new(&config.output.summary_path);
    generate_markdown_summary(&summary, summary_path)
        .with_context(|| format!("failed to write {}", summary_path.display()))?;
    tracing::info!("Summary written to {}", summary_path.display());

    print_summary(&summary);

    Ok(())
}
