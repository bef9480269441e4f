//! Crawler coordinator - main crawl orchestration logic
//!
//! The coordinator seeds the frontier, starts the worker pool and then acts
//! as the single consumer of worker events: it pushes discovered links,
//! publishes documents downstream, tracks budgets and decides when the run
//! is over.
//!
//! ```text
//! Seeding -> Running -> Draining -> Terminated
//! ```

use crate::config::{Config, CrawlerConfig};
use crate::crawler::extractor::{DocumentParser, HtmlParser};
use crate::crawler::worker::{run_worker, CrawlResult, FetchBudget, WorkerContext, WorkerEvent};
use crate::crawler::{
    build_http_client, DedupIndex, Fetcher, Frontier, HttpFetcher, PolitenessGate, PushOutcome,
    RetryPolicy,
};
use crate::output::{CrawlSummary, DeadUrl, SkippedUrl, StopReason};
use crate::robots::{HttpRobotsSource, RobotsSource};
use crate::sink::{DocumentRecord, DocumentSink, SqliteOutbox};
use crate::state::{CrawlPhase, CrawlStatus, UrlTask};
use crate::url::normalize_url;
use crate::{CrawlError, Result};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Results between two progress log lines
const PROGRESS_EVERY: u64 = 10;

/// Main crawler coordinator structure
pub struct Coordinator {
    config: CrawlerConfig,
    dedup: Arc<DedupIndex>,
    frontier: Arc<Frontier>,
    gate: Arc<PolitenessGate>,
    fetcher: Arc<dyn Fetcher>,
    parser: Arc<dyn DocumentParser>,
    sink: Arc<dyn DocumentSink>,
    cancel: CancellationToken,
    phase: CrawlPhase,
    config_hash: String,
}

/// Bookkeeping for one run
struct RunState {
    summary: CrawlSummary,
    /// Tasks claimed and not yet terminal
    outstanding: u64,
    url_budget_spent: bool,
    started: std::time::Instant,
}

impl Coordinator {
    /// Creates a coordinator from its collaborators
    ///
    /// # Arguments
    ///
    /// * `config` - Crawl behavior options
    /// * `user_agent` - Product token used to match robots.txt groups
    /// * `fetcher` - HTTP transport
    /// * `robots` - Source of robots rules
    /// * `sink` - Downstream topic for fetched documents
    pub fn new(
        config: CrawlerConfig,
        user_agent: &str,
        fetcher: Arc<dyn Fetcher>,
        robots: Arc<dyn RobotsSource>,
        sink: Arc<dyn DocumentSink>,
    ) -> Self {
        let dedup = Arc::new(DedupIndex::new());
        let frontier = Arc::new(Frontier::new(dedup.clone()));
        let gate = Arc::new(PolitenessGate::new(robots, &config, user_agent));

        Self {
            config,
            dedup,
            frontier,
            gate,
            fetcher,
            parser: Arc::new(HtmlParser),
            sink,
            cancel: CancellationToken::new(),
            phase: CrawlPhase::Seeding,
            config_hash: String::new(),
        }
    }

    /// Builds a coordinator with the HTTP fetcher, HTTP robots source and
    /// SQLite outbox described by `config`
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(CrawlError)` - Failed to build the HTTP client or open the outbox
    pub fn from_config(config: &Config, config_hash: &str) -> Result<Self> {
        let client = build_http_client(&config.user_agent)?;
        let fetcher = Arc::new(HttpFetcher::new(client.clone()));
        let robots =
            Arc::new(HttpRobotsSource::new(client).with_timeout(config.crawler.fetch_timeout()));
        let sink = Arc::new(SqliteOutbox::open(Path::new(&config.output.outbox_path))?);

        Ok(Self::new(
            config.crawler.clone(),
            &config.user_agent.crawler_name,
            fetcher,
            robots,
            sink,
        )
        .with_config_hash(config_hash))
    }

    /// Replaces the HTML parser
    pub fn with_parser(mut self, parser: Arc<dyn DocumentParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Uses an externally owned cancellation token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Stamps the summary with the hash of the configuration used
    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = config_hash.into();
        self
    }

    /// Token that cancels the run when triggered
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Current lifecycle phase
    ///
    /// `Terminated` once `run` has returned.
    pub fn phase(&self) -> CrawlPhase {
        self.phase
    }

    /// URL and content index shared by the frontier and the workers
    pub fn dedup(&self) -> &Arc<DedupIndex> {
        &self.dedup
    }

    /// Runs a complete crawl from `seeds`
    ///
    /// Returns once every worker has exited. Cancellation is not an error:
    /// the summary of the partial run is returned with
    /// [`StopReason::Cancelled`].
    pub async fn run(&mut self, seeds: &[String]) -> Result<CrawlSummary> {
        if self.phase != CrawlPhase::Seeding {
            return Err(CrawlError::InvalidTransition {
                from: self.phase,
                to: CrawlPhase::Seeding,
            });
        }

        let mut run = RunState {
            summary: CrawlSummary::new(self.config_hash.clone()),
            outstanding: 0,
            url_budget_spent: false,
            started: std::time::Instant::now(),
        };

        self.seed(seeds, &mut run);

        let (tx, mut rx) = mpsc::channel((self.config.worker_count as usize * 2).max(1));
        let workers = self.spawn_workers(tx);

        let stop_reason = if run.outstanding == 0 {
            StopReason::Completed
        } else {
            self.transition(CrawlPhase::Running)?;
            self.run_until_stop(&mut rx, &mut run).await
        };

        self.transition(CrawlPhase::Draining)?;
        tracing::info!("Draining: {}", stop_reason);

        self.frontier.close();
        let discarded = self.frontier.drain_pending();
        if !discarded.is_empty() {
            tracing::info!("Discarded {} pending tasks", discarded.len());
        }
        run.summary.abandoned += discarded.len() as u64;
        run.outstanding = run.outstanding.saturating_sub(discarded.len() as u64);

        // In-flight workers finish their current task; anything they try to
        // enqueue is refused by the closed frontier.
        while let Some(event) = rx.recv().await {
            self.handle_event(event, &mut run).await;
        }

        for handle in workers {
            if let Err(e) = handle.await {
                tracing::error!("Worker task failed: {}", e);
            }
        }

        self.transition(CrawlPhase::Terminated)?;

        let mut summary = run.summary;
        summary.stop_reason = stop_reason;
        summary.finished_at = Some(Utc::now());
        summary.duration = run.started.elapsed();
        summary.hosts_seen = self.gate.host_count();

        tracing::info!(
            "Crawl finished: {} fetched, {} failed, {} skipped in {:?}",
            summary.fetched,
            summary.failed,
            summary.skipped,
            summary.duration
        );

        Ok(summary)
    }

    /// Claims and enqueues the seeds; invalid ones are recorded as dead
    fn seed(&self, seeds: &[String], run: &mut RunState) {
        tracing::info!("Seeding frontier with {} URLs", seeds.len());

        for seed in seeds {
            let url = match normalize_url(seed) {
                Ok(url) => url,
                Err(e) => {
                    tracing::warn!("Ignoring invalid seed {}: {}", seed, e);
                    run.summary.failed += 1;
                    run.summary.dead.push(DeadUrl {
                        url: seed.clone(),
                        reason: e.to_string(),
                        retries: 0,
                    });
                    continue;
                }
            };

            match self.frontier.push(UrlTask::seed(url)) {
                Ok(PushOutcome::Enqueued) => run.outstanding += 1,
                Ok(PushOutcome::Duplicate) => tracing::debug!("Duplicate seed {}", seed),
                Err(e) => tracing::warn!("Could not enqueue seed {}: {}", seed, e),
            }
        }
    }

    fn spawn_workers(&self, tx: mpsc::Sender<WorkerEvent>) -> Vec<JoinHandle<()>> {
        let ctx = Arc::new(WorkerContext {
            frontier: self.frontier.clone(),
            gate: self.gate.clone(),
            fetcher: self.fetcher.clone(),
            parser: self.parser.clone(),
            dedup: self.dedup.clone(),
            retry: RetryPolicy::from_config(&self.config),
            fetch_timeout: self.config.fetch_timeout(),
            budget: FetchBudget::new(self.config.url_budget),
            cancel: self.cancel.clone(),
        });

        tracing::info!("Starting {} workers", self.config.worker_count);
        (0..self.config.worker_count as usize)
            .map(|id| tokio::spawn(run_worker(id, ctx.clone(), tx.clone())))
            .collect()
    }

    /// Consumes worker events until the run should stop
    async fn run_until_stop(
        &self,
        rx: &mut mpsc::Receiver<WorkerEvent>,
        run: &mut RunState,
    ) -> StopReason {
        loop {
            if let Some(reason) = self.stop_condition(run) {
                return reason;
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return StopReason::Cancelled,
                event = rx.recv() => match event {
                    Some(event) => self.handle_event(event, run).await,
                    // Every worker exited on its own
                    None => return StopReason::Completed,
                },
            }
        }
    }

    fn stop_condition(&self, run: &RunState) -> Option<StopReason> {
        if run.url_budget_spent {
            return Some(StopReason::UrlBudget);
        }
        if let Some(limit) = self.config.byte_budget {
            if run.summary.bytes_fetched >= limit {
                return Some(StopReason::ByteBudget);
            }
        }
        if run.outstanding == 0 {
            return Some(StopReason::Completed);
        }
        None
    }

    async fn handle_event(&self, event: WorkerEvent, run: &mut RunState) {
        match event {
            WorkerEvent::Finished(result) => {
                run.outstanding = run.outstanding.saturating_sub(1);
                self.handle_result(result, run).await;

                let done = run.summary.total_terminal();
                if done > 0 && done % PROGRESS_EVERY == 0 {
                    let elapsed = run.started.elapsed().as_secs_f64().max(f64::EPSILON);
                    tracing::info!(
                        "Progress: {} pages crawled, {} in frontier, {:.2} pages/sec",
                        run.summary.fetched,
                        self.frontier.len(),
                        run.summary.fetched as f64 / elapsed
                    );
                }
            }
            WorkerEvent::Retrying { .. } => {
                run.summary.retries += 1;
            }
            WorkerEvent::Abandoned { url } => {
                tracing::debug!("Abandoned {}", url);
                run.outstanding = run.outstanding.saturating_sub(1);
                run.summary.abandoned += 1;
            }
            WorkerEvent::BudgetExhausted { url } => {
                tracing::debug!("Fetch budget spent before {}", url);
                run.outstanding = run.outstanding.saturating_sub(1);
                run.summary.abandoned += 1;
                run.url_budget_spent = true;
            }
        }
    }

    async fn handle_result(&self, result: CrawlResult, run: &mut RunState) {
        let CrawlResult {
            task,
            status,
            links,
            content,
            failure,
            fetched_at,
            bytes,
            duplicate,
        } = result;

        match status {
            CrawlStatus::Failed => {
                run.summary.failed += 1;
                run.summary.dead.push(DeadUrl {
                    url: task.url.to_string(),
                    reason: failure.map(|f| f.to_string()).unwrap_or_default(),
                    retries: task.retry_count,
                });
            }
            CrawlStatus::Skipped => {
                run.summary.skipped += 1;
                run.summary.skipped_urls.push(SkippedUrl {
                    url: task.url.to_string(),
                    reason: failure.map(|f| f.to_string()).unwrap_or_default(),
                });
            }
            CrawlStatus::Success => {
                run.summary.fetched += 1;
                run.summary.bytes_fetched += bytes;
                *run.summary.depth_breakdown.entry(task.depth).or_insert(0) += 1;
                if duplicate {
                    run.summary.duplicate_content += 1;
                }

                let mut link_count = 0;
                for link in links.into_iter().flatten() {
                    link_count += 1;
                    let child = task.child(link);
                    if child.depth > self.config.max_depth {
                        continue;
                    }
                    match self.frontier.push(child) {
                        Ok(PushOutcome::Enqueued) => {
                            run.outstanding += 1;
                            run.summary.links_discovered += 1;
                        }
                        Ok(PushOutcome::Duplicate) => {}
                        // Draining: discovered links are dropped
                        Err(_) => {}
                    }
                }

                if let Some(content) = content {
                    let record = DocumentRecord {
                        url: task.url.to_string(),
                        final_url: content.final_url.to_string(),
                        fetched_at: fetched_at.unwrap_or_else(Utc::now),
                        title: content.title,
                        content: content.text,
                        body: content.body,
                        link_count,
                        content_type: content.content_type,
                        status: content.status,
                    };
                    if let Err(e) = self.sink.publish(record).await {
                        tracing::error!("Failed to publish {}: {}", task.url, e);
                        run.summary.emit_failures += 1;
                    }
                }
            }
        }
    }

    fn transition(&mut self, next: CrawlPhase) -> Result<()> {
        if !self.phase.can_transition_to(next) {
            return Err(CrawlError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::info!("Crawl phase: {} -> {}", self.phase, next);
        self.phase = next;
        Ok(())
    }
}
