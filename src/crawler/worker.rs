//! Fetch workers
//!
//! Each worker loops: pop a task, ask the politeness gate, fetch, and report
//! what happened to the coordinator over a channel. Workers never touch the
//! summary or the sink directly.

use crate::crawler::extractor::{extract_links, DocumentParser, ExtractedLinks};
use crate::crawler::{
    AdmitDecision, CrawlFailure, DedupIndex, FetchError, FetchResponse, Fetcher, Frontier,
    PolitenessGate, RetryPolicy,
};
use crate::state::{CrawlStatus, UrlTask};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use url::Url;

/// What a successful fetch produced, minus the links
#[derive(Debug, Clone)]
pub struct FetchedContent {
    pub final_url: Url,
    pub status: u16,
    pub content_type: Option<String>,
    pub title: Option<String>,
    pub text: String,
    /// Raw response body
    pub body: Vec<u8>,
}

/// Terminal outcome of one task, handed from a worker to the coordinator
#[derive(Debug)]
pub struct CrawlResult {
    pub task: UrlTask,
    pub status: CrawlStatus,

    /// Outbound links, resolved lazily; None unless the fetch succeeded
    pub links: Option<ExtractedLinks>,

    /// None for failures and for bodies already seen under another URL
    pub content: Option<FetchedContent>,

    pub failure: Option<CrawlFailure>,
    pub fetched_at: Option<DateTime<Utc>>,

    /// Body size in bytes
    pub bytes: u64,

    /// The body was identical to one fetched earlier
    pub duplicate: bool,
}

impl CrawlResult {
    fn failed(task: UrlTask, failure: CrawlFailure) -> Self {
        Self {
            task,
            status: CrawlStatus::Failed,
            links: None,
            content: None,
            failure: Some(failure),
            fetched_at: None,
            bytes: 0,
            duplicate: false,
        }
    }

    fn skipped(task: UrlTask) -> Self {
        Self {
            status: CrawlStatus::Skipped,
            ..Self::failed(task, CrawlFailure::PolicyDenied)
        }
    }
}

/// Messages from workers to the coordinator
#[derive(Debug)]
pub enum WorkerEvent {
    /// The task reached a terminal status
    Finished(CrawlResult),

    /// The task failed transiently and was requeued
    Retrying {
        url: Url,
        attempt: u32,
        failure: CrawlFailure,
    },

    /// The task was dropped because the run is shutting down
    Abandoned { url: Url },

    /// The fetch budget ran out before this task could be fetched
    BudgetExhausted { url: Url },
}

/// Run-wide cap on the number of fetches
#[derive(Debug)]
pub struct FetchBudget {
    remaining: Option<AtomicU64>,
}

impl FetchBudget {
    /// # Arguments
    ///
    /// * `limit` - Maximum number of fetches, or None for no limit
    pub fn new(limit: Option<u64>) -> Self {
        Self {
            remaining: limit.map(AtomicU64::new),
        }
    }

    /// Takes one fetch permit; false once the budget is spent
    pub fn try_take(&self) -> bool {
        match &self.remaining {
            None => true,
            Some(remaining) => remaining
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
                .is_ok(),
        }
    }
}

/// Everything a worker needs, shared by the whole pool
pub struct WorkerContext {
    pub frontier: Arc<Frontier>,
    pub gate: Arc<PolitenessGate>,
    pub fetcher: Arc<dyn Fetcher>,
    pub parser: Arc<dyn DocumentParser>,
    pub dedup: Arc<DedupIndex>,
    pub retry: RetryPolicy,
    pub fetch_timeout: Duration,
    pub budget: FetchBudget,
    pub cancel: CancellationToken,
}

/// Runs one worker until the frontier is exhausted, the run is cancelled,
/// or the fetch budget is spent
pub async fn run_worker(id: usize, ctx: Arc<WorkerContext>, events: mpsc::Sender<WorkerEvent>) {
    tracing::trace!("Worker {} started", id);

    while let Some(task) = ctx.frontier.pop(&ctx.cancel).await {
        tracing::debug!("Worker {} dispatching {}", id, task);

        let decision = tokio::select! {
            _ = ctx.cancel.cancelled() => None,
            decision = ctx.gate.admit(&task.url) => Some(decision),
        };
        let Some(decision) = decision else {
            let _ = events.send(WorkerEvent::Abandoned { url: task.url }).await;
            break;
        };

        let lease = match decision {
            AdmitDecision::Allow(lease) => lease,
            AdmitDecision::Disallowed => {
                let _ = events
                    .send(WorkerEvent::Finished(CrawlResult::skipped(task)))
                    .await;
                continue;
            }
            AdmitDecision::Deny { retry_after } => {
                let url = task.url.clone();
                let deferred = task.defer_until(Instant::now() + retry_after);
                if ctx.frontier.requeue(deferred).is_err() {
                    let _ = events.send(WorkerEvent::Abandoned { url }).await;
                }
                continue;
            }
        };

        if !ctx.budget.try_take() {
            drop(lease);
            tracing::debug!("Worker {} stopping: fetch budget spent", id);
            let _ = events
                .send(WorkerEvent::BudgetExhausted { url: task.url })
                .await;
            break;
        }

        let fetch = tokio::time::timeout(ctx.fetch_timeout, ctx.fetcher.fetch(&task.url, ctx.fetch_timeout));
        let outcome = tokio::select! {
            _ = ctx.cancel.cancelled() => None,
            result = fetch => Some(result.unwrap_or(Err(FetchError::Timeout))),
        };
        lease.release();

        let event = match outcome {
            None => {
                let _ = events.send(WorkerEvent::Abandoned { url: task.url }).await;
                break;
            }
            Some(Ok(response)) => handle_response(&ctx, task, response),
            Some(Err(error)) => {
                tracing::debug!("Fetch of {} failed: {}", task.url, error);
                handle_failure(&ctx, task, CrawlFailure::from_fetch_error(&error))
            }
        };

        if events.send(event).await.is_err() {
            break;
        }
    }

    tracing::trace!("Worker {} exiting", id);
}

fn handle_response(ctx: &WorkerContext, task: UrlTask, response: FetchResponse) -> WorkerEvent {
    if let Some(failure) = CrawlFailure::from_status(response.status) {
        return handle_failure(ctx, task, failure);
    }

    let fetched_at = Utc::now();
    let bytes = response.body.len() as u64;

    if !ctx.dedup.mark_content_seen(&response.body) {
        tracing::debug!("Duplicate content at {}", task.url);
        return WorkerEvent::Finished(CrawlResult {
            task,
            status: CrawlStatus::Success,
            links: None,
            content: None,
            failure: None,
            fetched_at: Some(fetched_at),
            bytes,
            duplicate: true,
        });
    }

    let content_type = response.content_type().map(str::to_string);
    let (title, text, links) = if response.is_html() {
        let mut document = ctx.parser.parse(&response.text());
        let title = document.title.take();
        let text = std::mem::take(&mut document.text);
        (title, text, Some(extract_links(document, &response.final_url)))
    } else if content_type
        .as_deref()
        .map_or(false, |ct| ct.starts_with("text/"))
    {
        (None, response.text(), None)
    } else {
        (None, String::new(), None)
    };

    WorkerEvent::Finished(CrawlResult {
        task,
        status: CrawlStatus::Success,
        links,
        content: Some(FetchedContent {
            final_url: response.final_url,
            status: response.status,
            content_type,
            title,
            text,
            body: response.body,
        }),
        failure: None,
        fetched_at: Some(fetched_at),
        bytes,
        duplicate: false,
    })
}

/// Applies the retry policy to a failed attempt
fn handle_failure(ctx: &WorkerContext, task: UrlTask, failure: CrawlFailure) -> WorkerEvent {
    let Some(delay) = ctx.retry.next_attempt(&failure, task.retry_count) else {
        if failure.is_retryable() {
            tracing::warn!(
                "Giving up on {} after {} retries: {}",
                task.url,
                task.retry_count,
                failure
            );
        }
        return WorkerEvent::Finished(CrawlResult::failed(task, failure));
    };

    let url = task.url.clone();
    let retry = task.retry_at(Instant::now() + delay);
    let attempt = retry.retry_count;

    match ctx.frontier.requeue(retry) {
        Ok(()) => {
            tracing::debug!("Retrying {} in {:?} (attempt {}): {}", url, delay, attempt, failure);
            WorkerEvent::Retrying {
                url,
                attempt,
                failure,
            }
        }
        Err(_) => WorkerEvent::Abandoned { url },
    }
}
