//! Frontier of pending URL tasks
//!
//! Ready tasks are ordered by depth, then by the instant they were first
//! enqueued, so the crawl proceeds breadth-first and a requeued task keeps
//! its place among its siblings. Tasks carrying a not-before marker wait in a second heap
//! keyed by that instant and are promoted when it passes.

use crate::crawler::{CrawlFailure, DedupIndex};
use crate::state::UrlTask;
use parking_lot::Mutex;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::trace;

/// Result of offering a new task to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Enqueued,
    /// The URL was already claimed; the task was dropped
    Duplicate,
}

/// A dispatchable task
#[derive(Debug)]
struct ReadyEntry {
    task: UrlTask,
    seq: u64,
}

// Reversed so the BinaryHeap pops the lowest (priority, enqueued_at, seq) first
impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .task
            .priority()
            .cmp(&self.task.priority())
            .then_with(|| other.task.enqueued_at.cmp(&self.task.enqueued_at))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ReadyEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for ReadyEntry {}

/// A task waiting for its not-before instant
#[derive(Debug)]
struct DelayedEntry {
    task: UrlTask,
    at: Instant,
    seq: u64,
}

impl Ord for DelayedEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for DelayedEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for DelayedEntry {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for DelayedEntry {}

#[derive(Debug, Default)]
struct Inner {
    ready: BinaryHeap<ReadyEntry>,
    delayed: BinaryHeap<DelayedEntry>,
    closed: bool,
    seq: u64,
}

impl Inner {
    fn insert(&mut self, task: UrlTask, now: Instant) {
        self.seq += 1;
        let seq = self.seq;
        match task.not_before {
            Some(at) if at > now => self.delayed.push(DelayedEntry { task, at, seq }),
            _ => self.ready.push(ReadyEntry { task, seq }),
        }
    }

    /// Moves every delayed task whose instant has passed to the ready heap
    fn promote_due(&mut self, now: Instant) {
        while self.delayed.peek().map_or(false, |entry| entry.at <= now) {
            if let Some(entry) = self.delayed.pop() {
                self.ready.push(ReadyEntry {
                    task: entry.task,
                    seq: entry.seq,
                });
            }
        }
    }
}

/// Priority queue of pending tasks, shared by the coordinator and workers
///
/// The frontier owns a task from the moment it is pushed until a single
/// `pop` hands it to one worker.
#[derive(Debug)]
pub struct Frontier {
    dedup: Arc<DedupIndex>,
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Frontier {
    /// Creates an open, empty frontier
    ///
    /// # Arguments
    ///
    /// * `dedup` - Index that `push` claims URLs in; shared with the
    ///   coordinator so its counts cover every discovered URL
    pub fn new(dedup: Arc<DedupIndex>) -> Self {
        Self {
            dedup,
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
        }
    }

    /// Offers a newly discovered task
    ///
    /// The task's URL is claimed in the dedup index first; if another task
    /// already claimed it the new one is dropped.
    ///
    /// # Returns
    ///
    /// * `Ok(PushOutcome::Enqueued)` - The task is now pending
    /// * `Ok(PushOutcome::Duplicate)` - The URL was seen before
    /// * `Err(CrawlFailure::FrontierClosed)` - The frontier no longer accepts work
    pub fn push(&self, task: UrlTask) -> Result<PushOutcome, CrawlFailure> {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(CrawlFailure::FrontierClosed);
            }
            if !self.dedup.try_claim(&task.url) {
                trace!("Duplicate {}", task.url);
                return Ok(PushOutcome::Duplicate);
            }
            trace!("Enqueue {}", task);
            inner.insert(task, Instant::now());
        }
        self.notify.notify_one();
        Ok(PushOutcome::Enqueued)
    }

    /// Returns an already claimed task to the frontier
    ///
    /// Used for retries and politeness deferrals; the task's not-before
    /// marker is honored.
    pub fn requeue(&self, task: UrlTask) -> Result<(), CrawlFailure> {
        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(CrawlFailure::FrontierClosed);
            }
            trace!("Requeue {}", task);
            inner.insert(task, Instant::now());
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Takes the next ready task
    ///
    /// Waits while the frontier is open but has nothing ready. Returns None
    /// when the frontier is closed and holds nothing, or when `cancel` fires.
    pub async fn pop(&self, cancel: &CancellationToken) -> Option<UrlTask> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before inspecting state so a concurrent push or close
            // cannot slip between the check and the wait.
            notified.as_mut().enable();

            let wake_at = {
                let mut inner = self.inner.lock();
                inner.promote_due(Instant::now());
                if let Some(entry) = inner.ready.pop() {
                    return Some(entry.task);
                }
                if inner.closed && inner.delayed.is_empty() {
                    return None;
                }
                inner.delayed.peek().map(|entry| entry.at)
            };

            let due = async {
                match wake_at {
                    Some(at) => sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = &mut notified => {}
                _ = due => {}
            }
        }
    }

    /// Stops accepting work and wakes every waiting `pop`
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.notify.notify_waiters();
    }

    /// Removes and returns every pending task, ready or delayed
    pub fn drain_pending(&self) -> Vec<UrlTask> {
        let drained: Vec<UrlTask> = {
            let mut inner = self.inner.lock();
            let ready = std::mem::take(&mut inner.ready);
            let delayed = std::mem::take(&mut inner.delayed);
            ready
                .into_iter()
                .map(|entry| entry.task)
                .chain(delayed.into_iter().map(|entry| entry.task))
                .collect()
        };
        self.notify.notify_waiters();
        drained
    }

    /// Number of pending tasks, ready or delayed
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner.ready.len() + inner.delayed.len()
    }

    /// True when nothing is pending, ready or delayed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `close` has been called
    ///
    /// A closed frontier may still hold tasks until they are popped or
    /// drained.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Dedup index backing `push`
    ///
    /// # Returns
    ///
    /// The shared index; claims made through it are seen by `push` and
    /// the other way round
    pub fn dedup(&self) -> &Arc<DedupIndex> {
        &self.dedup
    }
}
