//! Downstream document sinks
//!
//! Fetched documents leave the crawl through a [`DocumentSink`]. Delivery is
//! at-least-once: a record may be published again after a crash, never lost
//! once `publish` has returned `Ok`.

mod channel;
mod schema;
mod sqlite;

pub use channel::ChannelSink;
pub use sqlite::{OutboxEntry, SqliteOutbox};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// A fetched document, as handed downstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    /// Canonical URL of the task that produced the document
    pub url: String,

    /// Final URL after redirects
    pub final_url: String,

    /// When the fetch completed
    pub fetched_at: DateTime<Utc>,

    /// Page title, for HTML documents that have one
    pub title: Option<String>,

    /// Extracted text (HTML), the decoded body (other text types), or
    /// empty for binary documents
    pub content: String,

    /// Raw response body, exactly as fetched
    pub body: Vec<u8>,

    /// Number of crawlable links found in the document
    pub link_count: usize,

    /// Content-Type header value
    pub content_type: Option<String>,

    /// HTTP status code
    pub status: u16,
}

/// Errors that can occur while publishing documents
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Sink is closed")]
    Closed,

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Outbox entry not found: {0}")]
    NotFound(i64),

    #[error("Outbox write task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Result type for sink operations
pub type SinkResult<T> = Result<T, SinkError>;

/// Durable downstream topic
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Publishes one record; returns once the record is durable
    async fn publish(&self, record: DocumentRecord) -> SinkResult<()>;
}
