//! SQLite outbox
//!
//! Documents are appended to an `outbox` table; a downstream consumer reads
//! unacknowledged rows with [`SqliteOutbox::pending`] and removes them from
//! the pending set with [`SqliteOutbox::ack`] once processed. A consumer
//! that crashes before acking sees the same rows again.
//!
//! `publish` runs the insert on tokio's blocking pool, so a slow disk delays
//! only the record being written and not the runtime thread.

use crate::sink::schema::initialize_schema;
use crate::sink::{DocumentRecord, DocumentSink, SinkError, SinkResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;

/// A stored record and its outbox id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub id: i64,
    pub record: DocumentRecord,
}

/// Durable [`DocumentSink`] backed by SQLite
pub struct SqliteOutbox {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteOutbox {
    /// Opens (or creates) an outbox database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteOutbox)` - Successfully opened/created database
    /// * `Err(SinkError)` - Failed to open database
    pub fn open(path: &Path) -> SinkResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Creates an in-memory outbox (for testing)
    pub fn open_in_memory() -> SinkResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Appends a record and returns its id
    ///
    /// # Arguments
    ///
    /// * `record` - The document to store
    ///
    /// # Returns
    ///
    /// * `Ok(i64)` - Outbox id of the new row, used with [`SqliteOutbox::ack`]
    /// * `Err(SinkError)` - The insert failed
    pub fn insert(&self, record: &DocumentRecord) -> SinkResult<i64> {
        insert_record(&self.conn.lock(), record)
    }

    /// Returns up to `limit` unacknowledged records, oldest first
    pub fn pending(&self, limit: usize) -> SinkResult<Vec<OutboxEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, url, final_url, fetched_at, title, content, body, link_count, content_type, status
             FROM outbox WHERE acked_at IS NULL ORDER BY id LIMIT ?1",
        )?;

        let rows = stmt.query_map(params![limit as i64], |row| {
            let fetched_at: String = row.get(3)?;
            let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            let link_count: i64 = row.get(7)?;

            Ok(OutboxEntry {
                id: row.get(0)?,
                record: DocumentRecord {
                    url: row.get(1)?,
                    final_url: row.get(2)?,
                    fetched_at,
                    title: row.get(4)?,
                    content: row.get(5)?,
                    body: row.get(6)?,
                    link_count: link_count.max(0) as usize,
                    content_type: row.get(8)?,
                    status: row.get(9)?,
                },
            })
        })?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Marks a record as consumed
    ///
    /// Acking an already acked record is a no-op.
    pub fn ack(&self, id: i64) -> SinkResult<()> {
        let conn = self.conn.lock();
        let exists: i64 = conn.query_row(
            "SELECT COUNT(*) FROM outbox WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )?;
        if exists == 0 {
            return Err(SinkError::NotFound(id));
        }

        conn.execute(
            "UPDATE outbox SET acked_at = ?1 WHERE id = ?2 AND acked_at IS NULL",
            params![Utc::now().to_rfc3339(), id],
        )?;
        Ok(())
    }

    /// Number of unacknowledged records
    pub fn pending_count(&self) -> SinkResult<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM outbox WHERE acked_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }
}

#[async_trait]
impl DocumentSink for SqliteOutbox {
    async fn publish(&self, record: DocumentRecord) -> SinkResult<()> {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || insert_record(&conn.lock(), &record)).await??;
        Ok(())
    }
}

fn insert_record(conn: &Connection, record: &DocumentRecord) -> SinkResult<i64> {
    conn.execute(
        "INSERT INTO outbox (url, final_url, fetched_at, title, content, body, link_count, content_type, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.url,
            record.final_url,
            record.fetched_at.to_rfc3339(),
            record.title,
            record.content,
            record.body,
            record.link_count as i64,
            record.content_type,
            record.status,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}
