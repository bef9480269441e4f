//! Outbox schema definitions

/// SQL schema for the outbox database
pub const SCHEMA_SQL: &str = r#"
-- Documents waiting to be consumed downstream
CREATE TABLE IF NOT EXISTS outbox (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    final_url TEXT NOT NULL,
    fetched_at TEXT NOT NULL,
    title TEXT,
    content TEXT NOT NULL,
    body BLOB NOT NULL,
    link_count INTEGER NOT NULL,
    content_type TEXT,
    status INTEGER NOT NULL,
    acked_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_outbox_pending ON outbox(acked_at, id);
"#;

/// Initializes the outbox schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
