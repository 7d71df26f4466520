//! Database schema definitions
//!
//! `records` holds the archived items; `records_search` is a contentless FTS5
//! index keyed by the record id (its rowid) that only stores the search terms.

/// Name of the primary record table
pub const RECORDS_TABLE: &str = "records";

/// Name of the full-text projection table
pub const SEARCH_TABLE: &str = "records_search";

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS records (
    id INTEGER PRIMARY KEY,
    sent_at TEXT NOT NULL,
    subject TEXT NOT NULL DEFAULT '',
    sender TEXT NOT NULL DEFAULT '',
    recipient TEXT NOT NULL DEFAULT '',
    body TEXT NOT NULL DEFAULT ''
);

CREATE INDEX IF NOT EXISTS idx_records_sent_at ON records(sent_at);

CREATE VIRTUAL TABLE IF NOT EXISTS records_search USING fts5(
    subject,
    sender,
    recipient,
    body,
    content = '',
    tokenize = 'porter unicode61'
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
