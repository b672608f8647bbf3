//! Database schema for the frontier store

/// SQL schema for `frontier.sqlite`
pub const SCHEMA_SQL: &str = r#"
-- Requests that were scheduled but not fetched when a run stopped
CREATE TABLE IF NOT EXISTS pending (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    kind TEXT NOT NULL,
    priority INTEGER NOT NULL,
    render TEXT
);

CREATE INDEX IF NOT EXISTS idx_pending_priority ON pending(priority, id);

-- Every (kind, canonical URL) pair scheduled within the job
CREATE TABLE IF NOT EXISTS seen (
    kind TEXT NOT NULL,
    url TEXT NOT NULL,
    PRIMARY KEY (kind, url)
);
"#;

/// Initializes the database schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)
}
