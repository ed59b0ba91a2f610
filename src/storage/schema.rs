//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Stellwerk database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    search_url TEXT NOT NULL,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    rows_read INTEGER NOT NULL DEFAULT 0
);

-- One row per posting, keyed by the site's own id
CREATE TABLE IF NOT EXISTS postings (
    site_id TEXT PRIMARY KEY,
    company_name TEXT NOT NULL,
    city TEXT,
    start_date TEXT,
    post_date TEXT,
    job_title TEXT,
    postal_code INTEGER,
    street TEXT,
    email TEXT,
    phone TEXT,
    website TEXT,
    company_size INTEGER,
    search_url TEXT,
    run_id INTEGER NOT NULL REFERENCES runs(id),
    stored_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_postings_run ON postings(run_id);
CREATE INDEX IF NOT EXISTS idx_postings_city ON postings(city);
"#;

/// Initializes the database schema
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
