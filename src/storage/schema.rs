//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the crawl database.
//! The record store and the visited set may share one database file.

/// SQL schema for crawled page records
pub const RECORDS_SCHEMA_SQL: &str = r#"
-- One document per crawled URL
CREATE TABLE IF NOT EXISTS crawled_pages (
    url TEXT PRIMARY KEY,
    depth INTEGER NOT NULL,
    found_on TEXT NOT NULL,
    found_links TEXT NOT NULL,
    crawled_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_crawled_pages_depth ON crawled_pages(depth);
"#;

/// SQL schema for the visited set
pub const VISITED_SCHEMA_SQL: &str = r#"
-- Admitted URLs, namespaced by set key
CREATE TABLE IF NOT EXISTS visited_urls (
    set_key TEXT NOT NULL,
    url TEXT NOT NULL,
    PRIMARY KEY (set_key, url)
) WITHOUT ROWID;
"#;

/// Connection settings applied to every database handle
pub const PRAGMAS_SQL: &str = "
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA temp_store = MEMORY;
";

/// Initializes the record store schema
pub fn initialize_records_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(RECORDS_SCHEMA_SQL)
}

/// Initializes the visited set schema
pub fn initialize_visited_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(VISITED_SCHEMA_SQL)
}
