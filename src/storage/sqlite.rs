//! SQLite storage implementation
//!
//! `rusqlite` is blocking, so every call runs on the blocking thread pool
//! behind a shared connection handle. Closing takes the connection out of
//! the handle; later calls fail with [`StorageError::Closed`].

use crate::crawler::CrawledRecord;
use crate::storage::schema::{initialize_records_schema, initialize_visited_schema, PRAGMAS_SQL};
use crate::storage::{RecordStore, StorageError, StorageResult, VisitedSet};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

type SharedConnection = Arc<Mutex<Option<Connection>>>;

/// Opens a database file and applies connection settings
fn open_connection(path: &Path) -> StorageResult<Connection> {
    let conn = Connection::open(path)?;
    conn.execute_batch(PRAGMAS_SQL)?;
    // Another process (or the other store) may hold the write lock briefly
    conn.busy_timeout(Duration::from_secs(5))?;
    Ok(conn)
}

/// Runs `f` against the connection on the blocking pool
async fn with_connection<T, F>(conn: &SharedConnection, f: F) -> StorageResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> StorageResult<T> + Send + 'static,
{
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let mut guard = conn.lock().map_err(|_| StorageError::LockPoisoned)?;
        let conn = guard.as_mut().ok_or(StorageError::Closed)?;
        f(conn)
    })
    .await?
}

/// Takes the connection out of the handle and closes it
async fn close_connection(conn: &SharedConnection) -> StorageResult<()> {
    let conn = Arc::clone(conn);
    tokio::task::spawn_blocking(move || {
        let taken = conn
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?
            .take();
        match taken {
            Some(conn) => conn.close().map_err(|(_, e)| StorageError::Sqlite(e)),
            None => Ok(()),
        }
    })
    .await?
}

/// SQLite-backed [`RecordStore`]
#[derive(Debug, Clone)]
pub struct SqliteRecordStore {
    conn: SharedConnection,
}

impl SqliteRecordStore {
    /// Opens (or creates) the record store at `path`
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = open_connection(path)?;
        initialize_records_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    /// Creates a private in-memory record store
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_records_schema(&conn)?;
        Ok(Self::from_connection(conn))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(Some(conn))),
        }
    }

    /// Gets the record for a URL
    pub async fn get(&self, url: &str) -> StorageResult<Option<CrawledRecord>> {
        let url = url.to_string();
        with_connection(&self.conn, move |conn| {
            let row = conn
                .query_row(
                    "SELECT url, depth, found_on, found_links FROM crawled_pages WHERE url = ?1",
                    params![url],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, u32>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    },
                )
                .optional()?;

            row.map(decode_record).transpose()
        })
        .await
    }

    /// Gets every record, ordered by depth then URL
    pub async fn list(&self) -> StorageResult<Vec<CrawledRecord>> {
        with_connection(&self.conn, |conn| {
            let mut stmt = conn.prepare(
                "SELECT url, depth, found_on, found_links FROM crawled_pages ORDER BY depth, url",
            )?;

            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, u32>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter().map(decode_record).collect()
        })
        .await
    }

    /// Counts stored records
    pub async fn count(&self) -> StorageResult<u64> {
        with_connection(&self.conn, |conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM crawled_pages", [], |row| row.get(0))?;
            Ok(count as u64)
        })
        .await
    }

    /// Counts out-links across all records
    pub async fn count_links(&self) -> StorageResult<u64> {
        with_connection(&self.conn, |conn| {
            let count: i64 = conn.query_row(
                "SELECT COALESCE(SUM(json_array_length(found_links)), 0) FROM crawled_pages",
                [],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    /// Gets record count breakdown by depth
    pub async fn depth_breakdown(&self) -> StorageResult<BTreeMap<u32, u64>> {
        with_connection(&self.conn, |conn| {
            let mut stmt =
                conn.prepare("SELECT depth, COUNT(*) FROM crawled_pages GROUP BY depth")?;

            let breakdown = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, u32>(0)?, row.get::<_, i64>(1)? as u64))
                })?
                .collect::<Result<BTreeMap<_, _>, _>>()?;

            Ok(breakdown)
        })
        .await
    }
}

fn decode_record(
    (url, depth, found_on, found_links): (String, u32, String, String),
) -> StorageResult<CrawledRecord> {
    Ok(CrawledRecord {
        url,
        depth,
        found_on,
        found_links: serde_json::from_str(&found_links)?,
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn save(&self, record: &CrawledRecord) -> StorageResult<()> {
        let found_links = serde_json::to_string(&record.found_links)?;
        let record = record.clone();

        with_connection(&self.conn, move |conn| {
            conn.execute(
                "INSERT INTO crawled_pages (url, depth, found_on, found_links, crawled_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(url) DO UPDATE SET
                    depth = excluded.depth,
                    found_on = excluded.found_on,
                    found_links = excluded.found_links,
                    crawled_at = excluded.crawled_at",
                params![
                    record.url,
                    record.depth,
                    record.found_on,
                    found_links,
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> StorageResult<()> {
        close_connection(&self.conn).await
    }
}

/// SQLite-backed [`VisitedSet`]
///
/// Entries are namespaced by a set key so several crawls can share a file.
#[derive(Debug, Clone)]
pub struct SqliteVisitedSet {
    conn: SharedConnection,
    set_key: Arc<str>,
}

impl SqliteVisitedSet {
    /// Opens (or creates) the visited set at `path` under `set_key`
    pub fn open(path: &Path, set_key: &str) -> StorageResult<Self> {
        let conn = open_connection(path)?;
        initialize_visited_schema(&conn)?;
        Ok(Self::from_connection(conn, set_key))
    }

    /// Creates a private in-memory visited set
    pub fn open_in_memory(set_key: &str) -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_visited_schema(&conn)?;
        Ok(Self::from_connection(conn, set_key))
    }

    fn from_connection(conn: Connection, set_key: &str) -> Self {
        Self {
            conn: Arc::new(Mutex::new(Some(conn))),
            set_key: Arc::from(set_key),
        }
    }

    /// Counts the URLs in this set
    pub async fn len(&self) -> StorageResult<u64> {
        let set_key = Arc::clone(&self.set_key);
        with_connection(&self.conn, move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM visited_urls WHERE set_key = ?1",
                params![&*set_key],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
        .await
    }

    /// Returns true if `url` is in this set
    pub async fn contains(&self, url: &str) -> StorageResult<bool> {
        let set_key = Arc::clone(&self.set_key);
        let url = url.to_string();
        with_connection(&self.conn, move |conn| {
            let found = conn
                .query_row(
                    "SELECT 1 FROM visited_urls WHERE set_key = ?1 AND url = ?2",
                    params![&*set_key, url],
                    |_| Ok(()),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }
}

#[async_trait]
impl VisitedSet for SqliteVisitedSet {
    async fn try_insert(&self, url: &str) -> StorageResult<bool> {
        let set_key = Arc::clone(&self.set_key);
        let url = url.to_string();
        with_connection(&self.conn, move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO visited_urls (set_key, url) VALUES (?1, ?2)",
                params![&*set_key, url],
            )?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn clear(&self) -> StorageResult<()> {
        let set_key = Arc::clone(&self.set_key);
        with_connection(&self.conn, move |conn| {
            conn.execute(
                "DELETE FROM visited_urls WHERE set_key = ?1",
                params![&*set_key],
            )?;
            Ok(())
        })
        .await
    }

    async fn close(&self) -> StorageResult<()> {
        close_connection(&self.conn).await
    }
}
