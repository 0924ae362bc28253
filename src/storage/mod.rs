//! Storage module for persisting crawl data
//!
//! Two collaborators live here:
//! - The record store, which keeps one [`CrawledRecord`] per URL (upsert)
//! - The visited set, an external set with atomic test-and-insert that makes
//!   admission idempotent across workers and across process restarts
//!
//! Both are traits so the engine can run against SQLite, Redis, or anything
//! else with the same semantics.

mod redis;
mod schema;
mod sqlite;

pub use self::redis::RedisVisitedSet;
pub use self::sqlite::{SqliteRecordStore, SqliteVisitedSet};

use crate::crawler::CrawledRecord;
use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("Storage has been closed")]
    Closed,

    #[error("Storage lock poisoned")]
    LockPoisoned,

    #[error("Blocking storage task failed: {0}")]
    Blocking(#[from] tokio::task::JoinError),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Durable store of crawled page records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Saves a record, replacing any existing record with the same URL
    async fn save(&self, record: &CrawledRecord) -> StorageResult<()>;

    /// Releases the store's resources
    ///
    /// Safe to call after the crawl's cancellation has fired; callers bound
    /// it with their own timeout.
    async fn close(&self) -> StorageResult<()>;
}

/// External set of URLs already admitted for crawling
#[async_trait]
pub trait VisitedSet: Send + Sync {
    /// Atomically adds `url`
    ///
    /// Returns true iff the URL was not already present. Under concurrent
    /// callers exactly one of them observes true for a given URL.
    async fn try_insert(&self, url: &str) -> StorageResult<bool>;

    /// Removes every entry
    async fn clear(&self) -> StorageResult<()>;

    /// Releases the set's resources
    async fn close(&self) -> StorageResult<()>;
}
