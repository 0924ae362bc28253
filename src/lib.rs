//! Depthcrawl: a breadth-first, restart-safe web crawler
//!
//! This crate crawls outward from a single seed URL up to a configured depth,
//! recording every page it visits together with the links found on it.
//! Deduplication goes through an external visited set, so repeated runs
//! against the same configuration converge without re-fetching pages.

pub mod config;
pub mod crawler;
pub mod output;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for crawl operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Invalid seed URL '{url}': {reason}")]
    InvalidSeed { url: String, reason: String },

    #[error("Visited set unavailable: {0}")]
    StateUnavailable(#[source] storage::StorageError),

    #[error("Crawl cancelled")]
    Cancelled,

    #[error("Worker task failed: {0}")]
    WorkerFailed(#[from] tokio::task::JoinError),
}

impl CrawlError {
    /// Returns true if the crawl stopped because it was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid duration '{0}' (expected e.g. \"500ms\", \"30s\", \"2m\")")]
    InvalidDuration(String),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),
}

/// Errors returned by a [`crawler::Fetcher`]
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected status {status} for {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Failed to read body of {url}: {source}")]
    BodyRead {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Errors returned by a [`crawler::LinkExtractor`]
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Invalid base URL '{url}': {source}")]
    InvalidBase {
        url: String,
        #[source]
        source: ::url::ParseError,
    },
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(#[from] ::url::ParseError),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing host in URL")]
    MissingHost,
}

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{CrawlSummary, CrawledRecord, Engine, EngineSettings, Task};
pub use storage::{RecordStore, StorageError, VisitedSet};
