//! Crawler module for web page fetching and processing
//!
//! This module contains the core crawling logic, including:
//! - HTTP fetching with a single GET per page
//! - HTML parsing and link extraction
//! - The bounded frontier and in-flight accounting
//! - The worker pool that ties them together

mod engine;
mod fetcher;
mod frontier;
mod parser;
mod task;

pub use engine::{Engine, EngineSettings, SAVE_TIMEOUT};
pub use fetcher::{
    build_http_client, read_body, BodyStream, Fetcher, HttpFetcher, DEFAULT_USER_AGENT,
};
pub use frontier::{Admitted, Frontier, InFlight, InFlightGuard, Pop, PushAborted};
pub use parser::{extract_links, HtmlLinkExtractor, LinkExtractor};
pub use task::{CrawlSummary, CrawledRecord, Task};

use crate::config::Config;

impl From<&Config> for EngineSettings {
    fn from(config: &Config) -> Self {
        Self {
            worker_count: config.worker_count,
            max_depth: config.max_depth,
            same_host: config.same_host,
            save_timeout: SAVE_TIMEOUT,
        }
    }
}
