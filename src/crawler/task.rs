//! Units of work and the records they produce

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A URL admitted to the frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    /// The URL to fetch (fragment already removed)
    pub url: String,

    /// Number of hops from the seed; the seed is depth 0
    pub depth: u32,

    /// URL of the page this link was found on; empty for the seed
    pub parent_url: String,
}

impl Task {
    /// Creates the depth-0 task for a seed URL
    pub fn seed(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depth: 0,
            parent_url: String::new(),
        }
    }

    /// Creates the task for a link discovered on this task's page
    pub fn child(&self, url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            depth: self.depth + 1,
            parent_url: self.url.clone(),
        }
    }
}

/// The persisted artifact for one crawled URL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawledRecord {
    pub url: String,
    pub depth: u32,
    /// Referrer URL, empty for the seed
    pub found_on: String,
    /// Out-links in encounter order, deduplicated, without fragments
    pub found_links: Vec<String>,
}

impl CrawledRecord {
    pub fn new(task: &Task, found_links: Vec<String>) -> Self {
        Self {
            url: task.url.clone(),
            depth: task.depth,
            found_on: task.parent_url.clone(),
            found_links,
        }
    }
}

/// Counters reported at the end of a completed crawl
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlSummary {
    /// Pages whose record was saved
    pub pages_saved: u64,

    /// Tasks dropped because fetching, reading or parsing failed
    pub pages_dropped: u64,

    /// Pages processed whose record could not be saved
    pub save_failures: u64,

    /// Links admitted to the frontier, not counting the seed
    pub links_admitted: u64,

    /// Wall-clock duration of the run
    pub elapsed: Duration,
}
