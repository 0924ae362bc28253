//! Output module for reporting on crawl results
//!
//! This module handles:
//! - Loading statistics over the persisted records
//! - Printing them for `--stats`
//! - Printing the summary of a finished run

pub mod stats;

pub use stats::{load_statistics, print_statistics, print_summary, CrawlStatistics};
