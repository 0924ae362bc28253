//! Statistics generation from the record store
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::crawler::CrawlSummary;
use crate::storage::{SqliteRecordStore, StorageResult};
use std::collections::BTreeMap;

/// Statistics over every persisted record
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrawlStatistics {
    /// Total number of records
    pub total_records: u64,

    /// Records at depth 0
    pub seed_records: u64,

    /// Total number of out-links stored across all records
    pub total_links: u64,

    /// Record count per depth, shallowest first
    pub depth_breakdown: BTreeMap<u32, u64>,
}

impl CrawlStatistics {
    /// Deepest level with at least one record
    pub fn max_depth(&self) -> Option<u32> {
        self.depth_breakdown.keys().next_back().copied()
    }
}

/// Loads statistics from the record store
///
/// # Arguments
///
/// * `store` - The record store to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(StorageError)` - Failed to query statistics
pub async fn load_statistics(store: &SqliteRecordStore) -> StorageResult<CrawlStatistics> {
    let total_records = store.count().await?;
    let total_links = store.count_links().await?;
    let depth_breakdown = store.depth_breakdown().await?;
    let seed_records = depth_breakdown.get(&0).copied().unwrap_or(0);

    Ok(CrawlStatistics {
        total_records,
        seed_records,
        total_links,
        depth_breakdown,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Total records: {}", stats.total_records);
    println!("  Seed records: {}", stats.seed_records);
    println!("  Total links found: {}", stats.total_links);
    if let Some(depth) = stats.max_depth() {
        println!("  Deepest level: {}", depth);
    }
    println!();

    if stats.depth_breakdown.is_empty() {
        println!("No records stored yet.");
        return;
    }

    println!("Records by Depth:");
    for (depth, count) in &stats.depth_breakdown {
        let percentage = if stats.total_records > 0 {
            (*count as f64 / stats.total_records as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", depth, count, percentage);
    }
}

/// Prints the summary of a finished crawl to stdout
pub fn print_summary(summary: &CrawlSummary) {
    println!("=== Crawl Complete ===\n");
    println!("  Pages saved: {}", summary.pages_saved);
    println!("  Pages dropped: {}", summary.pages_dropped);
    println!("  Save failures: {}", summary.save_failures);
    println!("  Links admitted: {}", summary.links_admitted);
    println!("  Elapsed: {:.2}s", summary.elapsed.as_secs_f64());
}
