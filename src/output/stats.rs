//! Statistics gathered from the crawl stores
//!
//! This module reads url-record counts, the content object count and queue
//! depths, and prints them for the `status` command.

use crate::backends::Backends;
use crate::queue::QueueDepth;
use crate::state::UrlStatus;
use crate::storage::count_content;
use crate::FleetError;
use serde::Serialize;
use std::collections::BTreeMap;

/// Crawl statistics summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CrawlStatistics {
    /// Url records per status
    pub urls_by_status: BTreeMap<String, u64>,

    /// Total url records
    pub total_urls: u64,

    /// Content objects under the content prefix
    pub content_objects: u64,

    pub crawl_queue: QueueDepth,
    pub index_queue: QueueDepth,
}

impl CrawlStatistics {
    pub fn count(&self, status: UrlStatus) -> u64 {
        self.urls_by_status
            .get(status.to_db_string())
            .copied()
            .unwrap_or(0)
    }

    /// True when every FETCHED record has a content object and vice versa
    ///
    /// The two can disagree briefly while a worker sits between storing
    /// content and marking the record, or after a partial purge.
    pub fn content_matches_records(&self) -> bool {
        self.count(UrlStatus::Fetched) == self.content_objects
    }
}

/// Loads statistics from the stores
///
/// # Arguments
///
/// * `backends` - Store and queue handles
/// * `content_prefix` - Key prefix of content objects
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(FleetError)` - A store or queue could not be read
pub fn load_statistics(backends: &Backends, content_prefix: &str) -> Result<CrawlStatistics, FleetError> {
    let mut urls_by_status = BTreeMap::new();
    let mut total_urls = 0;

    for status in UrlStatus::all() {
        let count = backends.kv.count_by_status(status)?;
        total_urls += count;
        urls_by_status.insert(status.to_db_string().to_string(), count);
    }

    Ok(CrawlStatistics {
        urls_by_status,
        total_urls,
        content_objects: count_content(backends.blobs.as_ref(), content_prefix)?,
        crawl_queue: backends.crawl_queue.depth()?,
        index_queue: backends.index_queue.depth()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("URL records: {}", stats.total_urls);
    for (status, count) in &stats.urls_by_status {
        let percentage = if stats.total_urls > 0 {
            (*count as f64 / stats.total_urls as f64) * 100.0
        } else {
            0.0
        };
        println!("  {}: {} ({:.1}%)", status, count, percentage);
    }
    println!();

    println!("Content objects: {}", stats.content_objects);
    if !stats.content_matches_records() {
        println!(
            "  Note: {} FETCHED records but {} content objects",
            stats.count(UrlStatus::Fetched),
            stats.content_objects
        );
    }
    println!();

    println!("Queues:");
    println!(
        "  crawl: {} visible, {} in flight",
        stats.crawl_queue.visible, stats.crawl_queue.in_flight
    );
    println!(
        "  index: {} visible, {} in flight",
        stats.index_queue.visible, stats.index_queue.in_flight
    );
}
