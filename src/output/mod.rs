//! Operator-facing output
//!
//! This module handles:
//! - The live status dashboard
//! - Crawl statistics
//! - Listing stored content
//! - The completion marker written when a crawl finishes

mod dashboard;
pub mod stats;

pub use dashboard::{render_dashboard, DashboardView};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};

use crate::storage::{BlobEntry, BlobStore, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Blob key of the marker written once a crawl is complete
pub const COMPLETION_MARKER_KEY: &str = "status/crawl_completed.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub completed_at: DateTime<Utc>,
    pub task_ids: Vec<String>,
    pub status: String,
}

impl CompletionMarker {
    pub fn completed(task_ids: Vec<String>) -> Self {
        Self {
            completed_at: Utc::now(),
            task_ids,
            status: "completed".to_string(),
        }
    }
}

/// Writes the completion marker, replacing any earlier one
pub fn write_completion_marker(blobs: &dyn BlobStore, marker: &CompletionMarker) -> StorageResult<()> {
    let body = serde_json::to_vec_pretty(marker)?;
    blobs.put(COMPLETION_MARKER_KEY, &body)
}

/// Most recently modified content objects, newest first
pub fn recent_content(blobs: &dyn BlobStore, prefix: &str, limit: usize) -> StorageResult<Vec<BlobEntry>> {
    let mut entries: Vec<BlobEntry> = blobs
        .list(prefix)?
        .into_iter()
        .filter(BlobEntry::is_content)
        .collect();
    entries.sort_by(|a, b| b.last_modified.cmp(&a.last_modified).then_with(|| a.key.cmp(&b.key)));
    entries.truncate(limit);
    Ok(entries)
}

/// Prints a content listing to stdout
pub fn print_listing(entries: &[BlobEntry], total: u64) {
    println!("Stored content objects: {}", total);
    if entries.is_empty() {
        return;
    }
    println!();
    for entry in entries {
        println!(
            "  {}  {:>9} bytes  {}",
            entry.last_modified.format("%Y-%m-%d %H:%M:%S"),
            entry.size,
            entry.key
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::FsBlobStore;
    use tempfile::TempDir;

    #[test]
    fn test_completion_marker_written() {
        let dir = TempDir::new().unwrap();
        let blobs = FsBlobStore::new(dir.path()).unwrap();
        let marker = CompletionMarker::completed(vec!["t1".to_string(), "t2".to_string()]);

        write_completion_marker(&blobs, &marker).unwrap();
        let stored: CompletionMarker =
            serde_json::from_slice(&blobs.get(COMPLETION_MARKER_KEY).unwrap()).unwrap();
        assert_eq!(stored, marker);
        assert_eq!(stored.status, "completed");
    }

    #[test]
    fn test_recent_content_limits_and_filters() {
        let dir = TempDir::new().unwrap();
        let blobs = FsBlobStore::new(dir.path()).unwrap();
        for name in ["a", "b", "c"] {
            blobs.put(&format!("output/{}.json", name), b"{}").unwrap();
        }
        blobs.put("output/readme.txt", b"x").unwrap();

        let entries = recent_content(&blobs, "output/", 2).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.key.ends_with(".json")));
        assert!(entries[0].last_modified >= entries[1].last_modified);
    }
}
