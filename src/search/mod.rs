//! Full-text search over crawled content
//!
//! Queries go to the search index first. When the index backend fails, a
//! degraded scan over the blob store answers instead, and the results say so.

mod fallback;
mod fts;

pub use fallback::scan_blobs;
pub use fts::SqliteSearchIndex;

use crate::storage::{BlobStore, ContentRecord, StorageResult};
use crate::FleetError;
use serde::Serialize;

/// A document as stored in the search index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchDocument {
    /// Document id
    pub url: String,
    pub title: String,
    pub description: String,
    pub text_content: String,
    pub content_key: String,
    pub crawl_timestamp: i64,
}

impl SearchDocument {
    pub fn from_content(record: &ContentRecord, content_key: &str) -> Self {
        Self {
            url: record.url.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            text_content: record.text_content.clone(),
            content_key: content_key.to_string(),
            crawl_timestamp: record.crawl_timestamp,
        }
    }
}

/// One search result
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub description: String,
    pub score: f64,
    pub highlights: Vec<String>,
    pub content_key: Option<String>,
    pub crawl_timestamp: i64,
}

/// One page of hits plus the total match count
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SearchHits {
    pub hits: Vec<SearchHit>,
    pub total: u64,
}

/// A searchable index of crawled pages
pub trait SearchIndex: Send + Sync {
    /// Adds or replaces a document, keyed by URL
    fn index(&self, doc: &SearchDocument) -> StorageResult<()>;

    /// Runs a query; `page` starts at 1
    fn query(&self, text: &str, page: usize, page_size: usize) -> StorageResult<SearchHits>;

    /// Deletes the index; a missing index is not an error
    fn delete_index(&self) -> StorageResult<()>;

    /// Creates the index empty if it does not exist
    fn recreate_index(&self) -> StorageResult<()>;

    /// Cheap reachability probe, used by node health checks
    fn is_available(&self) -> bool;
}

/// Where a result page came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchSource {
    Index,
    BlobScan,
}

/// The answer to a search call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchPage {
    pub results: Vec<SearchHit>,
    pub total: u64,
    pub has_more: bool,
    pub source: SearchSource,
    /// True when results came from the blob scan (no ranking or highlighting guarantees)
    pub degraded: bool,
}

/// Searches crawled content, falling back to a blob scan if the index fails
///
/// # Arguments
///
/// * `index` - The primary search index
/// * `blobs` - Blob store holding content records
/// * `content_prefix` - Key prefix of content records
/// * `query` - Free-text query
/// * `page` - 1-based page number (0 is treated as 1)
/// * `page_size` - Results per page (0 is treated as 1)
///
/// # Returns
///
/// * `Ok(SearchPage)` - Results from the index, or degraded results from the scan
/// * `Err(FleetError::SearchUnavailable)` - Both the index and the scan failed
pub fn search(
    index: &dyn SearchIndex,
    blobs: &dyn BlobStore,
    content_prefix: &str,
    query: &str,
    page: usize,
    page_size: usize,
) -> Result<SearchPage, FleetError> {
    let page = page.max(1);
    let page_size = page_size.max(1);

    let index_error = match index.query(query, page, page_size) {
        Ok(hits) => return Ok(build_page(hits, page, page_size, SearchSource::Index)),
        Err(e) => e,
    };

    tracing::warn!(
        "Search index unavailable ({}); falling back to blob scan",
        index_error
    );

    match scan_blobs(blobs, content_prefix, query, page, page_size) {
        Ok(hits) => Ok(build_page(hits, page, page_size, SearchSource::BlobScan)),
        Err(fallback_error) => {
            tracing::error!("Blob scan fallback failed: {}", fallback_error);
            Err(FleetError::SearchUnavailable {
                index_error: index_error.to_string(),
                fallback_error: fallback_error.to_string(),
            })
        }
    }
}

fn build_page(hits: SearchHits, page: usize, page_size: usize, source: SearchSource) -> SearchPage {
    let seen = (page as u64) * (page_size as u64);
    SearchPage {
        has_more: seen < hits.total,
        total: hits.total,
        results: hits.hits,
        source,
        degraded: source == SearchSource::BlobScan,
    }
}
