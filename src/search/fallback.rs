//! Degraded search by scanning stored content records
//!
//! Matching is a case-insensitive substring test of each query term against
//! title, description and text. Results are ordered by how many term
//! occurrences they contain; that ordering is not a relevance ranking.

use crate::search::{SearchHit, SearchHits};
use crate::storage::{BlobStore, ContentRecord, StorageError, StorageResult};

const MAX_EXCERPTS: usize = 3;
const EXCERPT_CHARS: usize = 160;

/// Scans every content record under `prefix` for the query terms
///
/// Unreadable or malformed records are skipped. Listing failures are
/// returned, since then nothing can be scanned.
pub fn scan_blobs(
    blobs: &dyn BlobStore,
    prefix: &str,
    query: &str,
    page: usize,
    page_size: usize,
) -> StorageResult<SearchHits> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();
    if terms.is_empty() {
        return Ok(SearchHits::default());
    }

    let mut matches: Vec<(usize, SearchHit)> = Vec::new();

    for entry in blobs.list(prefix)?.into_iter().filter(|e| e.is_content()) {
        let record = match blobs
            .get(&entry.key)
            .and_then(|bytes| ContentRecord::from_json_bytes(&bytes))
        {
            Ok(record) => record,
            Err(StorageError::NotFound(_)) => continue,
            Err(e) => {
                tracing::debug!("Skipping unreadable content {}: {}", entry.key, e);
                continue;
            }
        };

        let haystack = format!(
            "{}\n{}\n{}",
            record.title, record.description, record.text_content
        )
        .to_lowercase();
        let occurrences: usize = terms.iter().map(|t| haystack.matches(t.as_str()).count()).sum();
        if occurrences == 0 {
            continue;
        }

        let highlights = excerpts(&record.text_content, &terms);
        matches.push((
            occurrences,
            SearchHit {
                url: record.url,
                title: record.title,
                description: record.description,
                score: occurrences as f64,
                highlights,
                content_key: Some(entry.key),
                crawl_timestamp: record.crawl_timestamp,
            },
        ));
    }

    matches.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.url.cmp(&b.1.url)));

    let total = matches.len() as u64;
    let offset = page.saturating_sub(1).saturating_mul(page_size);
    let hits = matches
        .into_iter()
        .skip(offset)
        .take(page_size)
        .map(|(_, hit)| hit)
        .collect();

    Ok(SearchHits { hits, total })
}

/// Sentences of `text` that contain any term, shortened for display
fn excerpts(text: &str, terms: &[String]) -> Vec<String> {
    text.split(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|sentence| {
            let lowered = sentence.to_lowercase();
            terms.iter().any(|t| lowered.contains(t.as_str()))
        })
        .take(MAX_EXCERPTS)
        .map(|sentence| {
            if sentence.chars().count() > EXCERPT_CHARS {
                let cut: String = sentence.chars().take(EXCERPT_CHARS).collect();
                format!("{}...", cut)
            } else {
                sentence.to_string()
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{content_key, FsBlobStore};
    use tempfile::TempDir;

    fn put(blobs: &FsBlobStore, url: &str, title: &str, text: &str) {
        let record = ContentRecord {
            url: url.to_string(),
            title: title.to_string(),
            description: "No description".to_string(),
            text_content: text.to_string(),
            html: String::new(),
            crawl_timestamp: 42,
            depth: 0,
        };
        blobs
            .put(&content_key("output/", url), &record.to_json_bytes().unwrap())
            .unwrap();
    }

    #[test]
    fn test_scan_matches_case_insensitively() {
        let dir = TempDir::new().unwrap();
        let blobs = FsBlobStore::new(dir.path()).unwrap();
        put(&blobs, "https://a.com/1", "Rust", "Ownership rules. Borrowing rules.");
        put(&blobs, "https://a.com/2", "Go", "Goroutines everywhere.");

        let hits = scan_blobs(&blobs, "output/", "OWNERSHIP", 1, 10).unwrap();
        assert_eq!(hits.total, 1);
        assert_eq!(hits.hits[0].url, "https://a.com/1");
        assert_eq!(hits.hits[0].highlights, vec!["Ownership rules".to_string()]);
        assert_eq!(hits.hits[0].crawl_timestamp, 42);
    }

    #[test]
    fn test_scan_orders_by_occurrences_and_pages() {
        let dir = TempDir::new().unwrap();
        let blobs = FsBlobStore::new(dir.path()).unwrap();
        put(&blobs, "https://a.com/once", "One", "crawl");
        put(&blobs, "https://a.com/thrice", "Three", "crawl crawl crawl");
        put(&blobs, "https://a.com/twice", "Two", "crawl crawl");

        let first = scan_blobs(&blobs, "output/", "crawl", 1, 2).unwrap();
        assert_eq!(first.total, 3);
        let urls: Vec<_> = first.hits.iter().map(|h| h.url.as_str()).collect();
        assert_eq!(urls, vec!["https://a.com/thrice", "https://a.com/twice"]);

        let second = scan_blobs(&blobs, "output/", "crawl", 2, 2).unwrap();
        assert_eq!(second.hits.len(), 1);
        assert_eq!(second.hits[0].url, "https://a.com/once");
    }

    #[test]
    fn test_scan_skips_malformed_records() {
        let dir = TempDir::new().unwrap();
        let blobs = FsBlobStore::new(dir.path()).unwrap();
        blobs.put("output/broken.json", b"not json").unwrap();
        put(&blobs, "https://a.com/ok", "Ok", "needle");

        let hits = scan_blobs(&blobs, "output/", "needle", 1, 10).unwrap();
        assert_eq!(hits.total, 1);
    }

    #[test]
    fn test_empty_query() {
        let dir = TempDir::new().unwrap();
        let blobs = FsBlobStore::new(dir.path()).unwrap();
        assert_eq!(scan_blobs(&blobs, "output/", "  ", 1, 10).unwrap().total, 0);
    }

    #[test]
    fn test_long_excerpt_is_shortened() {
        let long = format!("needle {}", "x".repeat(400));
        let parts = excerpts(&long, &["needle".to_string()]);
        assert_eq!(parts.len(), 1);
        assert!(parts[0].ends_with("..."));
        assert_eq!(parts[0].chars().count(), EXCERPT_CHARS + 3);
    }
}
