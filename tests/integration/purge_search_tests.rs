//! Purge and search behavior through the public API
//!
//! Covers purge idempotence, recovery from a partially failed purge, and the
//! degraded blob-scan search when the index backend is down.

use fleetcrawl::crawler::{PurgeCoordinator, PurgeStep};
use fleetcrawl::search::{search, SearchDocument, SearchHits, SearchIndex, SearchSource};
use fleetcrawl::storage::{
    content_key, BlobEntry, BlobStore, ContentRecord, StorageError, StorageResult, UrlRecord,
};
use fleetcrawl::{Backends, FleetError, UrlStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

fn store_page(backends: &Backends, url: &str, title: &str, text: &str) {
    let record = ContentRecord {
        url: url.to_string(),
        title: title.to_string(),
        description: "No description".to_string(),
        text_content: text.to_string(),
        html: format!("<html><body>{}</body></html>", text),
        crawl_timestamp: 1_700_000_000,
        depth: 0,
    };
    let key = content_key("output/", url);
    backends.blobs.put(&key, &record.to_json_bytes().unwrap()).unwrap();
    backends
        .index
        .index(&SearchDocument::from_content(&record, &key))
        .unwrap();
}

/// An index that fails every call while `down` is set
struct FlakyIndex {
    inner: Arc<dyn SearchIndex>,
    down: AtomicBool,
}

impl FlakyIndex {
    fn check(&self) -> StorageResult<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("search cluster unreachable".to_string()))
        } else {
            Ok(())
        }
    }
}

impl SearchIndex for FlakyIndex {
    fn index(&self, doc: &SearchDocument) -> StorageResult<()> {
        self.check()?;
        self.inner.index(doc)
    }
    fn query(&self, text: &str, page: usize, page_size: usize) -> StorageResult<SearchHits> {
        self.check()?;
        self.inner.query(text, page, page_size)
    }
    fn delete_index(&self) -> StorageResult<()> {
        self.check()?;
        self.inner.delete_index()
    }
    fn recreate_index(&self) -> StorageResult<()> {
        self.check()?;
        self.inner.recreate_index()
    }
    fn is_available(&self) -> bool {
        self.check().is_ok()
    }
}

#[test]
fn test_purge_twice_on_fresh_state_is_all_ok() {
    let dir = TempDir::new().unwrap();
    let backends = Backends::open_local_in(dir.path()).unwrap();
    let purge = PurgeCoordinator::from_backends(&backends, "output/", true);

    for _ in 0..2 {
        let report = purge.purge();
        assert!(report.blob_ok && report.kv_ok && report.index_ok);
        assert!(report.errors.is_empty());
    }
}

#[test]
fn test_partial_purge_converges_on_retry() {
    let dir = TempDir::new().unwrap();
    let backends = Backends::open_local_in(dir.path()).unwrap();
    store_page(&backends, "https://a.com/", "A", "alpha words");
    backends
        .kv
        .put_if_absent(&UrlRecord::pending("https://a.com/", 0, None))
        .unwrap();

    let flaky = Arc::new(FlakyIndex {
        inner: backends.index.clone(),
        down: AtomicBool::new(true),
    });
    let purge = PurgeCoordinator::new(
        backends.blobs.clone(),
        backends.kv.clone(),
        flaky.clone(),
        "output/",
        true,
    );

    let first = purge.purge();
    assert!(first.blob_ok);
    assert!(first.kv_ok);
    assert!(!first.index_ok);
    assert_eq!(first.errors.len(), 1);
    assert_eq!(first.errors[0].step, PurgeStep::SearchIndex);
    assert_eq!(backends.kv.count_by_status(UrlStatus::Pending).unwrap(), 0);

    flaky.down.store(false, Ordering::SeqCst);
    let second = purge.purge();
    assert!(second.is_complete());
    assert_eq!(second.blobs_deleted, 0);
    assert_eq!(backends.index.query("alpha", 1, 10).unwrap().total, 0);
}

#[test]
fn test_search_falls_back_to_blob_scan() {
    let dir = TempDir::new().unwrap();
    let backends = Backends::open_local_in(dir.path()).unwrap();
    store_page(&backends, "https://a.com/1", "Ownership", "Ownership moves values. Ownership ends at scope exit.");
    store_page(&backends, "https://a.com/2", "Lifetimes", "Lifetimes relate to ownership.");
    store_page(&backends, "https://a.com/3", "Traits", "Nothing relevant here.");

    let flaky = FlakyIndex {
        inner: backends.index.clone(),
        down: AtomicBool::new(true),
    };

    let page = search(&flaky, backends.blobs.as_ref(), "output/", "ownership", 1, 10).unwrap();
    assert_eq!(page.source, SearchSource::BlobScan);
    assert!(page.degraded);
    assert_eq!(page.total, 2);
    assert_eq!(page.results[0].url, "https://a.com/1");

    flaky.down.store(false, Ordering::SeqCst);
    let ranked = search(&flaky, backends.blobs.as_ref(), "output/", "ownership", 1, 10).unwrap();
    assert_eq!(ranked.source, SearchSource::Index);
    assert!(!ranked.degraded);
    assert_eq!(ranked.total, 2);
}

#[test]
fn test_search_on_empty_index_is_empty_not_error() {
    let dir = TempDir::new().unwrap();
    let backends = Backends::open_local_in(dir.path()).unwrap();

    let page = search(
        backends.index.as_ref(),
        backends.blobs.as_ref(),
        "output/",
        "anything",
        1,
        10,
    )
    .unwrap();
    assert_eq!(page.source, SearchSource::Index);
    assert_eq!(page.total, 0);
    assert!(!page.has_more);
}

/// A blob store whose listing always fails
struct DownBlobs;

impl BlobStore for DownBlobs {
    fn put(&self, _key: &str, _body: &[u8]) -> StorageResult<()> {
        Err(StorageError::Unavailable("bucket unreachable".to_string()))
    }
    fn list(&self, _prefix: &str) -> StorageResult<Vec<BlobEntry>> {
        Err(StorageError::Unavailable("bucket unreachable".to_string()))
    }
    fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        Err(StorageError::NotFound(key.to_string()))
    }
    fn delete_prefix(&self, _prefix: &str) -> StorageResult<usize> {
        Err(StorageError::Unavailable("bucket unreachable".to_string()))
    }
}

#[test]
fn test_search_unavailable_when_everything_is_down() {
    let dir = TempDir::new().unwrap();
    let backends = Backends::open_local_in(dir.path()).unwrap();
    let flaky = FlakyIndex {
        inner: backends.index.clone(),
        down: AtomicBool::new(true),
    };

    let err = search(&flaky, &DownBlobs, "output/", "anything", 1, 10).unwrap_err();
    match err {
        FleetError::SearchUnavailable {
            index_error,
            fallback_error,
        } => {
            assert!(index_error.contains("search cluster unreachable"));
            assert!(fallback_error.contains("bucket unreachable"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
