//! Purge of all crawl state
//!
//! Three stores hold crawl state and none of them shares a transaction with
//! the others. Purge runs every step even when an earlier one fails and
//! reports each outcome; every step is idempotent, so calling it again after
//! a partial failure converges.

use crate::backends::Backends;
use crate::search::SearchIndex;
use crate::storage::{BlobStore, KvStore, StorageResult};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// One of the purge steps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeStep {
    Blob,
    KeyValue,
    SearchIndex,
}

impl fmt::Display for PurgeStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PurgeStep::Blob => "blob store",
            PurgeStep::KeyValue => "url records",
            PurgeStep::SearchIndex => "search index",
        };
        write!(f, "{}", name)
    }
}

/// A failed purge step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeStepError {
    pub step: PurgeStep,
    pub message: String,
}

/// Per-store outcome of a purge
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub blob_ok: bool,
    pub kv_ok: bool,
    pub index_ok: bool,
    pub errors: Vec<PurgeStepError>,
    /// Content objects removed by the blob step
    pub blobs_deleted: usize,
}

impl PurgeReport {
    pub fn is_complete(&self) -> bool {
        self.blob_ok && self.kv_ok && self.index_ok
    }
}

pub struct PurgeCoordinator {
    blobs: Arc<dyn BlobStore>,
    kv: Arc<dyn KvStore>,
    index: Arc<dyn SearchIndex>,
    content_prefix: String,
    recreate_index: bool,
}

impl PurgeCoordinator {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        kv: Arc<dyn KvStore>,
        index: Arc<dyn SearchIndex>,
        content_prefix: impl Into<String>,
        recreate_index: bool,
    ) -> Self {
        Self {
            blobs,
            kv,
            index,
            content_prefix: content_prefix.into(),
            recreate_index,
        }
    }

    pub fn from_backends(backends: &Backends, content_prefix: &str, recreate_index: bool) -> Self {
        Self::new(
            backends.blobs.clone(),
            backends.kv.clone(),
            backends.index.clone(),
            content_prefix,
            recreate_index,
        )
    }

    /// Deletes content objects, url records and the search index
    ///
    /// Never returns early; inspect [`PurgeReport::errors`] for failures.
    pub fn purge(&self) -> PurgeReport {
        let mut errors = Vec::new();

        tracing::info!("Purging content under {}", self.content_prefix);
        let blobs_deleted = record_step(
            PurgeStep::Blob,
            self.blobs.delete_prefix(&self.content_prefix),
            &mut errors,
        );

        tracing::info!("Recreating url record table");
        let kv_ok = record_step(PurgeStep::KeyValue, self.kv.recreate_table(), &mut errors).is_some();

        tracing::info!("Deleting search index");
        let index_result = self.index.delete_index().and_then(|()| {
            if self.recreate_index {
                self.index.recreate_index()
            } else {
                Ok(())
            }
        });
        let index_ok = record_step(PurgeStep::SearchIndex, index_result, &mut errors).is_some();

        let report = PurgeReport {
            blob_ok: blobs_deleted.is_some(),
            kv_ok,
            index_ok,
            blobs_deleted: blobs_deleted.unwrap_or(0),
            errors,
        };

        if report.is_complete() {
            tracing::info!("Purge complete ({} content objects deleted)", report.blobs_deleted);
        } else {
            tracing::warn!(
                "Purge partially failed ({} step(s)); it is safe to run again",
                report.errors.len()
            );
        }
        report
    }
}

fn record_step<T>(step: PurgeStep, result: StorageResult<T>, errors: &mut Vec<PurgeStepError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("Purge of {} failed: {}", step, e);
            errors.push(PurgeStepError {
                step,
                message: e.to_string(),
            });
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{SearchDocument, SearchHits, SqliteSearchIndex};
    use crate::storage::{BlobEntry, FsBlobStore, SqliteKvStore, StorageError, UrlRecord};
    use crate::UrlStatus;
    use tempfile::TempDir;

    fn local(dir: &TempDir) -> (Arc<FsBlobStore>, Arc<SqliteKvStore>, Arc<SqliteSearchIndex>) {
        (
            Arc::new(FsBlobStore::new(dir.path().join("blobs")).unwrap()),
            Arc::new(SqliteKvStore::new_in_memory().unwrap()),
            Arc::new(SqliteSearchIndex::open(&dir.path().join("s.db"), "webcrawler").unwrap()),
        )
    }

    #[test]
    fn test_purge_clears_all_stores() {
        let dir = TempDir::new().unwrap();
        let (blobs, kv, index) = local(&dir);
        blobs.put("output/a.json", b"{}").unwrap();
        blobs.put("output/b.json", b"{}").unwrap();
        blobs.put("input/seed_urls.json", b"[]").unwrap();
        kv.put_if_absent(&UrlRecord::pending("https://a.com/", 0, None)).unwrap();
        index
            .index(&SearchDocument {
                url: "https://a.com/".to_string(),
                title: "A".to_string(),
                description: String::new(),
                text_content: "words".to_string(),
                content_key: "output/a.json".to_string(),
                crawl_timestamp: 0,
            })
            .unwrap();

        let purge = PurgeCoordinator::new(blobs.clone(), kv.clone(), index.clone(), "output/", true);
        let report = purge.purge();

        assert!(report.is_complete());
        assert_eq!(report.blobs_deleted, 2);
        assert!(blobs.list("output/").unwrap().is_empty());
        assert_eq!(blobs.list("input/").unwrap().len(), 1);
        assert_eq!(kv.count_by_status(UrlStatus::Pending).unwrap(), 0);
        assert_eq!(index.query("words", 1, 10).unwrap().total, 0);
    }

    #[test]
    fn test_purge_twice_on_empty_state() {
        let dir = TempDir::new().unwrap();
        let (blobs, kv, index) = local(&dir);
        let purge = PurgeCoordinator::new(blobs, kv, index, "output/", false);

        for _ in 0..2 {
            let report = purge.purge();
            assert!(report.is_complete(), "{:?}", report.errors);
            assert_eq!(report.blobs_deleted, 0);
        }
    }

    struct DownBlobs;

    impl BlobStore for DownBlobs {
        fn put(&self, _key: &str, _body: &[u8]) -> StorageResult<()> {
            Err(StorageError::Unavailable("blobs down".to_string()))
        }
        fn list(&self, _prefix: &str) -> StorageResult<Vec<BlobEntry>> {
            Err(StorageError::Unavailable("blobs down".to_string()))
        }
        fn get(&self, _key: &str) -> StorageResult<Vec<u8>> {
            Err(StorageError::Unavailable("blobs down".to_string()))
        }
        fn delete_prefix(&self, _prefix: &str) -> StorageResult<usize> {
            Err(StorageError::Unavailable("blobs down".to_string()))
        }
    }

    struct DownIndex;

    impl SearchIndex for DownIndex {
        fn index(&self, _doc: &SearchDocument) -> StorageResult<()> {
            Err(StorageError::Unavailable("index down".to_string()))
        }
        fn query(&self, _text: &str, _page: usize, _page_size: usize) -> StorageResult<SearchHits> {
            Err(StorageError::Unavailable("index down".to_string()))
        }
        fn delete_index(&self) -> StorageResult<()> {
            Err(StorageError::Unavailable("index down".to_string()))
        }
        fn recreate_index(&self) -> StorageResult<()> {
            Err(StorageError::Unavailable("index down".to_string()))
        }
        fn is_available(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_partial_failure_runs_every_step() {
        let kv = Arc::new(SqliteKvStore::new_in_memory().unwrap());
        kv.put_if_absent(&UrlRecord::pending("https://a.com/", 0, None)).unwrap();
        let purge = PurgeCoordinator::new(Arc::new(DownBlobs), kv.clone(), Arc::new(DownIndex), "output/", true);

        let report = purge.purge();
        assert!(!report.blob_ok);
        assert!(report.kv_ok);
        assert!(!report.index_ok);
        let steps: Vec<PurgeStep> = report.errors.iter().map(|e| e.step).collect();
        assert_eq!(steps, vec![PurgeStep::Blob, PurgeStep::SearchIndex]);
        assert_eq!(kv.count_by_status(UrlStatus::Pending).unwrap(), 0);
    }
}
