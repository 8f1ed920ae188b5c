//! Handles to every store and queue a node talks to
//!
//! Coordinator, monitor and workers share nothing in memory. Each opens the
//! same backing files and coordinates only through them.

use crate::config::Config;
use crate::queue::{SqliteQueue, TaskQueue};
use crate::search::{SearchIndex, SqliteSearchIndex};
use crate::storage::{BlobStore, FsBlobStore, KvStore, SqliteKvStore};
use crate::FleetError;
use std::path::Path;
use std::sync::Arc;

#[derive(Clone)]
pub struct Backends {
    pub kv: Arc<dyn KvStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub index: Arc<dyn SearchIndex>,
    pub crawl_queue: Arc<dyn TaskQueue>,
    pub index_queue: Arc<dyn TaskQueue>,
}

impl Backends {
    /// Opens the local SQLite and filesystem backends named in `config`
    ///
    /// Url records and both queues live in the storage database; the search
    /// index has its own database file.
    pub fn open_local(config: &Config) -> Result<Self, FleetError> {
        let db_path = Path::new(&config.storage.database_path);
        let search_path = Path::new(&config.search.database_path);
        ensure_parent(db_path)?;
        ensure_parent(search_path)?;

        tracing::debug!(
            "Opening stores: db={}, blobs={}, search={}",
            db_path.display(),
            config.storage.blob_root,
            search_path.display()
        );

        Ok(Self {
            kv: Arc::new(SqliteKvStore::new(db_path)?),
            blobs: Arc::new(FsBlobStore::new(&config.storage.blob_root)?),
            index: Arc::new(SqliteSearchIndex::open(search_path, &config.search.index_name)?),
            crawl_queue: Arc::new(SqliteQueue::open(db_path, &config.queues.crawl_queue)?),
            index_queue: Arc::new(SqliteQueue::open(db_path, &config.queues.index_queue)?),
        })
    }

    /// Opens local backends with default names under one directory
    pub fn open_local_in(root: &Path) -> Result<Self, FleetError> {
        let db_path = root.join("fleetcrawl.db");
        Ok(Self {
            kv: Arc::new(SqliteKvStore::new(&db_path)?),
            blobs: Arc::new(FsBlobStore::new(root.join("blobs"))?),
            index: Arc::new(SqliteSearchIndex::open(&root.join("search.db"), "webcrawler")?),
            crawl_queue: Arc::new(SqliteQueue::open(&db_path, "crawl-queue")?),
            index_queue: Arc::new(SqliteQueue::open(&db_path, "index-queue")?),
        })
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use tempfile::TempDir;

    #[test]
    fn test_open_local_creates_directories() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().display().to_string();
        let config = parse_config(&format!(
            r#"
[crawl]
seed-urls = ["https://example.com/"]

[user-agent]
crawler-name = "Test"
crawler-version = "1.0"
contact-url = "https://example.com/about"
contact-email = "admin@example.com"

[storage]
database-path = "{root}/state/fleet.db"
blob-root = "{root}/blobs"

[search]
database-path = "{root}/search/index.db"
"#
        ))
        .unwrap();

        let backends = Backends::open_local(&config).unwrap();
        assert!(backends.index.is_available());
        assert_eq!(backends.crawl_queue.name(), "crawl-queue");
        assert_eq!(backends.index_queue.name(), "index-queue");
        assert!(dir.path().join("state").is_dir());
        assert!(dir.path().join("search").is_dir());
    }

    #[test]
    fn test_queues_share_database_but_not_messages() {
        let dir = TempDir::new().unwrap();
        let backends = Backends::open_local_in(dir.path()).unwrap();

        backends.crawl_queue.send("crawl").unwrap();
        assert_eq!(backends.crawl_queue.depth().unwrap().visible, 1);
        assert!(backends.index_queue.depth().unwrap().is_empty());
    }
}
