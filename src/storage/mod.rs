//! Storage module for crawl state and page content
//!
//! This module handles:
//! - Url records in SQLite, written through conditional inserts and updates
//! - Content records in a filesystem blob store
//! - Key derivation for content objects

mod blob;
mod schema;
mod sqlite;
mod traits;

pub use blob::FsBlobStore;
pub use sqlite::SqliteKvStore;
pub use traits::{BlobStore, KvStore, StorageError, StorageResult};

use crate::state::UrlStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Suffix of content record objects
pub const CONTENT_SUFFIX: &str = ".json";

/// Represents a url record in the key-value store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlRecord {
    /// Normalized URL, the record key
    pub url: String,
    pub status: UrlStatus,
    pub first_seen_depth: u32,
    pub parent_url: Option<String>,
    pub discovered_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Present only when FETCHED
    pub content_key: Option<String>,
    /// Failed fetch attempts so far
    pub attempts: u32,
}

impl UrlRecord {
    /// A fresh PENDING record, as written by the frontier
    pub fn pending(url: impl Into<String>, depth: u32, parent_url: Option<String>) -> Self {
        Self {
            url: url.into(),
            status: UrlStatus::Pending,
            first_seen_depth: depth,
            parent_url,
            discovered_at: Utc::now(),
            last_attempt_at: None,
            content_key: None,
            attempts: 0,
        }
    }
}

/// A status change applied to an existing url record
///
/// Built through the constructors, which pair each target status with the
/// status the record must currently be in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlUpdate {
    pub status: UrlStatus,
    pub content_key: Option<String>,
    /// New attempt count; `None` leaves it unchanged
    pub attempts: Option<u32>,
    /// Apply only if the record is currently in this status
    pub expected_status: Option<UrlStatus>,
    /// Stamp `last_attempt_at` with the current time
    pub touch_attempt: bool,
}

impl UrlUpdate {
    /// PENDING → FETCHED with the stored content key
    pub fn fetched(content_key: impl Into<String>) -> Self {
        Self {
            status: UrlStatus::Fetched,
            content_key: Some(content_key.into()),
            attempts: None,
            expected_status: Some(UrlStatus::Pending),
            touch_attempt: true,
        }
    }

    /// PENDING → FAILED, recording the new attempt count
    pub fn failed(attempts: u32) -> Self {
        Self {
            status: UrlStatus::Failed,
            content_key: None,
            attempts: Some(attempts),
            expected_status: Some(UrlStatus::Pending),
            touch_attempt: true,
        }
    }

    /// FAILED → PENDING, for re-admission under the retry policy
    pub fn requeued() -> Self {
        Self {
            status: UrlStatus::Pending,
            content_key: None,
            attempts: None,
            expected_status: Some(UrlStatus::Failed),
            touch_attempt: false,
        }
    }

    /// PENDING → FAILED without counting an attempt
    ///
    /// Used when a task could not be enqueued after the record was written.
    pub fn enqueue_failed() -> Self {
        Self {
            status: UrlStatus::Failed,
            content_key: None,
            attempts: None,
            expected_status: Some(UrlStatus::Pending),
            touch_attempt: false,
        }
    }
}

/// A stored page, serialized as JSON into the blob store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub url: String,
    pub title: String,
    pub description: String,
    pub text_content: String,
    pub html: String,
    /// Epoch seconds
    pub crawl_timestamp: i64,
    pub depth: u32,
}

impl ContentRecord {
    pub fn to_json_bytes(&self) -> StorageResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_json_bytes(bytes: &[u8]) -> StorageResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Listing entry for a blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    pub key: String,
    pub size: u64,
    pub last_modified: DateTime<Utc>,
}

impl BlobEntry {
    /// True for content record objects
    pub fn is_content(&self) -> bool {
        self.key.ends_with(CONTENT_SUFFIX)
    }
}

/// Derives the blob key of a URL's content record
///
/// # Examples
///
/// ```
/// use fleetcrawl::storage::content_key;
///
/// let key = content_key("output/", "https://example.com/");
/// assert!(key.starts_with("output/"));
/// assert!(key.ends_with(".json"));
/// assert_eq!(key, content_key("output/", "https://example.com/"));
/// ```
pub fn content_key(prefix: &str, url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    format!("{}{}{}", prefix, hex::encode(digest), CONTENT_SUFFIX)
}

/// Counts content records under `prefix`
pub fn count_content(blobs: &dyn BlobStore, prefix: &str) -> StorageResult<u64> {
    let entries = blobs.list(prefix)?;
    Ok(entries.iter().filter(|e| e.is_content()).count() as u64)
}
