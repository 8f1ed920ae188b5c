//! Storage traits and error types
//!
//! This module defines the interfaces of the key-value store that tracks url
//! records and the blob store that holds page content.

use crate::retry::Transient;
use crate::state::UrlStatus;
use crate::storage::{BlobEntry, UrlRecord, UrlUpdate};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

impl Transient for StorageError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Sqlite(_) | Self::Unavailable(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Per-URL status store with conditional writes
///
/// The conditional insert is the only deduplication mechanism in the system:
/// callers must never read-then-write to decide whether a URL is new.
pub trait KvStore: Send + Sync {
    /// Inserts the record unless one already exists for its URL
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - This call created the record
    /// * `Ok(false)` - A record already existed, whatever its status
    fn put_if_absent(&self, record: &UrlRecord) -> StorageResult<bool>;

    /// Gets the record for a normalized URL
    fn get(&self, url: &str) -> StorageResult<Option<UrlRecord>>;

    /// Applies an update, honoring its expected-status condition
    ///
    /// Returns `false` if no record matched (absent, or in another status).
    fn update(&self, url: &str, update: &UrlUpdate) -> StorageResult<bool>;

    /// Drops the record table and creates it empty; safe when absent
    fn recreate_table(&self) -> StorageResult<()>;

    /// Counts records in the given status
    fn count_by_status(&self, status: UrlStatus) -> StorageResult<u64>;
}

/// Flat object store addressed by `/`-separated keys
pub trait BlobStore: Send + Sync {
    /// Writes an object, replacing any previous body
    fn put(&self, key: &str, body: &[u8]) -> StorageResult<()>;

    /// Lists objects whose key starts with `prefix`
    fn list(&self, prefix: &str) -> StorageResult<Vec<BlobEntry>>;

    /// Reads an object; `NotFound` if absent
    fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Deletes every object under `prefix` and returns how many were removed
    fn delete_prefix(&self, prefix: &str) -> StorageResult<usize>;
}
