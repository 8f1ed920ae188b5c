//! Filesystem blob store
//!
//! Keys map to files under a root directory, `/` separating path segments.
//! Writes go to a temporary sibling first and are renamed into place, so a
//! listing never sees a half-written object.

use crate::storage::traits::{BlobStore, StorageError, StorageResult};
use crate::storage::BlobEntry;
use chrono::{DateTime, Utc};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

const TEMP_PREFIX: &str = ".tmp-";

/// [`BlobStore`] rooted at a local directory
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    /// Opens the store, creating the root directory if needed
    pub fn new(root: impl Into<PathBuf>) -> StorageResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(key.split('/').fold(self.root.clone(), |path, segment| path.join(segment)))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let segments: Option<Vec<&str>> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect();
        segments.map(|s| s.join("/"))
    }

    fn walk(&self, dir: &Path, prefix: &str, out: &mut Vec<BlobEntry>) -> StorageResult<()> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();

            if file_type.is_dir() {
                self.walk(&path, prefix, out)?;
                continue;
            }

            if !file_type.is_file()
                || entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX)
            {
                continue;
            }

            let Some(key) = self.key_for(&path) else {
                continue;
            };
            if !key.starts_with(prefix) {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                // Deleted between read_dir and stat.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            let last_modified: DateTime<Utc> = metadata.modified()?.into();

            out.push(BlobEntry {
                key,
                size: metadata.len(),
                last_modified,
            });
        }

        Ok(())
    }
}

/// Rejects keys that would escape the root or name a directory
fn validate_key(key: &str) -> StorageResult<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.ends_with('/')
        || key.contains('\\')
        || key
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == ".." || segment.starts_with(TEMP_PREFIX));

    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}

impl BlobStore for FsBlobStore {
    fn put(&self, key: &str, body: &[u8]) -> StorageResult<()> {
        let path = self.path_for(key)?;
        let parent = path
            .parent()
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(parent)?;

        let temp = parent.join(format!("{}{}", TEMP_PREFIX, Uuid::new_v4()));
        fs::write(&temp, body)?;
        if let Err(e) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }

    fn list(&self, prefix: &str) -> StorageResult<Vec<BlobEntry>> {
        // Only the directory named by the prefix can hold matches.
        let start = match prefix.rfind('/') {
            Some(idx) => {
                let dir = &prefix[..idx];
                if dir.split('/').any(|s| s.is_empty() || s == "..") {
                    return Err(StorageError::InvalidKey(prefix.to_string()));
                }
                dir.split('/').fold(self.root.clone(), |p, s| p.join(s))
            }
            None => self.root.clone(),
        };

        let mut entries = Vec::new();
        self.walk(&start, prefix, &mut entries)?;
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StorageError::NotFound(key.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn delete_prefix(&self, prefix: &str) -> StorageResult<usize> {
        let mut deleted = 0;
        for entry in self.list(prefix)? {
            let path = self.path_for(&entry.key)?;
            match fs::remove_file(&path) {
                Ok(()) => deleted += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(deleted)
    }
}
