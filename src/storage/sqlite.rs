//! SQLite key-value store for url records

use crate::state::UrlStatus;
use crate::storage::schema::{initialize_schema, recreate_schema};
use crate::storage::traits::{KvStore, StorageError, StorageResult};
use crate::storage::{UrlRecord, UrlUpdate};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// SQLite-backed [`KvStore`]
pub struct SqliteKvStore {
    conn: Mutex<Connection>,
}

/// Row as stored, before status and timestamps are parsed
struct RawRecord {
    url: String,
    status: String,
    first_seen_depth: u32,
    parent_url: Option<String>,
    discovered_at: String,
    last_attempt_at: Option<String>,
    content_key: Option<String>,
    attempts: u32,
}

impl RawRecord {
    fn into_record(self) -> StorageResult<UrlRecord> {
        let status = UrlStatus::from_db_string(&self.status).ok_or_else(|| {
            StorageError::Database(format!("unknown status '{}' for {}", self.status, self.url))
        })?;

        Ok(UrlRecord {
            status,
            first_seen_depth: self.first_seen_depth,
            parent_url: self.parent_url,
            discovered_at: parse_timestamp(&self.discovered_at)?,
            last_attempt_at: self.last_attempt_at.as_deref().map(parse_timestamp).transpose()?,
            content_key: self.content_key,
            attempts: self.attempts,
            url: self.url,
        })
    }
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Database(format!("bad timestamp '{}': {}", value, e)))
}

impl SqliteKvStore {
    /// Opens or creates the url record store
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteKvStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory store (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("url record connection lock poisoned".to_string()))
    }
}

impl KvStore for SqliteKvStore {
    fn put_if_absent(&self, record: &UrlRecord) -> StorageResult<bool> {
        let conn = self.lock()?;
        let inserted = conn.execute(
            "INSERT INTO url_records
                (url, status, first_seen_depth, parent_url, discovered_at, last_attempt_at, content_key, attempts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(url) DO NOTHING",
            params![
                record.url,
                record.status.to_db_string(),
                record.first_seen_depth,
                record.parent_url,
                record.discovered_at.to_rfc3339(),
                record.last_attempt_at.map(|t| t.to_rfc3339()),
                record.content_key,
                record.attempts,
            ],
        )?;
        Ok(inserted == 1)
    }

    fn get(&self, url: &str) -> StorageResult<Option<UrlRecord>> {
        let conn = self.lock()?;
        let raw = conn
            .query_row(
                "SELECT url, status, first_seen_depth, parent_url, discovered_at,
                        last_attempt_at, content_key, attempts
                 FROM url_records WHERE url = ?1",
                params![url],
                |row| {
                    Ok(RawRecord {
                        url: row.get(0)?,
                        status: row.get(1)?,
                        first_seen_depth: row.get(2)?,
                        parent_url: row.get(3)?,
                        discovered_at: row.get(4)?,
                        last_attempt_at: row.get(5)?,
                        content_key: row.get(6)?,
                        attempts: row.get(7)?,
                    })
                },
            )
            .optional()?;

        raw.map(RawRecord::into_record).transpose()
    }

    fn update(&self, url: &str, update: &UrlUpdate) -> StorageResult<bool> {
        let touched_at = update.touch_attempt.then(|| Utc::now().to_rfc3339());
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE url_records SET
                status = ?1,
                content_key = CASE WHEN ?1 = 'FETCHED' THEN ?2 ELSE NULL END,
                attempts = COALESCE(?3, attempts),
                last_attempt_at = COALESCE(?4, last_attempt_at)
             WHERE url = ?5 AND (?6 IS NULL OR status = ?6)",
            params![
                update.status.to_db_string(),
                update.content_key,
                update.attempts,
                touched_at,
                url,
                update.expected_status.map(|s| s.to_db_string()),
            ],
        )?;
        Ok(changed == 1)
    }

    fn recreate_table(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        recreate_schema(&conn)?;
        Ok(())
    }

    fn count_by_status(&self, status: UrlStatus) -> StorageResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM url_records WHERE status = ?1",
            params![status.to_db_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }
}
