//! SQLite FTS5 search index

use crate::config::validate_index_name;
use crate::search::{SearchDocument, SearchHit, SearchHits, SearchIndex};
use crate::storage::{StorageError, StorageResult};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// bm25 column weights: url, title, description, text_content, content_key, crawl_timestamp
const BM25_WEIGHTS: &str = "0.0, 2.0, 1.5, 1.0, 0.0, 0.0";

/// Full-text index stored as an FTS5 virtual table
pub struct SqliteSearchIndex {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteSearchIndex {
    /// Connects to the index database; the index itself is created on first write
    pub fn open(path: &Path, index_name: &str) -> StorageResult<Self> {
        validate_index_name(index_name).map_err(|e| StorageError::Database(e.to_string()))?;

        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;

        Ok(Self {
            conn: Mutex::new(conn),
            table: format!("fts_{}", index_name),
        })
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("search connection lock poisoned".to_string()))
    }

    fn create_sql(&self) -> String {
        format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS {} USING fts5(
                url UNINDEXED,
                title,
                description,
                text_content,
                content_key UNINDEXED,
                crawl_timestamp UNINDEXED,
                tokenize = 'porter unicode61'
            );",
            self.table
        )
    }

    fn table_exists(&self, conn: &Connection) -> StorageResult<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![self.table],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

/// Turns free text into an FTS5 expression matching any of its terms
///
/// Each term is quoted so operators and punctuation in user input are taken
/// literally.
fn build_match_expression(text: &str) -> Option<String> {
    let terms: Vec<String> = text
        .split_whitespace()
        .map(|term| term.replace('"', ""))
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{}\"", term))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

impl SearchIndex for SqliteSearchIndex {
    fn index(&self, doc: &SearchDocument) -> StorageResult<()> {
        let create_sql = self.create_sql();
        let mut conn = self.lock()?;
        conn.execute_batch(&create_sql)?;

        let tx = conn.transaction()?;
        tx.execute(
            &format!("DELETE FROM {} WHERE url = ?1", self.table),
            params![doc.url],
        )?;
        tx.execute(
            &format!(
                "INSERT INTO {} (url, title, description, text_content, content_key, crawl_timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                self.table
            ),
            params![
                doc.url,
                doc.title,
                doc.description,
                doc.text_content,
                doc.content_key,
                doc.crawl_timestamp
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn query(&self, text: &str, page: usize, page_size: usize) -> StorageResult<SearchHits> {
        let Some(expression) = build_match_expression(text) else {
            return Ok(SearchHits::default());
        };

        let conn = self.lock()?;
        if !self.table_exists(&conn)? {
            return Ok(SearchHits::default());
        }

        let t = &self.table;
        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {t} WHERE {t} MATCH ?1"),
            params![expression],
            |row| row.get(0),
        )?;

        let offset = page.saturating_sub(1).saturating_mul(page_size);
        let mut stmt = conn.prepare(&format!(
            "SELECT url, title, description, content_key, crawl_timestamp,
                    bm25({t}, {BM25_WEIGHTS}) AS score,
                    snippet({t}, 3, '[', ']', '...', 16)
             FROM {t} WHERE {t} MATCH ?1
             ORDER BY score LIMIT ?2 OFFSET ?3"
        ))?;

        let rows = stmt.query_map(
            params![expression, page_size as i64, offset as i64],
            |row| {
                let score: f64 = row.get(5)?;
                let snippet: Option<String> = row.get(6)?;
                Ok(SearchHit {
                    url: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    content_key: row.get(3)?,
                    crawl_timestamp: row.get(4)?,
                    // bm25 is lower-is-better; flip it so larger means more relevant.
                    score: -score,
                    highlights: snippet.filter(|s| !s.is_empty()).into_iter().collect(),
                })
            },
        )?;
        let hits = rows.collect::<Result<Vec<_>, _>>()?;

        Ok(SearchHits {
            hits,
            total: total as u64,
        })
    }

    fn delete_index(&self) -> StorageResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {};", self.table))?;
        Ok(())
    }

    fn recreate_index(&self) -> StorageResult<()> {
        let create_sql = self.create_sql();
        let conn = self.lock()?;
        conn.execute_batch(&create_sql)?;
        Ok(())
    }

    fn is_available(&self) -> bool {
        match self.lock() {
            Ok(conn) => conn
                .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                .is_ok(),
            Err(_) => false,
        }
    }
}
