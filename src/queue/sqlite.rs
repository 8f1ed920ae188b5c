//! SQLite-backed task queue
//!
//! Every queue lives in one `queue_messages` table keyed by queue name, so a
//! crawl queue and an index queue can share a database file with the url
//! records. Several processes may open the same file; receives run inside an
//! immediate transaction so two workers never claim the same message.

use crate::queue::{QueueDepth, QueueError, QueueMessage, QueueResult, TaskQueue};
use chrono::Utc;
use rusqlite::{params, Connection, TransactionBehavior};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use uuid::Uuid;

const QUEUE_SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS queue_messages (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    id TEXT NOT NULL UNIQUE,
    queue TEXT NOT NULL,
    body TEXT NOT NULL,
    sent_at INTEGER NOT NULL,
    visible_at INTEGER NOT NULL,
    receipt TEXT,
    receive_count INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_queue_messages_visible ON queue_messages(queue, visible_at);
"#;

/// A named queue stored in SQLite
pub struct SqliteQueue {
    conn: Mutex<Connection>,
    name: String,
}

impl SqliteQueue {
    /// Opens (or creates) the queue `name` in the database at `path`
    pub fn open(path: &Path, name: &str) -> QueueResult<Self> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
        ",
        )?;
        conn.execute_batch(QUEUE_SCHEMA_SQL)?;

        Ok(Self {
            conn: Mutex::new(conn),
            name: name.to_string(),
        })
    }

    /// Creates an in-memory queue (for testing)
    #[cfg(test)]
    pub fn new_in_memory(name: &str) -> QueueResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(QUEUE_SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            name: name.to_string(),
        })
    }

    fn lock(&self) -> QueueResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| QueueError::Unavailable(format!("{} connection lock poisoned", self.name)))
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

impl TaskQueue for SqliteQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, body: &str) -> QueueResult<String> {
        let id = Uuid::new_v4().to_string();
        let now = now_millis();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO queue_messages (id, queue, body, sent_at, visible_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, self.name, body, now],
        )?;
        Ok(id)
    }

    fn receive(&self, max: usize, visibility_timeout: Duration) -> QueueResult<Vec<QueueMessage>> {
        if max == 0 {
            return Ok(Vec::new());
        }

        let now = now_millis();
        let hidden_until = now + visibility_timeout.as_millis() as i64;

        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidates: Vec<(String, String, u32)> = {
            let mut stmt = tx.prepare(
                "SELECT id, body, receive_count FROM queue_messages
                 WHERE queue = ?1 AND visible_at <= ?2
                 ORDER BY seq LIMIT ?3",
            )?;
            let rows = stmt.query_map(params![self.name, now, max as i64], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })?;
            rows.collect::<Result<Vec<_>, _>>()?
        };

        let mut messages = Vec::with_capacity(candidates.len());
        for (id, body, receive_count) in candidates {
            let receipt = Uuid::new_v4().to_string();
            tx.execute(
                "UPDATE queue_messages
                 SET visible_at = ?1, receipt = ?2, receive_count = receive_count + 1
                 WHERE id = ?3",
                params![hidden_until, receipt, id],
            )?;
            messages.push(QueueMessage {
                id,
                receipt,
                body,
                receive_count: receive_count + 1,
            });
        }

        tx.commit()?;
        Ok(messages)
    }

    fn ack(&self, message: &QueueMessage) -> QueueResult<()> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM queue_messages WHERE id = ?1 AND receipt = ?2",
            params![message.id, message.receipt],
        )?;

        if deleted == 0 {
            tracing::debug!(
                "Ignoring stale ack for message {} on {}",
                message.id,
                self.name
            );
        }
        Ok(())
    }

    fn depth(&self) -> QueueResult<QueueDepth> {
        let now = now_millis();
        let conn = self.lock()?;
        let (visible, in_flight): (i64, i64) = conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN visible_at <= ?2 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN visible_at > ?2 THEN 1 ELSE 0 END), 0)
             FROM queue_messages WHERE queue = ?1",
            params![self.name, now],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(QueueDepth {
            visible: visible as u64,
            in_flight: in_flight as u64,
        })
    }
}
