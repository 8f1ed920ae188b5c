//! Task queues connecting the coordinator and the worker pools
//!
//! Two queues exist per deployment: the crawl queue carries [`CrawlTask`]s to
//! crawler workers and the index queue carries [`IndexTask`]s to indexer
//! workers. Delivery is at-least-once: a received message becomes invisible
//! for the visibility timeout and reappears unless it is acked first.

mod sqlite;

pub use sqlite::SqliteQueue;

use crate::retry::Transient;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Malformed message {id}: {source}")]
    Decode {
        id: String,
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue unavailable: {0}")]
    Unavailable(String),
}

impl Transient for QueueError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Sqlite(_) | Self::Unavailable(_))
    }
}

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Approximate number of messages in a queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueDepth {
    /// Messages waiting to be received
    pub visible: u64,
    /// Messages received but not yet acked or timed out
    pub in_flight: u64,
}

impl QueueDepth {
    pub fn total(&self) -> u64 {
        self.visible + self.in_flight
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

/// One delivery of a queue message
#[derive(Debug, Clone)]
pub struct QueueMessage {
    /// Stable message id, assigned on send
    pub id: String,
    /// Token for this delivery; only the latest delivery can ack
    pub receipt: String,
    /// Raw JSON body
    pub body: String,
    /// How many times the message has been received, this delivery included
    pub receive_count: u32,
}

impl QueueMessage {
    /// Decodes the message body
    pub fn decode<T: DeserializeOwned>(&self) -> QueueResult<T> {
        serde_json::from_str(&self.body).map_err(|source| QueueError::Decode {
            id: self.id.clone(),
            source,
        })
    }
}

/// A message queue with visibility-timeout semantics
pub trait TaskQueue: Send + Sync {
    /// Queue name, for logs
    fn name(&self) -> &str;

    /// Appends a message and returns its id
    fn send(&self, body: &str) -> QueueResult<String>;

    /// Receives up to `max` visible messages, hiding each for `visibility_timeout`
    fn receive(&self, max: usize, visibility_timeout: Duration) -> QueueResult<Vec<QueueMessage>>;

    /// Deletes a received message
    ///
    /// A receipt from an earlier delivery is ignored, since the message now
    /// belongs to whoever received it last.
    fn ack(&self, message: &QueueMessage) -> QueueResult<()>;

    /// Current visible and in-flight counts
    fn depth(&self) -> QueueResult<QueueDepth>;
}

/// Serializes `payload` as JSON and sends it
pub fn send_json<T: Serialize>(queue: &dyn TaskQueue, payload: &T) -> QueueResult<String> {
    let body = serde_json::to_string(payload)?;
    queue.send(&body)
}

/// A page to fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlTask {
    /// Normalized absolute URL
    pub url: String,
    pub depth: u32,
    pub parent_url: Option<String>,
    pub enqueued_at: DateTime<Utc>,
}

impl CrawlTask {
    pub fn new(url: impl Into<String>, depth: u32, parent_url: Option<String>) -> Self {
        Self {
            url: url.into(),
            depth,
            parent_url,
            enqueued_at: Utc::now(),
        }
    }
}

/// A stored page to index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexTask {
    pub url: String,
    pub content_key: String,
    pub title: String,
    /// Epoch seconds
    pub crawl_timestamp: i64,
}
