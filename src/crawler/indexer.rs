//! Indexer worker
//!
//! Consumes [`IndexTask`]s, loads the stored content record and writes it to
//! the search index. Documents are keyed by URL, so redelivery replaces
//! rather than duplicates.

use crate::config::QueuesConfig;
use crate::crawler::poll::{poll_loop, PollSettings};
use crate::crawler::worker::WorkerError;
use crate::queue::{IndexTask, QueueMessage, TaskQueue};
use crate::retry::{retry_with_backoff, Backoff};
use crate::search::{SearchDocument, SearchIndex};
use crate::storage::{BlobStore, ContentRecord, StorageError};
use std::sync::Arc;
use tokio::sync::watch;

/// What happened to one index task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Indexed,
    /// The content record is gone or unreadable
    Dropped,
}

pub struct IndexerWorker {
    blobs: Arc<dyn BlobStore>,
    index: Arc<dyn SearchIndex>,
    index_queue: Arc<dyn TaskQueue>,
    poll: PollSettings,
}

impl IndexerWorker {
    pub fn new(
        blobs: Arc<dyn BlobStore>,
        index: Arc<dyn SearchIndex>,
        index_queue: Arc<dyn TaskQueue>,
        queues: &QueuesConfig,
    ) -> Self {
        Self {
            blobs,
            index,
            index_queue,
            poll: PollSettings::from_config(queues),
        }
    }

    /// Processes index tasks until `stop` turns true
    pub async fn run(&self, stop: watch::Receiver<bool>) {
        tracing::info!("Indexer worker listening on {}", self.index_queue.name());
        poll_loop(self.index_queue.as_ref(), self.poll, stop, |message| {
            self.process_message(message)
        })
        .await;
    }

    pub async fn process_message(&self, message: QueueMessage) {
        let task: IndexTask = match message.decode() {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!("Dropping undecodable index task: {}", e);
                self.ack(&message);
                return;
            }
        };

        match self.process(&task).await {
            Ok(_) => self.ack(&message),
            Err(e) => tracing::warn!("Leaving index task for {} for redelivery: {}", task.url, e),
        }
    }

    fn ack(&self, message: &QueueMessage) {
        if let Err(e) = self.index_queue.ack(message) {
            tracing::warn!("Failed to ack index message {}: {}", message.id, e);
        }
    }

    /// Indexes one stored page
    pub async fn process(&self, task: &IndexTask) -> Result<IndexOutcome, WorkerError> {
        let loaded = retry_with_backoff(Backoff::STORE, "load content", || {
            self.blobs.get(&task.content_key)
        })
        .await;

        let record = match loaded.and_then(|bytes| ContentRecord::from_json_bytes(&bytes)) {
            Ok(record) => record,
            Err(StorageError::NotFound(_)) => {
                tracing::info!("Content for {} is gone; not indexing", task.url);
                return Ok(IndexOutcome::Dropped);
            }
            Err(StorageError::Serialization(e)) => {
                tracing::warn!("Content for {} is malformed: {}", task.url, e);
                return Ok(IndexOutcome::Dropped);
            }
            Err(e) => return Err(e.into()),
        };

        let doc = SearchDocument::from_content(&record, &task.content_key);
        retry_with_backoff(Backoff::STORE, "index document", || self.index.index(&doc)).await?;

        tracing::info!("Indexed {}", task.url);
        Ok(IndexOutcome::Indexed)
    }
}
