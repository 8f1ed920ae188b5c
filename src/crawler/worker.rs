//! Crawler worker
//!
//! Consumes [`CrawlTask`]s: fetches the page, stores its content record,
//! hands an [`IndexTask`] to the indexers, offers discovered links to the
//! frontier and finally marks the URL FETCHED.
//!
//! Redelivered tasks are harmless. A URL is FETCHED only once every other
//! step succeeded, so a FETCHED URL is skipped. A URL whose record vanished
//! because the crawl was purged while the task was in flight is skipped too.

use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, fetch_url, FetchResult};
use crate::crawler::frontier::{Admission, AdmissionPolicy, Frontier};
use crate::crawler::parser::parse_html;
use crate::crawler::poll::{poll_loop, PollSettings};
use crate::queue::{send_json, CrawlTask, IndexTask, QueueError, QueueMessage, TaskQueue};
use crate::retry::{retry_with_backoff, Backoff};
use crate::storage::{content_key, BlobStore, ContentRecord, KvStore, StorageError, UrlUpdate};
use crate::UrlStatus;
use chrono::Utc;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use url::Url;

/// Backend failure while handling a task; the message is left for redelivery
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("queue: {0}")]
    Queue(#[from] QueueError),
}

/// What happened to one crawl task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Page stored and handed to the indexers
    Fetched { content_key: String, links_admitted: usize },
    /// Fetch failed; `readmitted` tells whether another attempt was queued
    Failed { reason: String, readmitted: bool },
    /// Nothing to do for this delivery
    Skipped,
}

/// Dependencies and settings of a crawler worker
pub struct CrawlerWorker {
    kv: Arc<dyn KvStore>,
    blobs: Arc<dyn BlobStore>,
    crawl_queue: Arc<dyn TaskQueue>,
    index_queue: Arc<dyn TaskQueue>,
    frontier: Frontier,
    client: Client,
    content_prefix: String,
    request_delay: Duration,
    poll: PollSettings,
}

impl CrawlerWorker {
    pub fn new(
        kv: Arc<dyn KvStore>,
        blobs: Arc<dyn BlobStore>,
        crawl_queue: Arc<dyn TaskQueue>,
        index_queue: Arc<dyn TaskQueue>,
        config: &Config,
    ) -> Result<Self, reqwest::Error> {
        let client = build_http_client(
            &config.user_agent,
            Duration::from_secs(config.crawl.request_timeout_secs),
        )?;
        let frontier = Frontier::new(
            kv.clone(),
            crawl_queue.clone(),
            AdmissionPolicy::from_config(&config.crawl),
        );

        Ok(Self {
            kv,
            blobs,
            crawl_queue,
            index_queue,
            frontier,
            client,
            content_prefix: config.storage.content_prefix.clone(),
            request_delay: Duration::from_millis(config.crawl.request_delay_ms),
            poll: PollSettings::from_config(&config.queues),
        })
    }

    /// Processes crawl tasks until `stop` turns true
    pub async fn run(&self, stop: watch::Receiver<bool>) {
        tracing::info!("Crawler worker listening on {}", self.crawl_queue.name());
        poll_loop(self.crawl_queue.as_ref(), self.poll, stop, |message| {
            self.process_message(message)
        })
        .await;
    }

    /// Handles one delivery and acks it unless a backend failed
    pub async fn process_message(&self, message: QueueMessage) {
        let task: CrawlTask = match message.decode() {
            Ok(task) => task,
            Err(e) => {
                tracing::warn!("Dropping undecodable crawl task: {}", e);
                self.ack(&message);
                return;
            }
        };

        match self.process(&task).await {
            Ok(outcome) => {
                tracing::debug!("{} -> {:?}", task.url, outcome);
                self.ack(&message);
            }
            Err(e) => {
                tracing::warn!(
                    "Leaving {} for redelivery (receive #{}): {}",
                    task.url,
                    message.receive_count,
                    e
                );
            }
        }
    }

    fn ack(&self, message: &QueueMessage) {
        if let Err(e) = self.crawl_queue.ack(message) {
            tracing::warn!("Failed to ack crawl message {}: {}", message.id, e);
        }
    }

    /// Crawls one task
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlOutcome)` - The task is finished with; ack it
    /// * `Err(WorkerError)` - A store or queue failed; leave it for redelivery
    pub async fn process(&self, task: &CrawlTask) -> Result<CrawlOutcome, WorkerError> {
        let record = retry_with_backoff(Backoff::STORE, "get url record", || {
            self.kv.get(&task.url)
        })
        .await?;

        let record = match record {
            Some(record) if record.status == UrlStatus::Pending => record,
            Some(record) => {
                tracing::debug!("Skipping {} ({})", task.url, record.status);
                return Ok(CrawlOutcome::Skipped);
            }
            None => {
                tracing::debug!("Skipping {}: no url record", task.url);
                return Ok(CrawlOutcome::Skipped);
            }
        };

        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        tracing::info!("Fetching {} (depth {})", task.url, task.depth);
        let (final_url, body) = match fetch_url(&self.client, &task.url).await {
            FetchResult::Success {
                final_url, body, ..
            } => (final_url, body),
            failure => {
                let reason = failure
                    .failure_reason()
                    .unwrap_or_else(|| "unknown fetch failure".to_string());
                return self.record_failure(task, record.attempts + 1, reason).await;
            }
        };

        let base = Url::parse(&final_url).or_else(|_| Url::parse(&task.url));
        let page = match base {
            Ok(base) => parse_html(&body, &base),
            Err(e) => {
                return self
                    .record_failure(task, record.attempts + 1, format!("bad page URL: {}", e))
                    .await
            }
        };

        let key = content_key(&self.content_prefix, &task.url);
        let content = ContentRecord {
            url: task.url.clone(),
            title: page.title,
            description: page.description,
            text_content: page.text_content,
            html: body,
            crawl_timestamp: Utc::now().timestamp(),
            depth: task.depth,
        };
        let bytes = content.to_json_bytes()?;

        retry_with_backoff(Backoff::STORE, "store content", || {
            self.blobs.put(&key, &bytes)
        })
        .await?;

        // Every step before the FETCHED mark is safe to repeat, so a delivery
        // that fails part way is finished by its redelivery.
        let index_task = IndexTask {
            url: task.url.clone(),
            content_key: key.clone(),
            title: content.title.clone(),
            crawl_timestamp: content.crawl_timestamp,
        };
        retry_with_backoff(Backoff::QUEUE, "send index task", || {
            send_json(self.index_queue.as_ref(), &index_task)
        })
        .await?;

        let mut links_admitted = 0;
        if task.depth < self.frontier.policy().max_depth {
            for link in &page.links {
                if let Admission::Enqueued { .. } =
                    self.frontier.admit(link, task.depth + 1, Some(&task.url)).await
                {
                    links_admitted += 1;
                }
            }
        }

        let marked = retry_with_backoff(Backoff::STORE, "mark fetched", || {
            self.kv.update(&task.url, &UrlUpdate::fetched(&key))
        })
        .await?;
        if !marked {
            return self.discard_unmarked(&task.url, &key).await;
        }

        tracing::info!(
            "Stored {} ({} of {} links admitted)",
            task.url,
            links_admitted,
            page.links.len()
        );

        Ok(CrawlOutcome::Fetched {
            content_key: key,
            links_admitted,
        })
    }

    /// The FETCHED mark lost: another delivery finished first, or the crawl
    /// was purged while this one was in flight. A purged URL must not leave
    /// its content behind.
    async fn discard_unmarked(&self, url: &str, key: &str) -> Result<CrawlOutcome, WorkerError> {
        let record = retry_with_backoff(Backoff::STORE, "get url record", || self.kv.get(url)).await?;
        if record.is_none() {
            tracing::info!("{} was purged during its fetch; removing {}", url, key);
            retry_with_backoff(Backoff::STORE, "remove orphaned content", || {
                self.blobs.delete_prefix(key)
            })
            .await?;
        } else {
            tracing::debug!("{} was no longer pending after fetch", url);
        }
        Ok(CrawlOutcome::Skipped)
    }

    async fn record_failure(
        &self,
        task: &CrawlTask,
        attempts: u32,
        reason: String,
    ) -> Result<CrawlOutcome, WorkerError> {
        tracing::warn!("Fetch of {} failed (attempt {}): {}", task.url, attempts, reason);

        let marked = retry_with_backoff(Backoff::STORE, "mark failed", || {
            self.kv.update(&task.url, &UrlUpdate::failed(attempts))
        })
        .await?;
        if !marked {
            return Ok(CrawlOutcome::Skipped);
        }

        let readmitted = match self.frontier.readmit_failed(task).await {
            Admission::Enqueued { .. } => true,
            Admission::Rejected(reason) => {
                tracing::info!("Not retrying {}: {}", task.url, reason);
                false
            }
        };

        Ok(CrawlOutcome::Failed { reason, readmitted })
    }
}
