//! Frontier and dedup tracker
//!
//! The frontier is the only component that enqueues crawl tasks. Admission
//! writes a PENDING url record with a conditional insert and only then sends
//! the task, so a URL is enqueued at most once no matter how many workers
//! discover it concurrently.

use crate::config::CrawlConfig;
use crate::queue::{send_json, CrawlTask, QueueError, TaskQueue};
use crate::retry::{retry_with_backoff, Backoff};
use crate::state::UrlStatus;
use crate::storage::{KvStore, StorageError, UrlRecord, UrlUpdate};
use crate::url::{extract_domain, is_domain_allowed, normalize_url};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A backend failure during admission; the link is dropped
#[derive(Debug, Error)]
pub enum AdmissionError {
    #[error("url record store unavailable: {0}")]
    Store(#[from] StorageError),

    #[error("crawl queue unavailable: {0}")]
    Queue(#[from] QueueError),
}

/// Why a URL was not enqueued
#[derive(Debug)]
pub enum RejectReason {
    DepthExceeded { depth: u32, max_depth: u32 },
    InvalidUrl(String),
    DomainNotAllowed(String),
    /// A url record already exists, whatever its status
    AlreadySeen,
    /// The URL failed `max_attempts` times
    RetriesExhausted { attempts: u32 },
    Unavailable(AdmissionError),
}

impl RejectReason {
    /// True if the rejection came from a failing backend rather than policy
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DepthExceeded { depth, max_depth } => {
                write!(f, "depth {} exceeds max depth {}", depth, max_depth)
            }
            Self::InvalidUrl(e) => write!(f, "invalid url: {}", e),
            Self::DomainNotAllowed(host) => write!(f, "domain {} not allowed", host),
            Self::AlreadySeen => f.write_str("already seen"),
            Self::RetriesExhausted { attempts } => {
                write!(f, "gave up after {} attempts", attempts)
            }
            Self::Unavailable(e) => write!(f, "{}", e),
        }
    }
}

/// Result of an admission attempt
#[derive(Debug)]
pub enum Admission {
    Enqueued { task_id: String, url: String },
    Rejected(RejectReason),
}

impl Admission {
    pub fn is_enqueued(&self) -> bool {
        matches!(self, Self::Enqueued { .. })
    }
}

/// Admission rules taken from one configuration snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmissionPolicy {
    pub max_depth: u32,
    /// Host allow-list; empty allows every host
    pub restricted_domains: Vec<String>,
    pub max_attempts: u32,
}

impl AdmissionPolicy {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            restricted_domains: config.restricted_domains.clone(),
            max_attempts: config.max_attempts,
        }
    }
}

/// The sole gate through which crawl tasks enter the crawl queue
pub struct Frontier {
    kv: Arc<dyn KvStore>,
    crawl_queue: Arc<dyn TaskQueue>,
    policy: AdmissionPolicy,
    store_backoff: Backoff,
    queue_backoff: Backoff,
}

impl Frontier {
    pub fn new(kv: Arc<dyn KvStore>, crawl_queue: Arc<dyn TaskQueue>, policy: AdmissionPolicy) -> Self {
        Self {
            kv,
            crawl_queue,
            policy,
            store_backoff: Backoff::STORE,
            queue_backoff: Backoff::QUEUE,
        }
    }

    /// Overrides the retry schedules used for store and queue calls
    pub fn with_backoff(mut self, store: Backoff, queue: Backoff) -> Self {
        self.store_backoff = store;
        self.queue_backoff = queue;
        self
    }

    pub fn policy(&self) -> &AdmissionPolicy {
        &self.policy
    }

    /// Admits a URL into the crawl
    ///
    /// # Checks, in order
    ///
    /// 1. `depth > max_depth` → rejected
    /// 2. URL must normalize
    /// 3. host must match the allow-list when one is configured
    /// 4. conditional insert of a PENDING record; an existing record → rejected,
    ///    unless it is FAILED with attempts left, in which case it is re-admitted
    /// 5. the crawl task is sent
    ///
    /// Store failures reject the URL (fail closed). If the send fails after
    /// the record was written, the record is moved to FAILED, and the next
    /// admission of the same URL re-admits it.
    pub async fn admit(&self, url: &str, depth: u32, parent_url: Option<&str>) -> Admission {
        if depth > self.policy.max_depth {
            return Admission::Rejected(RejectReason::DepthExceeded {
                depth,
                max_depth: self.policy.max_depth,
            });
        }

        let normalized = match normalize_url(url) {
            Ok(u) => u,
            Err(e) => return Admission::Rejected(RejectReason::InvalidUrl(e.to_string())),
        };

        let host = extract_domain(&normalized).unwrap_or_default();
        if !is_domain_allowed(&host, &self.policy.restricted_domains) {
            return Admission::Rejected(RejectReason::DomainNotAllowed(host));
        }

        let key = String::from(normalized);
        let record = UrlRecord::pending(&key, depth, parent_url.map(str::to_string));

        let created = retry_with_backoff(self.store_backoff, "put_if_absent", || {
            self.kv.put_if_absent(&record)
        })
        .await;

        match created {
            Ok(true) => {}
            Ok(false) => return self.readmit_existing(&key).await,
            Err(e) => {
                tracing::warn!("Dropping {}: url record store unavailable: {}", key, e);
                return Admission::Rejected(RejectReason::Unavailable(e.into()));
            }
        }

        let task = CrawlTask::new(&key, depth, parent_url.map(str::to_string));
        self.enqueue(task).await
    }

    /// Re-admits a FAILED URL while it has attempts left
    ///
    /// The FAILED → PENDING move is conditional on the current status, so
    /// when several deliveries race only one of them re-enqueues.
    pub async fn readmit_failed(&self, task: &CrawlTask) -> Admission {
        match retry_with_backoff(self.store_backoff, "get", || self.kv.get(&task.url)).await {
            Ok(Some(record)) => self.readmit_record(record).await,
            Ok(None) => Admission::Rejected(RejectReason::AlreadySeen),
            Err(e) => Admission::Rejected(RejectReason::Unavailable(e.into())),
        }
    }

    /// Second look at a URL whose conditional insert lost
    async fn readmit_existing(&self, key: &str) -> Admission {
        match retry_with_backoff(self.store_backoff, "get", || self.kv.get(key)).await {
            Ok(Some(record)) if record.status == UrlStatus::Failed => {
                self.readmit_record(record).await
            }
            Ok(_) => Admission::Rejected(RejectReason::AlreadySeen),
            Err(e) => {
                tracing::warn!("Dropping {}: url record store unavailable: {}", key, e);
                Admission::Rejected(RejectReason::Unavailable(e.into()))
            }
        }
    }

    async fn readmit_record(&self, record: UrlRecord) -> Admission {
        if record.status != UrlStatus::Failed {
            return Admission::Rejected(RejectReason::AlreadySeen);
        }

        if record.attempts >= self.policy.max_attempts {
            return Admission::Rejected(RejectReason::RetriesExhausted {
                attempts: record.attempts,
            });
        }

        let requeued = retry_with_backoff(self.store_backoff, "requeue", || {
            self.kv.update(&record.url, &UrlUpdate::requeued())
        })
        .await;

        match requeued {
            Ok(true) => {}
            Ok(false) => return Admission::Rejected(RejectReason::AlreadySeen),
            Err(e) => return Admission::Rejected(RejectReason::Unavailable(e.into())),
        }

        tracing::debug!(
            "Re-admitting {} (attempt {} of {})",
            record.url,
            record.attempts + 1,
            self.policy.max_attempts
        );
        let retry = CrawlTask::new(&record.url, record.first_seen_depth, record.parent_url);
        self.enqueue(retry).await
    }

    async fn enqueue(&self, task: CrawlTask) -> Admission {
        let sent = retry_with_backoff(self.queue_backoff, "send crawl task", || {
            send_json(self.crawl_queue.as_ref(), &task)
        })
        .await;

        match sent {
            Ok(task_id) => {
                tracing::debug!("Enqueued {} at depth {}", task.url, task.depth);
                Admission::Enqueued {
                    task_id,
                    url: task.url,
                }
            }
            Err(e) => {
                tracing::warn!("Failed to enqueue {}: {}", task.url, e);
                if let Err(undo) = self.kv.update(&task.url, &UrlUpdate::enqueue_failed()) {
                    tracing::warn!("Could not mark {} as failed: {}", task.url, undo);
                }
                Admission::Rejected(RejectReason::Unavailable(e.into()))
            }
        }
    }
}
