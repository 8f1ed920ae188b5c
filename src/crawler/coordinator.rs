//! Crawl coordinator - seeding and dispatch
//!
//! The coordinator turns a seed list into crawl tasks through the frontier.
//! It keeps no state of its own beyond store handles: starting the same crawl
//! twice is decided entirely by admission, so seeds whose records survive are
//! no-ops and seeds purged since are admitted again.

use crate::backends::Backends;
use crate::config::CrawlConfig;
use crate::crawler::frontier::{Admission, AdmissionError, AdmissionPolicy, Frontier, RejectReason};
use crate::queue::TaskQueue;
use crate::storage::{BlobStore, KvStore};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// Blob key of the seed manifest written at crawl start
pub const SEED_MANIFEST_KEY: &str = "input/seed_urls.json";

/// Errors surfaced by [`Coordinator::start_crawl`]
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Every seed was rejected by policy or because it was already seen
    #[error("no seed URLs were admitted ({} rejected)", .rejected.len())]
    NoSeedsAdmitted {
        /// Seed and rejection reason, in input order
        rejected: Vec<(String, String)>,
    },

    /// No seed was admitted and at least one failed on a backend
    #[error("seed dispatch failed: {0}")]
    Backend(AdmissionError),
}

#[derive(Serialize)]
struct SeedManifest<'a> {
    seed_urls: &'a [String],
    max_depth: u32,
    restricted_domains: &'a [String],
    started_at: String,
}

/// Seeds crawls and hands work to the crawler fleet
pub struct Coordinator {
    kv: Arc<dyn KvStore>,
    crawl_queue: Arc<dyn TaskQueue>,
    blobs: Arc<dyn BlobStore>,
}

impl Coordinator {
    pub fn new(
        kv: Arc<dyn KvStore>,
        crawl_queue: Arc<dyn TaskQueue>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            kv,
            crawl_queue,
            blobs,
        }
    }

    pub fn from_backends(backends: &Backends) -> Self {
        Self::new(
            backends.kv.clone(),
            backends.crawl_queue.clone(),
            backends.blobs.clone(),
        )
    }

    /// Admits every seed at depth 0 and returns the enqueued task ids
    ///
    /// # Arguments
    ///
    /// * `seed_urls` - URLs to start from
    /// * `config` - Crawl configuration snapshot for this invocation
    ///
    /// # Returns
    ///
    /// * `Ok(Vec<String>)` - Task ids of admitted seeds; rejected seeds are omitted
    /// * `Err(DispatchError::NoSeedsAdmitted)` - Nothing was admitted
    /// * `Err(DispatchError::Backend)` - Nothing was admitted and a backend failed
    pub async fn start_crawl(
        &self,
        seed_urls: &[String],
        config: &CrawlConfig,
    ) -> Result<Vec<String>, DispatchError> {
        let frontier = Frontier::new(
            self.kv.clone(),
            self.crawl_queue.clone(),
            AdmissionPolicy::from_config(config),
        );

        tracing::info!(
            "Starting crawl with {} seed URLs (max depth {})",
            seed_urls.len(),
            config.max_depth
        );
        self.write_seed_manifest(seed_urls, config);

        let mut task_ids = Vec::new();
        let mut rejected: Vec<(String, RejectReason)> = Vec::new();

        for seed in seed_urls {
            match frontier.admit(seed, 0, None).await {
                Admission::Enqueued { task_id, url } => {
                    tracing::info!("Seeded {}", url);
                    task_ids.push(task_id);
                }
                Admission::Rejected(reason) => {
                    tracing::warn!("Seed {} rejected: {}", seed, reason);
                    rejected.push((seed.clone(), reason));
                }
            }
        }

        if !task_ids.is_empty() {
            return Ok(task_ids);
        }

        let backend_failure = rejected
            .iter()
            .position(|(_, reason)| reason.is_backend_failure());
        if let Some(idx) = backend_failure {
            if let (_, RejectReason::Unavailable(e)) = rejected.swap_remove(idx) {
                return Err(DispatchError::Backend(e));
            }
        }

        Err(DispatchError::NoSeedsAdmitted {
            rejected: rejected
                .into_iter()
                .map(|(seed, reason)| (seed, reason.to_string()))
                .collect(),
        })
    }

    fn write_seed_manifest(&self, seed_urls: &[String], config: &CrawlConfig) {
        let manifest = SeedManifest {
            seed_urls,
            max_depth: config.max_depth,
            restricted_domains: &config.restricted_domains,
            started_at: Utc::now().to_rfc3339(),
        };

        let result = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| e.to_string())
            .and_then(|body| {
                self.blobs
                    .put(SEED_MANIFEST_KEY, &body)
                    .map_err(|e| e.to_string())
            });

        if let Err(e) = result {
            tracing::warn!("Could not record seed manifest: {}", e);
        }
    }
}
