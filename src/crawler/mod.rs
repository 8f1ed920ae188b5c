//! Crawl orchestration
//!
//! This module contains the crawl pipeline itself:
//! - URL admission and dedup (the frontier)
//! - Seeding and dispatch
//! - Crawler and indexer workers with their shared receive loop
//! - HTTP fetching and HTML parsing
//! - Purge of all crawl state

mod coordinator;
mod fetcher;
mod frontier;
mod indexer;
mod parser;
mod poll;
mod purge;
mod worker;

pub use coordinator::{Coordinator, DispatchError, SEED_MANIFEST_KEY};
pub use fetcher::{build_http_client, fetch_url, FetchResult};
pub use frontier::{Admission, AdmissionError, AdmissionPolicy, Frontier, RejectReason};
pub use indexer::{IndexOutcome, IndexerWorker};
pub use parser::{parse_html, ParsedPage};
pub use poll::PollSettings;
pub(crate) use poll::wait_or_stop;
pub use purge::{PurgeCoordinator, PurgeReport, PurgeStep, PurgeStepError};
pub use worker::{CrawlOutcome, CrawlerWorker, WorkerError};

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Spawns `count` crawler tasks sharing one worker and one stop signal
pub fn spawn_crawlers(
    worker: Arc<CrawlerWorker>,
    count: usize,
    stop: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|_| {
            let worker = worker.clone();
            let stop = stop.clone();
            tokio::spawn(async move { worker.run(stop).await })
        })
        .collect()
}

/// Spawns `count` indexer tasks sharing one worker and one stop signal
pub fn spawn_indexers(
    worker: Arc<IndexerWorker>,
    count: usize,
    stop: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|_| {
            let worker = worker.clone();
            let stop = stop.clone();
            tokio::spawn(async move { worker.run(stop).await })
        })
        .collect()
}
