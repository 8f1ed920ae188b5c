//! End-to-end tests of the crawl pipeline
//!
//! These tests serve a small site with wiremock, run coordinator, crawler
//! and indexer workers and the completion monitor in-process against local
//! stores, and check what ends up stored and searchable.

use fleetcrawl::config::{parse_config, Config};
use fleetcrawl::crawler::{
    spawn_crawlers, spawn_indexers, Coordinator, CrawlerWorker, DispatchError, IndexerWorker,
    PurgeCoordinator,
};
use fleetcrawl::monitor::{CompletionMonitor, MonitorOutcome, MonitorSettings};
use fleetcrawl::output::load_statistics;
use fleetcrawl::search::{search, SearchSource};
use fleetcrawl::state::ProgressSnapshot;
use fleetcrawl::{Backends, MonitorPhase, UrlStatus};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::watch;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn create_test_config(dir: &TempDir, seed: &str, max_depth: u32) -> Config {
    let root = dir.path().display();
    parse_config(&format!(
        r#"
[crawl]
seed-urls = ["{seed}"]
max-depth = {max_depth}
restricted-domains = ["127.0.0.1"]
request-delay-ms = 0
request-timeout-secs = 5

[workers]
crawlers = 2
indexers = 1

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[storage]
database-path = "{root}/fleetcrawl.db"
blob-root = "{root}/blobs"

[queues]
visibility-timeout-secs = 30
idle-poll-ms = 20

[search]
database-path = "{root}/search.db"
"#
    ))
    .expect("test config should be valid")
}

async fn mount_page(server: &MockServer, route: &str, title: &str, body: &str) {
    let html = format!(
        "<html><head><title>{}</title><meta name=\"description\" content=\"{} page\"></head><body>{}</body></html>",
        title, title, body
    );
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(html, "text/html; charset=utf-8"),
        )
        .mount(server)
        .await;
}

/// Home links to /a and /b (depth 1) and an off-site page; /a links to /c (depth 2)
async fn mock_site() -> MockServer {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        "Home",
        r#"Welcome. <a href="/a">A</a> <a href="/b">B</a> <a href="http://elsewhere.example/x">off-site</a>"#,
    )
    .await;
    mount_page(
        &server,
        "/a",
        "Alpha",
        r#"Rust ownership rules keep memory safe. <a href="/">home</a> <a href="/c">C</a>"#,
    )
    .await;
    mount_page(&server, "/b", "Beta", "The borrow checker enforces the rules.").await;
    mount_page(&server, "/c", "Gamma", "Too deep for a depth one crawl.").await;
    server
}

fn fast_monitor() -> MonitorSettings {
    MonitorSettings {
        poll_interval: Duration::from_millis(50),
        stability_window: Duration::from_millis(400),
        max_runtime: Some(Duration::from_secs(30)),
    }
}

/// Seeds a crawl, runs workers until the monitor reports completion
async fn run_crawl(config: &Config, backends: &Backends) -> ProgressSnapshot {
    let task_ids = Coordinator::from_backends(backends)
        .start_crawl(&config.crawl.seed_urls, &config.crawl)
        .await
        .expect("seeds should be admitted");
    assert_eq!(task_ids.len(), config.crawl.seed_urls.len());

    let (stop_tx, stop_rx) = watch::channel(false);
    let crawler = CrawlerWorker::new(
        backends.kv.clone(),
        backends.blobs.clone(),
        backends.crawl_queue.clone(),
        backends.index_queue.clone(),
        config,
    )
    .unwrap();
    let indexer = IndexerWorker::new(
        backends.blobs.clone(),
        backends.index.clone(),
        backends.index_queue.clone(),
        &config.queues,
    );
    let mut handles = spawn_crawlers(Arc::new(crawler), config.workers.crawlers as usize, &stop_rx);
    handles.extend(spawn_indexers(Arc::new(indexer), config.workers.indexers as usize, &stop_rx));

    let mut monitor = CompletionMonitor::new(
        backends.crawl_queue.clone(),
        backends.index_queue.clone(),
        backends.blobs.clone(),
        config.storage.content_prefix.clone(),
        fast_monitor(),
    );
    let outcome = monitor.run(stop_rx.clone(), |_| {}).await;

    stop_tx.send(true).unwrap();
    for handle in handles {
        handle.await.unwrap();
    }

    match outcome {
        MonitorOutcome::Complete(snapshot) => snapshot,
        other => panic!("crawl did not complete: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_depth_zero_crawls_only_seeds() {
    let server = mock_site().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &format!("{}/", server.uri()), 0);
    let backends = Backends::open_local(&config).unwrap();

    let snapshot = run_crawl(&config, &backends).await;
    assert_eq!(snapshot.phase, MonitorPhase::Done);
    assert_eq!(snapshot.content_count, 1);

    let stats = load_statistics(&backends, &config.storage.content_prefix).unwrap();
    assert_eq!(stats.total_urls, 1);
    assert_eq!(stats.count(UrlStatus::Fetched), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_full_crawl_is_indexed_and_searchable() {
    let server = mock_site().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &format!("{}/", server.uri()), 1);
    let backends = Backends::open_local(&config).unwrap();

    let snapshot = run_crawl(&config, &backends).await;
    assert_eq!(snapshot.content_count, 3, "home, /a and /b");
    assert_eq!(snapshot.crawl_queue_depth, 0);
    assert_eq!(snapshot.index_queue_depth, 0);

    let stats = load_statistics(&backends, &config.storage.content_prefix).unwrap();
    assert_eq!(stats.count(UrlStatus::Fetched), 3);
    assert_eq!(stats.count(UrlStatus::Pending), 0);
    assert!(stats.content_matches_records());

    let results = search(
        backends.index.as_ref(),
        backends.blobs.as_ref(),
        &config.storage.content_prefix,
        "ownership",
        1,
        10,
    )
    .unwrap();
    assert_eq!(results.source, SearchSource::Index);
    assert_eq!(results.total, 1);
    assert_eq!(results.results[0].title, "Alpha");
    assert!(results.results[0].url.ends_with("/a"));

    let deep = search(
        backends.index.as_ref(),
        backends.blobs.as_ref(),
        &config.storage.content_prefix,
        "Gamma",
        1,
        10,
    )
    .unwrap();
    assert_eq!(deep.total, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_rerun_without_purge_admits_nothing() {
    let server = mock_site().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &format!("{}/", server.uri()), 0);
    let backends = Backends::open_local(&config).unwrap();

    run_crawl(&config, &backends).await;

    let again = Coordinator::from_backends(&backends)
        .start_crawl(&config.crawl.seed_urls, &config.crawl)
        .await;
    assert!(matches!(again, Err(DispatchError::NoSeedsAdmitted { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_purge_then_rerun_recrawls() {
    let server = mock_site().await;
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &format!("{}/", server.uri()), 1);
    let backends = Backends::open_local(&config).unwrap();

    let first = run_crawl(&config, &backends).await;
    assert_eq!(first.content_count, 3);

    let report = PurgeCoordinator::from_backends(&backends, &config.storage.content_prefix, true).purge();
    assert!(report.is_complete(), "{:?}", report.errors);
    assert_eq!(report.blobs_deleted, 3);

    let second = run_crawl(&config, &backends).await;
    assert_eq!(second.content_count, 3);

    let results = search(
        backends.index.as_ref(),
        backends.blobs.as_ref(),
        &config.storage.content_prefix,
        "borrow",
        1,
        10,
    )
    .unwrap();
    assert_eq!(results.total, 1);
}
