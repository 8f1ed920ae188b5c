//! Fleetcrawl main entry point
//!
//! This is the command-line interface for seeding, monitoring, searching and
//! purging crawls, and for running crawler and indexer nodes.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use fleetcrawl::config::{load_config_with_hash, validate, Config};
use fleetcrawl::crawler::{
    spawn_crawlers, spawn_indexers, Coordinator, CrawlerWorker, DispatchError, IndexerWorker,
    PurgeCoordinator,
};
use fleetcrawl::monitor::{
    serve_health, watch_nodes, ClusterStatus, CompletionMonitor, HealthState, MonitorEvent,
    MonitorOutcome, MonitorSettings, NodeRole,
};
use fleetcrawl::output::{
    load_statistics, print_listing, print_statistics, recent_content, render_dashboard,
    write_completion_marker, CompletionMarker, COMPLETION_MARKER_KEY,
};
use fleetcrawl::search::{search, SearchSource};
use fleetcrawl::storage::count_content;
use fleetcrawl::Backends;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;

/// Fleetcrawl: distributed crawl orchestration
///
/// Seeds crawls into a task queue, tracks the frontier, detects when a crawl
/// has finished, and searches or purges what was collected.
#[derive(Parser, Debug)]
#[command(name = "fleetcrawl")]
#[command(version = "1.0.0")]
#[command(about = "Distributed crawl orchestration", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(short, long, value_name = "CONFIG", default_value = "fleetcrawl.toml", global = true)]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed a crawl and monitor it until it completes
    Start {
        /// Seed URL (repeatable); replaces the configured seeds
        #[arg(long = "seed", value_name = "URL")]
        seeds: Vec<String>,

        /// Override the maximum crawl depth
        #[arg(long)]
        max_depth: Option<u32>,

        /// Override the delay before each request, in milliseconds
        #[arg(long)]
        delay_ms: Option<u64>,

        /// Override the request timeout, in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Return after seeding instead of waiting for completion
        #[arg(long)]
        no_monitor: bool,

        /// Also run crawler and indexer workers in this process
        #[arg(long)]
        with_workers: bool,
    },

    /// Show crawl statistics and node health
    Status,

    /// Search crawled content
    Search {
        /// Query terms
        #[arg(required = true)]
        query: Vec<String>,

        #[arg(long, default_value_t = 1)]
        page: usize,

        #[arg(long, default_value_t = 10)]
        page_size: usize,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// List recently stored content
    List {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Delete all content, url records and the search index
    Purge {
        /// Skip the confirmation prompt
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Config,

    /// Run a crawler node
    CrawlWorker,

    /// Run an indexer node
    IndexWorker,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", config_hash);

    match cli.command {
        Command::Start {
            seeds,
            max_depth,
            delay_ms,
            timeout_secs,
            no_monitor,
            with_workers,
        } => {
            let mut config = config;
            if !seeds.is_empty() {
                config.crawl.seed_urls = seeds;
            }
            if let Some(depth) = max_depth {
                config.crawl.max_depth = depth;
            }
            if let Some(delay) = delay_ms {
                config.crawl.request_delay_ms = delay;
            }
            if let Some(timeout) = timeout_secs {
                config.crawl.request_timeout_secs = timeout;
            }
            validate(&config).context("invalid command-line overrides")?;
            handle_start(Arc::new(config), no_monitor, with_workers).await
        }
        Command::Status => handle_status(&config).await,
        Command::Search {
            query,
            page,
            page_size,
            json,
        } => handle_search(&config, &query.join(" "), page, page_size, json),
        Command::List { limit } => handle_list(&config, limit),
        Command::Purge { force } => handle_purge(&config, force),
        Command::Config => handle_config(&config, &config_hash),
        Command::CrawlWorker => handle_crawl_worker(&config).await,
        Command::IndexWorker => handle_index_worker(&config).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("fleetcrawl=info,warn"),
            1 => EnvFilter::new("fleetcrawl=debug,info"),
            2 => EnvFilter::new("fleetcrawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Seeds the crawl and, unless told otherwise, waits for it to complete
async fn handle_start(config: Arc<Config>, no_monitor: bool, with_workers: bool) -> Result<()> {
    let backends = Backends::open_local(&config)?;
    let coordinator = Coordinator::from_backends(&backends);

    let task_ids = match coordinator
        .start_crawl(&config.crawl.seed_urls, &config.crawl)
        .await
    {
        Ok(ids) => ids,
        Err(DispatchError::NoSeedsAdmitted { rejected }) => {
            for (seed, reason) in &rejected {
                eprintln!("  {}: {}", seed, reason);
            }
            bail!("no seed URLs were admitted; nothing to crawl");
        }
        Err(e) => return Err(e.into()),
    };
    println!("Crawl started with {} seed task(s)", task_ids.len());

    if no_monitor {
        return Ok(());
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    let mut workers: Vec<JoinHandle<()>> = Vec::new();
    if with_workers {
        let crawler = CrawlerWorker::new(
            backends.kv.clone(),
            backends.blobs.clone(),
            backends.crawl_queue.clone(),
            backends.index_queue.clone(),
            &config,
        )?;
        let indexer = IndexerWorker::new(
            backends.blobs.clone(),
            backends.index.clone(),
            backends.index_queue.clone(),
            &config.queues,
        );
        workers.extend(spawn_crawlers(Arc::new(crawler), config.workers.crawlers as usize, &stop_rx));
        workers.extend(spawn_indexers(Arc::new(indexer), config.workers.indexers as usize, &stop_rx));
    }

    let (cluster_tx, cluster_rx) = watch::channel(ClusterStatus::default());
    let node_watcher = tokio::spawn(watch_nodes(
        reqwest::Client::new(),
        config.nodes.clone(),
        fleetcrawl::monitor::NODE_CHECK_INTERVAL,
        stop_rx.clone(),
        move |status| {
            cluster_tx.send_replace(*status);
        },
    ));

    let mut monitor = CompletionMonitor::new(
        backends.crawl_queue.clone(),
        backends.index_queue.clone(),
        backends.blobs.clone(),
        config.storage.content_prefix.clone(),
        MonitorSettings::from_config(&config.monitor),
    );

    let outcome = tokio::select! {
        outcome = monitor.run(stop_rx.clone(), |event| match event {
            MonitorEvent::Progress(snapshot) | MonitorEvent::Completed(snapshot) => {
                let cluster = *cluster_rx.borrow();
                println!("{}", render_dashboard(&cluster, snapshot));
            }
            MonitorEvent::ReadFailed(error) => eprintln!("Status read failed: {}", error),
        }) => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted; stopping monitor");
            MonitorOutcome::Stopped
        }
    };

    let _ = stop_tx.send(true);
    for handle in workers {
        if let Err(e) = handle.await {
            tracing::warn!("Worker task ended abnormally: {}", e);
        }
    }
    if let Err(e) = node_watcher.await {
        tracing::warn!("Node watcher ended abnormally: {}", e);
    }

    match outcome {
        MonitorOutcome::Complete(snapshot) => {
            let marker = CompletionMarker::completed(task_ids);
            write_completion_marker(backends.blobs.as_ref(), &marker)
                .context("failed to write completion marker")?;
            println!(
                "Crawl complete: {} pages stored ({} new)",
                snapshot.content_count, snapshot.new_since_start
            );
        }
        MonitorOutcome::TimedOut(_) => {
            println!("Stopped waiting: maximum monitor runtime reached; the crawl may still be running");
        }
        MonitorOutcome::Stopped => {
            println!("Monitoring stopped; the crawl continues on its workers");
        }
    }

    Ok(())
}

async fn handle_status(config: &Config) -> Result<()> {
    let backends = Backends::open_local(config)?;
    let stats = load_statistics(&backends, &config.storage.content_prefix)?;
    print_statistics(&stats);

    let cluster = ClusterStatus::check(&reqwest::Client::new(), &config.nodes).await;
    println!("\nNodes: {}", cluster);

    if let Ok(bytes) = backends.blobs.get(COMPLETION_MARKER_KEY) {
        if let Ok(marker) = serde_json::from_slice::<CompletionMarker>(&bytes) {
            println!("Last crawl completed at {}", marker.completed_at.to_rfc3339());
        }
    }
    Ok(())
}

fn handle_search(config: &Config, query: &str, page: usize, page_size: usize, json: bool) -> Result<()> {
    let backends = Backends::open_local(config)?;
    let results = search(
        backends.index.as_ref(),
        backends.blobs.as_ref(),
        &config.storage.content_prefix,
        query,
        page,
        page_size,
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.source == SearchSource::BlobScan {
        println!("Note: search index unavailable; showing unranked matches from stored content\n");
    }
    println!("{} result(s) for \"{}\"", results.total, query);
    for (i, hit) in results.results.iter().enumerate() {
        println!("\n{}. {} ({:.2})", (page.max(1) - 1) * page_size.max(1) + i + 1, hit.title, hit.score);
        println!("   {}", hit.url);
        for highlight in &hit.highlights {
            println!("   ... {}", highlight);
        }
    }
    if results.has_more {
        println!("\nMore results: --page {}", page.max(1) + 1);
    }
    Ok(())
}

fn handle_list(config: &Config, limit: usize) -> Result<()> {
    let backends = Backends::open_local(config)?;
    let prefix = &config.storage.content_prefix;
    let total = count_content(backends.blobs.as_ref(), prefix)?;
    let entries = recent_content(backends.blobs.as_ref(), prefix, limit)?;
    print_listing(&entries, total);
    Ok(())
}

fn handle_purge(config: &Config, force: bool) -> Result<()> {
    if !force {
        print!("This deletes all crawled content, url records and the search index. Type 'yes' to continue: ");
        std::io::stdout().flush()?;
        let mut answer = String::new();
        std::io::stdin().read_line(&mut answer)?;
        if answer.trim() != "yes" {
            println!("Purge cancelled");
            return Ok(());
        }
    }

    let backends = Backends::open_local(config)?;
    let report = PurgeCoordinator::from_backends(
        &backends,
        &config.storage.content_prefix,
        config.search.recreate_on_purge,
    )
    .purge();

    println!(
        "Blob store: {}  Url records: {}  Search index: {}",
        ok_or_failed(report.blob_ok),
        ok_or_failed(report.kv_ok),
        ok_or_failed(report.index_ok)
    );
    println!("Content objects deleted: {}", report.blobs_deleted);
    for error in &report.errors {
        eprintln!("  {}: {}", error.step, error.message);
    }

    if !report.is_complete() {
        bail!("purge incomplete; run it again to finish");
    }
    Ok(())
}

fn ok_or_failed(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "FAILED"
    }
}

fn handle_config(config: &Config, config_hash: &str) -> Result<()> {
    println!("# Configuration hash: {}", config_hash);
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

fn health_bind(config: &Config) -> Result<SocketAddr> {
    config
        .nodes
        .health_bind
        .parse()
        .with_context(|| format!("invalid health bind address {}", config.nodes.health_bind))
}

async fn handle_crawl_worker(config: &Config) -> Result<()> {
    let backends = Backends::open_local(config)?;
    let worker = CrawlerWorker::new(
        backends.kv.clone(),
        backends.blobs.clone(),
        backends.crawl_queue.clone(),
        backends.index_queue.clone(),
        config,
    )?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let health = tokio::spawn(serve_health(
        health_bind(config)?,
        HealthState::always_ready(NodeRole::Crawler),
        stop_rx.clone(),
    ));
    let handles = spawn_crawlers(Arc::new(worker), config.workers.crawlers as usize, &stop_rx);
    println!("Crawler node running {} worker(s); Ctrl-C to stop", handles.len());

    tokio::signal::ctrl_c().await?;
    let _ = stop_tx.send(true);
    for handle in handles {
        handle.await?;
    }
    health.await??;
    Ok(())
}

async fn handle_index_worker(config: &Config) -> Result<()> {
    let backends = Backends::open_local(config)?;
    let worker = IndexerWorker::new(
        backends.blobs.clone(),
        backends.index.clone(),
        backends.index_queue.clone(),
        &config.queues,
    );

    let index = backends.index.clone();
    let state = HealthState {
        role: NodeRole::Indexer,
        probe: Arc::new(move || index.is_available()),
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    let health = tokio::spawn(serve_health(health_bind(config)?, state, stop_rx.clone()));
    let handles = spawn_indexers(Arc::new(worker), config.workers.indexers as usize, &stop_rx);
    println!("Indexer node running {} worker(s); Ctrl-C to stop", handles.len());

    tokio::signal::ctrl_c().await?;
    let _ = stop_tx.send(true);
    for handle in handles {
        handle.await?;
    }
    health.await??;
    Ok(())
}
