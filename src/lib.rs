//! Fleetcrawl: distributed crawl orchestration and completion detection
//!
//! This crate seeds and dispatches crawl work across a fleet of crawler and
//! indexer workers, tracks the crawl frontier with conditional writes, decides
//! when a crawl has finished by watching for a stable quiet period, and purges
//! crawl data across every backing store.

pub mod backends;
pub mod config;
pub mod crawler;
pub mod monitor;
pub mod output;
pub mod queue;
pub mod retry;
pub mod search;
pub mod state;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Crate-level error for operations that touch several backends
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("store: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("queue: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("url: {0}")]
    Url(#[from] UrlError),

    #[error("dispatch: {0}")]
    Dispatch(#[from] crawler::DispatchError),

    #[error("monitor: {0}")]
    MonitorRead(#[from] monitor::MonitorReadError),

    /// Raised only when the index and the blob-scan fallback both failed
    #[error("search unavailable: index failed ({index_error}), fallback failed ({fallback_error})")]
    SearchUnavailable {
        index_error: String,
        fallback_error: String,
    },

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is not valid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Validation(String),

    #[error("invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// A string that cannot become a url-record key
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("unparseable URL: {0}")]
    Parse(String),

    #[error("unsupported scheme: {0}")]
    InvalidScheme(String),

    #[error("URL has no host")]
    MissingDomain,

    #[error("malformed URL: {0}")]
    Malformed(String),
}

/// Result alias over [`FleetError`]
pub type Result<T> = std::result::Result<T, FleetError>;

pub use backends::Backends;
pub use config::Config;
pub use state::{MonitorPhase, UrlStatus};
pub use crate::url::{extract_domain, is_domain_allowed, normalize_url};
