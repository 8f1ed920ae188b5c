//! Configuration module for Fleetcrawl
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use fleetcrawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("fleetcrawl.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.crawl.max_depth);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlConfig, MonitorConfig, NodesConfig, QueuesConfig, SearchConfig, StorageConfig,
    UserAgentConfig, WorkersConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};

pub use validation::validate;
pub(crate) use validation::validate_index_name;
