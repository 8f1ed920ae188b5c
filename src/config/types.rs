use serde::{Deserialize, Serialize};

/// Main configuration structure for Fleetcrawl
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub crawl: CrawlConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub queues: QueuesConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub nodes: NodesConfig,
}

/// Crawl scope and politeness configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlConfig {
    /// URLs admitted at depth 0 when a crawl starts
    #[serde(rename = "seed-urls", default)]
    pub seed_urls: Vec<String>,

    /// Maximum depth to crawl from seed URLs
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: u32,

    /// Host allow-list; empty means every host is allowed
    #[serde(rename = "restricted-domains", default)]
    pub restricted_domains: Vec<String>,

    /// Delay before each fetch (milliseconds)
    #[serde(rename = "request-delay-ms", default = "default_request_delay_ms")]
    pub request_delay_ms: u64,

    /// Per-request timeout (seconds)
    #[serde(rename = "request-timeout-secs", default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Number of fetch attempts before a URL stays FAILED
    #[serde(rename = "max-attempts", default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// User agent identification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Backing store locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite file holding url records and both task queues
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Root directory of the blob store
    #[serde(rename = "blob-root")]
    pub blob_root: String,

    /// Key prefix under which content records are stored
    #[serde(rename = "content-prefix", default = "default_content_prefix")]
    pub content_prefix: String,
}

/// Worker pool sizes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersConfig {
    #[serde(default = "default_crawlers")]
    pub crawlers: u32,

    #[serde(default = "default_indexers")]
    pub indexers: u32,
}

/// Task queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuesConfig {
    #[serde(rename = "crawl-queue", default = "default_crawl_queue")]
    pub crawl_queue: String,

    #[serde(rename = "index-queue", default = "default_index_queue")]
    pub index_queue: String,

    /// How long a received message stays invisible before redelivery
    #[serde(
        rename = "visibility-timeout-secs",
        default = "default_visibility_timeout_secs"
    )]
    pub visibility_timeout_secs: u64,

    /// Maximum messages taken per receive
    #[serde(rename = "receive-batch", default = "default_receive_batch")]
    pub receive_batch: usize,

    /// Sleep between receives that returned nothing (milliseconds)
    #[serde(rename = "idle-poll-ms", default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

/// Search index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// SQLite file holding the full-text index
    #[serde(rename = "database-path", default = "default_search_database_path")]
    pub database_path: String,

    #[serde(rename = "index-name", default = "default_index_name")]
    pub index_name: String,

    /// Recreate an empty index after a purge deletes it
    #[serde(rename = "recreate-on-purge", default = "default_true")]
    pub recreate_on_purge: bool,
}

/// Completion monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(rename = "poll-interval-secs", default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Quiet period required before a crawl is declared done
    #[serde(
        rename = "stability-window-secs",
        default = "default_stability_window_secs"
    )]
    pub stability_window_secs: u64,

    /// Give up waiting after this long; unset waits indefinitely
    #[serde(rename = "max-runtime-secs", default)]
    pub max_runtime_secs: Option<u64>,
}

/// Worker node addresses used for health reporting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodesConfig {
    #[serde(rename = "crawler-health-url", default)]
    pub crawler_health_url: Option<String>,

    #[serde(rename = "indexer-health-url", default)]
    pub indexer_health_url: Option<String>,

    #[serde(rename = "health-timeout-secs", default = "default_health_timeout_secs")]
    pub health_timeout_secs: u64,

    /// Address a worker node serves `/health` on
    #[serde(rename = "health-bind", default = "default_health_bind")]
    pub health_bind: String,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            crawlers: default_crawlers(),
            indexers: default_indexers(),
        }
    }
}

impl Default for QueuesConfig {
    fn default() -> Self {
        Self {
            crawl_queue: default_crawl_queue(),
            index_queue: default_index_queue(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
            receive_batch: default_receive_batch(),
            idle_poll_ms: default_idle_poll_ms(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            database_path: default_search_database_path(),
            index_name: default_index_name(),
            recreate_on_purge: true,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            stability_window_secs: default_stability_window_secs(),
            max_runtime_secs: None,
        }
    }
}

impl Default for NodesConfig {
    fn default() -> Self {
        Self {
            crawler_health_url: None,
            indexer_health_url: None,
            health_timeout_secs: default_health_timeout_secs(),
            health_bind: default_health_bind(),
        }
    }
}

fn default_max_depth() -> u32 {
    3
}

fn default_request_delay_ms() -> u64 {
    1000
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_max_attempts() -> u32 {
    3
}

fn default_content_prefix() -> String {
    "output/".to_string()
}

fn default_crawlers() -> u32 {
    2
}

fn default_indexers() -> u32 {
    1
}

fn default_crawl_queue() -> String {
    "crawl-queue".to_string()
}

fn default_index_queue() -> String {
    "index-queue".to_string()
}

fn default_visibility_timeout_secs() -> u64 {
    300
}

fn default_receive_batch() -> usize {
    10
}

fn default_idle_poll_ms() -> u64 {
    500
}

fn default_search_database_path() -> String {
    "./fleetcrawl-search.db".to_string()
}

fn default_index_name() -> String {
    "webcrawler".to_string()
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_stability_window_secs() -> u64 {
    30
}

fn default_health_timeout_secs() -> u64 {
    5
}

fn default_health_bind() -> String {
    "127.0.0.1:8080".to_string()
}
