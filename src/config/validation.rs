use crate::config::types::{
    Config, CrawlConfig, MonitorConfig, NodesConfig, QueuesConfig, SearchConfig, StorageConfig,
    UserAgentConfig, WorkersConfig,
};
use crate::ConfigError;
use std::net::SocketAddr;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawl_config(&config.crawl)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_storage_config(&config.storage)?;
    validate_workers_config(&config.workers)?;
    validate_queues_config(&config.queues)?;
    validate_search_config(&config.search)?;
    validate_monitor_config(&config.monitor)?;
    validate_nodes_config(&config.nodes)?;
    Ok(())
}

/// Validates crawl scope configuration
fn validate_crawl_config(config: &CrawlConfig) -> Result<(), ConfigError> {
    for seed in &config.seed_urls {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid seed URL '{}': {}", seed, e)))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "Seed URL '{}' must use HTTP or HTTPS",
                seed
            )));
        }
    }

    for pattern in &config.restricted_domains {
        validate_domain_pattern(pattern)?;
    }

    if config.request_timeout_secs < 1 || config.request_timeout_secs > 300 {
        return Err(ConfigError::Validation(format!(
            "request_timeout_secs must be between 1 and 300, got {}",
            config.request_timeout_secs
        )));
    }

    if config.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "max_attempts must be >= 1, got {}",
            config.max_attempts
        )));
    }

    Ok(())
}

/// The crawler name is embedded in the User-Agent header, so it stays a single token
fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    let name = &config.crawler_name;
    let is_token = !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '-');
    if !is_token {
        return Err(ConfigError::Validation(format!(
            "crawler_name must be a non-empty run of letters, digits and '-', got '{}'",
            name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("contact_url '{}': {}", config.contact_url, e)))?;

    validate_email(&config.contact_email)
}

/// Validates store locations
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    if config.blob_root.is_empty() {
        return Err(ConfigError::Validation(
            "blob_root cannot be empty".to_string(),
        ));
    }

    let prefix = &config.content_prefix;
    if prefix.is_empty() || !prefix.ends_with('/') || prefix.starts_with('/') || prefix.contains("..")
    {
        return Err(ConfigError::Validation(format!(
            "content_prefix must be a relative key prefix ending in '/', got '{}'",
            prefix
        )));
    }

    Ok(())
}

fn validate_workers_config(config: &WorkersConfig) -> Result<(), ConfigError> {
    for (name, count) in [("crawlers", config.crawlers), ("indexers", config.indexers)] {
        if !(1..=64).contains(&count) {
            return Err(ConfigError::Validation(format!(
                "workers.{} must be between 1 and 64, got {}",
                name, count
            )));
        }
    }
    Ok(())
}

fn validate_queues_config(config: &QueuesConfig) -> Result<(), ConfigError> {
    if config.crawl_queue.is_empty() || config.index_queue.is_empty() {
        return Err(ConfigError::Validation(
            "queue names cannot be empty".to_string(),
        ));
    }

    if config.crawl_queue == config.index_queue {
        return Err(ConfigError::Validation(format!(
            "crawl and index queues must differ, both are '{}'",
            config.crawl_queue
        )));
    }

    if config.visibility_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "visibility_timeout_secs must be >= 1".to_string(),
        ));
    }

    if config.receive_batch < 1 || config.receive_batch > 100 {
        return Err(ConfigError::Validation(format!(
            "receive_batch must be between 1 and 100, got {}",
            config.receive_batch
        )));
    }

    Ok(())
}

fn validate_search_config(config: &SearchConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "search database_path cannot be empty".to_string(),
        ));
    }

    validate_index_name(&config.index_name)
}

/// Index names become SQL identifiers, so only `[a-z0-9_]` is accepted
pub(crate) fn validate_index_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty()
        || !name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(ConfigError::Validation(format!(
            "index_name must match [a-z0-9_]+, got '{}'",
            name
        )));
    }
    Ok(())
}

fn validate_monitor_config(config: &MonitorConfig) -> Result<(), ConfigError> {
    if config.poll_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "poll_interval_secs must be >= 1".to_string(),
        ));
    }

    if config.stability_window_secs < 1 {
        return Err(ConfigError::Validation(
            "stability_window_secs must be >= 1".to_string(),
        ));
    }

    if config.max_runtime_secs == Some(0) {
        return Err(ConfigError::Validation(
            "max_runtime_secs must be > 0 when set".to_string(),
        ));
    }

    Ok(())
}

fn validate_nodes_config(config: &NodesConfig) -> Result<(), ConfigError> {
    for url in [&config.crawler_health_url, &config.indexer_health_url]
        .into_iter()
        .flatten()
    {
        Url::parse(url)
            .map_err(|e| ConfigError::InvalidUrl(format!("Invalid health URL '{}': {}", url, e)))?;
    }

    config.health_bind.parse::<SocketAddr>().map_err(|e| {
        ConfigError::Validation(format!(
            "health_bind '{}' is not a socket address: {}",
            config.health_bind, e
        ))
    })?;

    if config.health_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "health_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Accepts `host.tld` or `*.host.tld`
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);
    let labels: Vec<&str> = domain.split('.').collect();

    if labels.len() < 2 {
        return Err(ConfigError::InvalidPattern(format!(
            "'{}' needs at least two labels, e.g. 'example.com'",
            pattern
        )));
    }

    for label in labels {
        let well_formed = !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_alphanumeric() || c == '-');
        if !well_formed {
            return Err(ConfigError::InvalidPattern(format!(
                "'{}' has a malformed label '{}'",
                pattern, label
            )));
        }
    }

    Ok(())
}

/// Only checks the `local@domain.tld` shape
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let shaped = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.contains('@')
        }
        None => false,
    };
    if !shaped {
        return Err(ConfigError::Validation(format!(
            "contact_email '{}' is not an address",
            email
        )));
    }
    Ok(())
}
