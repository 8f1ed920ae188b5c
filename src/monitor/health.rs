//! Node health
//!
//! Every node serves `GET /health`. The coordinator polls the crawler and
//! indexer nodes and reports each as RUNNING, ERROR (replied, but not 200)
//! or DOWN (no timely reply), so a partial outage shows as partial health.

use crate::config::NodesConfig;
use crate::crawler::wait_or_stop;
use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// Interval of the coordinator's periodic node check
pub const NODE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Coordinator,
    Crawler,
    Indexer,
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeRole::Coordinator => "coordinator",
            NodeRole::Crawler => "crawler",
            NodeRole::Indexer => "indexer",
        };
        f.write_str(name)
    }
}

/// Body of a `/health` reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub role: NodeRole,
}

/// Decides whether a node is ready to serve
pub type ReadinessProbe = Arc<dyn Fn() -> bool + Send + Sync>;

#[derive(Clone)]
pub struct HealthState {
    pub role: NodeRole,
    pub probe: ReadinessProbe,
}

impl HealthState {
    /// A node that is ready whenever it is up
    pub fn always_ready(role: NodeRole) -> Self {
        Self {
            role,
            probe: Arc::new(|| true),
        }
    }
}

async fn health_handler(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let ready = (state.probe)();
    let (code, status) = if ready {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            role: state.role,
        }),
    )
}

pub fn health_router(state: HealthState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Serves `/health` on `bind` until `stop` turns true
pub async fn serve_health(
    bind: SocketAddr,
    state: HealthState,
    stop: watch::Receiver<bool>,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    tracing::info!("{} health endpoint on http://{}/health", state.role, bind);
    serve_on(listener, state, stop).await
}

async fn serve_on(
    listener: TcpListener,
    state: HealthState,
    mut stop: watch::Receiver<bool>,
) -> std::io::Result<()> {
    axum::serve(listener, health_router(state))
        .with_graceful_shutdown(async move {
            while !wait_or_stop(&mut stop, Duration::from_secs(3600)).await {}
        })
        .await
}

/// Health of one node as seen by the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeStatus {
    Running,
    Error,
    Down,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeStatus::Running => "RUNNING",
            NodeStatus::Error => "ERROR",
            NodeStatus::Down => "DOWN",
        };
        f.write_str(name)
    }
}

/// Probes one node's health URL
pub async fn check_node(client: &Client, url: &str, timeout: Duration) -> NodeStatus {
    match client.get(url).timeout(timeout).send().await {
        Ok(response) if response.status() == reqwest::StatusCode::OK => NodeStatus::Running,
        Ok(response) => {
            tracing::debug!("{} answered {}", url, response.status());
            NodeStatus::Error
        }
        Err(e) => {
            tracing::debug!("{} unreachable: {}", url, e);
            NodeStatus::Down
        }
    }
}

/// Health of the worker nodes; `None` when a node has no health URL configured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClusterStatus {
    pub crawler: Option<NodeStatus>,
    pub indexer: Option<NodeStatus>,
}

impl ClusterStatus {
    pub async fn check(client: &Client, nodes: &NodesConfig) -> Self {
        let timeout = Duration::from_secs(nodes.health_timeout_secs);
        let crawler = match &nodes.crawler_health_url {
            Some(url) => Some(check_node(client, url, timeout).await),
            None => None,
        };
        let indexer = match &nodes.indexer_health_url {
            Some(url) => Some(check_node(client, url, timeout).await),
            None => None,
        };
        Self { crawler, indexer }
    }

    /// True when no configured node is ERROR or DOWN
    pub fn all_running(&self) -> bool {
        [self.crawler, self.indexer]
            .iter()
            .flatten()
            .all(|status| *status == NodeStatus::Running)
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |status: Option<NodeStatus>| {
            status.map_or_else(|| "not configured".to_string(), |s| s.to_string())
        };
        write!(f, "Crawler: {}, Indexer: {}", show(self.crawler), show(self.indexer))
    }
}

/// Checks the nodes every `interval` until stopped, logging each result
pub async fn watch_nodes<F>(
    client: Client,
    nodes: NodesConfig,
    interval: Duration,
    mut stop: watch::Receiver<bool>,
    mut on_status: F,
) where
    F: FnMut(&ClusterStatus),
{
    loop {
        let status = ClusterStatus::check(&client, &nodes).await;
        if status.all_running() {
            tracing::info!("{}", status);
        } else {
            tracing::warn!("{}", status);
        }
        on_status(&status);

        if wait_or_stop(&mut stop, interval).await {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client() -> Client {
        Client::new()
    }

    async fn spawn_server(state: HealthState) -> (SocketAddr, watch::Sender<bool>, tokio::task::JoinHandle<std::io::Result<()>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(serve_on(listener, state, rx));
        (addr, tx, handle)
    }

    #[tokio::test]
    async fn test_health_endpoint_reports_role() {
        let (addr, tx, handle) = spawn_server(HealthState::always_ready(NodeRole::Crawler)).await;

        let response = client()
            .get(format!("http://{}/health", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: HealthResponse =
            serde_json::from_str(&response.text().await.unwrap()).unwrap();
        assert_eq!(body.role, NodeRole::Crawler);
        assert_eq!(body.status, "healthy");

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_failed_probe_returns_503() {
        let ready = Arc::new(AtomicBool::new(false));
        let probe_flag = ready.clone();
        let state = HealthState {
            role: NodeRole::Indexer,
            probe: Arc::new(move || probe_flag.load(Ordering::SeqCst)),
        };
        let (addr, tx, handle) = spawn_server(state).await;
        let url = format!("http://{}/health", addr);

        assert_eq!(check_node(&client(), &url, Duration::from_secs(2)).await, NodeStatus::Error);
        ready.store(true, Ordering::SeqCst);
        assert_eq!(check_node(&client(), &url, Duration::from_secs(2)).await, NodeStatus::Running);

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_slow_node_is_down() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let status = check_node(&client(), &server.uri(), Duration::from_millis(100)).await;
        assert_eq!(status, NodeStatus::Down);
    }

    #[tokio::test]
    async fn test_cluster_status_partial_outage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let nodes = NodesConfig {
            crawler_health_url: Some(format!("{}/health", server.uri())),
            indexer_health_url: Some("http://127.0.0.1:9/health".to_string()),
            health_timeout_secs: 1,
            ..NodesConfig::default()
        };

        let status = ClusterStatus::check(&client(), &nodes).await;
        assert_eq!(status.crawler, Some(NodeStatus::Running));
        assert_eq!(status.indexer, Some(NodeStatus::Down));
        assert!(!status.all_running());
        assert_eq!(status.to_string(), "Crawler: RUNNING, Indexer: DOWN");
    }

    #[test]
    fn test_unconfigured_nodes_display() {
        let status = ClusterStatus::default();
        assert!(status.all_running());
        assert_eq!(
            status.to_string(),
            "Crawler: not configured, Indexer: not configured"
        );
    }

    #[tokio::test]
    async fn test_watch_nodes_stops() {
        let (tx, rx) = watch::channel(false);
        let mut seen = 0;
        tx.send(true).unwrap();
        watch_nodes(client(), NodesConfig::default(), Duration::from_secs(60), rx, |_| seen += 1).await;
        assert_eq!(seen, 1);
    }
}
