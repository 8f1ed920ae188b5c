//! Status dashboard for a running crawl
//!
//! Rendering is a pure function of node health and the latest progress
//! snapshot, so the same view serves the `start` monitor output and tests.

use crate::monitor::{ClusterStatus, NodeStatus};
use crate::state::{MonitorPhase, ProgressSnapshot};
use serde::Serialize;
use std::fmt;

/// One rendered status line per concern
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardView {
    pub phase: MonitorPhase,
    pub nodes: String,
    pub content: String,
    pub queues: String,
    pub stability: String,
    /// Set when some configured node is not RUNNING
    pub warning: Option<String>,
}

pub fn render_dashboard(cluster: &ClusterStatus, progress: &ProgressSnapshot) -> DashboardView {
    let content = format!(
        "{} pages stored ({:+} since last poll, {:+} since start)",
        progress.content_count, progress.delta, progress.new_since_start
    );
    let queues = format!(
        "crawl queue {}, index queue {}",
        progress.crawl_queue_depth, progress.index_queue_depth
    );
    let stability = match progress.phase {
        MonitorPhase::Running => "crawl in progress".to_string(),
        MonitorPhase::Stable => format!("no new pages for {}s", progress.seconds_stable),
        MonitorPhase::Done => format!("complete, stable for {}s", progress.seconds_stable),
    };

    let unhealthy: Vec<String> = [("crawler", cluster.crawler), ("indexer", cluster.indexer)]
        .into_iter()
        .filter_map(|(name, status)| match status {
            Some(NodeStatus::Running) | None => None,
            Some(status) => Some(format!("{} is {}", name, status)),
        })
        .collect();
    let warning = if unhealthy.is_empty() {
        None
    } else {
        Some(format!("degraded: {}", unhealthy.join(", ")))
    };

    DashboardView {
        phase: progress.phase,
        nodes: cluster.to_string(),
        content,
        queues,
        stability,
        warning,
    }
}

impl fmt::Display for DashboardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "[{}] {}", self.phase, self.stability)?;
        writeln!(f, "  Nodes:   {}", self.nodes)?;
        writeln!(f, "  Content: {}", self.content)?;
        write!(f, "  Queues:  {}", self.queues)?;
        if let Some(warning) = &self.warning {
            write!(f, "\n  Warning: {}", warning)?;
        }
        Ok(())
    }
}
