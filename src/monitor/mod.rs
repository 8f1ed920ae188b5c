//! Crawl monitoring
//!
//! - Completion detection over queue depths and the stored content count
//! - Node health endpoints and checks

mod completion;
mod health;

pub use completion::{CompletionMonitor, MonitorEvent, MonitorOutcome, MonitorSettings};
pub use health::{
    check_node, health_router, serve_health, watch_nodes, ClusterStatus, HealthResponse,
    HealthState, NodeRole, NodeStatus, ReadinessProbe, NODE_CHECK_INTERVAL,
};

use thiserror::Error;

/// A monitor poll could not read its inputs
///
/// The poll is skipped without changing state and retried on the next tick.
#[derive(Debug, Error)]
pub enum MonitorReadError {
    #[error("queue depth read failed: {0}")]
    Queue(#[from] crate::queue::QueueError),

    #[error("content count read failed: {0}")]
    Storage(#[from] crate::storage::StorageError),
}
