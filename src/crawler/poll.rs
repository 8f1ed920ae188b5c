//! Receive loop shared by the crawler and indexer workers

use crate::config::QueuesConfig;
use crate::queue::{QueueMessage, TaskQueue};
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;

/// How a worker polls its queue
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub receive_batch: usize,
    pub visibility_timeout: Duration,
    pub idle_poll: Duration,
}

impl PollSettings {
    pub fn from_config(config: &QueuesConfig) -> Self {
        Self {
            receive_batch: config.receive_batch,
            visibility_timeout: Duration::from_secs(config.visibility_timeout_secs),
            idle_poll: Duration::from_millis(config.idle_poll_ms),
        }
    }
}

/// Sleeps for `duration` unless the stop signal fires first
///
/// Returns true when the worker should stop. A dropped sender counts as stop.
pub(crate) async fn wait_or_stop(stop: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    if *stop.borrow() {
        return true;
    }
    tokio::select! {
        changed = stop.changed() => changed.is_err() || *stop.borrow(),
        _ = tokio::time::sleep(duration) => false,
    }
}

/// Receives batches from `queue` and hands each message to `handle` until stopped
///
/// Receive errors are logged and retried after the idle interval. Acking is
/// the handler's job.
pub(crate) async fn poll_loop<F, Fut>(
    queue: &dyn TaskQueue,
    settings: PollSettings,
    mut stop: watch::Receiver<bool>,
    mut handle: F,
) where
    F: FnMut(QueueMessage) -> Fut,
    Fut: Future<Output = ()>,
{
    loop {
        if *stop.borrow() {
            break;
        }

        let messages = match queue.receive(settings.receive_batch, settings.visibility_timeout) {
            Ok(messages) => messages,
            Err(e) => {
                tracing::warn!("Receive from {} failed: {}", queue.name(), e);
                if wait_or_stop(&mut stop, settings.idle_poll).await {
                    break;
                }
                continue;
            }
        };

        if messages.is_empty() {
            if wait_or_stop(&mut stop, settings.idle_poll).await {
                break;
            }
            continue;
        }

        for message in messages {
            handle(message).await;
        }
    }

    tracing::debug!("Worker on {} stopped", queue.name());
}
