//! Completion monitor
//!
//! Polls both queues and the content count on a fixed interval and feeds
//! the readings into [`CrawlRunState`]. The crawl is declared done once the
//! queues have been empty and the count unchanged for longer than the
//! stability window. Queue depths are approximate; the window absorbs a
//! message that is briefly invisible between receive and redelivery.

use crate::config::MonitorConfig;
use crate::crawler::wait_or_stop;
use crate::monitor::MonitorReadError;
use crate::queue::TaskQueue;
use crate::state::{CrawlRunState, MonitorPhase, PollSample, ProgressSnapshot};
use crate::storage::{count_content, BlobStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Timing of the completion protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    pub poll_interval: Duration,
    pub stability_window: Duration,
    pub max_runtime: Option<Duration>,
}

impl MonitorSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(config.poll_interval_secs),
            stability_window: Duration::from_secs(config.stability_window_secs),
            max_runtime: config.max_runtime_secs.map(Duration::from_secs),
        }
    }
}

/// Reported to the caller while the monitor runs
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorEvent {
    Progress(ProgressSnapshot),
    /// A poll could not read its inputs; no transition happened
    ReadFailed(String),
    /// Entered DONE
    Completed(ProgressSnapshot),
}

/// How a monitor run ended
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorOutcome {
    Complete(ProgressSnapshot),
    Stopped,
    TimedOut(Option<ProgressSnapshot>),
}

pub struct CompletionMonitor {
    crawl_queue: Arc<dyn TaskQueue>,
    index_queue: Arc<dyn TaskQueue>,
    blobs: Arc<dyn BlobStore>,
    content_prefix: String,
    settings: MonitorSettings,
    state: CrawlRunState,
}

impl CompletionMonitor {
    pub fn new(
        crawl_queue: Arc<dyn TaskQueue>,
        index_queue: Arc<dyn TaskQueue>,
        blobs: Arc<dyn BlobStore>,
        content_prefix: impl Into<String>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            crawl_queue,
            index_queue,
            blobs,
            content_prefix: content_prefix.into(),
            state: CrawlRunState::new(settings.stability_window),
            settings,
        }
    }

    pub fn state(&self) -> &CrawlRunState {
        &self.state
    }

    /// Reads queue depths and the content count without changing state
    pub fn read_sample(&self) -> Result<PollSample, MonitorReadError> {
        Ok(PollSample {
            crawl_queue: self.crawl_queue.depth()?,
            index_queue: self.index_queue.depth()?,
            content_count: count_content(self.blobs.as_ref(), &self.content_prefix)?,
        })
    }

    /// Runs one poll at `now`
    ///
    /// A read failure leaves the state untouched.
    pub fn poll_once(&mut self, now: Instant) -> Result<ProgressSnapshot, MonitorReadError> {
        let sample = self.read_sample()?;
        Ok(self.state.observe(sample, now))
    }

    /// Polls until DONE, the stop signal, or the maximum runtime
    ///
    /// The first poll happens immediately. The monitor only reads; stopping
    /// it never touches queue or store state.
    pub async fn run<F>(&mut self, mut stop: watch::Receiver<bool>, mut on_event: F) -> MonitorOutcome
    where
        F: FnMut(&MonitorEvent),
    {
        let started = Instant::now();
        let mut last_snapshot: Option<ProgressSnapshot> = None;

        tracing::info!(
            "Monitoring crawl (poll every {:?}, stability window {:?})",
            self.settings.poll_interval,
            self.settings.stability_window
        );

        loop {
            let now = Instant::now();
            match self.poll_once(now) {
                Ok(snapshot) => {
                    tracing::debug!(
                        "{} content={} (+{}) crawl-queue={} index-queue={} stable={}s",
                        snapshot.phase,
                        snapshot.content_count,
                        snapshot.delta,
                        snapshot.crawl_queue_depth,
                        snapshot.index_queue_depth,
                        snapshot.seconds_stable
                    );
                    if snapshot.phase == MonitorPhase::Done {
                        tracing::info!(
                            "Crawl complete: {} content objects, stable for {}s",
                            snapshot.content_count,
                            snapshot.seconds_stable
                        );
                        on_event(&MonitorEvent::Completed(snapshot.clone()));
                        return MonitorOutcome::Complete(snapshot);
                    }
                    on_event(&MonitorEvent::Progress(snapshot.clone()));
                    last_snapshot = Some(snapshot);
                }
                Err(e) => {
                    tracing::warn!("Monitor poll failed: {}", e);
                    on_event(&MonitorEvent::ReadFailed(e.to_string()));
                }
            }

            let mut wait = self.settings.poll_interval;
            if let Some(max_runtime) = self.settings.max_runtime {
                let elapsed = started.elapsed();
                if elapsed >= max_runtime {
                    tracing::warn!("Monitor reached its maximum runtime of {:?}", max_runtime);
                    return MonitorOutcome::TimedOut(last_snapshot);
                }
                wait = wait.min(max_runtime - elapsed);
            }

            if wait_or_stop(&mut stop, wait).await {
                tracing::info!("Monitor stopped");
                return MonitorOutcome::Stopped;
            }
        }
    }
}
