//! Completion state machine for a running crawl
//!
//! The monitor feeds one [`PollSample`] per poll into [`CrawlRunState::observe`]
//! together with the poll time. Time is passed in rather than read so the
//! machine can be driven deterministically.

use crate::queue::QueueDepth;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Phase of the completion protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MonitorPhase {
    /// Work is still flowing, or the count changed recently
    Running,

    /// Queues are empty and the count held for one poll
    Stable,

    /// The count held for longer than the stability window with empty queues
    Done,
}

impl fmt::Display for MonitorPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Running => "RUNNING",
            Self::Stable => "STABLE",
            Self::Done => "DONE",
        };
        f.write_str(name)
    }
}

/// One poll's worth of readings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSample {
    pub content_count: u64,
    pub crawl_queue: QueueDepth,
    pub index_queue: QueueDepth,
}

impl PollSample {
    /// True when neither queue holds visible or in-flight messages
    pub fn queues_empty(&self) -> bool {
        self.crawl_queue.is_empty() && self.index_queue.is_empty()
    }
}

/// Progress report emitted after every successful poll
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressSnapshot {
    pub phase: MonitorPhase,
    pub content_count: u64,
    /// Change in content count since the previous poll
    pub delta: i64,
    /// Content objects added since the monitor started
    pub new_since_start: i64,
    pub crawl_queue_depth: u64,
    pub index_queue_depth: u64,
    /// Seconds since the content count last changed
    pub seconds_stable: u64,
}

/// Monitor-owned record of the crawl's observed progress
#[derive(Debug, Clone)]
pub struct CrawlRunState {
    phase: MonitorPhase,
    stability_window: Duration,
    initial_content_count: Option<u64>,
    last_content_count: Option<u64>,
    last_change_at: Option<Instant>,
    crawl_queue_depth: u64,
    index_queue_depth: u64,
}

impl CrawlRunState {
    /// Creates a state that has not seen any poll yet
    pub fn new(stability_window: Duration) -> Self {
        Self {
            phase: MonitorPhase::Running,
            stability_window,
            initial_content_count: None,
            last_content_count: None,
            last_change_at: None,
            crawl_queue_depth: 0,
            index_queue_depth: 0,
        }
    }

    pub fn phase(&self) -> MonitorPhase {
        self.phase
    }

    pub fn last_content_count(&self) -> Option<u64> {
        self.last_content_count
    }

    pub fn last_change_at(&self) -> Option<Instant> {
        self.last_change_at
    }

    pub fn crawl_queue_depth(&self) -> u64 {
        self.crawl_queue_depth
    }

    pub fn index_queue_depth(&self) -> u64 {
        self.index_queue_depth
    }

    /// Applies one poll and returns the resulting progress snapshot
    ///
    /// # Transitions
    ///
    /// | Condition | Result |
    /// |-----------|--------|
    /// | first poll | RUNNING, change time = now |
    /// | count differs from previous poll | RUNNING, change time = now |
    /// | either queue non-empty | RUNNING |
    /// | RUNNING, queues empty, count unchanged | STABLE |
    /// | STABLE, queues empty, count unchanged, quiet > window | DONE |
    pub fn observe(&mut self, sample: PollSample, now: Instant) -> ProgressSnapshot {
        let previous = self.last_content_count;
        let changed = previous != Some(sample.content_count);

        if self.initial_content_count.is_none() {
            self.initial_content_count = Some(sample.content_count);
        }

        if changed {
            self.last_content_count = Some(sample.content_count);
            self.last_change_at = Some(now);
        }

        self.crawl_queue_depth = sample.crawl_queue.total();
        self.index_queue_depth = sample.index_queue.total();

        let quiet_for = self.quiet_for(now);

        self.phase = if changed || !sample.queues_empty() {
            MonitorPhase::Running
        } else {
            match self.phase {
                MonitorPhase::Running => MonitorPhase::Stable,
                MonitorPhase::Stable | MonitorPhase::Done if quiet_for > self.stability_window => {
                    MonitorPhase::Done
                }
                MonitorPhase::Stable | MonitorPhase::Done => MonitorPhase::Stable,
            }
        };

        let delta = previous
            .map(|p| sample.content_count as i64 - p as i64)
            .unwrap_or(0);
        let new_since_start = self
            .initial_content_count
            .map(|initial| sample.content_count as i64 - initial as i64)
            .unwrap_or(0);

        ProgressSnapshot {
            phase: self.phase,
            content_count: sample.content_count,
            delta,
            new_since_start,
            crawl_queue_depth: self.crawl_queue_depth,
            index_queue_depth: self.index_queue_depth,
            seconds_stable: quiet_for.as_secs(),
        }
    }

    /// Time since the content count last changed
    pub fn quiet_for(&self, now: Instant) -> Duration {
        self.last_change_at
            .map(|at| now.saturating_duration_since(at))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(30);

    fn sample(count: u64) -> PollSample {
        PollSample {
            content_count: count,
            crawl_queue: QueueDepth::default(),
            index_queue: QueueDepth::default(),
        }
    }

    fn busy_sample(count: u64, visible: u64, in_flight: u64) -> PollSample {
        PollSample {
            content_count: count,
            crawl_queue: QueueDepth { visible, in_flight },
            index_queue: QueueDepth::default(),
        }
    }

    #[test]
    fn test_first_poll_is_running() {
        let mut state = CrawlRunState::new(WINDOW);
        let t0 = Instant::now();
        let snapshot = state.observe(sample(10), t0);

        assert_eq!(snapshot.phase, MonitorPhase::Running);
        assert_eq!(state.last_content_count(), Some(10));
        assert_eq!(state.last_change_at(), Some(t0));
        assert_eq!(snapshot.delta, 0);
    }

    #[test]
    fn test_done_only_after_window_then_reset_on_change() {
        let mut state = CrawlRunState::new(WINDOW);
        let t0 = Instant::now();

        assert_eq!(state.observe(sample(10), t0).phase, MonitorPhase::Running);
        assert_eq!(
            state.observe(sample(10), t0 + WINDOW).phase,
            MonitorPhase::Stable
        );
        let done = state.observe(sample(10), t0 + WINDOW * 2);
        assert_eq!(done.phase, MonitorPhase::Done);
        assert_eq!(done.seconds_stable, 60);

        let resumed = state.observe(sample(11), t0 + WINDOW * 3);
        assert_eq!(resumed.phase, MonitorPhase::Running);
        assert_eq!(resumed.delta, 1);
        assert_eq!(state.last_change_at(), Some(t0 + WINDOW * 3));
    }

    #[test]
    fn test_stable_does_not_finish_inside_window() {
        let mut state = CrawlRunState::new(WINDOW);
        let t0 = Instant::now();
        let step = Duration::from_secs(5);

        state.observe(sample(3), t0);
        for i in 1..=6 {
            let snapshot = state.observe(sample(3), t0 + step * i);
            assert_eq!(snapshot.phase, MonitorPhase::Stable, "poll {i}");
        }
        assert_eq!(
            state.observe(sample(3), t0 + step * 7).phase,
            MonitorPhase::Done
        );
    }

    #[test]
    fn test_nonempty_queue_blocks_stability() {
        let mut state = CrawlRunState::new(WINDOW);
        let t0 = Instant::now();

        state.observe(sample(5), t0);
        let snapshot = state.observe(busy_sample(5, 0, 1), t0 + WINDOW * 2);
        assert_eq!(snapshot.phase, MonitorPhase::Running);
        assert_eq!(snapshot.crawl_queue_depth, 1);

        let index_busy = PollSample {
            content_count: 5,
            crawl_queue: QueueDepth::default(),
            index_queue: QueueDepth {
                visible: 2,
                in_flight: 0,
            },
        };
        assert_eq!(
            state.observe(index_busy, t0 + WINDOW * 3).phase,
            MonitorPhase::Running
        );
    }

    #[test]
    fn test_stable_resets_to_running_on_queue_activity() {
        let mut state = CrawlRunState::new(WINDOW);
        let t0 = Instant::now();

        state.observe(sample(5), t0);
        assert_eq!(
            state.observe(sample(5), t0 + Duration::from_secs(1)).phase,
            MonitorPhase::Stable
        );
        assert_eq!(
            state
                .observe(busy_sample(5, 1, 0), t0 + Duration::from_secs(2))
                .phase,
            MonitorPhase::Running
        );
        assert_eq!(
            state.observe(sample(5), t0 + WINDOW * 2).phase,
            MonitorPhase::Stable
        );
    }

    #[test]
    fn test_new_since_start_tracks_initial_count() {
        let mut state = CrawlRunState::new(WINDOW);
        let t0 = Instant::now();

        state.observe(sample(7), t0);
        state.observe(sample(9), t0 + Duration::from_secs(1));
        let snapshot = state.observe(sample(12), t0 + Duration::from_secs(2));

        assert_eq!(snapshot.delta, 3);
        assert_eq!(snapshot.new_since_start, 5);
    }
}
