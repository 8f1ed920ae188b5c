//! Retry with exponential backoff for transient backend failures
//!
//! Store and queue calls are retried at the point of use; only errors that
//! report themselves as transient are retried.

use std::fmt::Display;
use std::time::Duration;

/// Errors that may succeed if the same call is repeated
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Backoff schedule for one kind of call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Total attempts, the first one included
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Backoff {
    /// Schedule used for key-value, blob and index calls
    pub const STORE: Backoff = Backoff {
        attempts: 3,
        base_delay: Duration::from_millis(50),
        max_delay: Duration::from_secs(2),
    };

    /// Schedule used for queue sends
    pub const QUEUE: Backoff = Backoff {
        attempts: 4,
        base_delay: Duration::from_millis(100),
        max_delay: Duration::from_secs(5),
    };

    /// A single attempt, no retry
    pub const NONE: Backoff = Backoff {
        attempts: 1,
        base_delay: Duration::ZERO,
        max_delay: Duration::ZERO,
    };

    /// Delay to wait after the given failed attempt (1-based)
    ///
    /// ```
    /// use fleetcrawl::retry::Backoff;
    /// use std::time::Duration;
    ///
    /// let backoff = Backoff::STORE;
    /// assert_eq!(backoff.delay_after(1), Duration::from_millis(50));
    /// assert_eq!(backoff.delay_after(2), Duration::from_millis(100));
    /// assert_eq!(backoff.delay_after(20), Duration::from_secs(2));
    /// ```
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Runs `op` until it succeeds, fails permanently, or attempts run out
///
/// # Arguments
///
/// * `backoff` - The retry schedule
/// * `what` - Short description of the call, for logs
/// * `op` - The call to make
pub async fn retry_with_backoff<T, E, F>(backoff: Backoff, what: &str, mut op: F) -> Result<T, E>
where
    E: Transient + Display,
    F: FnMut() -> Result<T, E>,
{
    let mut attempt = 1;
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < backoff.attempts => {
                let delay = backoff.delay_after(attempt);
                tracing::debug!(
                    "{} failed (attempt {}/{}): {}; retrying in {:?}",
                    what,
                    attempt,
                    backoff.attempts,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt;

    #[derive(Debug)]
    struct Flaky(bool);

    impl fmt::Display for Flaky {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "flaky({})", self.0)
        }
    }

    impl Transient for Flaky {
        fn is_transient(&self) -> bool {
            self.0
        }
    }

    const FAST: Backoff = Backoff {
        attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(2),
    };

    #[tokio::test]
    async fn test_retries_transient_until_success() {
        let mut calls = 0;
        let result = retry_with_backoff(FAST, "op", || {
            calls += 1;
            if calls < 3 {
                Err(Flaky(true))
            } else {
                Ok(calls)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_attempts() {
        let mut calls = 0;
        let result: Result<(), Flaky> = retry_with_backoff(FAST, "op", || {
            calls += 1;
            Err(Flaky(true))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_permanent_error_not_retried() {
        let mut calls = 0;
        let result: Result<(), Flaky> = retry_with_backoff(FAST, "op", || {
            calls += 1;
            Err(Flaky(false))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_no_backoff_schedule() {
        assert_eq!(Backoff::NONE.attempts, 1);
        assert_eq!(Backoff::NONE.delay_after(1), Duration::ZERO);
    }
}
