//! Backoff policies for retried background work.

use std::time::Duration;

/// Source of delays between retries.
pub trait Backoff: Send {
    /// Delay before the next attempt.
    fn next_backoff(&mut self) -> Duration;

    /// Start over from the initial delay.
    fn reset(&mut self);
}

/// Doubling backoff, capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            current: initial,
        }
    }
}

impl Default for ExponentialBackoff {
    /// 500ms doubling up to one minute.
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(60))
    }
}

impl Backoff for ExponentialBackoff {
    fn next_backoff(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.initial;
    }
}
