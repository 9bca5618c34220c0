//! Exponential backoff between reconnection attempts

use std::time::Duration;

/// Wait duration that doubles after each failed attempt, capped at a maximum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
    failures: u32,
}

impl Backoff {
    /// `max` is raised to `initial` if smaller
    pub fn new(initial: Duration, max: Duration) -> Self {
        let max = max.max(initial);
        Self { initial, max, current: initial, failures: 0 }
    }

    /// Wait before the next attempt
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Consecutive failed attempts since the last reset
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Double the wait, up to the maximum. Returns the new wait.
    pub fn record_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        self.current = self.current.checked_mul(2).map_or(self.max, |next| next.min(self.max));
        self.current
    }

    /// Back to the initial wait after a successful connection
    pub fn reset(&mut self) {
        self.current = self.initial;
        self.failures = 0;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(32))
    }
}
