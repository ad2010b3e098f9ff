//! Exponential backoff state for the reconnect supervisor.

use std::time::Duration;

/// Delay between reconnect attempts: starts at `min`, doubles per failed
/// cycle, capped at `max`, reset to `min` on any successful connect.
#[derive(Clone, Debug)]
pub struct Backoff {
    current: Duration,
    min: Duration,
    max: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self {
            current: min,
            min,
            max: max.max(min),
        }
    }

    /// The delay to wait now; advances the state for the next failure.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}
