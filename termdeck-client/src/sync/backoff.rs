//! Reconnect delays

use std::time::Duration;

/// First reconnect delay
pub const INITIAL_RECONNECT_DELAY: Duration = Duration::from_millis(250);
/// Upper bound on the reconnect delay
pub const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Exponential backoff doubling from 250ms up to 5s
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new() -> Self {
        Self {
            next: INITIAL_RECONNECT_DELAY,
            attempts: 0,
        }
    }

    /// Delay before the next attempt
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = (self.next * 2).min(MAX_RECONNECT_DELAY);
        self.attempts += 1;
        delay
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Start over after a successful connection
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}
