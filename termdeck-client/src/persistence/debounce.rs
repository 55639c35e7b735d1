use std::time::Duration;

use tokio::time::Instant;

/// Delay between the last registry mutation and the write
pub const PERSIST_DEBOUNCE: Duration = Duration::from_millis(500);

/// Trailing debounce for registry writes
///
/// Every mutation pushes the deadline out; the runtime sleeps until the
/// deadline and then flushes.
#[derive(Debug, Clone)]
pub struct PersistDebounce {
    delay: Duration,
    deadline: Option<Instant>,
}

impl PersistDebounce {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn mark_dirty(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Forget the pending write, after a flush
    pub fn clear(&mut self) {
        self.deadline = None;
    }
}

impl Default for PersistDebounce {
    fn default() -> Self {
        Self::new(PERSIST_DEBOUNCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_debounce_restarts_on_each_mutation() {
        let mut debounce = PersistDebounce::default();
        assert!(!debounce.due(Instant::now()));

        debounce.mark_dirty(Instant::now());
        tokio::time::advance(Duration::from_millis(300)).await;
        debounce.mark_dirty(Instant::now());
        tokio::time::advance(Duration::from_millis(300)).await;
        assert!(!debounce.due(Instant::now()));

        tokio::time::advance(Duration::from_millis(200)).await;
        assert!(debounce.due(Instant::now()));

        debounce.clear();
        assert!(!debounce.is_pending());
        assert!(!debounce.due(Instant::now()));
    }
}
