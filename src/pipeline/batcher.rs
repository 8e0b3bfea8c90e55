use std::time::Duration;

use tokio::time::{sleep_until, Instant};

use crate::config::env::MAX_DEBOUNCE;

/// Trailing-edge debounce over raw change notices.
///
/// Every notice pushes the deadline out by one window; the batch fires only
/// after a quiet period.
#[derive(Debug)]
pub struct ChangeBatcher {
    window: Duration,
    deadline: Option<Instant>,
    coalesced: usize,
}

impl ChangeBatcher {
    pub fn new(window: Duration) -> Self {
        Self {
            window: window.min(MAX_DEBOUNCE),
            deadline: None,
            coalesced: 0,
        }
    }

    pub fn notify(&mut self, now: Instant) {
        self.coalesced += 1;
        self.deadline = Some(now + self.window);
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[cfg(test)]
    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }

    /// Disarms without firing. Returns the number of notices dropped.
    pub fn reset(&mut self) -> usize {
        self.deadline = None;
        std::mem::take(&mut self.coalesced)
    }

    /// Fires now if anything is pending, returning how many notices the
    /// batch coalesced.
    pub fn flush(&mut self) -> Option<usize> {
        self.deadline?;
        Some(self.reset())
    }
}

/// Resolves at `deadline`, or never when there is none.
pub async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
