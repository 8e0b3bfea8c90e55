use std::{collections::HashMap, time::Duration};

use tokio::time::Instant;

use crate::config::env::MAX_RETRY_BACKOFF;

#[derive(Debug, Clone, Copy)]
struct Failure {
    attempts: u32,
    last_failed: Instant,
    /// `None` while a retry is already dispatched.
    retry_at: Option<Instant>,
}

/// Per-identity retry schedule for rows whose classification failed.
///
/// Delays double from `base` on each consecutive failure, capped at
/// [`MAX_RETRY_BACKOFF`]. A successful label clears the entry.
#[derive(Debug)]
pub struct FailureBackoff {
    base: Duration,
    failures: HashMap<String, Failure>,
}

impl FailureBackoff {
    pub fn new(base: Duration) -> Self {
        Self {
            base: base.min(MAX_RETRY_BACKOFF),
            failures: HashMap::new(),
        }
    }

    pub fn delay_for(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(16);
        self.base
            .saturating_mul(2u32.saturating_pow(exponent))
            .min(MAX_RETRY_BACKOFF)
    }

    /// Records a failure and returns when the row may be retried.
    pub fn record_failure(&mut self, identity: &str, now: Instant) -> Instant {
        let entry = self.failures.entry(identity.to_string()).or_insert(Failure {
            attempts: 0,
            last_failed: now,
            retry_at: None,
        });
        entry.attempts = entry.attempts.saturating_add(1);
        entry.last_failed = now;
        let attempts = entry.attempts;
        let retry_at = now + self.delay_for(attempts);
        let entry = self
            .failures
            .get_mut(identity)
            .expect("entry inserted above");
        entry.retry_at = Some(retry_at);
        retry_at
    }

    /// Whether the identity is still inside its retry delay.
    pub fn is_waiting(&self, identity: &str, now: Instant) -> bool {
        self.failures
            .get(identity)
            .and_then(|failure| failure.retry_at)
            .is_some_and(|retry_at| now < retry_at)
    }

    /// The row was dispatched again; its timer no longer needs to fire.
    pub fn mark_retrying(&mut self, identity: &str) {
        if let Some(failure) = self.failures.get_mut(identity) {
            failure.retry_at = None;
        }
    }

    /// Disarms timers that are due. Those rows are eligible now whether or
    /// not they are still on screen.
    pub fn release_due(&mut self, now: Instant) {
        for failure in self.failures.values_mut() {
            if failure.retry_at.is_some_and(|retry_at| retry_at <= now) {
                failure.retry_at = None;
            }
        }
    }

    pub fn clear(&mut self, identity: &str) {
        self.failures.remove(identity);
    }

    /// Earliest pending retry, if any.
    pub fn next_retry(&self) -> Option<Instant> {
        self.failures.values().filter_map(|f| f.retry_at).min()
    }

    /// Forgets failures older than `retention`.
    pub fn evict(&mut self, now: Instant, retention: Duration) {
        self.failures.retain(|_, failure| {
            failure.retry_at.is_some_and(|retry_at| retry_at > now)
                || now.saturating_duration_since(failure.last_failed) <= retention
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: Duration = Duration::from_secs(5);

    #[test]
    fn delay_doubles_and_caps() {
        let backoff = FailureBackoff::new(BASE);
        assert_eq!(backoff.delay_for(1), BASE);
        assert_eq!(backoff.delay_for(2), BASE * 2);
        assert_eq!(backoff.delay_for(3), BASE * 4);
        assert_eq!(backoff.delay_for(40), MAX_RETRY_BACKOFF);
    }

    #[test]
    fn waits_until_retry_time_then_stops_scheduling_once_dispatched() {
        let mut backoff = FailureBackoff::new(BASE);
        let t0 = Instant::now();

        let retry_at = backoff.record_failure("a", t0);
        assert_eq!(retry_at, t0 + BASE);
        assert!(backoff.is_waiting("a", t0 + Duration::from_secs(1)));
        assert!(!backoff.is_waiting("a", t0 + BASE));
        assert!(!backoff.is_waiting("b", t0));
        assert_eq!(backoff.next_retry(), Some(retry_at));

        backoff.mark_retrying("a");
        assert_eq!(backoff.next_retry(), None);

        let second = backoff.record_failure("a", t0 + BASE);
        assert_eq!(second, t0 + BASE + BASE * 2);
    }

    #[test]
    fn due_timers_are_released_even_if_the_row_is_gone() {
        let mut backoff = FailureBackoff::new(BASE);
        let t0 = Instant::now();
        backoff.record_failure("a", t0);
        let later = backoff.record_failure("b", t0 + BASE);

        backoff.release_due(t0 + BASE);
        assert_eq!(backoff.next_retry(), Some(later));
        assert!(!backoff.is_waiting("a", t0 + BASE));
    }

    #[test]
    fn clear_and_evict_drop_entries() {
        let mut backoff = FailureBackoff::new(BASE);
        let t0 = Instant::now();
        backoff.record_failure("a", t0);
        backoff.record_failure("b", t0);

        backoff.clear("a");
        assert!(!backoff.is_waiting("a", t0));

        backoff.mark_retrying("b");
        backoff.evict(t0 + Duration::from_secs(61), Duration::from_secs(60));
        assert_eq!(backoff.next_retry(), None);
        assert!(backoff.failures.is_empty());
    }
}
