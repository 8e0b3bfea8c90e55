use std::{collections::HashMap, time::Duration};

use tokio::time::Instant;

/// Last successful classification time per identity.
///
/// Only written after a label is actually shown; never on the pending
/// transition.
#[derive(Debug, Default)]
pub struct ProcessingLedger {
    entries: HashMap<String, Instant>,
}

impl ProcessingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a row needs (re)classification.
    ///
    /// The ledger alone is not enough: the host can redraw a row and drop its
    /// label without the message changing, so the row's visible state decides
    /// as well.
    pub fn should_process(&self, identity: &str, has_visible_final_label: bool) -> bool {
        !self.entries.contains_key(identity) || !has_visible_final_label
    }

    pub fn mark_processed(&mut self, identity: &str, now: Instant) {
        self.entries.insert(identity.to_string(), now);
    }

    #[cfg(test)]
    pub fn last_processed(&self, identity: &str) -> Option<Instant> {
        self.entries.get(identity).copied()
    }

    /// Drops entries older than `retention`. Returns how many were removed.
    pub fn evict(&mut self, now: Instant, retention: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, processed_at| now.saturating_duration_since(*processed_at) <= retention);
        before - self.entries.len()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    #[test]
    fn unknown_identity_needs_processing() {
        let ledger = ProcessingLedger::new();
        assert!(ledger.should_process("a", false));
        assert!(ledger.should_process("a", true));
    }

    #[test]
    fn known_identity_with_label_is_skipped() {
        let mut ledger = ProcessingLedger::new();
        ledger.mark_processed("a", Instant::now());
        assert!(!ledger.should_process("a", true));
    }

    #[test]
    fn known_identity_without_label_is_reprocessed() {
        let mut ledger = ProcessingLedger::new();
        ledger.mark_processed("a", Instant::now());
        assert!(ledger.should_process("a", false));
    }

    #[test]
    fn mark_processed_keeps_one_entry_per_identity() {
        let mut ledger = ProcessingLedger::new();
        let t0 = Instant::now();
        ledger.mark_processed("a", t0);
        ledger.mark_processed("a", t0 + Duration::from_secs(5));
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.last_processed("a"), Some(t0 + Duration::from_secs(5)));
    }

    #[test]
    fn eviction_respects_retention_window() {
        let mut ledger = ProcessingLedger::new();
        let t0 = Instant::now();
        ledger.mark_processed("old", t0);
        ledger.mark_processed("young", t0 + Duration::from_secs(30 * 60));

        let now = t0 + HOUR + Duration::from_secs(1);
        assert_eq!(ledger.evict(now, HOUR), 1);
        assert_eq!(ledger.last_processed("old"), None);
        assert!(ledger.last_processed("young").is_some());
        assert!(!ledger.is_empty());
    }
}
