use std::time::Duration;

use tokio::time::Instant;

use crate::{
    classifier::ClassifyError,
    domain::{Classification, ItemFields, Label},
    host::{HostTree, MarkerToken},
};

use super::{
    backoff::FailureBackoff,
    extract, identity,
    ledger::ProcessingLedger,
    renderer::{BeginOutcome, CompleteOutcome, LabelRenderer, PendingTicket},
};

/// Row selected for classification by a scan. Its pending marker is already shown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub ticket: PendingTicket,
    pub fields: ItemFields,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub visible: usize,
    pub unresolved: usize,
    pub up_to_date: usize,
    pub in_flight: usize,
    pub backing_off: usize,
    pub failed: usize,
    pub evicted: usize,
    pub targets: Vec<ScanTarget>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Labeled { identity: String, label: Label },
    Discarded { identity: String },
    Failed { identity: String, retry_at: Instant },
    Stale,
}

/// Full re-scan of the visible list plus the bookkeeping that decides which
/// rows need work.
///
/// Owns the ledger, the renderer and the retry schedule so every write to
/// them happens on the task driving the scanner.
#[derive(Debug)]
pub struct ListScanner {
    ledger: ProcessingLedger,
    renderer: LabelRenderer,
    backoff: FailureBackoff,
    retention: Duration,
}

impl ListScanner {
    pub fn new(retention: Duration, retry_backoff: Duration) -> Self {
        Self {
            ledger: ProcessingLedger::new(),
            renderer: LabelRenderer::new(),
            backoff: FailureBackoff::new(retry_backoff),
            retention,
        }
    }

    #[cfg(test)]
    pub fn ledger(&self) -> &ProcessingLedger {
        &self.ledger
    }

    pub fn in_flight(&self) -> usize {
        self.renderer.in_flight()
    }

    /// When the earliest failed row becomes eligible again.
    pub fn next_retry(&self) -> Option<Instant> {
        self.backoff.next_retry()
    }

    pub fn scan(&mut self, tree: &dyn HostTree, now: Instant) -> ScanReport {
        let mut report = ScanReport {
            evicted: self.ledger.evict(now, self.retention),
            ..Default::default()
        };
        self.backoff.evict(now, self.retention);
        self.backoff.release_due(now);

        let items = tree.items();
        report.visible = items.len();

        for node in items {
            let Some(identity) = identity::resolve(tree, node) else {
                report.unresolved += 1;
                continue;
            };

            let state = LabelRenderer::render_state(tree, node);
            if !self
                .ledger
                .should_process(&identity, state.has_final_label())
            {
                report.up_to_date += 1;
                continue;
            }
            if self.backoff.is_waiting(&identity, now) {
                report.backing_off += 1;
                continue;
            }

            match self.renderer.begin(tree, node, &identity) {
                Ok(BeginOutcome::Started(ticket)) => {
                    self.backoff.mark_retrying(&identity);
                    let extraction = extract::extract(tree, node);
                    if !extraction.is_complete() {
                        tracing::debug!(
                            target: "scanner",
                            identity = %identity,
                            missing = ?extraction.missing,
                            "row fields incomplete; using empty defaults"
                        );
                    }
                    report.targets.push(ScanTarget {
                        ticket,
                        fields: extraction.fields,
                    });
                }
                Ok(BeginOutcome::AlreadyLabeled) => report.up_to_date += 1,
                Ok(BeginOutcome::InFlight) => report.in_flight += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::warn!(
                        target: "scanner",
                        identity = %identity,
                        node = %node,
                        error = %err,
                        "could not mark row pending"
                    );
                }
            }
        }

        report
    }

    /// Applies a finished classification and records it in the ledger.
    pub fn settle(
        &mut self,
        tree: &dyn HostTree,
        token: MarkerToken,
        outcome: Result<Classification, ClassifyError>,
        now: Instant,
    ) -> Settlement {
        match outcome {
            Ok(classification) => match self.renderer.complete(tree, token, &classification) {
                CompleteOutcome::Applied { identity, label } => {
                    self.ledger.mark_processed(&identity, now);
                    self.backoff.clear(&identity);
                    tracing::info!(
                        target: "scanner",
                        identity = %identity,
                        label = %label,
                        rule = classification.rule,
                        suggestion = ?classification.suggestion,
                        "row labeled"
                    );
                    Settlement::Labeled { identity, label }
                }
                CompleteOutcome::Discarded { identity, reason } => {
                    tracing::debug!(
                        target: "scanner",
                        identity = %identity,
                        reason = %reason,
                        "discarded result for a row that went away"
                    );
                    Settlement::Discarded { identity }
                }
                CompleteOutcome::Unknown => Settlement::Stale,
            },
            Err(err) => match self.renderer.abandon(tree, token) {
                Some(identity) => {
                    let retry_at = self.backoff.record_failure(&identity, now);
                    tracing::debug!(
                        target: "scanner",
                        identity = %identity,
                        error = %err,
                        retry_in_ms = (retry_at - now).as_millis() as u64,
                        "classification failed; row left unlabeled"
                    );
                    Settlement::Failed { identity, retry_at }
                }
                None => Settlement::Stale,
            },
        }
    }
}
