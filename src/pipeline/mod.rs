//! Incremental labeling of a live inbox list.
//!
//! Host change notices are debounced into batch passes; each pass re-scans
//! every visible row and dispatches the ones that need a label. Classification
//! runs on spawned tasks and reports back over a channel, so the ledger and
//! the marker swaps are only touched by the pipeline task. Rows whose
//! classification failed are retried on their own timer with a growing delay.

pub mod backoff;
pub mod batcher;
pub mod extract;
pub mod identity;
pub mod ledger;
pub mod renderer;
pub mod scanner;

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
    time::{timeout, Instant},
};

use crate::{
    classifier::{ClassifyError, Classifier},
    config::PipelineConfig,
    domain::Classification,
    host::{HostTree, MarkerToken},
    infrastructure::shutdown::ShutdownListener,
};

use batcher::ChangeBatcher;
use scanner::{ListScanner, ScanTarget, Settlement};

#[derive(Debug)]
struct Completion {
    token: MarkerToken,
    outcome: Result<Classification, ClassifyError>,
}

/// Counters reported when the pipeline stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub passes: usize,
    pub dispatched: usize,
    pub labeled: usize,
    pub discarded: usize,
    pub failed: usize,
}

pub struct LabelPipeline {
    tree: Arc<dyn HostTree>,
    classifier: Arc<dyn Classifier>,
    scanner: ListScanner,
    batcher: ChangeBatcher,
    classify_timeout: Duration,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,
    stats: PipelineStats,
}

impl LabelPipeline {
    pub fn new(
        tree: Arc<dyn HostTree>,
        classifier: Arc<dyn Classifier>,
        config: &PipelineConfig,
    ) -> Self {
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        Self {
            tree,
            classifier,
            scanner: ListScanner::new(config.retention, config.retry_backoff),
            batcher: ChangeBatcher::new(config.debounce),
            classify_timeout: config.classify_timeout,
            completions_tx,
            completions_rx,
            stats: PipelineStats::default(),
        }
    }

    pub fn spawn(self, shutdown: ShutdownListener) -> JoinHandle<PipelineStats> {
        tokio::spawn(self.run(shutdown))
    }

    pub async fn run(mut self, mut shutdown: ShutdownListener) -> PipelineStats {
        // Subscribe before the first pass so nothing between the two is missed.
        let mut changes = self.tree.subscribe();
        tracing::info!(target: "pipeline", "attached to inbox list");
        self.run_pass("attach", 0);

        loop {
            tokio::select! {
                _ = shutdown.notified() => break,
                notice = changes.recv() => match notice {
                    Ok(_) => self.batcher.notify(Instant::now()),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(target: "pipeline", skipped, "change notices lagged");
                        self.batcher.notify(Instant::now());
                    }
                    Err(RecvError::Closed) => {
                        tracing::info!(target: "pipeline", "host tree closed its change feed");
                        break;
                    }
                },
                _ = batcher::wait_for(self.batcher.deadline()) => {
                    if let Some(coalesced) = self.batcher.flush() {
                        self.run_pass("debounce", coalesced);
                    }
                }
                _ = batcher::wait_for(self.scanner.next_retry()) => self.run_pass("retry", 0),
                Some(completion) = self.completions_rx.recv() => self.on_completion(completion),
            }
        }

        tracing::info!(
            target: "pipeline",
            passes = self.stats.passes,
            labeled = self.stats.labeled,
            in_flight = self.scanner.in_flight(),
            "pipeline stopped"
        );
        self.stats
    }

    fn run_pass(&mut self, trigger: &'static str, coalesced: usize) {
        let report = self.scanner.scan(self.tree.as_ref(), Instant::now());
        self.stats.passes += 1;
        self.stats.dispatched += report.targets.len();
        tracing::debug!(
            target: "pipeline",
            trigger,
            coalesced,
            visible = report.visible,
            dispatched = report.targets.len(),
            up_to_date = report.up_to_date,
            in_flight = report.in_flight,
            backing_off = report.backing_off,
            unresolved = report.unresolved,
            failed = report.failed,
            evicted = report.evicted,
            "batch pass"
        );
        for target in report.targets {
            self.dispatch(target);
        }
    }

    fn dispatch(&self, target: ScanTarget) {
        let classifier = self.classifier.clone();
        let completions = self.completions_tx.clone();
        let limit = self.classify_timeout;
        tokio::spawn(async move {
            let ScanTarget { ticket, fields } = target;
            let outcome = match timeout(limit, classifier.classify(&fields)).await {
                Ok(result) => result,
                Err(_) => {
                    tracing::debug!(
                        target: "pipeline",
                        identity = %ticket.identity,
                        node = %ticket.node,
                        "classification timed out"
                    );
                    Err(ClassifyError::TimedOut(limit))
                }
            };
            // the pipeline may already be gone during shutdown
            let _ = completions.send(Completion {
                token: ticket.token,
                outcome,
            });
        });
    }

    fn on_completion(&mut self, completion: Completion) {
        let settlement = self.scanner.settle(
            self.tree.as_ref(),
            completion.token,
            completion.outcome,
            Instant::now(),
        );
        match settlement {
            Settlement::Labeled { identity, label } => {
                self.stats.labeled += 1;
                tracing::trace!(target: "pipeline", identity = %identity, label = %label, "settled");
            }
            Settlement::Discarded { identity } => {
                self.stats.discarded += 1;
                // the row was redrawn under us; the next batch pass picks it up
                tracing::trace!(target: "pipeline", identity = %identity, "awaiting rescan");
            }
            Settlement::Failed { identity, retry_at } => {
                self.stats.failed += 1;
                tracing::trace!(
                    target: "pipeline",
                    identity = %identity,
                    retry_in_ms = retry_at.saturating_duration_since(Instant::now()).as_millis() as u64,
                    "retry scheduled"
                );
            }
            Settlement::Stale => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::future::{self, BoxFuture, FutureExt};
    use tokio::time::sleep;

    use super::*;
    use crate::{
        ai::{testing::ScriptedBackend, BackendError},
        classifier::{AssistedClassifier, RuleClassifier},
        domain::{ItemFields, Label},
        host::{memory::RowSpec, InMemoryInbox, MarkerKind},
        infrastructure::shutdown::Shutdown,
    };

    fn row(key: &str, subject: &str) -> RowSpec {
        RowSpec {
            key: key.into(),
            message_id: Some(format!("id-{key}")),
            sender: Some("ana@example.org".into()),
            subject: Some(subject.into()),
            ..Default::default()
        }
    }

    fn label_of(inbox: &InMemoryInbox, key: &str) -> Option<Label> {
        match inbox.marker_of(key)?.kind {
            MarkerKind::Labeled { label, .. } => Some(label),
            MarkerKind::Pending => None,
        }
    }

    fn start(
        inbox: &Arc<InMemoryInbox>,
        classifier: Arc<dyn Classifier>,
        config: PipelineConfig,
    ) -> (Shutdown, JoinHandle<PipelineStats>) {
        let (shutdown, listener) = Shutdown::new();
        let pipeline = LabelPipeline::new(inbox.clone(), classifier, &config);
        (shutdown, pipeline.spawn(listener))
    }

    #[tokio::test(start_paused = true)]
    async fn rows_present_at_attach_are_labeled_without_mutations() {
        let inbox = Arc::new(InMemoryInbox::new());
        inbox.upsert(&row("a", "Meeting tomorrow at 3:00pm via Zoom"));

        let (shutdown, handle) = start(&inbox, Arc::new(RuleClassifier), PipelineConfig::default());
        sleep(Duration::from_millis(10)).await;
        assert_eq!(label_of(&inbox, "a"), Some(Label::Meeting));

        shutdown.trigger();
        let stats = handle.await.unwrap();
        assert_eq!(stats.labeled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn inserted_rows_wait_for_the_debounce_window() {
        let inbox = Arc::new(InMemoryInbox::new());
        let (shutdown, handle) = start(&inbox, Arc::new(RuleClassifier), PipelineConfig::default());
        sleep(Duration::from_millis(10)).await;

        for i in 0..20 {
            inbox.upsert(&row(&format!("r{i}"), "Please review and confirm by Friday"));
        }
        sleep(Duration::from_millis(50)).await;
        assert_eq!(inbox.marker_of("r0"), None);

        sleep(Duration::from_millis(100)).await;
        for i in 0..20 {
            assert_eq!(label_of(&inbox, &format!("r{i}")), Some(Label::NeedsAction));
        }

        shutdown.trigger();
        let stats = handle.await.unwrap();
        assert_eq!(stats.dispatched, 20);
        assert_eq!(stats.labeled, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn rerendered_row_is_relabeled() {
        let inbox = Arc::new(InMemoryInbox::new());
        inbox.upsert(&row("a", "Just following up"));
        let (shutdown, handle) = start(&inbox, Arc::new(RuleClassifier), PipelineConfig::default());
        sleep(Duration::from_millis(10)).await;
        assert_eq!(label_of(&inbox, "a"), Some(Label::FollowUp));

        inbox.rerender("a");
        assert_eq!(inbox.marker_of("a"), None);
        sleep(Duration::from_millis(200)).await;
        assert_eq!(label_of(&inbox, "a"), Some(Label::FollowUp));

        shutdown.trigger();
        let stats = handle.await.unwrap();
        assert_eq!(stats.labeled, 2);
    }

    /// Classifier that never answers.
    struct Hanging;

    impl Classifier for Hanging {
        fn classify<'a>(
            &'a self,
            _fields: &'a ItemFields,
        ) -> BoxFuture<'a, Result<Classification, ClassifyError>> {
            future::pending().boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hung_classification_times_out_and_retries() {
        let inbox = Arc::new(InMemoryInbox::new());
        inbox.upsert(&row("a", "hello"));
        let config = PipelineConfig {
            classify_timeout: Duration::from_secs(1),
            retry_backoff: Duration::from_millis(500),
            ..PipelineConfig::default()
        };
        let (shutdown, handle) = start(&inbox, Arc::new(Hanging), config);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(inbox.marker_of("a").map(|m| m.kind), Some(MarkerKind::Pending));

        sleep(Duration::from_millis(550)).await;
        assert_eq!(inbox.marker_of("a"), None);

        // the debounce pass after the marker removal is held back
        sleep(Duration::from_millis(150)).await;
        assert_eq!(inbox.marker_of("a"), None);

        sleep(Duration::from_millis(400)).await;
        assert_eq!(inbox.marker_of("a").map(|m| m.kind), Some(MarkerKind::Pending));

        shutdown.trigger();
        let stats = handle.await.unwrap();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.dispatched, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_backend_is_not_called_every_debounce_window() {
        let inbox = Arc::new(InMemoryInbox::new());
        inbox.upsert(&row("a", "Please review and confirm by Friday"));
        let backend = Arc::new(ScriptedBackend::failing(BackendError::Status(429)));
        let classifier = Arc::new(AssistedClassifier::new(backend.clone()));
        let (shutdown, handle) = start(&inbox, classifier, PipelineConfig::default());

        sleep(Duration::from_secs(2)).await;
        assert_eq!(backend.suggest_calls(), 1);
        assert_eq!(inbox.marker_of("a"), None);

        // retried on its own timer with no host activity: 5s, then 5s + 10s
        sleep(Duration::from_secs(4)).await;
        assert_eq!(backend.suggest_calls(), 2);
        sleep(Duration::from_secs(10)).await;
        assert_eq!(backend.suggest_calls(), 3);

        shutdown.trigger();
        let stats = handle.await.unwrap();
        assert_eq!(stats.failed, 3);
        assert_eq!(stats.labeled, 0);
    }
}
