pub mod rules;

use std::sync::Arc;

use futures::future::{self, BoxFuture, FutureExt};
use thiserror::Error;

use crate::{
    ai::{BackendError, GenerativeBackend},
    domain::{Classification, ItemFields},
};

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("classification backend unavailable: {0}")]
    Backend(#[from] BackendError),
    #[error("classification did not finish within {0:?}")]
    TimedOut(std::time::Duration),
}

/// Produces a [`Classification`] for one row.
///
/// Implementations must not block; the pipeline runs each call on its own task.
pub trait Classifier: Send + Sync {
    fn classify<'a>(
        &'a self,
        fields: &'a ItemFields,
    ) -> BoxFuture<'a, Result<Classification, ClassifyError>>;
}

/// Pure keyword rules. Never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleClassifier;

impl RuleClassifier {
    pub fn classify_now(&self, fields: &ItemFields) -> Classification {
        let rule = rules::evaluate(fields);
        Classification {
            label: rule.label,
            suggestion: Some(rule.label.default_action()),
            rule: rule.name,
        }
    }
}

impl Classifier for RuleClassifier {
    fn classify<'a>(
        &'a self,
        fields: &'a ItemFields,
    ) -> BoxFuture<'a, Result<Classification, ClassifyError>> {
        future::ready(Ok(self.classify_now(fields))).boxed()
    }
}

/// Rule label plus an action suggestion from the generative backend.
///
/// A backend failure fails the whole classification so the row is left
/// unlabeled and retried on a later scan.
pub struct AssistedClassifier {
    rules: RuleClassifier,
    backend: Arc<dyn GenerativeBackend>,
}

impl AssistedClassifier {
    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self {
            rules: RuleClassifier,
            backend,
        }
    }
}

impl Classifier for AssistedClassifier {
    fn classify<'a>(
        &'a self,
        fields: &'a ItemFields,
    ) -> BoxFuture<'a, Result<Classification, ClassifyError>> {
        async move {
            let mut classification = self.rules.classify_now(fields);
            let action = self.backend.suggest_action(fields.to_content()).await?;
            tracing::debug!(
                target: "classifier",
                label = %classification.label,
                action = %action,
                "backend suggested action"
            );
            classification.suggestion = Some(action);
            Ok(classification)
        }
        .boxed()
    }
}
