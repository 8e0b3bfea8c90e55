use std::collections::HashMap;

use crate::{
    domain::{Classification, Label, NodeId, RenderState},
    host::{HostError, HostTree, Marker, MarkerKind, MarkerToken},
};

/// Handle for one in-flight classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingTicket {
    pub token: MarkerToken,
    pub node: NodeId,
    pub identity: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BeginOutcome {
    Started(PendingTicket),
    /// A final label is already shown.
    AlreadyLabeled,
    /// Our own pending marker is on the row and its classification is still running.
    InFlight,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompleteOutcome {
    Applied { identity: String, label: Label },
    /// The pending marker or the row went away before the result arrived.
    Discarded { identity: String, reason: HostError },
    /// Token was not in flight, e.g. completed twice.
    Unknown,
}

#[derive(Debug)]
struct Flight {
    node: NodeId,
    identity: String,
}

/// Per-row marker state machine: unlabeled -> pending -> labeled.
///
/// Lives on the pipeline task; classification tasks report back through it
/// rather than touching the tree themselves.
#[derive(Debug, Default)]
pub struct LabelRenderer {
    next_token: u64,
    in_flight: HashMap<MarkerToken, Flight>,
}

impl LabelRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn render_state(tree: &dyn HostTree, node: NodeId) -> RenderState {
        match tree.marker(node) {
            None => RenderState::Unlabeled,
            Some(Marker {
                kind: MarkerKind::Pending,
                ..
            }) => RenderState::Pending,
            Some(Marker {
                kind: MarkerKind::Labeled { label, .. },
                ..
            }) => RenderState::Labeled(label),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Unlabeled -> pending.
    ///
    /// A pending marker nobody is waiting on any more is cleared and replaced.
    pub fn begin(
        &mut self,
        tree: &dyn HostTree,
        node: NodeId,
        identity: &str,
    ) -> Result<BeginOutcome, HostError> {
        match tree.marker(node) {
            Some(Marker {
                kind: MarkerKind::Labeled { .. },
                ..
            }) => return Ok(BeginOutcome::AlreadyLabeled),
            Some(Marker {
                kind: MarkerKind::Pending,
                token,
            }) => {
                if self.in_flight.contains_key(&token) {
                    return Ok(BeginOutcome::InFlight);
                }
                tree.remove_marker(node, token);
                tracing::debug!(
                    target: "renderer",
                    node = %node,
                    identity,
                    token = token.0,
                    "cleared orphaned pending marker"
                );
            }
            None => {}
        }

        self.next_token += 1;
        let token = MarkerToken(self.next_token);
        tree.insert_marker(node, Marker::pending(token))?;
        self.in_flight.insert(
            token,
            Flight {
                node,
                identity: identity.to_string(),
            },
        );
        Ok(BeginOutcome::Started(PendingTicket {
            token,
            node,
            identity: identity.to_string(),
        }))
    }

    /// Pending -> labeled, swapping markers in place.
    ///
    /// Never re-inserts: if the pending marker is gone the result is dropped
    /// and the row will show as unlabeled on the next scan.
    pub fn complete(
        &mut self,
        tree: &dyn HostTree,
        token: MarkerToken,
        classification: &Classification,
    ) -> CompleteOutcome {
        let Some(flight) = self.in_flight.remove(&token) else {
            return CompleteOutcome::Unknown;
        };
        let marker = Marker::labeled(token, classification.label, classification.suggestion);
        match tree.replace_marker(flight.node, token, marker) {
            Ok(()) => CompleteOutcome::Applied {
                identity: flight.identity,
                label: classification.label,
            },
            Err(reason) => CompleteOutcome::Discarded {
                identity: flight.identity,
                reason,
            },
        }
    }

    /// Pending -> unlabeled after a failed classification. Returns the
    /// identity the token belonged to.
    pub fn abandon(&mut self, tree: &dyn HostTree, token: MarkerToken) -> Option<String> {
        let flight = self.in_flight.remove(&token)?;
        tree.remove_marker(flight.node, token);
        Some(flight.identity)
    }
}
