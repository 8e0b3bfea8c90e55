//! Seam between the labeling pipeline and the application that renders the
//! inbox list.

pub mod feed;
pub mod memory;

use thiserror::Error;
use tokio::sync::broadcast;

use crate::domain::{Label, NodeId, SuggestedAction};

pub use memory::InMemoryInbox;

/// Identifies one injected marker element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarkerToken(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Pending,
    Labeled {
        label: Label,
        suggestion: Option<SuggestedAction>,
    },
}

/// Element the pipeline injects next to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marker {
    pub token: MarkerToken,
    pub kind: MarkerKind,
}

impl Marker {
    pub fn pending(token: MarkerToken) -> Self {
        Self {
            token,
            kind: MarkerKind::Pending,
        }
    }

    pub fn labeled(
        token: MarkerToken,
        label: Label,
        suggestion: Option<SuggestedAction>,
    ) -> Self {
        Self {
            token,
            kind: MarkerKind::Labeled { label, suggestion },
        }
    }

    pub fn text(&self) -> String {
        match self.kind {
            MarkerKind::Pending => "...".to_string(),
            MarkerKind::Labeled { label, .. } => label.display().to_uppercase(),
        }
    }
}

/// Raw change observed in the watched tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeNotice {
    NodeAdded(NodeId),
    NodeRemoved(NodeId),
    AttributeChanged(NodeId),
    /// Something below the row changed, e.g. an injected marker.
    SubtreeChanged(NodeId),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("node {0} is no longer attached to the tree")]
    Detached(NodeId),
    #[error("marker on node {node} no longer matches {expected:?}")]
    MarkerMismatch { node: NodeId, expected: MarkerToken },
}

/// Live, externally mutated list of inbox rows.
///
/// Selectors are opaque strings understood by the host; the pipeline only
/// passes through the ones listed in its extraction table.
pub trait HostTree: Send + Sync {
    /// Rows currently present and visible, in display order.
    fn items(&self) -> Vec<NodeId>;

    fn subscribe(&self) -> broadcast::Receiver<ChangeNotice>;

    /// Attribute set on the row element itself.
    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    /// Text content of the first descendant matching `selector`.
    fn query_text(&self, node: NodeId, selector: &str) -> Option<String>;

    /// Attribute of the first descendant matching `selector`.
    fn query_attribute(&self, node: NodeId, selector: &str, name: &str) -> Option<String>;

    fn marker(&self, node: NodeId) -> Option<Marker>;

    fn insert_marker(&self, node: NodeId, marker: Marker) -> Result<(), HostError>;

    /// Swaps the marker carrying `expected` for `replacement` in one step.
    fn replace_marker(
        &self,
        node: NodeId,
        expected: MarkerToken,
        replacement: Marker,
    ) -> Result<(), HostError>;

    /// Removes the marker carrying `token`. Returns whether anything was removed.
    fn remove_marker(&self, node: NodeId, token: MarkerToken) -> bool;
}
