use std::fmt;

use super::label::Label;

/// Opaque handle to a row element in the host tree.
///
/// A host re-render replaces the element, so a handle can go stale while the
/// logical message it displayed is still on screen under a new handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Text extracted from one list row. Every field may be empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFields {
    pub sender: String,
    pub sender_name: String,
    pub subject: String,
    pub snippet: String,
}

impl ItemFields {
    pub fn to_content(&self) -> MessageContent {
        MessageContent {
            sender: self.sender.clone(),
            sender_name: if self.sender_name.is_empty() {
                self.sender.clone()
            } else {
                self.sender_name.clone()
            },
            subject: self.subject.clone(),
            body: self.snippet.clone(),
        }
    }
}

/// Payload handed to the generative backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageContent {
    pub sender: String,
    pub sender_name: String,
    pub subject: String,
    pub body: String,
}

/// What the row currently shows, read back from the host tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderState {
    Unlabeled,
    Pending,
    Labeled(Label),
}

impl RenderState {
    pub fn has_final_label(&self) -> bool {
        matches!(self, RenderState::Labeled(_))
    }
}
