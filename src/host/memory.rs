use std::collections::HashMap;

use parking_lot::Mutex;
use serde::Deserialize;
use tokio::sync::broadcast;

use crate::{
    actions::{ActionError, MailActions},
    domain::{MessageContent, NodeId},
};

use super::{ChangeNotice, HostError, HostTree, Marker, MarkerToken};

pub const SUBJECT_SELECTOR: &str = ".bqe";
pub const SNIPPET_SELECTOR: &str = ".y2";
pub const SENDER_SELECTOR: &str = ".yX.xY span[email]";
pub const LEGACY_ID_ATTR: &str = "data-legacy-message-id";
pub const MESSAGE_ID_ATTR: &str = "data-message-id";

const CHANGE_CAPACITY: usize = 1024;

/// Content of one descendant element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Slot {
    pub text: String,
    pub attributes: HashMap<String, String>,
}

impl Slot {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            attributes: HashMap::new(),
        }
    }

    #[cfg(test)]
    pub fn with_attribute(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }
}

/// Row description as it arrives from the feed. Absent fields are left
/// untouched on update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RowSpec {
    pub key: String,
    #[serde(default)]
    pub legacy_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub sender: Option<String>,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub snippet: Option<String>,
    /// Full message body shown when the row is opened.
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowSnapshot {
    pub key: String,
    pub node: NodeId,
    pub visible: bool,
    pub marker: Option<Marker>,
}

#[derive(Debug)]
struct Row {
    key: String,
    node: NodeId,
    visible: bool,
    attributes: HashMap<String, String>,
    slots: HashMap<String, Slot>,
    body: Option<String>,
    marker: Option<Marker>,
}

impl Row {
    fn apply(&mut self, spec: &RowSpec) {
        if let Some(id) = &spec.legacy_id {
            self.attributes.insert(LEGACY_ID_ATTR.to_string(), id.clone());
        }
        if let Some(id) = &spec.message_id {
            self.attributes.insert(MESSAGE_ID_ATTR.to_string(), id.clone());
        }
        if let Some(subject) = &spec.subject {
            self.slots
                .insert(SUBJECT_SELECTOR.to_string(), Slot::text(subject.clone()));
        }
        if let Some(snippet) = &spec.snippet {
            self.slots
                .insert(SNIPPET_SELECTOR.to_string(), Slot::text(snippet.clone()));
        }
        if spec.sender.is_some() || spec.sender_name.is_some() {
            let slot = self.slots.entry(SENDER_SELECTOR.to_string()).or_default();
            if let Some(name) = &spec.sender_name {
                slot.text = name.clone();
            }
            if let Some(address) = &spec.sender {
                slot.attributes.insert("email".to_string(), address.clone());
                if slot.text.is_empty() {
                    slot.text = address.clone();
                }
            }
        }
        if let Some(body) = &spec.body {
            self.body = Some(body.clone());
        }
    }

    fn content(&self) -> MessageContent {
        let sender_slot = self.slots.get(SENDER_SELECTOR);
        let text_of = |selector: &str| {
            self.slots
                .get(selector)
                .map(|slot| slot.text.clone())
                .unwrap_or_default()
        };
        MessageContent {
            sender: sender_slot
                .and_then(|slot| slot.attributes.get("email").cloned())
                .unwrap_or_default(),
            sender_name: text_of(SENDER_SELECTOR),
            subject: text_of(SUBJECT_SELECTOR),
            body: self
                .body
                .clone()
                .unwrap_or_else(|| text_of(SNIPPET_SELECTOR)),
        }
    }
}

#[derive(Debug, Default)]
struct InboxState {
    next_node: u64,
    rows: Vec<Row>,
    opened: Option<String>,
    drafts: Vec<(String, String)>,
}

impl InboxState {
    fn allocate_node(&mut self) -> NodeId {
        self.next_node += 1;
        NodeId(self.next_node)
    }

    fn row_by_key(&mut self, key: &str) -> Option<&mut Row> {
        self.rows.iter_mut().find(|row| row.key == key)
    }

    fn row_by_node(&self, node: NodeId) -> Option<&Row> {
        self.rows.iter().find(|row| row.node == node)
    }

    fn row_by_node_mut(&mut self, node: NodeId) -> Option<&mut Row> {
        self.rows.iter_mut().find(|row| row.node == node)
    }
}

/// Inbox list kept in memory, standing in for a rendered mail client.
///
/// Selectors resolve by exact key. A re-render assigns a fresh [`NodeId`] and
/// drops any injected marker, like a host redraw that rebuilds the row element.
pub struct InMemoryInbox {
    state: Mutex<InboxState>,
    changes: broadcast::Sender<ChangeNotice>,
}

impl Default for InMemoryInbox {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryInbox {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_CAPACITY);
        Self {
            state: Mutex::new(InboxState::default()),
            changes,
        }
    }

    fn notify(&self, notices: &[ChangeNotice]) {
        for notice in notices {
            let _ = self.changes.send(*notice);
        }
    }

    /// Inserts a row, or updates it in place when the key already exists.
    pub fn upsert(&self, spec: &RowSpec) -> NodeId {
        let notice;
        let node = {
            let mut state = self.state.lock();
            if let Some(row) = state.row_by_key(&spec.key) {
                row.apply(spec);
                notice = ChangeNotice::AttributeChanged(row.node);
                row.node
            } else {
                let node = state.allocate_node();
                let mut row = Row {
                    key: spec.key.clone(),
                    node,
                    visible: true,
                    attributes: HashMap::new(),
                    slots: HashMap::new(),
                    body: None,
                    marker: None,
                };
                row.apply(spec);
                state.rows.push(row);
                notice = ChangeNotice::NodeAdded(node);
                node
            }
        };
        self.notify(&[notice]);
        node
    }

    pub fn remove(&self, key: &str) -> bool {
        let removed = {
            let mut state = self.state.lock();
            let position = state.rows.iter().position(|row| row.key == key);
            position.map(|idx| state.rows.remove(idx).node)
        };
        match removed {
            Some(node) => {
                self.notify(&[ChangeNotice::NodeRemoved(node)]);
                true
            }
            None => false,
        }
    }

    /// Rebuilds the row element: new node handle, injected marker discarded.
    pub fn rerender(&self, key: &str) -> Option<NodeId> {
        let (old, new) = {
            let mut state = self.state.lock();
            let index = state.rows.iter().position(|row| row.key == key)?;
            let new = state.allocate_node();
            let row = &mut state.rows[index];
            let old = row.node;
            row.node = new;
            row.marker = None;
            (old, new)
        };
        self.notify(&[ChangeNotice::NodeRemoved(old), ChangeNotice::NodeAdded(new)]);
        Some(new)
    }

    /// Drops the injected marker without emitting any change notice.
    #[cfg(test)]
    pub fn drop_marker_silently(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        state
            .row_by_key(key)
            .and_then(|row| row.marker.take())
            .is_some()
    }

    pub fn set_visible(&self, key: &str, visible: bool) -> bool {
        let node = {
            let mut state = self.state.lock();
            match state.row_by_key(key) {
                Some(row) => {
                    row.visible = visible;
                    row.node
                }
                None => return false,
            }
        };
        self.notify(&[ChangeNotice::AttributeChanged(node)]);
        true
    }

    #[cfg(test)]
    pub fn set_slot(&self, key: &str, selector: &str, slot: Slot) -> bool {
        let node = {
            let mut state = self.state.lock();
            match state.row_by_key(key) {
                Some(row) => {
                    row.slots.insert(selector.to_string(), slot);
                    row.node
                }
                None => return false,
            }
        };
        self.notify(&[ChangeNotice::SubtreeChanged(node)]);
        true
    }

    #[cfg(test)]
    pub fn set_attribute(&self, key: &str, name: &str, value: &str) -> bool {
        let node = {
            let mut state = self.state.lock();
            match state.row_by_key(key) {
                Some(row) => {
                    row.attributes.insert(name.to_string(), value.to_string());
                    row.node
                }
                None => return false,
            }
        };
        self.notify(&[ChangeNotice::AttributeChanged(node)]);
        true
    }

    #[cfg(test)]
    pub fn node_of(&self, key: &str) -> Option<NodeId> {
        let mut state = self.state.lock();
        state.row_by_key(key).map(|row| row.node)
    }

    pub fn marker_of(&self, key: &str) -> Option<Marker> {
        let mut state = self.state.lock();
        state.row_by_key(key).and_then(|row| row.marker)
    }

    /// Marks a row as the message shown in the reading pane.
    pub fn open(&self, key: &str) -> Option<MessageContent> {
        let mut state = self.state.lock();
        let content = state.row_by_key(key).map(|row| row.content())?;
        state.opened = Some(key.to_string());
        Some(content)
    }

    pub fn opened_content(&self) -> Option<MessageContent> {
        let mut state = self.state.lock();
        let key = state.opened.clone()?;
        state.row_by_key(&key).map(|row| row.content())
    }

    pub fn drafts(&self) -> Vec<(String, String)> {
        self.state.lock().drafts.clone()
    }

    pub fn snapshot(&self) -> Vec<RowSnapshot> {
        self.state
            .lock()
            .rows
            .iter()
            .map(|row| RowSnapshot {
                key: row.key.clone(),
                node: row.node,
                visible: row.visible,
                marker: row.marker,
            })
            .collect()
    }
}

impl HostTree for InMemoryInbox {
    fn items(&self) -> Vec<NodeId> {
        self.state
            .lock()
            .rows
            .iter()
            .filter(|row| row.visible)
            .map(|row| row.node)
            .collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.changes.subscribe()
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        let state = self.state.lock();
        state.row_by_node(node)?.attributes.get(name).cloned()
    }

    fn query_text(&self, node: NodeId, selector: &str) -> Option<String> {
        let state = self.state.lock();
        state
            .row_by_node(node)?
            .slots
            .get(selector)
            .map(|slot| slot.text.clone())
    }

    fn query_attribute(&self, node: NodeId, selector: &str, name: &str) -> Option<String> {
        let state = self.state.lock();
        state
            .row_by_node(node)?
            .slots
            .get(selector)?
            .attributes
            .get(name)
            .cloned()
    }

    fn marker(&self, node: NodeId) -> Option<Marker> {
        let state = self.state.lock();
        state.row_by_node(node)?.marker
    }

    fn insert_marker(&self, node: NodeId, marker: Marker) -> Result<(), HostError> {
        {
            let mut state = self.state.lock();
            let row = state.row_by_node_mut(node).ok_or(HostError::Detached(node))?;
            row.marker = Some(marker);
        }
        self.notify(&[ChangeNotice::SubtreeChanged(node)]);
        Ok(())
    }

    fn replace_marker(
        &self,
        node: NodeId,
        expected: MarkerToken,
        replacement: Marker,
    ) -> Result<(), HostError> {
        {
            let mut state = self.state.lock();
            let row = state.row_by_node_mut(node).ok_or(HostError::Detached(node))?;
            match row.marker {
                Some(current) if current.token == expected => row.marker = Some(replacement),
                _ => return Err(HostError::MarkerMismatch { node, expected }),
            }
        }
        self.notify(&[ChangeNotice::SubtreeChanged(node)]);
        Ok(())
    }

    fn remove_marker(&self, node: NodeId, token: MarkerToken) -> bool {
        let removed = {
            let mut state = self.state.lock();
            match state.row_by_node_mut(node) {
                Some(row) if row.marker.is_some_and(|m| m.token == token) => {
                    row.marker = None;
                    true
                }
                _ => false,
            }
        };
        if removed {
            self.notify(&[ChangeNotice::SubtreeChanged(node)]);
        }
        removed
    }
}

impl MailActions for InMemoryInbox {
    fn archive(&self) -> Result<(), ActionError> {
        let key = self
            .state
            .lock()
            .opened
            .take()
            .ok_or(ActionError::NoOpenMessage)?;
        self.remove(&key);
        tracing::info!(target: "actions", key = %key, "message archived");
        Ok(())
    }

    fn forward(&self) -> Result<(), ActionError> {
        let key = self
            .state
            .lock()
            .opened
            .clone()
            .ok_or(ActionError::NoOpenMessage)?;
        tracing::info!(target: "actions", key = %key, "forward composer opened");
        Ok(())
    }

    fn compose_reply(&self, text: &str) -> Result<(), ActionError> {
        let mut state = self.state.lock();
        let key = state.opened.clone().ok_or(ActionError::NoOpenMessage)?;
        state.drafts.push((key.clone(), text.to_string()));
        tracing::info!(target: "actions", key = %key, chars = text.len(), "reply draft inserted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(key: &str) -> RowSpec {
        RowSpec {
            key: key.into(),
            message_id: Some(format!("msg-{key}")),
            sender: Some("ana@example.org".into()),
            sender_name: Some("Ana".into()),
            subject: Some("Lunch?".into()),
            snippet: Some("Are you free today".into()),
            ..Default::default()
        }
    }

    #[test]
    fn rerender_detaches_old_node_and_drops_marker() {
        let inbox = InMemoryInbox::new();
        let old = inbox.upsert(&spec("a"));
        inbox.insert_marker(old, Marker::pending(MarkerToken(1))).unwrap();

        let new = inbox.rerender("a").unwrap();
        assert_ne!(old, new);
        assert_eq!(inbox.marker(new), None);
        assert_eq!(
            inbox.insert_marker(old, Marker::pending(MarkerToken(2))),
            Err(HostError::Detached(old))
        );
        assert_eq!(inbox.query_text(new, SUBJECT_SELECTOR).as_deref(), Some("Lunch?"));
    }

    #[test]
    fn rerender_of_unknown_key_does_not_consume_a_node_id() {
        let inbox = InMemoryInbox::new();
        let first = inbox.upsert(&spec("a"));
        assert_eq!(inbox.rerender("missing"), None);

        let second = inbox.upsert(&spec("b"));
        assert_eq!(second, NodeId(first.0 + 1));
    }

    #[test]
    fn replace_marker_requires_matching_token() {
        let inbox = InMemoryInbox::new();
        let node = inbox.upsert(&spec("a"));
        inbox.insert_marker(node, Marker::pending(MarkerToken(1))).unwrap();

        let labeled = Marker::labeled(MarkerToken(1), crate::domain::Label::Meeting, None);
        assert_eq!(
            inbox.replace_marker(node, MarkerToken(9), labeled),
            Err(HostError::MarkerMismatch {
                node,
                expected: MarkerToken(9)
            })
        );
        inbox.replace_marker(node, MarkerToken(1), labeled).unwrap();
        assert_eq!(inbox.marker(node), Some(labeled));
    }

    #[test]
    fn hidden_rows_are_not_enumerated() {
        let inbox = InMemoryInbox::new();
        let a = inbox.upsert(&spec("a"));
        let b = inbox.upsert(&spec("b"));
        assert!(inbox.set_visible("a", false));
        assert_eq!(inbox.items(), vec![b]);
        assert!(inbox.set_visible("a", true));
        assert_eq!(inbox.items(), vec![a, b]);
    }

    #[test]
    fn mutations_emit_change_notices() {
        let inbox = InMemoryInbox::new();
        let mut rx = inbox.subscribe();
        let node = inbox.upsert(&spec("a"));
        assert_eq!(rx.try_recv().unwrap(), ChangeNotice::NodeAdded(node));
        assert!(inbox.remove("a"));
        assert_eq!(rx.try_recv().unwrap(), ChangeNotice::NodeRemoved(node));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn update_merges_present_fields_only() {
        let inbox = InMemoryInbox::new();
        let node = inbox.upsert(&RowSpec {
            key: "a".into(),
            subject: Some("Hello".into()),
            ..Default::default()
        });
        inbox.upsert(&RowSpec {
            key: "a".into(),
            legacy_id: Some("18c2".into()),
            ..Default::default()
        });
        assert_eq!(inbox.attribute(node, LEGACY_ID_ATTR).as_deref(), Some("18c2"));
        assert_eq!(inbox.query_text(node, SUBJECT_SELECTOR).as_deref(), Some("Hello"));
    }

    #[test]
    fn mail_actions_operate_on_opened_row() {
        let inbox = InMemoryInbox::new();
        inbox.upsert(&spec("a"));
        assert_eq!(inbox.compose_reply("hi"), Err(ActionError::NoOpenMessage));

        let content = inbox.open("a").unwrap();
        assert_eq!(content.sender, "ana@example.org");
        assert_eq!(content.body, "Are you free today");

        inbox.compose_reply("Sure, noon works.").unwrap();
        assert_eq!(inbox.drafts(), vec![("a".to_string(), "Sure, noon works.".to_string())]);

        inbox.archive().unwrap();
        assert!(inbox.node_of("a").is_none());
        assert!(inbox.opened_content().is_none());
    }
}
