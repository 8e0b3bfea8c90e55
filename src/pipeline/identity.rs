//! Stable identity for a list row, used to dedupe work across scans.

use crate::{domain::NodeId, host::HostTree};

use super::extract::{self, Strategy};

/// Characters of the subject kept in the composite fallback.
const SUBJECT_PREFIX_CHARS: usize = 40;

const ID_STRATEGIES: &[Strategy] = &[
    Strategy::RowAttribute("data-legacy-message-id"),
    Strategy::RowAttribute("data-message-id"),
    Strategy::RowAttribute("data-thread-id"),
];

/// Resolves the identity of `node`, or `None` when the row exposes nothing
/// usable yet.
///
/// Host identifiers win. The `composite:` fallback built from sender and
/// subject prefix can collide for distinct messages; that is tolerated since
/// the host normally exposes a real identifier on a later scan.
pub fn resolve(tree: &dyn HostTree, node: NodeId) -> Option<String> {
    if let Some(id) = extract::first_match(ID_STRATEGIES, tree, node) {
        return Some(id);
    }

    let sender = extract::first_match(extract::SENDER, tree, node)
        .map(|s| s.to_lowercase())
        .unwrap_or_default();
    let subject: String = extract::first_match(extract::SUBJECT, tree, node)
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .take(SUBJECT_PREFIX_CHARS)
        .collect();

    if sender.is_empty() && subject.is_empty() {
        return None;
    }
    Some(format!("composite:{sender}|{subject}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{memory::RowSpec, InMemoryInbox};

    #[test]
    fn legacy_id_wins_over_message_id() {
        let inbox = InMemoryInbox::new();
        let node = inbox.upsert(&RowSpec {
            key: "a".into(),
            legacy_id: Some("18c2f".into()),
            message_id: Some("#msg-f:1".into()),
            ..Default::default()
        });
        assert_eq!(resolve(&inbox, node).as_deref(), Some("18c2f"));
    }

    #[test]
    fn message_id_used_without_legacy_id() {
        let inbox = InMemoryInbox::new();
        let node = inbox.upsert(&RowSpec {
            key: "a".into(),
            message_id: Some("#msg-f:1".into()),
            subject: Some("Hello".into()),
            ..Default::default()
        });
        assert_eq!(resolve(&inbox, node).as_deref(), Some("#msg-f:1"));
    }

    #[test]
    fn composite_fallback_from_sender_and_subject_prefix() {
        let inbox = InMemoryInbox::new();
        let long_subject = format!("Quarterly   planning {}", "x".repeat(100));
        let a = inbox.upsert(&RowSpec {
            key: "a".into(),
            sender: Some("Ana@Example.org".into()),
            subject: Some(long_subject.clone()),
            ..Default::default()
        });
        let id = resolve(&inbox, a).unwrap();
        assert!(id.starts_with("composite:ana@example.org|Quarterly planning x"));
        assert_eq!(id.len(), "composite:ana@example.org|".len() + SUBJECT_PREFIX_CHARS);

        // same sender and prefix collide by construction
        let b = inbox.upsert(&RowSpec {
            key: "b".into(),
            sender: Some("ana@example.org".into()),
            subject: Some(format!("{long_subject} but different tail")),
            ..Default::default()
        });
        assert_eq!(resolve(&inbox, b), Some(id));
    }

    #[test]
    fn identity_follows_late_server_id() {
        let inbox = InMemoryInbox::new();
        let node = inbox.upsert(&RowSpec {
            key: "a".into(),
            sender: Some("ana@example.org".into()),
            subject: Some("Hi".into()),
            ..Default::default()
        });
        assert!(resolve(&inbox, node).unwrap().starts_with("composite:"));

        inbox.upsert(&RowSpec {
            key: "a".into(),
            message_id: Some("srv-42".into()),
            ..Default::default()
        });
        assert_eq!(resolve(&inbox, node).as_deref(), Some("srv-42"));
    }

    #[test]
    fn unresolvable_row_yields_none() {
        let inbox = InMemoryInbox::new();
        let node = inbox.upsert(&RowSpec {
            key: "a".into(),
            snippet: Some("body only".into()),
            ..Default::default()
        });
        assert_eq!(resolve(&inbox, node), None);
    }
}
