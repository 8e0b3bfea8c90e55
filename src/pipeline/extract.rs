//! Field extraction from a host row.
//!
//! Each field has an ordered list of strategies. Strategies are tried
//! independently and the first non-empty trimmed value wins.

use crate::{
    domain::{ItemFields, NodeId},
    host::HostTree,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Text content of a descendant.
    Text(&'static str),
    /// Attribute of a descendant.
    Attribute(&'static str, &'static str),
    /// Attribute of the row element itself.
    RowAttribute(&'static str),
}

impl Strategy {
    pub fn read(&self, tree: &dyn HostTree, node: NodeId) -> Option<String> {
        let raw = match *self {
            Strategy::Text(selector) => tree.query_text(node, selector),
            Strategy::Attribute(selector, name) => tree.query_attribute(node, selector, name),
            Strategy::RowAttribute(name) => tree.attribute(node, name),
        }?;
        let value = raw.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }
}

pub const SENDER: &[Strategy] = &[
    Strategy::Attribute(".yX.xY span[email]", "email"),
    Strategy::Attribute("span[email]", "email"),
    Strategy::Text(".yX.xY span[email]"),
    Strategy::Text(".ag6"),
];

pub const SENDER_NAME: &[Strategy] = &[
    Strategy::Text(".yX.xY span[email]"),
    Strategy::Text("span[email]"),
    Strategy::Text(".ag6"),
];

pub const SUBJECT: &[Strategy] = &[Strategy::Text(".bqe"), Strategy::Text(".bog")];

pub const SNIPPET: &[Strategy] = &[Strategy::Text(".y2")];

pub fn first_match(strategies: &[Strategy], tree: &dyn HostTree, node: NodeId) -> Option<String> {
    strategies.iter().find_map(|strategy| strategy.read(tree, node))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    pub fields: ItemFields,
    /// Names of the fields no strategy produced a value for.
    pub missing: Vec<&'static str>,
}

impl Extraction {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// Reads all fields of a row. Missing fields are left empty.
pub fn extract(tree: &dyn HostTree, node: NodeId) -> Extraction {
    let mut missing = Vec::new();
    let mut read = |name: &'static str, strategies: &[Strategy]| {
        first_match(strategies, tree, node).unwrap_or_else(|| {
            missing.push(name);
            String::new()
        })
    };
    let fields = ItemFields {
        sender: read("sender", SENDER),
        sender_name: read("sender_name", SENDER_NAME),
        subject: read("subject", SUBJECT),
        snippet: read("snippet", SNIPPET),
    };
    Extraction { fields, missing }
}
