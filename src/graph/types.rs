//! Identifier and naming types for the directory graph

use serde::{Deserialize, Serialize};
use std::fmt;

/// Property every directory node is keyed on
pub const OBJECT_ID_KEY: &str = "objectid";

/// Display-name property covered by the lookup indexes
pub const NAME_KEY: &str = "name";

/// Store-assigned identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn new(id: u64) -> Self {
        NodeId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Store-assigned identifier for an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct EdgeId(pub u64);

impl EdgeId {
    pub fn new(id: u64) -> Self {
        EdgeId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({})", self.0)
    }
}

/// Node label (e.g. "User", "Group", "Base")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Label(String);

impl Label {
    /// Label carried by every ingested node, whatever its entity type
    pub const BASE: &'static str = "Base";

    pub fn new(label: impl Into<String>) -> Self {
        Label(label.into())
    }

    pub fn base() -> Self {
        Label::new(Self::BASE)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Label {
    fn from(s: String) -> Self {
        Label(s)
    }
}

impl From<&str> for Label {
    fn from(s: &str) -> Self {
        Label(s.to_string())
    }
}

/// Relationship type (e.g. "MemberOf", "GenericAll", "TrustedBy")
///
/// ACE right names from the collector become relationship types verbatim,
/// so the name is backtick-quoted whenever it is rendered into Cypher.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct EdgeType(String);

impl EdgeType {
    pub fn new(edge_type: impl Into<String>) -> Self {
        EdgeType(edge_type.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name escaped for use inside a Cypher relationship pattern
    pub fn quoted(&self) -> String {
        quote_identifier(&self.0)
    }
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for EdgeType {
    fn from(s: String) -> Self {
        EdgeType(s)
    }
}

impl From<&str> for EdgeType {
    fn from(s: &str) -> Self {
        EdgeType(s.to_string())
    }
}

/// Backtick-quote an identifier unless it is a plain alphanumeric name
pub fn quote_identifier(name: &str) -> String {
    let plain = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());
    if plain {
        name.to_string()
    } else {
        format!("`{}`", name.replace('`', "``"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id() {
        let id = NodeId::new(42);
        assert_eq!(id.as_u64(), 42);
        assert_eq!(format!("{}", id), "NodeId(42)");
    }

    #[test]
    fn test_label() {
        let label = Label::new("User");
        assert_eq!(label.as_str(), "User");
        assert_eq!(Label::base().as_str(), "Base");

        let label2: Label = "GPO".into();
        assert_eq!(format!("{}", label2), "GPO");
    }

    #[test]
    fn test_edge_type_quoting() {
        assert_eq!(EdgeType::new("MemberOf").quoted(), "MemberOf");
        assert_eq!(EdgeType::new("Owns-Raw").quoted(), "`Owns-Raw`");
        assert_eq!(EdgeType::new("a`b").quoted(), "`a``b`");
        assert_eq!(quote_identifier("1st"), "`1st`");
    }
}
