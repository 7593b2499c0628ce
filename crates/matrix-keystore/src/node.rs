// SPDX-License-Identifier: Apache-2.0

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A value in the hierarchical document store.
///
/// Mappings preserve insertion order (so serialized documents are stable
/// and readable) but compare equal regardless of key order — the document
/// model has no notion of a mapping's iteration order being meaningful to
/// equality, only to display.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Null,
    Scalar(String),
    Sequence(Vec<Node>),
    Mapping(IndexMap<String, Node>),
    /// Distinct from `Null`: the result of looking up a keychain that does
    /// not resolve, never something a document is expected to store.
    #[serde(skip)]
    Undefined,
}

impl Node {
    pub fn mapping() -> Self {
        Node::Mapping(IndexMap::new())
    }

    pub fn scalar(s: impl Into<String>) -> Self {
        Node::Scalar(s.into())
    }

    pub fn as_mapping(&self) -> Option<&IndexMap<String, Node>> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_mapping_mut(&mut self) -> Option<&mut IndexMap<String, Node>> {
        match self {
            Node::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&str> {
        match self {
            Node::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_sequence(&self) -> Option<&[Node]> {
        match self {
            Node::Sequence(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Node::Undefined)
    }

    pub fn is_mapping(&self) -> bool {
        matches!(self, Node::Mapping(_))
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Node::Null, Node::Null) => true,
            (Node::Undefined, Node::Undefined) => true,
            (Node::Scalar(a), Node::Scalar(b)) => a == b,
            (Node::Sequence(a), Node::Sequence(b)) => a == b,
            (Node::Mapping(a), Node::Mapping(b)) => {
                a.len() == b.len() && a.iter().all(|(k, v)| b.get(k).map_or(false, |bv| bv == v))
            }
            _ => false,
        }
    }
}

impl Eq for Node {}

impl Default for Node {
    fn default() -> Self {
        Node::Undefined
    }
}

impl From<&str> for Node {
    fn from(s: &str) -> Self {
        Node::Scalar(s.to_string())
    }
}

impl From<String> for Node {
    fn from(s: String) -> Self {
        Node::Scalar(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mappings_compare_equal_regardless_of_insertion_order() {
        let mut a = IndexMap::new();
        a.insert("x".to_string(), Node::scalar("1"));
        a.insert("y".to_string(), Node::scalar("2"));
        let mut b = IndexMap::new();
        b.insert("y".to_string(), Node::scalar("2"));
        b.insert("x".to_string(), Node::scalar("1"));

        assert_eq!(Node::Mapping(a), Node::Mapping(b));
    }

    #[test]
    fn mappings_of_different_size_are_unequal() {
        let mut a = IndexMap::new();
        a.insert("x".to_string(), Node::scalar("1"));
        let b = IndexMap::new();
        assert_ne!(Node::Mapping(a), Node::Mapping(b));
    }

    #[test]
    fn undefined_is_distinct_from_null() {
        assert_ne!(Node::Undefined, Node::Null);
    }

    #[test]
    fn yaml_round_trip_preserves_structure() {
        let mut m = IndexMap::new();
        m.insert("a".to_string(), Node::scalar("1"));
        m.insert(
            "b".to_string(),
            Node::Sequence(vec![Node::scalar("x"), Node::scalar("y")]),
        );
        let node = Node::Mapping(m);

        let text = serde_yaml::to_string(&node).unwrap();
        let parsed: Node = serde_yaml::from_str(&text).unwrap();
        assert_eq!(node, parsed);
    }
}
