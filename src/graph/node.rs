//! Node records
//!
//! A node owns an insertion-ordered label set and a property map. Adjacency
//! lives in the store, not on the node, so a node clone never copies edges.

use super::property::{PropertyMap, PropertyValue};
use super::types::{Label, NodeId};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// A node in the property graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Immutable identifier
    pub id: NodeId,

    /// Labels in the order they were first attached
    pub labels: IndexSet<Label>,

    pub properties: PropertyMap,

    /// Caller-supplied entity key registered through `add_entity`
    pub entity_key: Option<String>,
}

impl Node {
    /// Create a node with a single label
    pub fn new(id: NodeId, label: impl Into<Label>) -> Self {
        let mut labels = IndexSet::new();
        labels.insert(label.into());
        Node {
            id,
            labels,
            properties: PropertyMap::new(),
            entity_key: None,
        }
    }

    /// Create a node with labels and properties. Duplicate labels collapse.
    pub fn new_with_properties(id: NodeId, labels: Vec<Label>, properties: PropertyMap) -> Self {
        Node {
            id,
            labels: labels.into_iter().collect(),
            properties,
            entity_key: None,
        }
    }

    pub fn with_entity_key(mut self, key: impl Into<String>) -> Self {
        self.entity_key = Some(key.into());
        self
    }

    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    pub fn get_labels(&self) -> Vec<&Label> {
        self.labels.iter().collect()
    }

    /// Set a property value, returning the previous one
    pub fn set_property(
        &mut self,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Option<PropertyValue> {
        self.properties.insert(key.into(), value.into())
    }

    pub fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    /// Property lookup where a missing key reads as null
    pub fn property_or_null(&self, key: &str) -> PropertyValue {
        self.properties.get(key).cloned().unwrap_or(PropertyValue::Null)
    }

    pub fn remove_property(&mut self, key: &str) -> Option<PropertyValue> {
        self.properties.remove(key)
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn label_count(&self) -> usize {
        self.labels.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::props;

    #[test]
    fn test_create_node_single_label() {
        let node = Node::new(NodeId::new(1), "Person");
        assert_eq!(node.id, NodeId::new(1));
        assert_eq!(node.label_count(), 1);
        assert!(node.has_label("Person"));
        assert!(node.entity_key.is_none());
    }

    #[test]
    fn test_labels_keep_insertion_order_and_dedupe() {
        let node = Node::new_with_properties(
            NodeId::new(2),
            vec![Label::new("Person"), Label::new("Employee"), Label::new("Person")],
            PropertyMap::new(),
        );
        let names: Vec<&str> = node.labels.iter().map(|l| l.as_str()).collect();
        assert_eq!(names, vec!["Person", "Employee"]);
    }

    #[test]
    fn test_node_properties() {
        let mut node = Node::new(NodeId::new(4), "Person");
        node.set_property("name", "Alice");
        let old = node.set_property("age", 30i64);
        assert!(old.is_none());
        assert_eq!(node.set_property("age", 31i64), Some(PropertyValue::Integer(30)));

        assert_eq!(node.get_property("name").and_then(|v| v.as_string()), Some("Alice"));
        assert_eq!(node.property_or_null("missing"), PropertyValue::Null);

        assert!(node.remove_property("age").is_some());
        assert!(!node.has_property("age"));
        assert_eq!(node.property_count(), 1);
    }

    #[test]
    fn test_entity_key() {
        let node = Node::new_with_properties(
            NodeId::new(5),
            vec![Label::new("Person")],
            props! { "name" => "Bob" },
        )
        .with_entity_key("p2");
        assert_eq!(node.entity_key.as_deref(), Some("p2"));
    }
}
