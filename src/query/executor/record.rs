//! Record structures for query execution
//!
//! Records flow through the Volcano iterator pipeline. Operators below the
//! projection bind pattern variables; the projection rebinds the record to
//! its output column names. `Row` is what callers finally receive.

use crate::graph::{Edge, EdgeId, GraphStore, Node, NodeId, PropertyValue};
use serde_json::json;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A single record flowing through the query pipeline
#[derive(Debug, Clone, Default)]
pub struct Record {
    /// Variable bindings (variable name -> value)
    bindings: HashMap<String, Value>,
}

/// Value types that can be bound to variables
#[derive(Debug, Clone)]
pub enum Value {
    /// A fully materialized node
    Node(NodeId, Node),
    /// A lazy node reference (no property clone)
    NodeRef(NodeId),
    /// A fully materialized relationship
    Edge(EdgeId, Edge),
    /// A lazy relationship reference
    EdgeRef(EdgeId),
    /// A property value, including null
    Property(PropertyValue),
}

// NodeRef(id) == Node(id, _): nodes and edges compare by id only
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self.node_id(), other.node_id()) {
            (Some(a), Some(b)) => return a == b,
            (Some(_), None) | (None, Some(_)) => return false,
            (None, None) => {}
        }
        match (self.edge_id(), other.edge_id()) {
            (Some(a), Some(b)) => return a == b,
            (Some(_), None) | (None, Some(_)) => return false,
            (None, None) => {}
        }
        match (self, other) {
            (Value::Property(p1), Value::Property(p2)) => p1 == p2,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Semantic tags so NodeRef and Node hash the same
        match self {
            Value::Node(id, _) | Value::NodeRef(id) => {
                0u8.hash(state);
                id.hash(state);
            }
            Value::Edge(id, _) | Value::EdgeRef(id) => {
                1u8.hash(state);
                id.hash(state);
            }
            Value::Property(p) => {
                2u8.hash(state);
                p.hash(state);
            }
        }
    }
}

impl From<PropertyValue> for Value {
    fn from(value: PropertyValue) -> Self {
        Value::Property(value)
    }
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a variable to a value
    pub fn bind(&mut self, variable: impl Into<String>, value: Value) {
        self.bindings.insert(variable.into(), value);
    }

    pub fn get(&self, variable: &str) -> Option<&Value> {
        self.bindings.get(variable)
    }

    pub fn has(&self, variable: &str) -> bool {
        self.bindings.contains_key(variable)
    }

    pub fn bindings(&self) -> &HashMap<String, Value> {
        &self.bindings
    }

    /// Merge another record into this one
    pub fn merge(&mut self, other: &Record) {
        for (k, v) in &other.bindings {
            self.bindings.insert(k.clone(), v.clone());
        }
    }
}

impl Value {
    pub fn null() -> Self {
        Value::Property(PropertyValue::Null)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Property(PropertyValue::Null))
    }

    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Value::Node(id, _) | Value::NodeRef(id) => Some(*id),
            _ => None,
        }
    }

    pub fn edge_id(&self) -> Option<EdgeId> {
        match self {
            Value::Edge(id, _) | Value::EdgeRef(id) => Some(*id),
            _ => None,
        }
    }

    /// Get as node if this is a fully materialized node value
    pub fn as_node(&self) -> Option<&Node> {
        match self {
            Value::Node(_, node) => Some(node),
            _ => None,
        }
    }

    /// Get as edge if this is a fully materialized edge value
    pub fn as_edge(&self) -> Option<&Edge> {
        match self {
            Value::Edge(_, edge) => Some(edge),
            _ => None,
        }
    }

    pub fn as_property(&self) -> Option<&PropertyValue> {
        match self {
            Value::Property(p) => Some(p),
            _ => None,
        }
    }

    /// Replace references with full copies of the node or relationship
    pub fn materialize(self, store: &GraphStore) -> Self {
        match self {
            Value::NodeRef(id) => store
                .get_node(id)
                .map(|node| Value::Node(id, node.clone()))
                .unwrap_or_else(Value::null),
            Value::EdgeRef(id) => store
                .get_edge(id)
                .map(|edge| Value::Edge(id, edge.clone()))
                .unwrap_or_else(Value::null),
            other => other,
        }
    }

    fn sort_rank(&self) -> u8 {
        match self {
            Value::Property(PropertyValue::Null) => 9,
            Value::Property(p) => p.type_rank(),
            Value::Node(..) | Value::NodeRef(_) => 6,
            Value::Edge(..) | Value::EdgeRef(_) => 7,
        }
    }

    /// Total order used by ORDER BY, MIN and MAX: numbers, strings,
    /// booleans, lists, maps, nodes, relationships, then null
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        let rank = self.sort_rank().cmp(&other.sort_rank());
        if rank != Ordering::Equal {
            return rank;
        }
        if let (Some(a), Some(b)) = (self.node_id(), other.node_id()) {
            return a.cmp(&b);
        }
        if let (Some(a), Some(b)) = (self.edge_id(), other.edge_id()) {
            return a.cmp(&b);
        }
        match (self, other) {
            (Value::Property(a), Value::Property(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }

    /// JSON rendering used by [`Row::to_json`]
    pub fn to_json(&self, store: Option<&GraphStore>) -> serde_json::Value {
        match self {
            Value::Property(p) => p.clone().into(),
            Value::Node(_, node) => node_json(node),
            Value::Edge(_, edge) => edge_json(edge),
            Value::NodeRef(id) => match store.and_then(|s| s.get_node(*id)) {
                Some(node) => node_json(node),
                None => json!({ "id": id.as_u64() }),
            },
            Value::EdgeRef(id) => match store.and_then(|s| s.get_edge(*id)) {
                Some(edge) => edge_json(edge),
                None => json!({ "id": id.as_u64() }),
            },
        }
    }
}

fn properties_json(properties: &crate::graph::PropertyMap) -> serde_json::Value {
    serde_json::Value::Object(
        properties
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::from(v.clone())))
            .collect(),
    )
}

fn node_json(node: &Node) -> serde_json::Value {
    json!({
        "id": node.id.as_u64(),
        "labels": node.labels.iter().map(|l| l.as_str()).collect::<Vec<_>>(),
        "properties": properties_json(&node.properties),
    })
}

fn edge_json(edge: &Edge) -> serde_json::Value {
    json!({
        "id": edge.id.as_u64(),
        "type": edge.edge_type.as_str(),
        "source": edge.source.as_u64(),
        "target": edge.target.as_u64(),
        "properties": properties_json(&edge.properties),
    })
}

/// One result row: an ordered mapping from column name to value
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    /// Column names in projection order
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Values in projection order
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Property value of a column, if the column holds one
    pub fn get_property(&self, column: &str) -> Option<&PropertyValue> {
        self.get(column).and_then(Value::as_property)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Render as a JSON object, keys in column order
    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (column, value) in self.columns.iter().zip(&self.values) {
            map.insert(column.clone(), value.to_json(None));
        }
        serde_json::Value::Object(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Label;

    #[test]
    fn test_record_bindings() {
        let mut record = Record::new();
        record.bind("n", Value::NodeRef(NodeId::new(1)));
        assert!(record.has("n"));
        assert!(!record.has("m"));
        assert_eq!(record.get("n").and_then(Value::node_id), Some(NodeId::new(1)));
    }

    #[test]
    fn test_node_values_compare_by_id() {
        let node = Node::new(NodeId::new(3), Label::new("Person"));
        assert_eq!(Value::Node(NodeId::new(3), node), Value::NodeRef(NodeId::new(3)));
        assert_ne!(Value::NodeRef(NodeId::new(3)), Value::EdgeRef(EdgeId::new(3)));
        assert_eq!(Value::from(PropertyValue::Integer(1)), Value::from(PropertyValue::Float(1.0)));
    }

    #[test]
    fn test_sort_order() {
        let mut values = vec![
            Value::null(),
            Value::EdgeRef(EdgeId::new(1)),
            Value::NodeRef(NodeId::new(2)),
            Value::from(PropertyValue::Boolean(false)),
            Value::from(PropertyValue::String("a".to_string())),
            Value::from(PropertyValue::Integer(5)),
            Value::from(PropertyValue::Float(1.5)),
        ];
        values.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(values[0], Value::from(PropertyValue::Float(1.5)));
        assert_eq!(values[1], Value::from(PropertyValue::Integer(5)));
        assert_eq!(values[2], Value::from(PropertyValue::String("a".to_string())));
        assert_eq!(values[3], Value::from(PropertyValue::Boolean(false)));
        assert!(values[4].node_id().is_some());
        assert!(values[5].edge_id().is_some());
        assert!(values[6].is_null());
    }

    #[test]
    fn test_row_access_and_json() {
        let columns: Arc<[String]> = vec!["a.name".to_string(), "n".to_string()].into();
        let row = Row::new(
            columns,
            vec![Value::from(PropertyValue::from("Alice")), Value::from(PropertyValue::Integer(2))],
        );
        assert_eq!(row.columns(), &["a.name".to_string(), "n".to_string()]);
        assert_eq!(row.get_property("a.name"), Some(&PropertyValue::from("Alice")));
        assert!(row.get("missing").is_none());
        assert_eq!(row.to_json(), json!({ "a.name": "Alice", "n": 2 }));
    }
}
