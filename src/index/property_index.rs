//! B-tree property index
//!
//! Maps each observed value of one (label, property) pair to the nodes that
//! hold it. Nulls are never indexed: a null property is an absent property.
//!
//! Both levels are persistent ordered collections, so cloning an index for a
//! new store version shares everything until one side writes.

use crate::graph::{NodeId, PropertyValue};
use im::{OrdMap, OrdSet};
use std::ops::RangeBounds;

/// Index for a specific property on a specific label
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyIndex {
    index: OrdMap<PropertyValue, OrdSet<NodeId>>,
    entries: usize,
}

impl PropertyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, value: PropertyValue, node_id: NodeId) {
        if value.is_null() {
            return;
        }
        let added = match self.index.get_mut(&value) {
            Some(nodes) => nodes.insert(node_id).is_none(),
            None => {
                self.index.insert(value, OrdSet::unit(node_id));
                true
            }
        };
        if added {
            self.entries += 1;
        }
    }

    pub fn remove(&mut self, value: &PropertyValue, node_id: NodeId) {
        if let Some(nodes) = self.index.get_mut(value) {
            if nodes.remove(&node_id).is_some() {
                self.entries -= 1;
            }
            if nodes.is_empty() {
                self.index.remove(value);
            }
        }
    }

    /// Nodes holding exactly `value`, in ascending id order
    pub fn get(&self, value: &PropertyValue) -> Vec<NodeId> {
        self.index
            .get(value)
            .map(|nodes| nodes.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Any node other than `except` holding `value`
    pub fn first_holder_except(&self, value: &PropertyValue, except: Option<NodeId>) -> Option<NodeId> {
        self.index
            .get(value)?
            .iter()
            .copied()
            .find(|id| Some(*id) != except)
    }

    pub fn range<R>(&self, range: R) -> Vec<NodeId>
    where
        R: RangeBounds<PropertyValue>,
    {
        let mut result = Vec::new();
        for (_, nodes) in self.index.range(range) {
            result.extend(nodes.iter().copied());
        }
        result
    }

    /// Number of distinct non-null values currently indexed
    pub fn distinct_values(&self) -> usize {
        self.index.len()
    }

    /// Number of (value, node) pairs
    pub fn len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }

    /// First value shared by two or more nodes, if any
    pub fn first_duplicate(&self) -> Option<(&PropertyValue, Vec<NodeId>)> {
        self.index
            .iter()
            .find(|(_, nodes)| nodes.len() > 1)
            .map(|(value, nodes)| (value, nodes.iter().copied().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ops::Bound;

    #[test]
    fn test_property_index_ops() {
        let mut index = PropertyIndex::new();
        let n1 = NodeId::new(1);
        let n2 = NodeId::new(2);
        let val = PropertyValue::Integer(100);

        index.insert(val.clone(), n2);
        index.insert(val.clone(), n1);
        index.insert(val.clone(), n1);
        assert_eq!(index.get(&val), vec![n1, n2]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.distinct_values(), 1);

        index.remove(&val, n1);
        assert_eq!(index.get(&val), vec![n2]);
        index.remove(&val, n2);
        assert!(index.is_empty());
        assert_eq!(index.distinct_values(), 0);
    }

    #[test]
    fn test_nulls_are_not_indexed() {
        let mut index = PropertyIndex::new();
        index.insert(PropertyValue::Null, NodeId::new(1));
        assert!(index.is_empty());
    }

    #[test]
    fn test_numeric_lookup_crosses_int_and_float() {
        let mut index = PropertyIndex::new();
        index.insert(PropertyValue::Integer(30), NodeId::new(1));
        assert_eq!(index.get(&PropertyValue::Float(30.0)), vec![NodeId::new(1)]);
    }

    #[test]
    fn test_property_index_range() {
        let mut index = PropertyIndex::new();
        for i in 1..=10 {
            index.insert(PropertyValue::Integer(i), NodeId::new(i as u64));
        }
        let range = (
            Bound::Included(PropertyValue::Integer(3)),
            Bound::Included(PropertyValue::Integer(7)),
        );
        let results = index.range(range);
        assert_eq!(results.len(), 5);
        for i in 3..=7 {
            assert!(results.contains(&NodeId::new(i)));
        }
    }

    #[test]
    fn test_first_duplicate_and_holder() {
        let mut index = PropertyIndex::new();
        let v = PropertyValue::from("a@x.io");
        index.insert(v.clone(), NodeId::new(4));
        assert!(index.first_duplicate().is_none());
        assert_eq!(index.first_holder_except(&v, Some(NodeId::new(4))), None);
        assert_eq!(index.first_holder_except(&v, None), Some(NodeId::new(4)));

        index.insert(v.clone(), NodeId::new(9));
        let (dup, holders) = index.first_duplicate().unwrap();
        assert_eq!(dup, &v);
        assert_eq!(holders, vec![NodeId::new(4), NodeId::new(9)]);
    }
}
