//! Index and constraint catalog
//!
//! Every definition targets one (label, property) key and is either a plain
//! index or a unique constraint. A unique constraint owns its own index, so
//! a key carries at most one definition. Definitions remember the order in
//! which they were declared; the query compiler uses it as a tie-break.

use super::property_index::PropertyIndex;
use crate::graph::{Label, NodeId, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors raised by index and constraint maintenance
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    #[error("{existing} already defined on :{label}({property}), cannot define {requested}")]
    DuplicateDefinition {
        label: Label,
        property: String,
        existing: IndexKind,
        requested: IndexKind,
    },

    #[error("unique constraint on :{label}({property}) violated: value {value} already held by {holder}")]
    ConstraintViolation {
        label: Label,
        property: String,
        value: PropertyValue,
        holder: NodeId,
    },
}

pub type IndexResult<T> = Result<T, IndexError>;

/// Key for identifying a property index
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PropertyIndexKey {
    pub label: Label,
    pub property: String,
}

impl PropertyIndexKey {
    pub fn new(label: impl Into<Label>, property: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            property: property.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    Index,
    UniqueConstraint,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Index => f.write_str("index"),
            IndexKind::UniqueConstraint => f.write_str("unique constraint"),
        }
    }
}

/// A declared index or constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub key: PropertyIndexKey,
    pub kind: IndexKind,
    /// Declaration order, lower is older
    pub declared: u64,
}

/// Outcome of a define call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DefineOutcome {
    Created,
    AlreadyDefined,
}

#[derive(Debug, Clone, PartialEq)]
struct IndexEntry {
    definition: IndexDefinition,
    index: PropertyIndex,
}

/// Owner of all property indices and unique constraints
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexManager {
    indices: HashMap<PropertyIndexKey, IndexEntry>,
    next_declaration: u64,
}

impl IndexManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check whether defining `kind` on `key` is new, a repeat, or a conflict
    pub fn check_define(&self, key: &PropertyIndexKey, kind: IndexKind) -> IndexResult<DefineOutcome> {
        match self.indices.get(key) {
            None => Ok(DefineOutcome::Created),
            Some(entry) if entry.definition.kind == kind => Ok(DefineOutcome::AlreadyDefined),
            Some(entry) => Err(IndexError::DuplicateDefinition {
                label: key.label.clone(),
                property: key.property.clone(),
                existing: entry.definition.kind,
                requested: kind,
            }),
        }
    }

    /// Register a definition with a pre-built index.
    ///
    /// The caller backfills `index` from the store and runs `check_define`
    /// first; a repeat definition is kept as is.
    pub fn define(&mut self, key: PropertyIndexKey, kind: IndexKind, index: PropertyIndex) -> IndexResult<DefineOutcome> {
        let outcome = self.check_define(&key, kind)?;
        if outcome == DefineOutcome::Created {
            let declared = self.next_declaration;
            self.next_declaration += 1;
            self.indices.insert(
                key.clone(),
                IndexEntry {
                    definition: IndexDefinition { key, kind, declared },
                    index,
                },
            );
        }
        Ok(outcome)
    }

    /// Re-register a definition loaded from a snapshot, keeping its
    /// declaration order
    pub fn restore(&mut self, definition: IndexDefinition, index: PropertyIndex) {
        self.next_declaration = self.next_declaration.max(definition.declared + 1);
        self.indices.insert(definition.key.clone(), IndexEntry { definition, index });
    }

    pub fn next_declaration(&self) -> u64 {
        self.next_declaration
    }

    pub(crate) fn set_next_declaration(&mut self, next: u64) {
        self.next_declaration = self.next_declaration.max(next);
    }

    /// Remove a definition of the given kind. Missing keys are a no-op.
    pub fn drop_definition(&mut self, key: &PropertyIndexKey, kind: IndexKind) -> IndexResult<bool> {
        match self.indices.get(key) {
            None => Ok(false),
            Some(entry) if entry.definition.kind != kind => Err(IndexError::DuplicateDefinition {
                label: key.label.clone(),
                property: key.property.clone(),
                existing: entry.definition.kind,
                requested: kind,
            }),
            Some(_) => {
                self.indices.remove(key);
                Ok(true)
            }
        }
    }

    /// Fails if a unique constraint on (label, property) would be broken by
    /// `node_id` taking `value`
    pub fn check_unique(
        &self,
        label: &Label,
        property: &str,
        value: &PropertyValue,
        node_id: Option<NodeId>,
    ) -> IndexResult<()> {
        if value.is_null() {
            return Ok(());
        }
        let key = PropertyIndexKey::new(label.clone(), property);
        if let Some(entry) = self.indices.get(&key) {
            if entry.definition.kind == IndexKind::UniqueConstraint {
                if let Some(holder) = entry.index.first_holder_except(value, node_id) {
                    return Err(IndexError::ConstraintViolation {
                        label: label.clone(),
                        property: property.to_string(),
                        value: value.clone(),
                        holder,
                    });
                }
            }
        }
        Ok(())
    }

    /// Update index when a node property is set
    pub fn index_insert(&mut self, label: &Label, property: &str, value: PropertyValue, node_id: NodeId) {
        if let Some(entry) = self.indices.get_mut(&PropertyIndexKey::new(label.clone(), property)) {
            entry.index.insert(value, node_id);
        }
    }

    /// Update index when a node property is removed or replaced
    pub fn index_remove(&mut self, label: &Label, property: &str, value: &PropertyValue, node_id: NodeId) {
        if let Some(entry) = self.indices.get_mut(&PropertyIndexKey::new(label.clone(), property)) {
            entry.index.remove(value, node_id);
        }
    }

    pub fn has_index(&self, label: &Label, property: &str) -> bool {
        self.indices.contains_key(&PropertyIndexKey::new(label.clone(), property))
    }

    pub fn get_index(&self, label: &Label, property: &str) -> Option<&PropertyIndex> {
        self.indices
            .get(&PropertyIndexKey::new(label.clone(), property))
            .map(|entry| &entry.index)
    }

    pub fn get_definition(&self, label: &Label, property: &str) -> Option<&IndexDefinition> {
        self.indices
            .get(&PropertyIndexKey::new(label.clone(), property))
            .map(|entry| &entry.definition)
    }

    /// Exact-match lookup; `None` when no index covers the key
    pub fn lookup(&self, label: &Label, property: &str, value: &PropertyValue) -> Option<Vec<NodeId>> {
        self.get_index(label, property).map(|index| index.get(value))
    }

    /// All definitions in declaration order
    pub fn definitions(&self) -> Vec<IndexDefinition> {
        let mut defs: Vec<IndexDefinition> =
            self.indices.values().map(|entry| entry.definition.clone()).collect();
        defs.sort_by_key(|def| def.declared);
        defs
    }

    /// Unique constraints that apply to a node carrying `label`
    pub fn unique_properties<'a>(&'a self, label: &'a Label) -> impl Iterator<Item = &'a str> + 'a {
        self.indices
            .values()
            .filter(move |entry| {
                entry.definition.kind == IndexKind::UniqueConstraint && &entry.definition.key.label == label
            })
            .map(|entry| entry.definition.key.property.as_str())
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(label: &str, prop: &str) -> PropertyIndexKey {
        PropertyIndexKey::new(label, prop)
    }

    #[test]
    fn test_define_is_idempotent() {
        let mut manager = IndexManager::new();
        let k = key("Person", "name");
        assert_eq!(
            manager.define(k.clone(), IndexKind::Index, PropertyIndex::new()).unwrap(),
            DefineOutcome::Created
        );
        assert_eq!(
            manager.define(k, IndexKind::Index, PropertyIndex::new()).unwrap(),
            DefineOutcome::AlreadyDefined
        );
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_conflicting_definition_rejected() {
        let mut manager = IndexManager::new();
        manager
            .define(key("Person", "email"), IndexKind::UniqueConstraint, PropertyIndex::new())
            .unwrap();
        let err = manager
            .define(key("Person", "email"), IndexKind::Index, PropertyIndex::new())
            .unwrap_err();
        assert!(matches!(err, IndexError::DuplicateDefinition { existing: IndexKind::UniqueConstraint, .. }));

        let err = manager.drop_definition(&key("Person", "email"), IndexKind::Index).unwrap_err();
        assert!(matches!(err, IndexError::DuplicateDefinition { .. }));
        assert!(manager.drop_definition(&key("Person", "email"), IndexKind::UniqueConstraint).unwrap());
        assert!(!manager.drop_definition(&key("Person", "email"), IndexKind::UniqueConstraint).unwrap());
    }

    #[test]
    fn test_unique_check() {
        let mut manager = IndexManager::new();
        let person = Label::new("Person");
        manager
            .define(key("Person", "email"), IndexKind::UniqueConstraint, PropertyIndex::new())
            .unwrap();
        manager.index_insert(&person, "email", "a@x.io".into(), NodeId::new(1));

        let same_node = manager.check_unique(&person, "email", &"a@x.io".into(), Some(NodeId::new(1)));
        assert!(same_node.is_ok());

        let other = manager.check_unique(&person, "email", &"a@x.io".into(), Some(NodeId::new(2)));
        assert!(matches!(other, Err(IndexError::ConstraintViolation { holder, .. }) if holder == NodeId::new(1)));

        assert!(manager.check_unique(&person, "email", &PropertyValue::Null, None).is_ok());
    }

    #[test]
    fn test_definitions_in_declaration_order() {
        let mut manager = IndexManager::new();
        manager.define(key("B", "x"), IndexKind::Index, PropertyIndex::new()).unwrap();
        manager.define(key("A", "y"), IndexKind::UniqueConstraint, PropertyIndex::new()).unwrap();
        let defs = manager.definitions();
        assert_eq!(defs[0].key, key("B", "x"));
        assert_eq!(defs[1].key, key("A", "y"));
        assert!(defs[0].declared < defs[1].declared);

        let label = Label::new("A");
        let uniques: Vec<&str> = manager.unique_properties(&label).collect();
        assert_eq!(uniques, vec!["y"]);
    }

    #[test]
    fn test_lookup_without_index_is_none() {
        let manager = IndexManager::new();
        assert!(manager.lookup(&Label::new("Person"), "name", &"x".into()).is_none());
    }
}
