//! In-memory graph storage
//!
//! Node and relationship records live in id-indexed arenas. Each node owns two
//! adjacency lists (outgoing, incoming) of relationship ids in creation order,
//! so one expand step costs O(degree).
//!
//! The store is a plain value: the database publishes committed states behind
//! an `Arc`, and only the transaction layer mutates it, through [`Mutation`]
//! records. Arenas and indices are persistent collections, so cloning a store
//! is O(1) and a writer copies only the chunks it touches.

use super::edge::Edge;
use super::mutation::Mutation;
use super::node::Node;
use super::property::{PropertyMap, PropertyValue};
use super::types::{EdgeId, EdgeType, Label, NodeId};
use crate::index::{DefineOutcome, IndexDefinition, IndexError, IndexKind, IndexManager, PropertyIndex, PropertyIndexKey};
use im::{HashMap, OrdSet, Vector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::debug;

/// Errors that can occur during graph operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Edge {0} not found")]
    EdgeNotFound(EdgeId),

    #[error("Node {0} already exists")]
    NodeAlreadyExists(NodeId),

    #[error("Edge {0} already exists")]
    EdgeAlreadyExists(EdgeId),

    #[error("Invalid edge: source node {0} does not exist")]
    InvalidEdgeSource(NodeId),

    #[error("Invalid edge: target node {0} does not exist")]
    InvalidEdgeTarget(NodeId),

    #[error("Node {0} still has {1} relationship(s)")]
    NodeHasRelationships(NodeId, usize),

    #[error("Entity '{0}' already exists")]
    EntityKeyExists(String),

    #[error("Entity '{0}' not found")]
    EntityNotFound(String),

    #[error(transparent)]
    Index(#[from] IndexError),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Per-index statistics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyStats {
    pub label: String,
    pub property: String,
    pub kind: IndexKind,
    pub distinct_values: usize,
    pub entries: usize,
}

/// Summary counts used for planning and diagnostics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphStatistics {
    pub node_count: usize,
    pub edge_count: usize,
    pub labels: BTreeMap<String, usize>,
    pub edge_types: BTreeMap<String, usize>,
    pub indices: Vec<PropertyStats>,
    pub sequence: u64,
}

/// Serializable form of a store, written by snapshots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreImage {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub definitions: Vec<IndexDefinition>,
    pub next_declaration: u64,
    pub next_node_id: u64,
    pub next_edge_id: u64,
    pub sequence: u64,
}

/// In-memory graph storage
#[derive(Debug, Clone, PartialEq)]
pub struct GraphStore {
    /// Node arena, indexed by id; `None` marks a deleted or unused slot
    nodes: Vector<Option<Node>>,

    /// Edge arena, indexed by id
    edges: Vector<Option<Edge>>,

    /// Outgoing edges for each node (adjacency list)
    outgoing: Vector<Vec<EdgeId>>,

    /// Incoming edges for each node (adjacency list)
    incoming: Vector<Vec<EdgeId>>,

    /// Label index, ordered so scans are deterministic
    label_index: HashMap<Label, OrdSet<NodeId>>,

    edge_type_index: HashMap<EdgeType, OrdSet<EdgeId>>,

    /// Caller entity keys
    entity_keys: HashMap<String, NodeId>,

    property_index: IndexManager,

    node_count: usize,
    edge_count: usize,

    next_node_id: u64,
    next_edge_id: u64,

    /// Sequence number of the last WAL record reflected in this state
    sequence: u64,
}

impl GraphStore {
    /// Create a new empty graph store
    pub fn new() -> Self {
        GraphStore {
            nodes: Vector::new(),
            edges: Vector::new(),
            outgoing: Vector::new(),
            incoming: Vector::new(),
            label_index: HashMap::new(),
            edge_type_index: HashMap::new(),
            entity_keys: HashMap::new(),
            property_index: IndexManager::new(),
            node_count: 0,
            edge_count: 0,
            next_node_id: 1,
            next_edge_id: 1,
            sequence: 0,
        }
    }

    // ============================================================
    // Reads
    // ============================================================

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.get_node(id).is_some()
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index()).and_then(Option::as_ref)
    }

    pub fn has_edge(&self, id: EdgeId) -> bool {
        self.get_edge(id).is_some()
    }

    /// Property of a node; `None` when the node or the key is missing
    pub fn get_property(&self, id: NodeId, key: &str) -> Option<&PropertyValue> {
        self.get_node(id).and_then(|node| node.get_property(key))
    }

    /// Outgoing relationships of a node, optionally restricted to one type
    pub fn outgoing(&self, node_id: NodeId, edge_type: Option<&str>) -> Vec<&Edge> {
        self.adjacent(&self.outgoing, node_id, edge_type)
    }

    /// Incoming relationships of a node, optionally restricted to one type
    pub fn incoming(&self, node_id: NodeId, edge_type: Option<&str>) -> Vec<&Edge> {
        self.adjacent(&self.incoming, node_id, edge_type)
    }

    fn adjacent<'a>(
        &'a self,
        lists: &'a Vector<Vec<EdgeId>>,
        node_id: NodeId,
        edge_type: Option<&str>,
    ) -> Vec<&'a Edge> {
        lists
            .get(node_id.index())
            .map(|edge_ids| {
                edge_ids
                    .iter()
                    .filter_map(|&id| self.get_edge(id))
                    .filter(|edge| edge_type.map_or(true, |t| edge.edge_type.as_str() == t))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Raw outgoing adjacency list in creation order
    pub fn outgoing_ids(&self, node_id: NodeId) -> &[EdgeId] {
        self.outgoing.get(node_id.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Raw incoming adjacency list in creation order
    pub fn incoming_ids(&self, node_id: NodeId) -> &[EdgeId] {
        self.incoming.get(node_id.index()).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn degree(&self, node_id: NodeId) -> usize {
        self.outgoing_ids(node_id).len() + self.incoming_ids(node_id).len()
    }

    /// Node ids carrying `label`, ascending
    pub fn node_ids_by_label(&self, label: &str) -> Vec<NodeId> {
        self.label_index
            .get(label)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn get_nodes_by_label(&self, label: &str) -> Vec<&Node> {
        self.label_index
            .get(label)
            .map(|ids| ids.iter().filter_map(|&id| self.get_node(id)).collect())
            .unwrap_or_default()
    }

    pub fn get_edges_by_type(&self, edge_type: &str) -> Vec<&Edge> {
        self.edge_type_index
            .get(edge_type)
            .map(|ids| ids.iter().filter_map(|&id| self.get_edge(id)).collect())
            .unwrap_or_default()
    }

    /// All live node ids, ascending
    pub fn all_node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().flatten().map(|node| node.id).collect()
    }

    pub fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().flatten()
    }

    pub fn all_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter().flatten()
    }

    pub fn node_by_entity_key(&self, key: &str) -> Option<NodeId> {
        self.entity_keys.get(key).copied()
    }

    pub fn label_count(&self, label: &str) -> usize {
        self.label_index.get(label).map_or(0, OrdSet::len)
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn property_index(&self) -> &IndexManager {
        &self.property_index
    }

    pub fn next_node_id(&self) -> u64 {
        self.next_node_id
    }

    pub fn next_edge_id(&self) -> u64 {
        self.next_edge_id
    }

    /// Sequence number of the last committed WAL record in this state
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    pub fn statistics(&self) -> GraphStatistics {
        let labels = self
            .label_index
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(label, ids)| (label.as_str().to_string(), ids.len()))
            .collect();
        let edge_types = self
            .edge_type_index
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(t, ids)| (t.as_str().to_string(), ids.len()))
            .collect();
        let indices = self
            .property_index
            .definitions()
            .into_iter()
            .map(|def| {
                let index = self.property_index.get_index(&def.key.label, &def.key.property);
                PropertyStats {
                    label: def.key.label.as_str().to_string(),
                    property: def.key.property.clone(),
                    kind: def.kind,
                    distinct_values: index.map_or(0, PropertyIndex::distinct_values),
                    entries: index.map_or(0, PropertyIndex::len),
                }
            })
            .collect();
        GraphStatistics {
            node_count: self.node_count,
            edge_count: self.edge_count,
            labels,
            edge_types,
            indices,
            sequence: self.sequence,
        }
    }

    // ============================================================
    // Writes (transaction layer and recovery only)
    // ============================================================

    /// Apply one change record
    pub(crate) fn apply(&mut self, mutation: &Mutation) -> GraphResult<()> {
        debug!(kind = mutation.kind(), "applying mutation");
        match mutation {
            Mutation::CreateNode { id, labels, properties, entity_key } => {
                self.insert_node(*id, labels, properties, entity_key.as_deref())
            }
            Mutation::CreateEdge { id, source, target, edge_type, properties } => {
                self.insert_edge(*id, *source, *target, edge_type, properties)
            }
            Mutation::SetNodeProperty { id, key, value } => self.set_node_property(*id, key, value.clone()),
            Mutation::SetEdgeProperty { id, key, value } => self.set_edge_property(*id, key, value.clone()),
            Mutation::DeleteNode { id } => self.delete_node(*id).map(|_| ()),
            Mutation::CreateIndex { label, property } => {
                self.create_index(label, property, IndexKind::Index).map(|_| ())
            }
            Mutation::CreateConstraint { label, property } => {
                self.create_index(label, property, IndexKind::UniqueConstraint).map(|_| ())
            }
            Mutation::DropIndex { label, property } => self.drop_index(label, property, IndexKind::Index).map(|_| ()),
            Mutation::DropConstraint { label, property } => {
                self.drop_index(label, property, IndexKind::UniqueConstraint).map(|_| ())
            }
        }
    }

    fn ensure_node_slot(&mut self, idx: usize) {
        while self.nodes.len() <= idx {
            self.nodes.push_back(None);
            self.outgoing.push_back(Vec::new());
            self.incoming.push_back(Vec::new());
        }
    }

    fn ensure_edge_slot(&mut self, idx: usize) {
        while self.edges.len() <= idx {
            self.edges.push_back(None);
        }
    }

    pub(crate) fn insert_node(
        &mut self,
        id: NodeId,
        labels: &[Label],
        properties: &PropertyMap,
        entity_key: Option<&str>,
    ) -> GraphResult<()> {
        if self.has_node(id) {
            return Err(GraphError::NodeAlreadyExists(id));
        }
        if let Some(key) = entity_key {
            if self.entity_keys.contains_key(key) {
                return Err(GraphError::EntityKeyExists(key.to_string()));
            }
        }
        for label in labels {
            for (key, value) in properties {
                self.property_index.check_unique(label, key, value, None)?;
            }
        }

        let properties: PropertyMap = properties
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut node = Node::new_with_properties(id, labels.to_vec(), properties);
        node.entity_key = entity_key.map(str::to_string);

        for label in &node.labels {
            match self.label_index.get_mut(label) {
                Some(ids) => {
                    ids.insert(id);
                }
                None => {
                    self.label_index.insert(label.clone(), OrdSet::unit(id));
                }
            }
            for (key, value) in &node.properties {
                self.property_index.index_insert(label, key, value.clone(), id);
            }
        }
        if let Some(key) = entity_key {
            self.entity_keys.insert(key.to_string(), id);
        }

        self.ensure_node_slot(id.index());
        self.nodes.set(id.index(), Some(node));
        self.node_count += 1;
        self.next_node_id = self.next_node_id.max(id.as_u64() + 1);
        Ok(())
    }

    pub(crate) fn insert_edge(
        &mut self,
        id: EdgeId,
        source: NodeId,
        target: NodeId,
        edge_type: &EdgeType,
        properties: &PropertyMap,
    ) -> GraphResult<()> {
        if !self.has_node(source) {
            return Err(GraphError::InvalidEdgeSource(source));
        }
        if !self.has_node(target) {
            return Err(GraphError::InvalidEdgeTarget(target));
        }
        if self.has_edge(id) {
            return Err(GraphError::EdgeAlreadyExists(id));
        }

        let properties: PropertyMap = properties
            .iter()
            .filter(|(_, v)| !v.is_null())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let edge = Edge::new_with_properties(id, source, target, edge_type.clone(), properties);

        if let Some(list) = self.outgoing.get_mut(source.index()) {
            list.push(id);
        }
        if let Some(list) = self.incoming.get_mut(target.index()) {
            list.push(id);
        }
        match self.edge_type_index.get_mut(edge_type) {
            Some(ids) => {
                ids.insert(id);
            }
            None => {
                self.edge_type_index.insert(edge_type.clone(), OrdSet::unit(id));
            }
        }

        self.ensure_edge_slot(id.index());
        self.edges.set(id.index(), Some(edge));
        self.edge_count += 1;
        self.next_edge_id = self.next_edge_id.max(id.as_u64() + 1);
        Ok(())
    }

    /// Set (or with null, remove) a node property, keeping indices in step
    pub(crate) fn set_node_property(&mut self, id: NodeId, key: &str, value: PropertyValue) -> GraphResult<()> {
        let labels: Vec<Label> = match self.get_node(id) {
            Some(node) => node.labels.iter().cloned().collect(),
            None => return Err(GraphError::NodeNotFound(id)),
        };
        for label in &labels {
            self.property_index.check_unique(label, key, &value, Some(id))?;
        }

        let node = self
            .nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(GraphError::NodeNotFound(id))?;
        let old = if value.is_null() {
            node.remove_property(key)
        } else {
            node.set_property(key, value.clone())
        };

        for label in &labels {
            if let Some(old) = &old {
                self.property_index.index_remove(label, key, old, id);
            }
            self.property_index.index_insert(label, key, value.clone(), id);
        }
        Ok(())
    }

    pub(crate) fn set_edge_property(&mut self, id: EdgeId, key: &str, value: PropertyValue) -> GraphResult<()> {
        let edge = self
            .edges
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(GraphError::EdgeNotFound(id))?;
        if value.is_null() {
            edge.properties.remove(key);
        } else {
            edge.set_property(key, value);
        }
        Ok(())
    }

    /// Delete a node that has no relationships
    pub(crate) fn delete_node(&mut self, id: NodeId) -> GraphResult<Node> {
        if !self.has_node(id) {
            return Err(GraphError::NodeNotFound(id));
        }
        let degree = self.degree(id);
        if degree > 0 {
            return Err(GraphError::NodeHasRelationships(id, degree));
        }
        let node = self
            .nodes
            .get_mut(id.index())
            .and_then(Option::take)
            .ok_or(GraphError::NodeNotFound(id))?;

        for label in &node.labels {
            if let Some(ids) = self.label_index.get_mut(label) {
                ids.remove(&id);
                if ids.is_empty() {
                    self.label_index.remove(label);
                }
            }
            for (key, value) in &node.properties {
                self.property_index.index_remove(label, key, value, id);
            }
        }
        if let Some(key) = &node.entity_key {
            self.entity_keys.remove(key);
        }
        self.node_count -= 1;
        Ok(node)
    }

    /// Define an index or unique constraint, backfilling it from existing nodes
    pub(crate) fn create_index(&mut self, label: &Label, property: &str, kind: IndexKind) -> GraphResult<DefineOutcome> {
        let key = PropertyIndexKey::new(label.clone(), property);
        if self.property_index.check_define(&key, kind)? == DefineOutcome::AlreadyDefined {
            return Ok(DefineOutcome::AlreadyDefined);
        }

        let mut index = PropertyIndex::new();
        for node in self.get_nodes_by_label(label.as_str()) {
            if let Some(value) = node.get_property(property) {
                index.insert(value.clone(), node.id);
            }
        }
        if kind == IndexKind::UniqueConstraint {
            if let Some((value, holders)) = index.first_duplicate() {
                return Err(IndexError::ConstraintViolation {
                    label: label.clone(),
                    property: property.to_string(),
                    value: value.clone(),
                    holder: holders[0],
                }
                .into());
            }
        }
        Ok(self.property_index.define(key, kind, index)?)
    }

    pub(crate) fn drop_index(&mut self, label: &Label, property: &str, kind: IndexKind) -> GraphResult<bool> {
        let key = PropertyIndexKey::new(label.clone(), property);
        Ok(self.property_index.drop_definition(&key, kind)?)
    }

    // ============================================================
    // Snapshot images
    // ============================================================

    pub fn to_image(&self) -> StoreImage {
        StoreImage {
            nodes: self.all_nodes().cloned().collect(),
            edges: self.all_edges().cloned().collect(),
            definitions: self.property_index.definitions(),
            next_declaration: self.property_index.next_declaration(),
            next_node_id: self.next_node_id,
            next_edge_id: self.next_edge_id,
            sequence: self.sequence,
        }
    }

    /// Rebuild a store, its adjacency lists and its indices from an image
    pub fn from_image(image: StoreImage) -> GraphResult<Self> {
        let mut store = GraphStore::new();
        for definition in image.definitions {
            store.property_index.restore(definition, PropertyIndex::new());
        }
        store.property_index.set_next_declaration(image.next_declaration);
        for node in image.nodes {
            let labels: Vec<Label> = node.labels.into_iter().collect();
            store.insert_node(node.id, &labels, &node.properties, node.entity_key.as_deref())?;
        }
        // Edge ids ascend in creation order, which restores adjacency order
        for edge in image.edges {
            store.insert_edge(edge.id, edge.source, edge.target, &edge.edge_type, &edge.properties)?;
        }
        store.next_node_id = store.next_node_id.max(image.next_node_id);
        store.next_edge_id = store.next_edge_id.max(image.next_edge_id);
        // Arenas span every id ever allocated, deleted slots included
        if store.next_node_id > 1 {
            store.ensure_node_slot((store.next_node_id - 1) as usize);
        }
        if store.next_edge_id > 1 {
            store.ensure_edge_slot((store.next_edge_id - 1) as usize);
        }
        store.sequence = image.sequence;
        Ok(store)
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}
