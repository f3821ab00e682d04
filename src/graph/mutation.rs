//! Change records applied to the graph store
//!
//! A `Mutation` is the unit a write transaction stages, the WAL persists and
//! recovery replays. Every id is allocated before the record is built so that
//! replaying the same records always rebuilds the same store.

use super::property::{PropertyMap, PropertyValue};
use super::types::{EdgeId, EdgeType, Label, NodeId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    CreateNode {
        id: NodeId,
        labels: Vec<Label>,
        properties: PropertyMap,
        entity_key: Option<String>,
    },
    CreateEdge {
        id: EdgeId,
        source: NodeId,
        target: NodeId,
        edge_type: EdgeType,
        properties: PropertyMap,
    },
    /// Setting a property to null removes it
    SetNodeProperty {
        id: NodeId,
        key: String,
        value: PropertyValue,
    },
    SetEdgeProperty {
        id: EdgeId,
        key: String,
        value: PropertyValue,
    },
    /// Only valid for nodes without relationships
    DeleteNode { id: NodeId },
    CreateIndex { label: Label, property: String },
    DropIndex { label: Label, property: String },
    CreateConstraint { label: Label, property: String },
    DropConstraint { label: Label, property: String },
}

impl Mutation {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Mutation::CreateNode { .. } => "create_node",
            Mutation::CreateEdge { .. } => "create_edge",
            Mutation::SetNodeProperty { .. } => "set_node_property",
            Mutation::SetEdgeProperty { .. } => "set_edge_property",
            Mutation::DeleteNode { .. } => "delete_node",
            Mutation::CreateIndex { .. } => "create_index",
            Mutation::DropIndex { .. } => "drop_index",
            Mutation::CreateConstraint { .. } => "create_constraint",
            Mutation::DropConstraint { .. } => "drop_constraint",
        }
    }

    /// True for index and constraint definitions
    pub fn is_schema(&self) -> bool {
        matches!(
            self,
            Mutation::CreateIndex { .. }
                | Mutation::DropIndex { .. }
                | Mutation::CreateConstraint { .. }
                | Mutation::DropConstraint { .. }
        )
    }
}
