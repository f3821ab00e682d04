//! Core graph data model
//!
//! This module implements the property graph:
//! - Nodes with multiple labels and properties
//! - Directed, typed relationships with properties, parallel edges allowed
//! - Adjacency lists in creation order plus label and relationship-type indices
//! - Change records (`Mutation`) shared by transactions, the WAL and recovery

pub mod edge;
pub mod mutation;
pub mod node;
pub mod property;
pub mod store;
pub mod types;

// Re-export main types
pub use edge::Edge;
pub use mutation::Mutation;
pub use node::Node;
pub use property::{PropertyMap, PropertyValue};
pub use store::{GraphError, GraphResult, GraphStatistics, GraphStore, PropertyStats, StoreImage};
pub use types::{EdgeId, EdgeType, Label, NodeId};
