//! Graphcore - embedded property-graph database
//!
//! A single-process engine for labeled nodes and typed relationships with a
//! Cypher-compatible query language and crash-safe transactions.
//!
//! # Architecture
//!
//! - `graph`: node and relationship tables, adjacency lists, label index
//! - `index`: property indices and unique constraints
//! - `query`: lexer, parser, AST, compiler and pull-based executor
//! - `transaction`: single-writer transactions over copy-on-write stores
//! - `persistence`: write-ahead log, snapshots and recovery
//! - `database`: the `GraphDatabase` handle tying it together
//!
//! ## Example Usage
//!
//! ```rust
//! use graphcore::{props, GraphDatabase};
//! use std::collections::HashMap;
//!
//! let db = GraphDatabase::in_memory();
//! let txn = db.begin_transaction().unwrap();
//! db.add_entity(txn, "p1", "Person", props! { "name" => "Alice" }).unwrap();
//! db.add_entity(txn, "p2", "Person", props! { "name" => "Bob" }).unwrap();
//! db.add_relationship(txn, "p1", "p2", "KNOWS", props! { "since" => 2020i64 }).unwrap();
//! db.commit_transaction(txn).unwrap();
//!
//! let rows = db
//!     .execute_query("MATCH (a:Person)-[r:KNOWS]->(b:Person) RETURN a.name, b.name", HashMap::new())
//!     .unwrap()
//!     .collect_rows()
//!     .unwrap();
//! assert_eq!(rows.len(), 1);
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod database;
pub mod error;
pub mod graph;
pub mod index;
pub mod persistence;
pub mod query;
pub mod transaction;

// Re-export main types for convenience
pub use config::{GraphConfig, QueryOptions, SyncMode};
pub use database::GraphDatabase;
pub use error::{DbError, ErrorKind, Result};

pub use graph::{
    Edge, EdgeId, EdgeType, GraphError, GraphResult, GraphStatistics, GraphStore, Label, Mutation, Node, NodeId,
    PropertyMap, PropertyValue,
};

pub use index::{IndexDefinition, IndexKind};

pub use query::{parse_query, tokenize, CancelHandle, QueryEngine, QueryResult, Row, Statement, Value};

pub use persistence::{PersistenceManager, RecoveryStats, WAL_FILE, SNAPSHOT_FILE};

pub use transaction::{TxnId, TxnState};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let ver = version();
        assert!(!ver.is_empty());
        assert_eq!(ver, "0.1.0");
    }
}
