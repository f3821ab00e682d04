//! GraphDatabase - the embedded handle collaborators use
//!
//! Wraps the transaction manager (committed store, writer slot, WAL) and the
//! query engine. Every write goes through an explicit transaction id; reads
//! run against the latest committed snapshot unless a query names an open
//! transaction.

use crate::config::{GraphConfig, QueryOptions};
use crate::error::{DbError, Result};
use crate::graph::{
    Edge, EdgeId, EdgeType, GraphError, GraphStatistics, GraphStore, Label, Mutation, Node, NodeId, PropertyMap,
    PropertyValue,
};
use crate::persistence::{PersistenceManager, RecoveryStats};
use crate::query::ast::{CreateStatement, SchemaAction, SchemaCommand, SchemaKind};
use crate::query::executor::{compile_create, plan_mutations};
use crate::query::{ExecContext, Query, QueryEngine, QueryResult, Statement, Value};
use crate::transaction::{TransactionManager, TxnId, TxnState};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Embedded property-graph database
pub struct GraphDatabase {
    config: GraphConfig,
    transactions: TransactionManager,
    engine: QueryEngine,
    recovery: RecoveryStats,
}

impl GraphDatabase {
    /// Open (or create) a database. With a data directory this loads the
    /// latest snapshot and replays the WAL; a corrupt log refuses to open.
    pub fn open(config: GraphConfig) -> Result<Self> {
        let (store, persistence, recovery) = match &config.data_dir {
            Some(dir) => {
                let (pm, store, stats) = PersistenceManager::open(dir, config.sync_mode, config.compress_snapshots)?;
                (store, Some(pm), stats)
            }
            None => (GraphStore::new(), None, RecoveryStats::default()),
        };
        info!(
            "Opened graph ({} nodes, {} relationships, persistent: {})",
            store.node_count(),
            store.edge_count(),
            persistence.is_some()
        );
        Ok(Self {
            engine: QueryEngine::new(config.parse_cache_capacity),
            transactions: TransactionManager::new(store, persistence),
            recovery,
            config,
        })
    }

    /// Open at `path`, or purely in memory when `path` is None
    pub fn create(path: Option<&std::path::Path>) -> Result<Self> {
        Self::open(match path {
            Some(path) => GraphConfig::persistent(path),
            None => GraphConfig::in_memory(),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            engine: QueryEngine::default(),
            transactions: TransactionManager::new(GraphStore::new(), None),
            recovery: RecoveryStats::default(),
            config: GraphConfig::in_memory(),
        }
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    /// What the last open recovered
    pub fn recovery_stats(&self) -> RecoveryStats {
        self.recovery
    }

    /// The latest committed store; stays valid across later commits
    pub fn snapshot(&self) -> Arc<GraphStore> {
        self.transactions.snapshot()
    }

    // ============================================================
    // Transactions
    // ============================================================

    pub fn begin_transaction(&self) -> Result<TxnId> {
        self.transactions.begin()
    }

    pub fn commit_transaction(&self, id: TxnId) -> Result<u64> {
        self.transactions.commit(id)
    }

    pub fn rollback_transaction(&self, id: TxnId) -> Result<()> {
        self.transactions.rollback(id)
    }

    pub fn transaction_state(&self, id: TxnId) -> Option<TxnState> {
        self.transactions.state(id)
    }

    // ============================================================
    // Writes (staged in the given transaction)
    // ============================================================

    /// Create a node registered under a caller-chosen entity key
    pub fn add_entity(
        &self,
        txn: TxnId,
        key: impl Into<String>,
        entity_type: impl Into<Label>,
        properties: PropertyMap,
    ) -> Result<NodeId> {
        let key = key.into();
        let label = entity_type.into();
        self.transactions.with_active(Some(txn), |active| {
            let id = NodeId::new(active.store().next_node_id());
            active.stage(Mutation::CreateNode {
                id,
                labels: vec![label],
                properties,
                entity_key: Some(key),
            })?;
            Ok(id)
        })
    }

    /// Relationship between two entities addressed by their keys
    pub fn add_relationship(
        &self,
        txn: TxnId,
        source: &str,
        target: &str,
        edge_type: impl Into<EdgeType>,
        properties: PropertyMap,
    ) -> Result<EdgeId> {
        let edge_type = edge_type.into();
        self.transactions.with_active(Some(txn), |active| {
            let resolve = |key: &str| {
                active
                    .store()
                    .node_by_entity_key(key)
                    .ok_or_else(|| DbError::Graph(GraphError::EntityNotFound(key.to_string())))
            };
            let (source, target) = (resolve(source)?, resolve(target)?);
            let id = EdgeId::new(active.store().next_edge_id());
            active.stage(Mutation::CreateEdge {
                id,
                source,
                target,
                edge_type,
                properties,
            })?;
            Ok(id)
        })
    }

    pub fn create_node(&self, txn: TxnId, labels: Vec<Label>, properties: PropertyMap) -> Result<NodeId> {
        self.transactions.with_active(Some(txn), |active| {
            let id = NodeId::new(active.store().next_node_id());
            active.stage(Mutation::CreateNode {
                id,
                labels,
                properties,
                entity_key: None,
            })?;
            Ok(id)
        })
    }

    pub fn create_relationship(
        &self,
        txn: TxnId,
        edge_type: impl Into<EdgeType>,
        source: NodeId,
        target: NodeId,
        properties: PropertyMap,
    ) -> Result<EdgeId> {
        let edge_type = edge_type.into();
        self.transactions.with_active(Some(txn), |active| {
            let id = EdgeId::new(active.store().next_edge_id());
            active.stage(Mutation::CreateEdge {
                id,
                source,
                target,
                edge_type,
                properties,
            })?;
            Ok(id)
        })
    }

    /// Set (or with a null value, remove) a node property
    pub fn set_property(
        &self,
        txn: TxnId,
        node: NodeId,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Result<()> {
        let mutation = Mutation::SetNodeProperty {
            id: node,
            key: key.into(),
            value: value.into(),
        };
        self.transactions
            .with_active(Some(txn), |active| Ok(active.stage(mutation)?))
    }

    pub fn set_relationship_property(
        &self,
        txn: TxnId,
        edge: EdgeId,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> Result<()> {
        let mutation = Mutation::SetEdgeProperty {
            id: edge,
            key: key.into(),
            value: value.into(),
        };
        self.transactions
            .with_active(Some(txn), |active| Ok(active.stage(mutation)?))
    }

    /// Delete a node without relationships. `detach` would remove them
    /// first, which needs relationship deletion.
    pub fn delete_node(&self, txn: TxnId, node: NodeId, detach: bool) -> Result<()> {
        if detach {
            return Err(DbError::UnsupportedFeature("detach delete".to_string()));
        }
        self.transactions
            .with_active(Some(txn), |active| Ok(active.stage(Mutation::DeleteNode { id: node })?))
    }

    pub fn delete_relationship(&self, _txn: TxnId, edge: EdgeId) -> Result<()> {
        Err(DbError::UnsupportedFeature(format!("deleting relationship {}", edge)))
    }

    // ============================================================
    // Reads (latest committed state)
    // ============================================================

    pub fn get_node(&self, id: NodeId) -> Option<Node> {
        self.snapshot().get_node(id).cloned()
    }

    pub fn get_relationship(&self, id: EdgeId) -> Option<Edge> {
        self.snapshot().get_edge(id).cloned()
    }

    /// Node id registered for an entity key
    pub fn entity(&self, key: &str) -> Option<NodeId> {
        self.snapshot().node_by_entity_key(key)
    }

    pub fn get_property(&self, id: NodeId, key: &str) -> Option<PropertyValue> {
        self.snapshot().get_property(id, key).cloned()
    }

    pub fn outgoing(&self, id: NodeId, edge_type: Option<&str>) -> Vec<Edge> {
        self.snapshot().outgoing(id, edge_type).into_iter().cloned().collect()
    }

    pub fn incoming(&self, id: NodeId, edge_type: Option<&str>) -> Vec<Edge> {
        self.snapshot().incoming(id, edge_type).into_iter().cloned().collect()
    }

    pub fn statistics(&self) -> GraphStatistics {
        self.snapshot().statistics()
    }

    // ============================================================
    // Indices and constraints
    // ============================================================

    /// Returns false when the identical index already exists
    pub fn create_index(&self, label: impl Into<Label>, property: impl Into<String>) -> Result<bool> {
        self.transactions.apply_schema(Mutation::CreateIndex {
            label: label.into(),
            property: property.into(),
        })
    }

    /// Only unique constraints exist
    pub fn create_constraint(
        &self,
        label: impl Into<Label>,
        property: impl Into<String>,
        unique: bool,
    ) -> Result<bool> {
        if !unique {
            return Err(DbError::UnsupportedFeature("non-unique constraints".to_string()));
        }
        self.transactions.apply_schema(Mutation::CreateConstraint {
            label: label.into(),
            property: property.into(),
        })
    }

    /// Returns false when no such index exists
    pub fn drop_index(&self, label: impl Into<Label>, property: impl Into<String>) -> Result<bool> {
        self.transactions.apply_schema(Mutation::DropIndex {
            label: label.into(),
            property: property.into(),
        })
    }

    pub fn drop_constraint(&self, label: impl Into<Label>, property: impl Into<String>) -> Result<bool> {
        self.transactions.apply_schema(Mutation::DropConstraint {
            label: label.into(),
            property: property.into(),
        })
    }

    // ============================================================
    // Queries
    // ============================================================

    pub fn execute_query(&self, text: &str, params: HashMap<String, PropertyValue>) -> Result<QueryResult> {
        self.execute_query_with(text, QueryOptions::new().with_params(params))
    }

    /// Parse, compile and run a statement. Read results are lazy; CREATE and
    /// schema statements return a single summary row.
    pub fn execute_query_with(&self, text: &str, options: QueryOptions) -> Result<QueryResult> {
        let statement = self.engine.parse(text)?;
        debug!(query = text, "executing statement");
        let timeout = options.timeout.or(self.config.default_query_timeout);
        let txn = options.transaction;
        let ctx = ExecContext::new(options.params, timeout, options.cancel);

        match statement.as_ref() {
            Statement::Query(query) => {
                let store = self.read_store(txn)?;
                Ok(self.engine.execute(query, store, ctx)?)
            }
            Statement::Explain(query) => self.explain(query, txn),
            Statement::Create(create) => self.run_create(create, txn, &ctx),
            Statement::Schema(command) => self.run_schema(command),
        }
    }

    fn read_store(&self, txn: Option<TxnId>) -> Result<Arc<GraphStore>> {
        match txn {
            Some(id) => self
                .transactions
                .with_active(Some(id), |active| Ok(Arc::clone(active.store()))),
            None => Ok(self.snapshot()),
        }
    }

    fn explain(&self, query: &Query, txn: Option<TxnId>) -> Result<QueryResult> {
        let store = self.read_store(txn)?;
        Ok(self.engine.explain(query, &store)?)
    }

    /// Stage a CREATE in the open transaction (the named one, or whichever
    /// is active)
    fn run_create(&self, statement: &CreateStatement, txn: Option<TxnId>, ctx: &ExecContext) -> Result<QueryResult> {
        let (nodes, relationships) = self.transactions.with_active(txn, |active| {
            let plan = compile_create(statement, active.store().property_index())?;
            let outcome = plan_mutations(&plan, active.store(), ctx)?;
            let counts = (outcome.nodes_created, outcome.relationships_created);
            active.stage_all(outcome.mutations)?;
            debug!(txn = %active.id(), nodes = counts.0, relationships = counts.1, "staged CREATE");
            Ok(counts)
        })?;
        Ok(QueryResult::from_rows(
            vec!["nodes_created".to_string(), "relationships_created".to_string()],
            vec![vec![
                Value::from(PropertyValue::Integer(nodes as i64)),
                Value::from(PropertyValue::Integer(relationships as i64)),
            ]],
        ))
    }

    fn run_schema(&self, command: &SchemaCommand) -> Result<QueryResult> {
        let (label, property) = (command.label.clone(), command.property.clone());
        let mutation = match (command.action, command.kind) {
            (SchemaAction::Create, SchemaKind::Index) => Mutation::CreateIndex { label, property },
            (SchemaAction::Create, SchemaKind::UniqueConstraint) => Mutation::CreateConstraint { label, property },
            (SchemaAction::Drop, SchemaKind::Index) => Mutation::DropIndex { label, property },
            (SchemaAction::Drop, SchemaKind::UniqueConstraint) => Mutation::DropConstraint { label, property },
        };
        let changed = self.transactions.apply_schema(mutation)?;
        let column = match command.action {
            SchemaAction::Create => "created",
            SchemaAction::Drop => "dropped",
        };
        Ok(QueryResult::from_rows(
            vec![column.to_string()],
            vec![vec![Value::from(PropertyValue::Boolean(changed))]],
        ))
    }

    // ============================================================
    // Lifecycle
    // ============================================================

    /// Write a snapshot of the committed state and truncate the WAL
    pub fn checkpoint(&self) -> Result<()> {
        self.transactions.checkpoint()
    }

    /// Flush the WAL and release the handle. An open transaction is
    /// discarded.
    pub fn close(self) -> Result<()> {
        if let Some(id) = self.transactions.active_id() {
            warn!("Closing with {} still active; rolling it back", id);
            self.transactions.rollback(id)?;
        }
        self.transactions.flush()?;
        info!("Closed graph at sequence {}", self.snapshot().sequence());
        Ok(())
    }
}

impl Drop for GraphDatabase {
    fn drop(&mut self) {
        if let Err(err) = self.transactions.flush() {
            warn!("WAL flush on drop failed: {}", err);
        }
    }
}

impl std::fmt::Debug for GraphDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphDatabase")
            .field("data_dir", &self.config.data_dir)
            .field("sequence", &self.snapshot().sequence())
            .field("active", &self.transactions.active_id())
            .finish()
    }
}
