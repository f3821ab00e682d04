//! Single-writer transactions
//!
//! The committed store is published as an `Arc<GraphStore>`. A write
//! transaction works on its own version, cloned on first write. Store clones
//! share structure, so that clone is O(1) whatever the graph size. Every
//! mutation is validated and applied to that copy as it is staged, so the
//! transaction always reads its own writes and a rejected mutation leaves it
//! untouched. Commit logs the staged mutations to the WAL and then swaps the
//! published `Arc`, the only step readers ever wait on.

use crate::error::{DbError, Result};
use crate::graph::{GraphResult, GraphStore, Mutation};
use crate::index::{DefineOutcome, IndexKind};
use crate::persistence::PersistenceManager;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Transaction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxnId(u64);

impl TxnId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TxnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn-{}", self.0)
    }
}

/// Transaction lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    Active,
    Committing,
    Committed,
    RolledBack,
}

/// The one open write transaction
#[derive(Debug)]
pub struct ActiveTransaction {
    id: TxnId,
    working: Arc<GraphStore>,
    ops: Vec<Mutation>,
}

impl ActiveTransaction {
    fn new(id: TxnId, base: Arc<GraphStore>) -> Self {
        Self {
            id,
            working: base,
            ops: Vec::new(),
        }
    }

    pub fn id(&self) -> TxnId {
        self.id
    }

    /// The transaction's view: committed state plus its own writes
    pub fn store(&self) -> &Arc<GraphStore> {
        &self.working
    }

    /// Staged mutations in order
    pub fn ops(&self) -> &[Mutation] {
        &self.ops
    }

    /// Validate and apply one mutation. On error nothing changes and the
    /// transaction stays active.
    pub fn stage(&mut self, mutation: Mutation) -> GraphResult<()> {
        Arc::make_mut(&mut self.working).apply(&mutation)?;
        debug!(txn = %self.id, kind = mutation.kind(), "staged mutation");
        self.ops.push(mutation);
        Ok(())
    }

    /// Stage several mutations as one unit: all of them or none
    pub fn stage_all(&mut self, mutations: Vec<Mutation>) -> GraphResult<()> {
        if mutations.len() <= 1 {
            return mutations.into_iter().try_for_each(|m| self.stage(m));
        }
        let saved = (Arc::clone(&self.working), self.ops.len());
        for mutation in mutations {
            if let Err(err) = self.stage(mutation) {
                self.working = saved.0;
                self.ops.truncate(saved.1);
                return Err(err);
            }
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Transaction manager: owns the committed store, the writer slot and the
/// WAL
#[derive(Debug)]
pub struct TransactionManager {
    committed: RwLock<Arc<GraphStore>>,
    /// Single-writer slot
    active: Mutex<Option<ActiveTransaction>>,
    /// Most recent transaction that left the Active state
    last: Mutex<Option<(TxnId, TxnState)>>,
    next_txn: AtomicU64,
    /// None for an in-memory database
    persistence: Option<Mutex<PersistenceManager>>,
}

impl TransactionManager {
    pub fn new(store: GraphStore, persistence: Option<PersistenceManager>) -> Self {
        Self {
            committed: RwLock::new(Arc::new(store)),
            active: Mutex::new(None),
            last: Mutex::new(None),
            next_txn: AtomicU64::new(1),
            persistence: persistence.map(Mutex::new),
        }
    }

    /// Latest committed store
    pub fn snapshot(&self) -> Arc<GraphStore> {
        Arc::clone(&self.committed.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn publish(&self, store: Arc<GraphStore>) {
        *self.committed.write().unwrap_or_else(PoisonError::into_inner) = store;
    }

    fn allocate_id(&self) -> TxnId {
        TxnId(self.next_txn.fetch_add(1, Ordering::Relaxed))
    }

    fn record(&self, id: TxnId, state: TxnState) {
        *lock(&self.last) = Some((id, state));
    }

    /// Open the write transaction
    pub fn begin(&self) -> Result<TxnId> {
        let mut slot = lock(&self.active);
        if let Some(active) = slot.as_ref() {
            return Err(DbError::ConcurrentTransaction(format!(
                "{} is still active",
                active.id
            )));
        }
        let id = self.allocate_id();
        *slot = Some(ActiveTransaction::new(id, self.snapshot()));
        info!("Began transaction {}", id);
        Ok(id)
    }

    pub fn active_id(&self) -> Option<TxnId> {
        lock(&self.active).as_ref().map(ActiveTransaction::id)
    }

    /// Run `f` on the active transaction; `id` must match it when given
    pub fn with_active<R>(
        &self,
        id: Option<TxnId>,
        f: impl FnOnce(&mut ActiveTransaction) -> Result<R>,
    ) -> Result<R> {
        let mut slot = lock(&self.active);
        match slot.as_mut() {
            Some(txn) if id.map_or(true, |id| id == txn.id) => f(txn),
            Some(txn) => Err(DbError::NoActiveTransaction(format!(
                "{} is not active ({} is)",
                id.map_or_else(String::new, |id| id.to_string()),
                txn.id
            ))),
            None => Err(DbError::NoActiveTransaction(match id {
                Some(id) => format!("{} is not active", id),
                None => "begin a transaction first".to_string(),
            })),
        }
    }

    /// Take the active transaction out of the slot if `id` names it
    fn take(&self, slot: &mut Option<ActiveTransaction>, id: TxnId) -> Result<ActiveTransaction> {
        match slot.take() {
            Some(txn) if txn.id == id => Ok(txn),
            other => {
                *slot = other;
                Err(DbError::NoActiveTransaction(format!("{} is not active", id)))
            }
        }
    }

    /// Log the staged mutations, then publish the transaction's store.
    /// Returns the commit sequence number.
    pub fn commit(&self, id: TxnId) -> Result<u64> {
        let mut slot = lock(&self.active);
        let txn = self.take(&mut slot, id)?;
        self.record(id, TxnState::Committing);

        if txn.ops.is_empty() {
            self.record(id, TxnState::Committed);
            info!("Committed transaction {} (no changes)", id);
            return Ok(txn.working.sequence());
        }

        let sequence = match &self.persistence {
            Some(persistence) => match lock(persistence).log_transaction(id.as_u64(), &txn.ops) {
                Ok(sequence) => sequence,
                Err(err) => {
                    self.record(id, TxnState::RolledBack);
                    warn!("Commit of {} failed, transaction discarded: {}", id, err);
                    return Err(err.into());
                }
            },
            // Same numbering as the log: Begin, each mutation, Commit
            None => self.snapshot().sequence() + txn.ops.len() as u64 + 2,
        };

        let ActiveTransaction { mut working, ops, .. } = txn;
        Arc::make_mut(&mut working).set_sequence(sequence);
        self.publish(working);
        self.record(id, TxnState::Committed);
        info!("Committed transaction {} ({} mutations, sequence {})", id, ops.len(), sequence);
        Ok(sequence)
    }

    /// Discard the transaction; neither the WAL nor the store is touched
    pub fn rollback(&self, id: TxnId) -> Result<()> {
        let mut slot = lock(&self.active);
        let txn = self.take(&mut slot, id)?;
        self.record(id, TxnState::RolledBack);
        info!("Rolled back transaction {} ({} staged mutations dropped)", id, txn.ops.len());
        Ok(())
    }

    pub fn state(&self, id: TxnId) -> Option<TxnState> {
        if self.active_id() == Some(id) {
            return Some(TxnState::Active);
        }
        match *lock(&self.last) {
            Some((last, state)) if last == id => Some(state),
            _ => None,
        }
    }

    /// Apply an index or constraint definition as its own transaction.
    /// Returns false when it changed nothing (repeat create, absent drop).
    pub fn apply_schema(&self, mutation: Mutation) -> Result<bool> {
        let slot = lock(&self.active);
        if let Some(active) = slot.as_ref() {
            return Err(DbError::ConcurrentTransaction(format!(
                "schema changes are not allowed while {} is active",
                active.id
            )));
        }

        let mut store = self.snapshot();
        let working = Arc::make_mut(&mut store);
        let changed = match &mutation {
            Mutation::CreateIndex { label, property } => {
                working.create_index(label, property, IndexKind::Index)? == DefineOutcome::Created
            }
            Mutation::CreateConstraint { label, property } => {
                working.create_index(label, property, IndexKind::UniqueConstraint)? == DefineOutcome::Created
            }
            Mutation::DropIndex { label, property } => working.drop_index(label, property, IndexKind::Index)?,
            Mutation::DropConstraint { label, property } => {
                working.drop_index(label, property, IndexKind::UniqueConstraint)?
            }
            other => {
                return Err(DbError::Runtime(format!("{} is not a schema change", other.kind())));
            }
        };
        if !changed {
            debug!(kind = mutation.kind(), "schema change is a no-op");
            return Ok(false);
        }

        let id = self.allocate_id();
        let sequence = match &self.persistence {
            Some(persistence) => lock(persistence).log_transaction(id.as_u64(), std::slice::from_ref(&mutation))?,
            None => working.sequence() + 3,
        };
        working.set_sequence(sequence);
        self.publish(store);
        self.record(id, TxnState::Committed);
        info!("Applied {} as {} (sequence {})", mutation.kind(), id, sequence);
        drop(slot);
        Ok(true)
    }

    /// Snapshot the committed store and truncate the WAL
    pub fn checkpoint(&self) -> Result<()> {
        let slot = lock(&self.active);
        if let Some(active) = slot.as_ref() {
            return Err(DbError::ConcurrentTransaction(format!(
                "cannot checkpoint while {} is active",
                active.id
            )));
        }
        if let Some(persistence) = &self.persistence {
            let store = self.snapshot();
            lock(persistence).checkpoint(&store)?;
        }
        Ok(())
    }

    pub fn flush(&self) -> Result<()> {
        if let Some(persistence) = &self.persistence {
            lock(persistence).flush()?;
        }
        Ok(())
    }

    pub fn is_persistent(&self) -> bool {
        self.persistence.is_some()
    }
}
