//! Persistence layer
//!
//! A data directory holds two files: `graph.wal`, the append-only log of
//! committed transactions, and `graph.snap`, the latest checkpoint. Opening
//! loads the snapshot and replays WAL transactions with sequence numbers
//! above its watermark.

pub mod snapshot;
pub mod wal;

pub use snapshot::{read_snapshot, write_snapshot, SnapshotError, SnapshotResult};
pub use wal::{Wal, WalEntry, WalError, WalRecord, WalResult};

use crate::config::SyncMode;
use crate::graph::{GraphError, GraphStore, Mutation};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

pub const WAL_FILE: &str = "graph.wal";
pub const SNAPSHOT_FILE: &str = "graph.snap";

/// Persistence errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("WAL error: {0}")]
    Wal(#[from] WalError),

    #[error("Snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    /// A logged transaction no longer applies to the recovered store
    #[error("Replay failed: {0}")]
    Replay(GraphError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// What recovery found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryStats {
    pub snapshot_watermark: Option<u64>,
    pub replayed_transactions: usize,
    pub replayed_mutations: usize,
    pub sequence: u64,
}

/// Apply the committed transactions among `records` whose sequence numbers
/// lie above `watermark`
pub fn replay(store: &mut GraphStore, records: &[WalRecord], watermark: u64) -> PersistenceResult<RecoveryStats> {
    let mut stats = RecoveryStats::default();
    let mut pending: Option<(u64, Vec<&Mutation>)> = None;

    for record in records.iter().filter(|r| r.sequence > watermark) {
        let corrupt = |reason: &str| {
            PersistenceError::Wal(WalError::Misplaced {
                sequence: record.sequence,
                txn_id: record.txn_id,
                reason: reason.to_string(),
            })
        };
        match &record.entry {
            WalEntry::Begin => {
                if pending.is_some() {
                    return Err(corrupt("transaction began before the previous one committed"));
                }
                pending = Some((record.txn_id, Vec::new()));
            }
            WalEntry::Mutation(mutation) => match &mut pending {
                Some((txn, mutations)) if *txn == record.txn_id => mutations.push(mutation),
                _ => return Err(corrupt("mutation outside its transaction")),
            },
            WalEntry::Commit => {
                let Some((txn, mutations)) = pending.take() else {
                    return Err(corrupt("commit without begin"));
                };
                if txn != record.txn_id {
                    return Err(corrupt("commit for a different transaction"));
                }
                for mutation in &mutations {
                    store.apply(mutation).map_err(PersistenceError::Replay)?;
                }
                store.set_sequence(record.sequence);
                debug!(txn, mutations = mutations.len(), sequence = record.sequence, "replayed transaction");
                stats.replayed_transactions += 1;
                stats.replayed_mutations += mutations.len();
            }
        }
    }
    stats.sequence = store.sequence();
    Ok(stats)
}

/// Owner of the WAL and snapshot files of one data directory
#[derive(Debug)]
pub struct PersistenceManager {
    dir: PathBuf,
    wal: Wal,
    compress_snapshots: bool,
}

impl PersistenceManager {
    /// Open the data directory and rebuild the committed store
    pub fn open(
        dir: impl AsRef<Path>,
        sync_mode: SyncMode,
        compress_snapshots: bool,
    ) -> PersistenceResult<(Self, GraphStore, RecoveryStats)> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        info!("Opening data directory {:?}", dir);

        let (mut store, watermark) = match read_snapshot(&dir.join(SNAPSHOT_FILE))? {
            Some((watermark, image)) => {
                let mut store = GraphStore::from_image(image).map_err(PersistenceError::Replay)?;
                store.set_sequence(watermark);
                info!("Loaded snapshot at watermark {}", watermark);
                (store, Some(watermark))
            }
            None => (GraphStore::new(), None),
        };

        let (mut wal, records) = Wal::open(dir.join(WAL_FILE), sync_mode)?;
        let mut stats = replay(&mut store, &records, watermark.unwrap_or(0))?;
        stats.snapshot_watermark = watermark;
        wal.ensure_sequence(store.sequence());
        info!(
            "Recovered {} transactions ({} mutations), sequence {}",
            stats.replayed_transactions, stats.replayed_mutations, stats.sequence
        );

        Ok((
            Self {
                dir,
                wal,
                compress_snapshots,
            },
            store,
            stats,
        ))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn wal(&self) -> &Wal {
        &self.wal
    }

    /// Durably log one transaction; returns its commit sequence
    pub fn log_transaction(&mut self, txn_id: u64, mutations: &[Mutation]) -> PersistenceResult<u64> {
        Ok(self.wal.append_transaction(txn_id, mutations)?)
    }

    /// Snapshot `store` and drop the WAL records it covers
    pub fn checkpoint(&mut self, store: &GraphStore) -> PersistenceResult<()> {
        let watermark = store.sequence();
        write_snapshot(&self.dir.join(SNAPSHOT_FILE), &store.to_image(), watermark, self.compress_snapshots)?;
        self.wal.truncate()?;
        info!("Checkpoint complete at sequence {}", watermark);
        Ok(())
    }

    pub fn flush(&mut self) -> PersistenceResult<()> {
        Ok(self.wal.flush()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeId, EdgeType, Label, NodeId, PropertyMap};
    use crate::props;
    use tempfile::TempDir;

    fn create_node(id: u64, name: &str) -> Mutation {
        Mutation::CreateNode {
            id: NodeId::new(id),
            labels: vec![Label::new("Person")],
            properties: props! { "name" => name },
            entity_key: None,
        }
    }

    #[test]
    fn test_replay_rebuilds_store() {
        let dir = TempDir::new().unwrap();
        let mut expected = GraphStore::new();
        {
            let (mut pm, _, stats) = PersistenceManager::open(dir.path(), SyncMode::Full, true).unwrap();
            assert_eq!(stats.replayed_transactions, 0);
            let txn = vec![
                create_node(1, "Alice"),
                create_node(2, "Bob"),
                Mutation::CreateEdge {
                    id: EdgeId::new(1),
                    source: NodeId::new(1),
                    target: NodeId::new(2),
                    edge_type: EdgeType::new("KNOWS"),
                    properties: PropertyMap::new(),
                },
            ];
            for m in &txn {
                expected.apply(m).unwrap();
            }
            let seq = pm.log_transaction(1, &txn).unwrap();
            expected.set_sequence(seq);
        }
        let (_, store, stats) = PersistenceManager::open(dir.path(), SyncMode::Full, true).unwrap();
        assert_eq!(stats.replayed_transactions, 1);
        assert_eq!(stats.replayed_mutations, 3);
        assert_eq!(store, expected);
    }

    #[test]
    fn test_checkpoint_then_more_writes() {
        let dir = TempDir::new().unwrap();
        {
            let (mut pm, mut store, _) = PersistenceManager::open(dir.path(), SyncMode::Flush, false).unwrap();
            let first = vec![create_node(1, "Alice")];
            store.apply(&first[0]).unwrap();
            store.set_sequence(pm.log_transaction(1, &first).unwrap());
            pm.checkpoint(&store).unwrap();
            assert!(pm.wal().is_empty());

            let second = vec![create_node(2, "Bob")];
            let seq = pm.log_transaction(2, &second).unwrap();
            assert!(seq > store.sequence());
        }
        let (_, store, stats) = PersistenceManager::open(dir.path(), SyncMode::Flush, false).unwrap();
        assert_eq!(stats.snapshot_watermark, Some(3));
        assert_eq!(stats.replayed_transactions, 1);
        assert_eq!(store.node_count(), 2);
    }

    #[test]
    fn test_failed_snapshot_keeps_wal() {
        let dir = TempDir::new().unwrap();
        let (mut pm, mut store, _) = PersistenceManager::open(dir.path(), SyncMode::Flush, true).unwrap();
        let first = vec![create_node(1, "Alice")];
        store.apply(&first[0]).unwrap();
        store.set_sequence(pm.log_transaction(1, &first).unwrap());

        // A non-empty directory where the snapshot should go makes the rename fail
        let blocker = dir.path().join(SNAPSHOT_FILE);
        std::fs::create_dir(&blocker).unwrap();
        std::fs::write(blocker.join("keep"), b"x").unwrap();
        assert!(pm.checkpoint(&store).is_err());
        assert!(!pm.wal().is_empty());
        drop(pm);

        std::fs::remove_dir_all(&blocker).unwrap();
        let (_, recovered, stats) = PersistenceManager::open(dir.path(), SyncMode::Flush, true).unwrap();
        assert_eq!(stats.replayed_transactions, 1);
        assert_eq!(recovered, store);
    }

    #[test]
    fn test_replay_skips_records_below_watermark() {
        let mut store = GraphStore::new();
        let records = vec![
            WalRecord { sequence: 1, txn_id: 1, entry: WalEntry::Begin },
            WalRecord { sequence: 2, txn_id: 1, entry: WalEntry::Mutation(create_node(1, "A")) },
            WalRecord { sequence: 3, txn_id: 1, entry: WalEntry::Commit },
        ];
        let stats = replay(&mut store, &records, 3).unwrap();
        assert_eq!(stats.replayed_transactions, 0);
        assert_eq!(store.node_count(), 0);

        let stats = replay(&mut store, &records, 0).unwrap();
        assert_eq!(stats.replayed_transactions, 1);
        assert_eq!(store.sequence(), 3);
    }

    #[test]
    fn test_replay_rejects_interleaving() {
        let mut store = GraphStore::new();
        let records = vec![
            WalRecord { sequence: 1, txn_id: 1, entry: WalEntry::Begin },
            WalRecord { sequence: 2, txn_id: 2, entry: WalEntry::Mutation(create_node(1, "A")) },
        ];
        match replay(&mut store, &records, 0) {
            Err(PersistenceError::Wal(WalError::Misplaced { sequence, txn_id, .. })) => {
                assert_eq!((sequence, txn_id), (2, 2));
            }
            other => panic!("expected a misplaced record, got {:?}", other),
        }
        let err: crate::error::DbError = replay(&mut store, &records, 0).unwrap_err().into();
        assert_eq!(err.kind(), crate::error::ErrorKind::Recovery);
        assert!(err.to_string().contains("record 2"), "{}", err);
    }
}
