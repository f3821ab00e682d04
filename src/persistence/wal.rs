//! Write-Ahead Log (WAL) implementation
//!
//! One append-only file of length-prefixed, checksummed frames:
//! `[len u32 LE][crc32 u32 LE][bincode WalRecord]`. A transaction is written
//! as `Begin`, its mutations, then `Commit`, in a single write. Sequence
//! numbers are strictly increasing across the whole log.

use crate::config::SyncMode;
use crate::graph::Mutation;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, error, info, warn};

const FRAME_HEADER: usize = 8;

/// WAL errors
#[derive(Error, Debug)]
pub enum WalError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Checksum mismatch or torn frame
    #[error("WAL corruption at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    #[error("Undecodable WAL record at offset {offset}: {source}")]
    Decode { offset: u64, source: bincode::Error },

    #[error("WAL sequence {found} at offset {offset} does not follow {previous}")]
    Sequence { offset: u64, previous: u64, found: u64 },

    /// Well-formed record that breaks transaction framing
    #[error("WAL record {sequence} (transaction {txn_id}) out of place: {reason}")]
    Misplaced { sequence: u64, txn_id: u64, reason: String },

    /// A failed commit could not be rolled back out of the file
    #[error("WAL is unwritable")]
    Poisoned,
}

pub type WalResult<T> = Result<T, WalError>;

/// Write-Ahead Log entry types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalEntry {
    Begin,
    Mutation(Mutation),
    Commit,
}

/// WAL record with metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalRecord {
    /// Sequence number (monotonically increasing)
    pub sequence: u64,
    pub txn_id: u64,
    pub entry: WalEntry,
}

fn encode_frame(buf: &mut Vec<u8>, record: &WalRecord) -> WalResult<()> {
    let body = bincode::serialize(record)?;
    buf.extend_from_slice(&(body.len() as u32).to_le_bytes());
    buf.extend_from_slice(&crc32fast::hash(&body).to_le_bytes());
    buf.extend_from_slice(&body);
    Ok(())
}

/// Decode every frame, returning the records and the byte offset just past
/// the last `Commit`
fn decode_frames(bytes: &[u8]) -> WalResult<(Vec<WalRecord>, u64)> {
    let mut records = Vec::new();
    let mut offset = 0usize;
    let mut previous = 0u64;
    let mut committed_len = 0u64;

    while offset < bytes.len() {
        let at = offset as u64;
        if bytes.len() - offset < FRAME_HEADER {
            return Err(WalError::Corrupt {
                offset: at,
                reason: "truncated frame header".to_string(),
            });
        }
        let len = u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]]) as usize;
        let crc = u32::from_le_bytes([bytes[offset + 4], bytes[offset + 5], bytes[offset + 6], bytes[offset + 7]]);
        let start = offset + FRAME_HEADER;
        if bytes.len() - start < len {
            return Err(WalError::Corrupt {
                offset: at,
                reason: format!("truncated frame body ({} of {} bytes)", bytes.len() - start, len),
            });
        }
        let body = &bytes[start..start + len];
        if crc32fast::hash(body) != crc {
            return Err(WalError::Corrupt {
                offset: at,
                reason: "checksum mismatch".to_string(),
            });
        }
        let record: WalRecord =
            bincode::deserialize(body).map_err(|source| WalError::Decode { offset: at, source })?;
        if record.sequence <= previous {
            return Err(WalError::Sequence {
                offset: at,
                previous,
                found: record.sequence,
            });
        }
        previous = record.sequence;
        offset = start + len;
        if record.entry == WalEntry::Commit {
            committed_len = offset as u64;
        }
        debug!(sequence = record.sequence, txn = record.txn_id, "decoded WAL record");
        records.push(record);
    }
    Ok((records, committed_len))
}

/// Write-Ahead Log manager
#[derive(Debug)]
pub struct Wal {
    path: PathBuf,
    file: File,
    /// Bytes of complete, committed frames
    len: u64,
    /// Last sequence number written
    sequence: u64,
    sync_mode: SyncMode,
    poisoned: bool,
}

impl Wal {
    /// Open (or create) the log and read back every complete record.
    ///
    /// Records of a trailing transaction without `Commit` are dropped from
    /// the file. Any damaged frame fails the open.
    pub fn open(path: impl AsRef<Path>, sync_mode: SyncMode) -> WalResult<(Self, Vec<WalRecord>)> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new().create(true).read(true).append(true).open(&path)?;

        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)?;
        let (mut records, committed_len) = decode_frames(&bytes)?;

        if committed_len < bytes.len() as u64 {
            let tail: Vec<_> = records
                .iter()
                .rev()
                .take_while(|r| r.entry != WalEntry::Commit)
                .map(|r| r.sequence)
                .collect();
            warn!(
                records = tail.len(),
                bytes = bytes.len() as u64 - committed_len,
                "discarding uncommitted WAL tail"
            );
            records.truncate(records.len() - tail.len());
            file.set_len(committed_len)?;
            file.sync_all()?;
        }

        let sequence = records.last().map_or(0, |r| r.sequence);
        info!("Opened WAL at {:?}: {} records, sequence {}", path, records.len(), sequence);
        Ok((
            Self {
                path,
                file,
                len: committed_len,
                sequence,
                sync_mode,
                poisoned: false,
            },
            records,
        ))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last sequence number written
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Never hand out a sequence at or below `sequence` (snapshot watermark)
    pub fn ensure_sequence(&mut self, sequence: u64) {
        self.sequence = self.sequence.max(sequence);
    }

    /// Size of the log in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Append one transaction and make it durable. Returns the sequence of
    /// its `Commit` record.
    ///
    /// On failure the file is cut back to its previous length; if that fails
    /// too the log is poisoned and refuses all further writes.
    pub fn append_transaction(&mut self, txn_id: u64, mutations: &[Mutation]) -> WalResult<u64> {
        if self.poisoned {
            return Err(WalError::Poisoned);
        }

        let mut buf = Vec::new();
        let mut sequence = self.sequence;
        let entries = std::iter::once(WalEntry::Begin)
            .chain(mutations.iter().cloned().map(WalEntry::Mutation))
            .chain(std::iter::once(WalEntry::Commit));
        for entry in entries {
            sequence += 1;
            encode_frame(
                &mut buf,
                &WalRecord {
                    sequence,
                    txn_id,
                    entry,
                },
            )?;
        }

        if let Err(err) = self.write_durable(&buf) {
            error!("WAL write failed for transaction {}: {}", txn_id, err);
            if let Err(truncate_err) = self.file.set_len(self.len).and_then(|_| self.file.sync_all()) {
                error!("Could not roll back partial WAL write: {}", truncate_err);
                self.poisoned = true;
                return Err(WalError::Poisoned);
            }
            return Err(err);
        }

        self.len += buf.len() as u64;
        self.sequence = sequence;
        debug!(txn = txn_id, records = mutations.len() + 2, sequence, "appended transaction to WAL");
        Ok(sequence)
    }

    fn write_durable(&mut self, buf: &[u8]) -> WalResult<()> {
        self.file.write_all(buf)?;
        match self.sync_mode {
            SyncMode::Full => self.file.sync_data()?,
            SyncMode::Flush => self.file.flush()?,
        }
        Ok(())
    }

    /// Force flush the WAL
    pub fn flush(&mut self) -> WalResult<()> {
        self.file.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    /// Drop every record; called once a snapshot covers them
    pub fn truncate(&mut self) -> WalResult<()> {
        if self.poisoned {
            return Err(WalError::Poisoned);
        }
        self.file.set_len(0)?;
        self.file.sync_all()?;
        info!("Truncated WAL at {:?} (sequence {})", self.path, self.sequence);
        self.len = 0;
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn poison(&mut self) {
        self.poisoned = true;
    }
}
