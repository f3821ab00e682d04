//! Snapshot files
//!
//! Layout: magic, format version, watermark (last sequence the snapshot
//! covers), compression flag, crc32 and length of the payload, then the
//! payload: a bincode `StoreImage`, gzipped when the flag is set. Files are
//! written to a temporary path, synced and renamed into place.

use crate::graph::StoreImage;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

const MAGIC: &[u8; 8] = b"GCSNAPSH";
const FORMAT_VERSION: u32 = 1;
const HEADER_LEN: usize = 8 + 4 + 8 + 1 + 4 + 8;
const FLAG_GZIP: u8 = 1;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Snapshot encoding failed: {0}")]
    Encode(bincode::Error),

    #[error("Not a snapshot file")]
    BadMagic,

    #[error("Unsupported snapshot format version {0}")]
    UnsupportedVersion(u32),

    #[error("Corrupt snapshot: {0}")]
    Corrupt(String),

    #[error("Undecodable snapshot payload: {0}")]
    Decode(bincode::Error),
}

pub type SnapshotResult<T> = Result<T, SnapshotError>;

/// Write `image` covering everything up to `watermark`
pub fn write_snapshot(path: &Path, image: &StoreImage, watermark: u64, compress: bool) -> SnapshotResult<u64> {
    let raw = bincode::serialize(image).map_err(SnapshotError::Encode)?;
    let payload = if compress {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&raw)?;
        encoder.finish()?
    } else {
        raw
    };

    let mut bytes = Vec::with_capacity(HEADER_LEN + payload.len());
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&watermark.to_le_bytes());
    bytes.push(if compress { FLAG_GZIP } else { 0 });
    let payload_len = u64::try_from(payload.len())
        .map_err(|_| SnapshotError::Corrupt(format!("payload of {} bytes overflows the length field", payload.len())))?;
    bytes.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    bytes.extend_from_slice(&payload_len.to_le_bytes());
    bytes.extend_from_slice(&payload);

    let tmp = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    // The caller truncates the WAL next, so the rename must be durable first
    if let Some(dir) = path.parent() {
        sync_dir(dir)?;
    }
    info!(
        "Wrote snapshot {:?} at watermark {} ({} bytes, compressed: {})",
        path,
        watermark,
        bytes.len(),
        compress
    );
    Ok(HEADER_LEN as u64 + payload_len)
}

/// Make a rename inside `dir` durable
#[cfg(unix)]
fn sync_dir(dir: &Path) -> io::Result<()> {
    let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
    File::open(dir)?.sync_all()
}

/// Directories cannot be opened for syncing here
#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(buf)
}

/// Load a snapshot; `None` when the file does not exist
pub fn read_snapshot(path: &Path) -> SnapshotResult<Option<(u64, StoreImage)>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if bytes.len() < HEADER_LEN {
        return Err(SnapshotError::Corrupt(format!("file is only {} bytes", bytes.len())));
    }
    if &bytes[0..8] != MAGIC {
        return Err(SnapshotError::BadMagic);
    }
    let version = read_u32(&bytes, 8);
    if version != FORMAT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }
    let watermark = read_u64(&bytes, 12);
    let flags = bytes[20];
    let crc = read_u32(&bytes, 21);
    let declared = read_u64(&bytes, 25);
    let len = usize::try_from(declared)
        .map_err(|_| SnapshotError::Corrupt(format!("payload length {} exceeds the address space", declared)))?;
    let payload = &bytes[HEADER_LEN..];
    if payload.len() != len {
        return Err(SnapshotError::Corrupt(format!(
            "payload is {} bytes, header says {}",
            payload.len(),
            len
        )));
    }
    if crc32fast::hash(payload) != crc {
        return Err(SnapshotError::Corrupt("checksum mismatch".to_string()));
    }

    let raw = if flags & FLAG_GZIP != 0 {
        let mut raw = Vec::new();
        GzDecoder::new(payload)
            .read_to_end(&mut raw)
            .map_err(|err| SnapshotError::Corrupt(format!("gzip: {}", err)))?;
        raw
    } else {
        payload.to_vec()
    };
    let image: StoreImage = bincode::deserialize(&raw).map_err(SnapshotError::Decode)?;
    debug!(watermark, nodes = image.nodes.len(), "loaded snapshot");
    Ok(Some((watermark, image)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{GraphStore, Label, NodeId};
    use crate::props;
    use tempfile::TempDir;

    fn image() -> StoreImage {
        let mut store = GraphStore::new();
        store
            .insert_node(NodeId::new(1), &[Label::new("Person")], &props! { "name" => "Alice" }, None)
            .unwrap();
        store.to_image()
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let dir = TempDir::new().unwrap();
        for compress in [true, false] {
            let path = dir.path().join(format!("graph-{}.snap", compress));
            write_snapshot(&path, &image(), 42, compress).unwrap();
            let (watermark, loaded) = read_snapshot(&path).unwrap().unwrap();
            assert_eq!(watermark, 42);
            assert_eq!(loaded.nodes.len(), 1);
            assert!(!path.with_extension("tmp").exists());
        }
    }

    #[test]
    fn test_missing_snapshot() {
        let dir = TempDir::new().unwrap();
        assert!(read_snapshot(&dir.path().join("none.snap")).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.snap");
        write_snapshot(&path, &image(), 1, true).unwrap();
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x55;
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(read_snapshot(&path), Err(SnapshotError::Corrupt(_))));

        fs::write(&path, b"not a snapshot at all, clearly not").unwrap();
        assert!(matches!(read_snapshot(&path), Err(SnapshotError::BadMagic)));
    }

    #[test]
    fn test_oversized_length_field() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("graph.snap");
        let written = write_snapshot(&path, &image(), 1, false).unwrap();
        let mut bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len() as u64, written);

        bytes[25..33].copy_from_slice(&u64::MAX.to_le_bytes());
        fs::write(&path, &bytes).unwrap();
        assert!(matches!(read_snapshot(&path), Err(SnapshotError::Corrupt(_))));
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_sync_failure_is_reported() {
        let dir = TempDir::new().unwrap();
        assert!(sync_dir(dir.path()).is_ok());
        assert!(sync_dir(&dir.path().join("missing")).is_err());
    }
}
