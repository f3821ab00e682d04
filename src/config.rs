//! Typed configuration
//!
//! Every capability is passed in explicitly; nothing is looked up by name.

use crate::graph::PropertyValue;
use crate::query::CancelHandle;
use crate::transaction::TxnId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How hard a commit pushes its WAL records to disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncMode {
    /// fsync on every commit
    #[default]
    Full,
    /// Flush to the OS only; survives a process crash, not a power loss
    Flush,
}

/// Database configuration
#[derive(Debug, Clone, PartialEq)]
pub struct GraphConfig {
    /// Directory holding the WAL and snapshot (None = in-memory only)
    pub data_dir: Option<PathBuf>,
    pub sync_mode: SyncMode,
    /// Gzip snapshot payloads
    pub compress_snapshots: bool,
    /// Applied to queries that do not set their own timeout
    pub default_query_timeout: Option<Duration>,
    /// Parsed statements kept in the LRU cache (0 disables it)
    pub parse_cache_capacity: usize,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            sync_mode: SyncMode::Full,
            compress_snapshots: true,
            default_query_timeout: None,
            parse_cache_capacity: 128,
        }
    }
}

impl GraphConfig {
    /// Purely in-memory graph, nothing survives the process
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Durable graph stored under `path`
    pub fn persistent(path: impl AsRef<Path>) -> Self {
        Self {
            data_dir: Some(path.as_ref().to_path_buf()),
            ..Self::default()
        }
    }

    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    pub fn with_compression(mut self, compress: bool) -> Self {
        self.compress_snapshots = compress;
        self
    }

    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.default_query_timeout = Some(timeout);
        self
    }

    pub fn with_parse_cache(mut self, capacity: usize) -> Self {
        self.parse_cache_capacity = capacity;
        self
    }

    pub fn is_persistent(&self) -> bool {
        self.data_dir.is_some()
    }
}

/// Per-query options
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
    pub params: HashMap<String, PropertyValue>,
    /// Overrides the configured default timeout
    pub timeout: Option<Duration>,
    pub cancel: Option<CancelHandle>,
    /// Run inside this open transaction: reads see its staged writes and
    /// CREATE stages into it
    pub transaction: Option<TxnId>,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn param(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: HashMap<String, PropertyValue>) -> Self {
        self.params.extend(params);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_cancel(mut self, cancel: CancelHandle) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn in_transaction(mut self, id: TxnId) -> Self {
        self.transaction = Some(id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GraphConfig::default();
        assert!(!config.is_persistent());
        assert_eq!(config.sync_mode, SyncMode::Full);
        assert_eq!(config.parse_cache_capacity, 128);
    }

    #[test]
    fn test_builders() {
        let config = GraphConfig::persistent("/tmp/graph")
            .with_sync_mode(SyncMode::Flush)
            .with_compression(false)
            .with_query_timeout(Duration::from_secs(5));
        assert_eq!(config.data_dir.as_deref(), Some(Path::new("/tmp/graph")));
        assert_eq!(config.sync_mode, SyncMode::Flush);
        assert!(!config.compress_snapshots);
        assert_eq!(config.default_query_timeout, Some(Duration::from_secs(5)));

        let options = QueryOptions::new().param("name", "Alice").with_timeout(Duration::from_millis(10));
        assert_eq!(options.params.get("name"), Some(&PropertyValue::from("Alice")));
        assert!(options.transaction.is_none());
        let options = options.in_transaction(TxnId::new(7));
        assert_eq!(options.transaction, Some(TxnId::new(7)));
    }
}
