//! Public error taxonomy
//!
//! Every layer keeps its own error enum; the database surface converts them
//! into `DbError` so callers can match on the category via [`DbError::kind`].

use crate::graph::GraphError;
use crate::index::IndexError;
use crate::persistence::{PersistenceError, SnapshotError, WalError};
use crate::query::executor::{CompileError, ExecutionError};
use crate::query::{ParseError, SyntaxError};
use thiserror::Error;

/// Error category without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Syntax,
    Compilation,
    Runtime,
    ConstraintViolation,
    ConcurrentTransaction,
    NoActiveTransaction,
    DuplicateDefinition,
    UnsupportedFeature,
    Recovery,
    Cancelled,
    Storage,
    WalUnwritable,
    Graph,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Syntax error: {0}")]
    Syntax(SyntaxError),

    #[error("Compilation error: {0}")]
    Compilation(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Concurrent transaction: {0}")]
    ConcurrentTransaction(String),

    #[error("No active transaction: {0}")]
    NoActiveTransaction(String),

    #[error("Duplicate definition: {0}")]
    DuplicateDefinition(String),

    #[error("Unsupported feature: {0}")]
    UnsupportedFeature(String),

    #[error("Recovery failed: {0}")]
    Recovery(String),

    #[error("Query cancelled: {0}")]
    Cancelled(String),

    /// A single commit or checkpoint failed; the engine is still usable
    #[error("Storage error: {0}")]
    Storage(String),

    /// The WAL can no longer be written; no further writes are accepted
    #[error("WAL unwritable: {0}")]
    WalUnwritable(String),

    #[error("Graph error: {0}")]
    Graph(GraphError),
}

impl DbError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DbError::Syntax(_) => ErrorKind::Syntax,
            DbError::Compilation(_) => ErrorKind::Compilation,
            DbError::Runtime(_) => ErrorKind::Runtime,
            DbError::ConstraintViolation(_) => ErrorKind::ConstraintViolation,
            DbError::ConcurrentTransaction(_) => ErrorKind::ConcurrentTransaction,
            DbError::NoActiveTransaction(_) => ErrorKind::NoActiveTransaction,
            DbError::DuplicateDefinition(_) => ErrorKind::DuplicateDefinition,
            DbError::UnsupportedFeature(_) => ErrorKind::UnsupportedFeature,
            DbError::Recovery(_) => ErrorKind::Recovery,
            DbError::Cancelled(_) => ErrorKind::Cancelled,
            DbError::Storage(_) => ErrorKind::Storage,
            DbError::WalUnwritable(_) => ErrorKind::WalUnwritable,
            DbError::Graph(_) => ErrorKind::Graph,
        }
    }
}

pub type Result<T> = std::result::Result<T, DbError>;

impl From<IndexError> for DbError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::DuplicateDefinition { .. } => DbError::DuplicateDefinition(err.to_string()),
            IndexError::ConstraintViolation { .. } => DbError::ConstraintViolation(err.to_string()),
        }
    }
}

impl From<GraphError> for DbError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Index(inner) => inner.into(),
            GraphError::EntityKeyExists(_) => DbError::ConstraintViolation(err.to_string()),
            other => DbError::Graph(other),
        }
    }
}

impl From<SyntaxError> for DbError {
    fn from(err: SyntaxError) -> Self {
        DbError::Syntax(err)
    }
}

impl From<ParseError> for DbError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Syntax(inner) => DbError::Syntax(inner),
            unsupported @ ParseError::Unsupported { .. } => DbError::UnsupportedFeature(unsupported.to_string()),
        }
    }
}

impl From<CompileError> for DbError {
    fn from(err: CompileError) -> Self {
        match err {
            CompileError::Unsupported(feature) => DbError::UnsupportedFeature(feature),
            other => DbError::Compilation(other.to_string()),
        }
    }
}

impl From<ExecutionError> for DbError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Cancelled | ExecutionError::TimedOut => DbError::Cancelled(err.to_string()),
            other => DbError::Runtime(other.to_string()),
        }
    }
}

impl From<WalError> for DbError {
    fn from(err: WalError) -> Self {
        match err {
            WalError::Poisoned => DbError::WalUnwritable(err.to_string()),
            WalError::Corrupt { .. }
            | WalError::Decode { .. }
            | WalError::Sequence { .. }
            | WalError::Misplaced { .. } => {
                DbError::Recovery(err.to_string())
            }
            other => DbError::Storage(other.to_string()),
        }
    }
}

impl From<SnapshotError> for DbError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::Io(_) | SnapshotError::Encode(_) => DbError::Storage(err.to_string()),
            other => DbError::Recovery(other.to_string()),
        }
    }
}

impl From<PersistenceError> for DbError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::Wal(inner) => inner.into(),
            PersistenceError::Snapshot(inner) => inner.into(),
            PersistenceError::Replay(inner) => DbError::Recovery(inner.to_string()),
            PersistenceError::Io(inner) => DbError::Storage(inner.to_string()),
        }
    }
}
