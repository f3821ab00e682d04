//! Secondary indices and uniqueness constraints
//!
//! Provides B-tree indices keyed by (label, property) and the catalog that
//! enforces unique constraints on top of them.

pub mod manager;
pub mod property_index;

pub use manager::{
    DefineOutcome, IndexDefinition, IndexError, IndexKind, IndexManager, IndexResult, PropertyIndexKey,
};
pub use property_index::PropertyIndex;
