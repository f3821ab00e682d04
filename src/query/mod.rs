//! Query processing module
//!
//! Cypher subset pipeline: lexer -> parser -> AST -> compiler -> executor.
//! Architecture follows the Volcano iterator model; see `executor`.

pub mod ast;
pub mod executor;
pub mod lexer;
pub mod parser;

// Re-export main types
pub use ast::{Query, Statement};
pub use executor::{
    CancelHandle, CompileError, CompiledQuery, ExecContext, ExecutionError, ExecutionResult, QueryResult, Record, Row,
    Value,
};
pub use lexer::{tokenize, Position, SyntaxError, Token};
pub use parser::{parse_query, ParseError, ParseResult};

use crate::graph::{GraphStore, PropertyValue};
use executor::CompileResult;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

/// Query engine - parses (with an LRU cache of ASTs) and runs read queries
/// against a store snapshot
pub struct QueryEngine {
    /// None when caching is disabled
    cache: Option<Mutex<LruCache<String, Arc<Statement>>>>,
}

impl QueryEngine {
    /// Create a query engine caching up to `capacity` parsed statements
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: NonZeroUsize::new(capacity).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// Parse a statement, reusing the cached AST for repeated text
    pub fn parse(&self, text: &str) -> ParseResult<Arc<Statement>> {
        let Some(cache) = &self.cache else {
            return parse_query(text).map(Arc::new);
        };
        if let Some(statement) = cache.lock().unwrap_or_else(PoisonError::into_inner).get(text) {
            debug!("parse cache hit");
            return Ok(Arc::clone(statement));
        }
        // Parse outside the lock; a racing parse of the same text is harmless
        let statement = Arc::new(parse_query(text)?);
        cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .put(text.to_string(), Arc::clone(&statement));
        Ok(statement)
    }

    /// Number of cached statements
    pub fn cached(&self) -> usize {
        self.cache
            .as_ref()
            .map_or(0, |c| c.lock().unwrap_or_else(PoisonError::into_inner).len())
    }

    /// Compile a read query against the snapshot's indices and return the
    /// lazy result
    pub fn execute(&self, query: &Query, store: Arc<GraphStore>, ctx: ExecContext) -> CompileResult<QueryResult> {
        let CompiledQuery { plan, columns } = executor::compile(query, store.property_index())?;
        debug!(columns = ?columns, "compiled query");
        let root = plan.build();
        Ok(QueryResult::pipeline(columns, store, root, ctx))
    }

    /// The compiled plan as rows, one operator per row
    pub fn explain(&self, query: &Query, store: &GraphStore) -> CompileResult<QueryResult> {
        let compiled = executor::compile(query, store.property_index())?;
        let rows = compiled
            .plan
            .describe()
            .into_iter()
            .map(|(operator, details)| {
                vec![
                    Value::from(PropertyValue::String(operator)),
                    Value::from(PropertyValue::String(details)),
                ]
            })
            .collect();
        Ok(QueryResult::from_rows(
            vec!["operator".to_string(), "details".to_string()],
            rows,
        ))
    }
}

impl Default for QueryEngine {
    fn default() -> Self {
        Self::new(128)
    }
}
