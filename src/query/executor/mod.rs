//! Query execution
//!
//! Compiled plans are turned into a tree of pull-based operators (Volcano
//! model). Each call to `next` yields at most one record, so execution only
//! suspends between operators, and the cancellation check runs once per
//! pulled row.

pub mod create;
pub mod eval;
pub mod operator;
pub mod planner;
pub mod record;

pub use create::{plan_mutations, CreateOutcome};
pub use operator::{OperatorBox, PhysicalOperator};
pub use planner::{
    compile, compile_create, CompileError, CompileResult, CompiledQuery, CreatePlan, CreateStep, PhysicalPlan,
};
pub use record::{Record, Row, Value};

use crate::error::DbError;
use crate::graph::{GraphStore, PropertyValue};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Execution errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    #[error("Variable not defined: {0}")]
    UndefinedVariable(String),

    #[error("Missing parameter: ${0}")]
    MissingParameter(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Query cancelled")]
    Cancelled,

    #[error("Query timed out")]
    TimedOut,
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;

/// Shared flag a caller flips to stop a running query
#[derive(Debug, Clone, Default)]
pub struct CancelHandle(Arc<AtomicBool>);

impl CancelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-query execution state: parameters, deadline and cancellation
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    params: HashMap<String, PropertyValue>,
    deadline: Option<Instant>,
    cancel: Option<CancelHandle>,
}

impl ExecContext {
    pub fn new(
        params: HashMap<String, PropertyValue>,
        timeout: Option<Duration>,
        cancel: Option<CancelHandle>,
    ) -> Self {
        Self {
            params,
            deadline: timeout.map(|t| Instant::now() + t),
            cancel,
        }
    }

    pub fn param(&self, name: &str) -> Option<&PropertyValue> {
        self.params.get(name)
    }

    /// Called at every pull boundary
    pub fn check(&self) -> ExecutionResult<()> {
        if self.cancel.as_ref().is_some_and(CancelHandle::is_cancelled) {
            return Err(ExecutionError::Cancelled);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(ExecutionError::TimedOut);
        }
        Ok(())
    }
}

enum ResultSource {
    Pipeline {
        store: Arc<GraphStore>,
        root: OperatorBox,
        ctx: ExecContext,
    },
    Rows(std::vec::IntoIter<Row>),
}

/// Lazy, finite, non-restartable sequence of result rows.
///
/// The result holds its own snapshot of the store, so later commits are
/// never observed while it is being drained.
pub struct QueryResult {
    columns: Arc<[String]>,
    source: ResultSource,
    done: bool,
}

impl QueryResult {
    /// Wrap an operator tree built from a compiled plan
    pub fn pipeline(columns: Vec<String>, store: Arc<GraphStore>, root: OperatorBox, ctx: ExecContext) -> Self {
        Self {
            columns: columns.into(),
            source: ResultSource::Pipeline { store, root, ctx },
            done: false,
        }
    }

    /// Already materialized rows (summaries, EXPLAIN output)
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        let columns: Arc<[String]> = columns.into();
        let rows: Vec<Row> = rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&columns), values))
            .collect();
        Self {
            columns,
            source: ResultSource::Rows(rows.into_iter()),
            done: false,
        }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Drain every remaining row
    pub fn collect_rows(self) -> crate::Result<Vec<Row>> {
        self.collect()
    }

    fn pull(&mut self) -> ExecutionResult<Option<Row>> {
        match &mut self.source {
            ResultSource::Rows(rows) => Ok(rows.next()),
            ResultSource::Pipeline { store, root, ctx } => {
                ctx.check()?;
                let Some(record) = root.next(store, ctx)? else {
                    return Ok(None);
                };
                let values = self
                    .columns
                    .iter()
                    .map(|column| {
                        record
                            .get(column)
                            .cloned()
                            .unwrap_or_else(Value::null)
                            .materialize(store)
                    })
                    .collect();
                Ok(Some(Row::new(Arc::clone(&self.columns), values)))
            }
        }
    }
}

impl Iterator for QueryResult {
    type Item = crate::Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.pull() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(DbError::from(err)))
            }
        }
    }
}

impl std::fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResult")
            .field("columns", &self.columns)
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_handle() {
        let handle = CancelHandle::new();
        let ctx = ExecContext::new(HashMap::new(), None, Some(handle.clone()));
        assert!(ctx.check().is_ok());
        handle.cancel();
        assert_eq!(ctx.check(), Err(ExecutionError::Cancelled));
    }

    #[test]
    fn test_deadline() {
        let ctx = ExecContext::new(HashMap::new(), Some(Duration::ZERO), None);
        assert_eq!(ctx.check(), Err(ExecutionError::TimedOut));
    }

    #[test]
    fn test_materialized_result() {
        let result = QueryResult::from_rows(
            vec!["x".to_string()],
            vec![vec![Value::from(PropertyValue::Integer(1))], vec![Value::null()]],
        );
        assert_eq!(result.columns(), &["x".to_string()]);
        let rows = result.collect_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert!(rows[1].get("x").unwrap().is_null());
    }
}
