//! Physical operators
//!
//! Each operator is a pull-based iterator over records. Scan and Seek are the
//! leaves (optionally repeated per input record to form a cartesian product),
//! Aggregate and Sort are blocking, everything else streams.

use super::eval::{evaluate, evaluate_predicate};
use super::record::{Record, Value};
use super::{ExecContext, ExecutionError, ExecutionResult};
use crate::graph::{EdgeId, EdgeType, GraphStore, Label, NodeId, PropertyValue};
use crate::query::ast::{AggregateKind, Direction, Expression};
use rustc_hash::{FxHashMap, FxHashSet};
use std::cmp::Ordering;

/// Physical operator trait - all operators implement this
pub trait PhysicalOperator: Send {
    /// Get the next record from this operator
    fn next(&mut self, store: &GraphStore, ctx: &ExecContext) -> ExecutionResult<Option<Record>>;
}

/// Type alias for boxed operators
pub type OperatorBox = Box<dyn PhysicalOperator>;

/// Drives a leaf operator once per input record, or once overall when the
/// leaf has no input.
struct InputCursor {
    input: Option<OperatorBox>,
    current: Option<Record>,
    started: bool,
}

impl InputCursor {
    fn new(input: Option<OperatorBox>) -> Self {
        Self {
            input,
            current: None,
            started: false,
        }
    }

    /// Move to the next driving record; false when exhausted
    fn advance(&mut self, store: &GraphStore, ctx: &ExecContext) -> ExecutionResult<bool> {
        match &mut self.input {
            Some(input) => {
                self.current = input.next(store, ctx)?;
                Ok(self.current.is_some())
            }
            None => {
                if self.started {
                    self.current = None;
                    return Ok(false);
                }
                self.started = true;
                self.current = Some(Record::new());
                Ok(true)
            }
        }
    }
}

fn has_labels(store: &GraphStore, id: NodeId, labels: &[Label]) -> bool {
    match store.get_node(id) {
        Some(node) => labels.iter().all(|label| node.has_label(label.as_str())),
        None => false,
    }
}

/// Node scan operator: MATCH (n:Person)
pub struct NodeScanOperator {
    cursor: InputCursor,
    /// Variable name to bind nodes to
    variable: String,
    /// All labels the node must carry; the first one drives the scan
    labels: Vec<Label>,
    node_ids: Option<Vec<NodeId>>,
    position: usize,
}

impl NodeScanOperator {
    pub fn new(input: Option<OperatorBox>, variable: String, labels: Vec<Label>) -> Self {
        Self {
            cursor: InputCursor::new(input),
            variable,
            labels,
            node_ids: None,
            position: 0,
        }
    }

    fn initialize(&mut self, store: &GraphStore) {
        if self.node_ids.is_some() {
            return;
        }
        // Label index sets are ordered, so the scan runs in ascending id order
        self.node_ids = Some(match self.labels.first() {
            Some(label) => store.node_ids_by_label(label.as_str()),
            None => store.all_node_ids(),
        });
    }
}

impl PhysicalOperator for NodeScanOperator {
    fn next(&mut self, store: &GraphStore, ctx: &ExecContext) -> ExecutionResult<Option<Record>> {
        ctx.check()?;
        self.initialize(store);
        loop {
            if self.cursor.current.is_none() {
                if !self.cursor.advance(store, ctx)? {
                    return Ok(None);
                }
                self.position = 0;
            }
            let ids = self.node_ids.as_deref().unwrap_or(&[]);
            while self.position < ids.len() {
                let id = ids[self.position];
                self.position += 1;
                if self.labels.len() > 1 && !has_labels(store, id, &self.labels[1..]) {
                    continue;
                }
                if let Some(base) = &self.cursor.current {
                    let mut record = base.clone();
                    record.bind(self.variable.clone(), Value::NodeRef(id));
                    return Ok(Some(record));
                }
            }
            self.cursor.current = None;
        }
    }
}

/// Index seek operator: MATCH (n:Person) WHERE n.email = $email
pub struct IndexSeekOperator {
    cursor: InputCursor,
    variable: String,
    label: Label,
    property: String,
    /// Variable-free expression; evaluated once
    value: Expression,
    /// Remaining labels of the node pattern
    extra_labels: Vec<Label>,
    node_ids: Option<Vec<NodeId>>,
    position: usize,
}

impl IndexSeekOperator {
    pub fn new(
        input: Option<OperatorBox>,
        variable: String,
        label: Label,
        property: String,
        value: Expression,
        extra_labels: Vec<Label>,
    ) -> Self {
        Self {
            cursor: InputCursor::new(input),
            variable,
            label,
            property,
            value,
            extra_labels,
            node_ids: None,
            position: 0,
        }
    }

    fn resolve(&mut self, store: &GraphStore, ctx: &ExecContext) -> ExecutionResult<()> {
        if self.node_ids.is_some() {
            return Ok(());
        }
        let value = match evaluate(&self.value, &Record::new(), store, ctx)? {
            Value::Property(p) => p,
            _ => PropertyValue::Null,
        };
        let ids = if value.is_null() {
            Vec::new()
        } else {
            store
                .property_index()
                .lookup(&self.label, &self.property, &value)
                .unwrap_or_default()
        };
        self.node_ids = Some(ids);
        Ok(())
    }
}

impl PhysicalOperator for IndexSeekOperator {
    fn next(&mut self, store: &GraphStore, ctx: &ExecContext) -> ExecutionResult<Option<Record>> {
        ctx.check()?;
        self.resolve(store, ctx)?;
        loop {
            if self.cursor.current.is_none() {
                if !self.cursor.advance(store, ctx)? {
                    return Ok(None);
                }
                self.position = 0;
            }
            let ids = self.node_ids.as_deref().unwrap_or(&[]);
            while self.position < ids.len() {
                let id = ids[self.position];
                self.position += 1;
                if !has_labels(store, id, &self.extra_labels) {
                    continue;
                }
                if let Some(base) = &self.cursor.current {
                    let mut record = base.clone();
                    record.bind(self.variable.clone(), Value::NodeRef(id));
                    return Ok(Some(record));
                }
            }
            self.cursor.current = None;
        }
    }
}

/// Filter operator: WHERE n.age > 30
pub struct FilterOperator {
    input: OperatorBox,
    predicate: Expression,
}

impl FilterOperator {
    pub fn new(input: OperatorBox, predicate: Expression) -> Self {
        Self { input, predicate }
    }
}

impl PhysicalOperator for FilterOperator {
    fn next(&mut self, store: &GraphStore, ctx: &ExecContext) -> ExecutionResult<Option<Record>> {
        while let Some(record) = self.input.next(store, ctx)? {
            if evaluate_predicate(&self.predicate, &record, store, ctx)? {
                return Ok(Some(record));
            }
        }
        Ok(None)
    }
}

/// Expand operator: -[:KNOWS]->
pub struct ExpandOperator {
    input: OperatorBox,
    /// Bound node to expand from
    from: String,
    edge_variable: String,
    to: String,
    /// Empty matches any type
    types: Vec<EdgeType>,
    direction: Direction,
    to_labels: Vec<Label>,
    /// `to` is already bound: only edges reaching that node match
    to_bound: bool,
    /// Edge variables bound earlier in the same pattern; a relationship is
    /// never matched twice
    distinct_from: Vec<String>,
    current: Option<(Record, Vec<(EdgeId, NodeId)>, usize)>,
}

/// Expansion step parameters
#[derive(Debug, Clone, PartialEq)]
pub struct ExpandSpec {
    pub from: String,
    pub edge_variable: String,
    pub to: String,
    pub types: Vec<EdgeType>,
    pub direction: Direction,
    pub to_labels: Vec<Label>,
    pub to_bound: bool,
    pub distinct_from: Vec<String>,
}

impl ExpandOperator {
    pub fn new(input: OperatorBox, spec: ExpandSpec) -> Self {
        Self {
            input,
            from: spec.from,
            edge_variable: spec.edge_variable,
            to: spec.to,
            types: spec.types,
            direction: spec.direction,
            to_labels: spec.to_labels,
            to_bound: spec.to_bound,
            distinct_from: spec.distinct_from,
            current: None,
        }
    }

    fn type_matches(&self, edge_type: &EdgeType) -> bool {
        self.types.is_empty() || self.types.contains(edge_type)
    }

    /// Candidate (edge, other end) pairs in adjacency order
    fn candidates(&self, store: &GraphStore, node: NodeId) -> Vec<(EdgeId, NodeId)> {
        let mut out = Vec::new();
        if matches!(self.direction, Direction::Outgoing | Direction::Both) {
            for &edge_id in store.outgoing_ids(node) {
                if let Some(edge) = store.get_edge(edge_id) {
                    if self.type_matches(&edge.edge_type) {
                        out.push((edge_id, edge.target));
                    }
                }
            }
        }
        if matches!(self.direction, Direction::Incoming | Direction::Both) {
            for &edge_id in store.incoming_ids(node) {
                if let Some(edge) = store.get_edge(edge_id) {
                    // A self-loop was already produced by the outgoing pass
                    if self.direction == Direction::Both && edge.source == edge.target {
                        continue;
                    }
                    if self.type_matches(&edge.edge_type) {
                        out.push((edge_id, edge.source));
                    }
                }
            }
        }
        out
    }

    fn accept(&self, store: &GraphStore, record: &Record, edge_id: EdgeId, other: NodeId) -> bool {
        if self
            .distinct_from
            .iter()
            .any(|var| record.get(var).and_then(Value::edge_id) == Some(edge_id))
        {
            return false;
        }
        if self.to_bound && record.get(&self.to).and_then(Value::node_id) != Some(other) {
            return false;
        }
        has_labels(store, other, &self.to_labels)
    }
}

impl PhysicalOperator for ExpandOperator {
    fn next(&mut self, store: &GraphStore, ctx: &ExecContext) -> ExecutionResult<Option<Record>> {
        ctx.check()?;
        loop {
            if let Some((record, candidates, mut position)) = self.current.take() {
                while position < candidates.len() {
                    let (edge_id, other) = candidates[position];
                    position += 1;
                    if !self.accept(store, &record, edge_id, other) {
                        continue;
                    }
                    let mut out = record.clone();
                    out.bind(self.edge_variable.clone(), Value::EdgeRef(edge_id));
                    if !self.to_bound {
                        out.bind(self.to.clone(), Value::NodeRef(other));
                    }
                    self.current = Some((record, candidates, position));
                    return Ok(Some(out));
                }
            }

            let Some(record) = self.input.next(store, ctx)? else {
                return Ok(None);
            };
            let from = record
                .get(&self.from)
                .and_then(Value::node_id)
                .ok_or_else(|| ExecutionError::UndefinedVariable(self.from.clone()))?;
            let candidates = self.candidates(store, from);
            self.current = Some((record, candidates, 0));
        }
    }
}

/// Project operator: RETURN n.name, n.age AS age
pub struct ProjectOperator {
    /// None produces a single empty driving record (RETURN without MATCH)
    input: Option<OperatorBox>,
    items: Vec<(String, Expression)>,
    distinct: bool,
    seen: FxHashSet<Vec<Value>>,
    unit_done: bool,
}

impl ProjectOperator {
    pub fn new(input: Option<OperatorBox>, items: Vec<(String, Expression)>, distinct: bool) -> Self {
        Self {
            input,
            items,
            distinct,
            seen: FxHashSet::default(),
            unit_done: false,
        }
    }

    fn pull(&mut self, store: &GraphStore, ctx: &ExecContext) -> ExecutionResult<Option<Record>> {
        match &mut self.input {
            Some(input) => input.next(store, ctx),
            None if !self.unit_done => {
                self.unit_done = true;
                Ok(Some(Record::new()))
            }
            None => Ok(None),
        }
    }
}

impl PhysicalOperator for ProjectOperator {
    fn next(&mut self, store: &GraphStore, ctx: &ExecContext) -> ExecutionResult<Option<Record>> {
        while let Some(record) = self.pull(store, ctx)? {
            let mut values = Vec::with_capacity(self.items.len());
            for (_, expr) in &self.items {
                values.push(evaluate(expr, &record, store, ctx)?);
            }
            if self.distinct && !self.seen.insert(values.clone()) {
                continue;
            }
            let mut out = Record::new();
            for ((name, _), value) in self.items.iter().zip(values) {
                out.bind(name.clone(), value);
            }
            return Ok(Some(out));
        }
        Ok(None)
    }
}

/// One aggregate computed by [`AggregateOperator`]
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateSpec {
    pub kind: AggregateKind,
    pub distinct: bool,
    /// Projected column holding the argument; None for count(*)
    pub argument: Option<String>,
    /// Name the result is bound to
    pub output: String,
}

#[derive(Debug)]
enum Accumulator {
    Count(i64),
    Sum { int: i64, float: f64, is_float: bool },
    Avg { sum: f64, n: u64 },
    Min(Option<Value>),
    Max(Option<Value>),
}

impl Accumulator {
    fn new(kind: AggregateKind) -> Self {
        match kind {
            AggregateKind::Count => Accumulator::Count(0),
            AggregateKind::Sum => Accumulator::Sum {
                int: 0,
                float: 0.0,
                is_float: false,
            },
            AggregateKind::Avg => Accumulator::Avg { sum: 0.0, n: 0 },
            AggregateKind::Min => Accumulator::Min(None),
            AggregateKind::Max => Accumulator::Max(None),
        }
    }

    /// Feed one non-null value (or a row, for count(*))
    fn update(&mut self, value: &Value) {
        match self {
            Accumulator::Count(n) => *n += 1,
            Accumulator::Sum { int, float, is_float } => match value.as_property() {
                Some(PropertyValue::Integer(i)) if !*is_float => match int.checked_add(*i) {
                    Some(sum) => *int = sum,
                    None => {
                        *is_float = true;
                        *float = *int as f64 + *i as f64;
                    }
                },
                Some(p) if p.is_numeric() => {
                    if !*is_float {
                        *is_float = true;
                        *float = *int as f64;
                    }
                    *float += p.as_float().unwrap_or(0.0);
                }
                _ => {}
            },
            Accumulator::Avg { sum, n } => {
                if let Some(f) = value.as_property().and_then(PropertyValue::as_float) {
                    *sum += f;
                    *n += 1;
                }
            }
            Accumulator::Min(best) => {
                if best.as_ref().map_or(true, |b| value.sort_cmp(b) == Ordering::Less) {
                    *best = Some(value.clone());
                }
            }
            Accumulator::Max(best) => {
                if best.as_ref().map_or(true, |b| value.sort_cmp(b) == Ordering::Greater) {
                    *best = Some(value.clone());
                }
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            Accumulator::Count(n) => Value::Property(PropertyValue::Integer(n)),
            Accumulator::Sum { int, float, is_float } => Value::Property(if is_float {
                PropertyValue::Float(float)
            } else {
                PropertyValue::Integer(int)
            }),
            Accumulator::Avg { sum, n } => Value::Property(if n == 0 {
                PropertyValue::Null
            } else {
                PropertyValue::Float(sum / n as f64)
            }),
            Accumulator::Min(best) | Accumulator::Max(best) => best.unwrap_or_else(Value::null),
        }
    }
}

struct GroupState {
    keys: Vec<Value>,
    accumulators: Vec<Accumulator>,
    seen: Vec<Option<FxHashSet<Value>>>,
}

/// Aggregate operator: RETURN n.city, count(*)
///
/// Consumes its whole input before yielding. Groups come out in the order
/// they were first seen.
pub struct AggregateOperator {
    input: OperatorBox,
    group_keys: Vec<String>,
    aggregates: Vec<AggregateSpec>,
    /// Final columns, evaluated over the group keys and aggregate results
    outputs: Vec<(String, Expression)>,
    results: Option<std::vec::IntoIter<Record>>,
}

impl AggregateOperator {
    pub fn new(
        input: OperatorBox,
        group_keys: Vec<String>,
        aggregates: Vec<AggregateSpec>,
        outputs: Vec<(String, Expression)>,
    ) -> Self {
        Self {
            input,
            group_keys,
            aggregates,
            outputs,
            results: None,
        }
    }

    fn new_group(&self, keys: Vec<Value>) -> GroupState {
        GroupState {
            keys,
            accumulators: self.aggregates.iter().map(|a| Accumulator::new(a.kind)).collect(),
            seen: self
                .aggregates
                .iter()
                .map(|a| if a.distinct { Some(FxHashSet::default()) } else { None })
                .collect(),
        }
    }

    fn execute(&mut self, store: &GraphStore, ctx: &ExecContext) -> ExecutionResult<Vec<Record>> {
        let mut index: FxHashMap<Vec<Value>, usize> = FxHashMap::default();
        let mut groups: Vec<GroupState> = Vec::new();

        while let Some(record) = self.input.next(store, ctx)? {
            let keys: Vec<Value> = self
                .group_keys
                .iter()
                .map(|k| record.get(k).cloned().unwrap_or_else(Value::null))
                .collect();
            let slot = match index.get(&keys) {
                Some(&slot) => slot,
                None => {
                    groups.push(self.new_group(keys.clone()));
                    index.insert(keys, groups.len() - 1);
                    groups.len() - 1
                }
            };
            let group = &mut groups[slot];
            for (i, spec) in self.aggregates.iter().enumerate() {
                let value = match &spec.argument {
                    None => Value::null(),
                    Some(column) => {
                        let v = record.get(column).cloned().unwrap_or_else(Value::null);
                        if v.is_null() {
                            continue;
                        }
                        v
                    }
                };
                if let Some(seen) = &mut group.seen[i] {
                    if !seen.insert(value.clone()) {
                        continue;
                    }
                }
                group.accumulators[i].update(&value);
            }
        }

        // Without grouping keys an empty input still yields one row
        if groups.is_empty() && self.group_keys.is_empty() {
            groups.push(self.new_group(Vec::new()));
        }

        let mut out = Vec::with_capacity(groups.len());
        for group in groups {
            let mut intermediate = Record::new();
            for (name, value) in self.group_keys.iter().zip(group.keys) {
                intermediate.bind(name.clone(), value);
            }
            for (spec, acc) in self.aggregates.iter().zip(group.accumulators) {
                intermediate.bind(spec.output.clone(), acc.finish());
            }
            let mut record = Record::new();
            for (name, expr) in &self.outputs {
                record.bind(name.clone(), evaluate(expr, &intermediate, store, ctx)?);
            }
            out.push(record);
        }
        Ok(out)
    }
}

impl PhysicalOperator for AggregateOperator {
    fn next(&mut self, store: &GraphStore, ctx: &ExecContext) -> ExecutionResult<Option<Record>> {
        if self.results.is_none() {
            let records = self.execute(store, ctx)?;
            self.results = Some(records.into_iter());
        }
        Ok(self.results.as_mut().and_then(Iterator::next))
    }
}

/// Sort operator: ORDER BY n.age DESC
///
/// Keys name projected columns. Nulls sort last in both directions and the
/// sort is stable, so ties keep input order.
pub struct SortOperator {
    input: OperatorBox,
    /// (column, ascending)
    keys: Vec<(String, bool)>,
    results: Option<std::vec::IntoIter<Record>>,
}

impl SortOperator {
    pub fn new(input: OperatorBox, keys: Vec<(String, bool)>) -> Self {
        Self {
            input,
            keys,
            results: None,
        }
    }

    fn compare(&self, a: &[Value], b: &[Value]) -> Ordering {
        for ((va, vb), (_, ascending)) in a.iter().zip(b).zip(&self.keys) {
            let ord = match (va.is_null(), vb.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => {
                    let ord = va.sort_cmp(vb);
                    if *ascending {
                        ord
                    } else {
                        ord.reverse()
                    }
                }
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl PhysicalOperator for SortOperator {
    fn next(&mut self, store: &GraphStore, ctx: &ExecContext) -> ExecutionResult<Option<Record>> {
        if self.results.is_none() {
            let mut keyed = Vec::new();
            while let Some(record) = self.input.next(store, ctx)? {
                let key: Vec<Value> = self
                    .keys
                    .iter()
                    .map(|(column, _)| record.get(column).cloned().unwrap_or_else(Value::null))
                    .collect();
                keyed.push((key, record));
            }
            keyed.sort_by(|(a, _), (b, _)| self.compare(a, b));
            let records: Vec<Record> = keyed.into_iter().map(|(_, record)| record).collect();
            self.results = Some(records.into_iter());
        }
        Ok(self.results.as_mut().and_then(Iterator::next))
    }
}

/// Limit operator: SKIP 5 LIMIT 10
pub struct LimitOperator {
    input: OperatorBox,
    skip: Option<Expression>,
    limit: Option<Expression>,
    /// (rows still to skip, rows still allowed)
    state: Option<(usize, Option<usize>)>,
}

impl LimitOperator {
    pub fn new(input: OperatorBox, skip: Option<Expression>, limit: Option<Expression>) -> Self {
        Self {
            input,
            skip,
            limit,
            state: None,
        }
    }

    fn row_count(
        expr: &Option<Expression>,
        clause: &str,
        store: &GraphStore,
        ctx: &ExecContext,
    ) -> ExecutionResult<Option<usize>> {
        let Some(expr) = expr else {
            return Ok(None);
        };
        match evaluate(expr, &Record::new(), store, ctx)? {
            Value::Property(PropertyValue::Integer(n)) if n >= 0 => Ok(Some(n as usize)),
            other => Err(ExecutionError::Runtime(format!(
                "{} expects a non-negative integer, got {:?}",
                clause, other
            ))),
        }
    }
}

impl PhysicalOperator for LimitOperator {
    fn next(&mut self, store: &GraphStore, ctx: &ExecContext) -> ExecutionResult<Option<Record>> {
        if self.state.is_none() {
            let skip = Self::row_count(&self.skip, "SKIP", store, ctx)?.unwrap_or(0);
            let limit = Self::row_count(&self.limit, "LIMIT", store, ctx)?;
            self.state = Some((skip, limit));
        }
        let Some((skip, remaining)) = self.state.as_mut() else {
            return Ok(None);
        };

        // Once satisfied, stop pulling from upstream
        if *remaining == Some(0) {
            return Ok(None);
        }
        while *skip > 0 {
            if self.input.next(store, ctx)?.is_none() {
                *remaining = Some(0);
                return Ok(None);
            }
            *skip -= 1;
        }
        match self.input.next(store, ctx)? {
            Some(record) => {
                if let Some(n) = remaining.as_mut() {
                    *n -= 1;
                }
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }
}
