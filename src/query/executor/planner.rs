//! Query planner - lowers an AST into a physical plan
//!
//! Binding analysis and access-path choice happen here. Every node pattern
//! is either scanned by label, sought through a property index, or reached
//! by expanding from an already bound node. Operators are attached in a
//! fixed order: match, filter, project, aggregate, order, limit.

use super::eval::is_scalar_function;
use super::operator::{
    AggregateOperator, AggregateSpec, ExpandOperator, ExpandSpec, FilterOperator, IndexSeekOperator, LimitOperator,
    NodeScanOperator, OperatorBox, ProjectOperator, SortOperator,
};
use crate::graph::{EdgeType, Label, PropertyValue};
use crate::index::{IndexManager, PropertyIndex};
use crate::query::ast::*;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Compilation errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Variable not defined: {0}")]
    UnknownVariable(String),

    #[error("Variable `{variable}` is already bound to a {existing}")]
    VariableKindConflict { variable: String, existing: &'static str },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Invalid aggregation: {0}")]
    InvalidAggregation(String),

    #[error("Duplicate column name: {0}")]
    DuplicateColumn(String),

    #[error("ORDER BY expression {0} must be one of the returned columns")]
    OrderByNotProjected(String),

    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),
}

pub type CompileResult<T> = Result<T, CompileError>;

/// Physical plan: a closed set of operators, each with at most one input
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalPlan {
    /// Label scan (or all nodes), repeated per input row when there is one
    NodeScan {
        input: Option<Box<PhysicalPlan>>,
        variable: String,
        labels: Vec<Label>,
    },
    /// Equality lookup through a property index
    IndexSeek {
        input: Option<Box<PhysicalPlan>>,
        variable: String,
        label: Label,
        property: String,
        value: Expression,
        extra_labels: Vec<Label>,
    },
    Filter {
        input: Box<PhysicalPlan>,
        predicate: Expression,
    },
    Expand {
        input: Box<PhysicalPlan>,
        spec: ExpandSpec,
    },
    /// Columns starting with `__` are internal and never returned
    Project {
        input: Option<Box<PhysicalPlan>>,
        items: Vec<(String, Expression)>,
        distinct: bool,
    },
    Aggregate {
        input: Box<PhysicalPlan>,
        group_keys: Vec<String>,
        aggregates: Vec<AggregateSpec>,
        outputs: Vec<(String, Expression)>,
    },
    OrderBy {
        input: Box<PhysicalPlan>,
        keys: Vec<(String, bool)>,
    },
    Limit {
        input: Box<PhysicalPlan>,
        skip: Option<Expression>,
        limit: Option<Expression>,
    },
}

impl PhysicalPlan {
    /// Instantiate the operator tree
    pub fn build(&self) -> OperatorBox {
        let build_opt = |input: &Option<Box<PhysicalPlan>>| input.as_ref().map(|p| p.build());
        match self {
            PhysicalPlan::NodeScan { input, variable, labels } => {
                Box::new(NodeScanOperator::new(build_opt(input), variable.clone(), labels.clone()))
            }
            PhysicalPlan::IndexSeek {
                input,
                variable,
                label,
                property,
                value,
                extra_labels,
            } => Box::new(IndexSeekOperator::new(
                build_opt(input),
                variable.clone(),
                label.clone(),
                property.clone(),
                value.clone(),
                extra_labels.clone(),
            )),
            PhysicalPlan::Filter { input, predicate } => {
                Box::new(FilterOperator::new(input.build(), predicate.clone()))
            }
            PhysicalPlan::Expand { input, spec } => Box::new(ExpandOperator::new(input.build(), spec.clone())),
            PhysicalPlan::Project { input, items, distinct } => {
                Box::new(ProjectOperator::new(build_opt(input), items.clone(), *distinct))
            }
            PhysicalPlan::Aggregate {
                input,
                group_keys,
                aggregates,
                outputs,
            } => Box::new(AggregateOperator::new(
                input.build(),
                group_keys.clone(),
                aggregates.clone(),
                outputs.clone(),
            )),
            PhysicalPlan::OrderBy { input, keys } => Box::new(SortOperator::new(input.build(), keys.clone())),
            PhysicalPlan::Limit { input, skip, limit } => {
                Box::new(LimitOperator::new(input.build(), skip.clone(), limit.clone()))
            }
        }
    }

    fn input(&self) -> Option<&PhysicalPlan> {
        match self {
            PhysicalPlan::NodeScan { input, .. }
            | PhysicalPlan::IndexSeek { input, .. }
            | PhysicalPlan::Project { input, .. } => input.as_deref(),
            PhysicalPlan::Filter { input, .. }
            | PhysicalPlan::Expand { input, .. }
            | PhysicalPlan::Aggregate { input, .. }
            | PhysicalPlan::OrderBy { input, .. }
            | PhysicalPlan::Limit { input, .. } => Some(input),
        }
    }

    fn operator_name(&self) -> &'static str {
        match self {
            PhysicalPlan::NodeScan { labels, .. } if labels.is_empty() => "AllNodesScan",
            PhysicalPlan::NodeScan { .. } => "NodeByLabelScan",
            PhysicalPlan::IndexSeek { .. } => "NodeIndexSeek",
            PhysicalPlan::Filter { .. } => "Filter",
            PhysicalPlan::Expand { .. } => "Expand",
            PhysicalPlan::Project { .. } => "Projection",
            PhysicalPlan::Aggregate { .. } => "Aggregation",
            PhysicalPlan::OrderBy { .. } => "Sort",
            PhysicalPlan::Limit { .. } => "Limit",
        }
    }

    fn details(&self) -> String {
        fn join<T: AsRef<str>>(items: &[T], sep: &str) -> String {
            items.iter().map(|i| i.as_ref()).collect::<Vec<_>>().join(sep)
        }
        match self {
            PhysicalPlan::NodeScan { variable, labels, input } => {
                let labels: Vec<&str> = labels.iter().map(Label::as_str).collect();
                let mut s = if labels.is_empty() {
                    format!("({})", variable)
                } else {
                    format!("({}:{})", variable, labels.join(":"))
                };
                if input.is_some() {
                    s.push_str(" per input row");
                }
                s
            }
            PhysicalPlan::IndexSeek {
                variable,
                label,
                property,
                value,
                ..
            } => format!("({}:{}) {}.{} = {}", variable, label, variable, property, value),
            PhysicalPlan::Filter { predicate, .. } => predicate.to_string(),
            PhysicalPlan::Expand { spec, .. } => {
                let types: Vec<&str> = spec.types.iter().map(EdgeType::as_str).collect();
                let rel = if types.is_empty() {
                    format!("[{}]", spec.edge_variable)
                } else {
                    format!("[{}:{}]", spec.edge_variable, types.join("|"))
                };
                match spec.direction {
                    Direction::Outgoing => format!("({})-{}->({})", spec.from, rel, spec.to),
                    Direction::Incoming => format!("({})<-{}-({})", spec.from, rel, spec.to),
                    Direction::Both => format!("({})-{}-({})", spec.from, rel, spec.to),
                }
            }
            PhysicalPlan::Project { items, distinct, .. } => {
                let names: Vec<&String> = items.iter().map(|(name, _)| name).collect();
                let s = join(&names, ", ");
                if *distinct {
                    format!("DISTINCT {}", s)
                } else {
                    s
                }
            }
            PhysicalPlan::Aggregate { outputs, group_keys, .. } => {
                let names: Vec<&String> = outputs.iter().map(|(name, _)| name).collect();
                format!("{} grouped by [{}]", join(&names, ", "), join(group_keys, ", "))
            }
            PhysicalPlan::OrderBy { keys, .. } => {
                let keys: Vec<String> = keys
                    .iter()
                    .map(|(column, asc)| format!("{} {}", column, if *asc { "ASC" } else { "DESC" }))
                    .collect();
                join(&keys, ", ")
            }
            PhysicalPlan::Limit { skip, limit, .. } => {
                let mut parts = Vec::new();
                if let Some(skip) = skip {
                    parts.push(format!("SKIP {}", skip));
                }
                if let Some(limit) = limit {
                    parts.push(format!("LIMIT {}", limit));
                }
                parts.join(" ")
            }
        }
    }

    /// One (operator, details) pair per operator, root first, with the
    /// operator name indented by its depth
    pub fn describe(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        let mut current = Some(self);
        let mut depth = 0;
        while let Some(plan) = current {
            out.push((format!("{}{}", "  ".repeat(depth), plan.operator_name()), plan.details()));
            current = plan.input();
            depth += 1;
        }
        out
    }
}

/// A compiled read query
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub plan: PhysicalPlan,
    /// Returned column names in projection order
    pub columns: Vec<String>,
}

/// One element of a CREATE pattern
#[derive(Debug, Clone, PartialEq)]
pub enum CreateStep {
    Node {
        variable: String,
        labels: Vec<Label>,
        properties: Vec<(String, Expression)>,
    },
    Relationship {
        variable: String,
        edge_type: EdgeType,
        source: String,
        target: String,
        properties: Vec<(String, Expression)>,
    },
}

/// A compiled CREATE statement: steps run once per input row
#[derive(Debug, Clone, PartialEq)]
pub struct CreatePlan {
    /// MATCH/WHERE rows driving the creation; None runs the steps once
    pub input: Option<PhysicalPlan>,
    pub steps: Vec<CreateStep>,
}

/// Compile a read query against the current index catalog
pub fn compile(query: &Query, schema: &IndexManager) -> CompileResult<CompiledQuery> {
    QueryPlanner::new(schema).plan_query(query)
}

/// Compile a CREATE statement against the current index catalog
pub fn compile_create(statement: &CreateStatement, schema: &IndexManager) -> CompileResult<CreatePlan> {
    QueryPlanner::new(schema).plan_create(statement)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarKind {
    Node,
    Relationship,
}

impl VarKind {
    fn name(self) -> &'static str {
        match self {
            VarKind::Node => "node",
            VarKind::Relationship => "relationship",
        }
    }
}

#[derive(Debug)]
enum SeekSource {
    /// Index into the node pattern's inline properties
    Inline(usize),
    /// Index into the WHERE conjuncts
    Where(usize),
}

#[derive(Debug)]
struct SeekCandidate {
    node: usize,
    label: Label,
    property: String,
    value: Expression,
    source: SeekSource,
    estimate: usize,
    declared: u64,
}

/// Average number of nodes per distinct value
fn estimate(index: Option<&PropertyIndex>) -> usize {
    match index {
        Some(index) if index.distinct_values() > 0 => index.len() / index.distinct_values(),
        _ => 0,
    }
}

fn split_conjuncts(expr: &Expression, out: &mut Vec<Expression>) {
    match expr {
        Expression::Binary {
            left,
            op: BinaryOp::And,
            right,
        } => {
            split_conjuncts(left, out);
            split_conjuncts(right, out);
        }
        other => out.push(other.clone()),
    }
}

fn conjoin(mut predicates: Vec<Expression>) -> Option<Expression> {
    let first = if predicates.is_empty() {
        return None;
    } else {
        predicates.remove(0)
    };
    Some(predicates.into_iter().fold(first, |acc, next| Expression::Binary {
        left: Box::new(acc),
        op: BinaryOp::And,
        right: Box::new(next),
    }))
}

fn property_eq(variable: &str, property: &str, value: Expression) -> Expression {
    Expression::Binary {
        left: Box::new(Expression::Property {
            variable: variable.to_string(),
            property: property.to_string(),
        }),
        op: BinaryOp::Eq,
        right: Box::new(value),
    }
}

/// `'Label' IN labels(variable)`
fn label_test(variable: &str, label: &Label) -> Expression {
    Expression::Binary {
        left: Box::new(Expression::Literal(PropertyValue::String(label.as_str().to_string()))),
        op: BinaryOp::In,
        right: Box::new(Expression::Function {
            name: "labels".to_string(),
            args: vec![Expression::Variable(variable.to_string())],
            distinct: false,
        }),
    }
}

/// Match `var.prop = value` (either side) with a variable-free value
fn equality_on(conjunct: &Expression, variable: &str) -> Option<(String, Expression)> {
    let Expression::Binary {
        left,
        op: BinaryOp::Eq,
        right,
    } = conjunct
    else {
        return None;
    };
    for (a, b) in [(left, right), (right, left)] {
        if let Expression::Property { variable: v, property } = a.as_ref() {
            if v == variable && b.variables().is_empty() {
                return Some((property.clone(), b.as_ref().clone()));
            }
        }
    }
    None
}

struct QueryPlanner<'a> {
    schema: &'a IndexManager,
    kinds: HashMap<String, VarKind>,
    bound: HashSet<String>,
    /// Relationship variables bound so far, in binding order
    relationships: Vec<String>,
    anonymous: usize,
}

impl<'a> QueryPlanner<'a> {
    fn new(schema: &'a IndexManager) -> Self {
        Self {
            schema,
            kinds: HashMap::new(),
            bound: HashSet::new(),
            relationships: Vec::new(),
            anonymous: 0,
        }
    }

    fn fresh(&mut self, prefix: &str) -> String {
        let name = format!("__{}{}", prefix, self.anonymous);
        self.anonymous += 1;
        name
    }

    fn declare(&mut self, name: &str, kind: VarKind) -> CompileResult<()> {
        match self.kinds.get(name) {
            Some(existing) if *existing != kind => Err(CompileError::VariableKindConflict {
                variable: name.to_string(),
                existing: existing.name(),
            }),
            Some(_) if kind == VarKind::Relationship => Err(CompileError::InvalidPattern(format!(
                "relationship variable `{}` is used more than once",
                name
            ))),
            _ => {
                self.kinds.insert(name.to_string(), kind);
                Ok(())
            }
        }
    }

    /// Functions must exist and variables must be bound
    fn check_expression(&self, expr: &Expression, allow_aggregates: bool) -> CompileResult<()> {
        match expr {
            Expression::Variable(name) | Expression::Property { variable: name, .. } => {
                if !self.bound.contains(name) {
                    return Err(CompileError::UnknownVariable(name.clone()));
                }
            }
            Expression::CountStar if !allow_aggregates => {
                return Err(CompileError::InvalidAggregation(
                    "aggregate functions are only allowed in RETURN".to_string(),
                ));
            }
            Expression::Function { name, args, distinct } => {
                if AggregateKind::from_name(name).is_some() {
                    if !allow_aggregates {
                        return Err(CompileError::InvalidAggregation(format!(
                            "{}() is only allowed in RETURN",
                            name
                        )));
                    }
                    if args.len() != 1 {
                        return Err(CompileError::InvalidAggregation(format!(
                            "{}() takes exactly one argument",
                            name
                        )));
                    }
                    if args[0].contains_aggregate() {
                        return Err(CompileError::InvalidAggregation(format!(
                            "nested aggregate in {}",
                            expr
                        )));
                    }
                } else if is_scalar_function(name) {
                    if *distinct {
                        return Err(CompileError::InvalidAggregation(format!(
                            "DISTINCT is only valid inside an aggregate, not {}()",
                            name
                        )));
                    }
                    let lowered = name.to_ascii_lowercase();
                    let arity_ok = if lowered == "coalesce" {
                        !args.is_empty()
                    } else {
                        args.len() == 1
                    };
                    if !arity_ok {
                        return Err(CompileError::InvalidPattern(format!(
                            "wrong number of arguments to {}()",
                            name
                        )));
                    }
                } else {
                    return Err(CompileError::UnknownFunction(name.clone()));
                }
            }
            _ => {}
        }
        for child in expr.children() {
            self.check_expression(child, allow_aggregates)?;
        }
        Ok(())
    }

    // ============================================================
    // MATCH
    // ============================================================

    /// Plan every path of a MATCH clause. Returns the plan together with the
    /// inline property predicates still to be filtered; WHERE conjuncts used
    /// by an index seek are removed from `conjuncts`.
    fn plan_match(
        &mut self,
        clause: &MatchClause,
        conjuncts: &mut Vec<Expression>,
    ) -> CompileResult<(PhysicalPlan, Vec<Expression>)> {
        for path in &clause.pattern.paths {
            if let Some(v) = &path.start.variable {
                self.declare(v, VarKind::Node)?;
            }
            for segment in &path.segments {
                if let Some(v) = &segment.edge.variable {
                    self.declare(v, VarKind::Relationship)?;
                }
                if let Some(v) = &segment.node.variable {
                    self.declare(v, VarKind::Node)?;
                }
            }
        }

        let mut plan: Option<PhysicalPlan> = None;
        let mut filters = Vec::new();
        for path in &clause.pattern.paths {
            plan = Some(self.plan_path(plan, path, conjuncts, &mut filters)?);
        }
        let plan = plan.ok_or_else(|| CompileError::InvalidPattern("empty MATCH pattern".to_string()))?;
        Ok((plan, filters))
    }

    fn seek_candidates(&self, nodes: &[&NodePattern], names: &[String], conjuncts: &[Expression]) -> Vec<SeekCandidate> {
        let mut candidates = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            if self.bound.contains(&names[i]) {
                continue;
            }
            for label in &node.labels {
                let mut push = |property: &str, value: &Expression, source: SeekSource| {
                    if let Some(definition) = self.schema.get_definition(label, property) {
                        candidates.push(SeekCandidate {
                            node: i,
                            label: label.clone(),
                            property: property.to_string(),
                            value: value.clone(),
                            source,
                            estimate: estimate(self.schema.get_index(label, property)),
                            declared: definition.declared,
                        });
                    }
                };
                for (p, (property, value)) in node.properties.iter().enumerate() {
                    if value.variables().is_empty() {
                        push(property, value, SeekSource::Inline(p));
                    }
                }
                for (c, conjunct) in conjuncts.iter().enumerate() {
                    if let Some((property, value)) = equality_on(conjunct, &names[i]) {
                        push(&property, &value, SeekSource::Where(c));
                    }
                }
            }
        }
        candidates
    }

    fn plan_path(
        &mut self,
        input: Option<PhysicalPlan>,
        path: &PathPattern,
        conjuncts: &mut Vec<Expression>,
        filters: &mut Vec<Expression>,
    ) -> CompileResult<PhysicalPlan> {
        let mut nodes: Vec<&NodePattern> = vec![&path.start];
        nodes.extend(path.segments.iter().map(|s| &s.node));
        let mut names = Vec::with_capacity(nodes.len());
        for node in &nodes {
            let name = match &node.variable {
                Some(v) => v.clone(),
                None => self.fresh("n"),
            };
            names.push(name);
        }
        let mut edge_names = Vec::with_capacity(path.segments.len());
        for segment in &path.segments {
            let name = match &segment.edge.variable {
                Some(v) => v.clone(),
                None => self.fresh("r"),
            };
            edge_names.push(name);
        }

        // Anchor: a bound node, else the cheapest index seek, else the
        // first labelled node, else the start node
        let mut seek = None;
        let anchor = match names.iter().position(|n| self.bound.contains(n)) {
            Some(i) => i,
            None => {
                let best = self
                    .seek_candidates(&nodes, &names, conjuncts)
                    .into_iter()
                    .min_by_key(|c| (c.estimate, c.declared, c.node));
                match best {
                    Some(candidate) => {
                        let node = candidate.node;
                        seek = Some(candidate);
                        node
                    }
                    None => nodes.iter().position(|n| !n.labels.is_empty()).unwrap_or(0),
                }
            }
        };

        let mut consumed_inline = None;
        let mut plan = if self.bound.contains(&names[anchor]) {
            for label in &nodes[anchor].labels {
                filters.push(label_test(&names[anchor], label));
            }
            input.ok_or_else(|| CompileError::UnknownVariable(names[anchor].clone()))?
        } else {
            let input = input.map(Box::new);
            let variable = names[anchor].clone();
            let leaf = match seek {
                Some(candidate) => {
                    match candidate.source {
                        SeekSource::Inline(p) => consumed_inline = Some((anchor, p)),
                        SeekSource::Where(c) => {
                            conjuncts.remove(c);
                        }
                    }
                    let extra_labels = nodes[anchor]
                        .labels
                        .iter()
                        .filter(|l| **l != candidate.label)
                        .cloned()
                        .collect();
                    PhysicalPlan::IndexSeek {
                        input,
                        variable,
                        label: candidate.label,
                        property: candidate.property,
                        value: candidate.value,
                        extra_labels,
                    }
                }
                None => PhysicalPlan::NodeScan {
                    input,
                    variable,
                    labels: nodes[anchor].labels.clone(),
                },
            };
            self.bound.insert(names[anchor].clone());
            leaf
        };

        for j in anchor..path.segments.len() {
            let edge = &path.segments[j].edge;
            plan = self.expand(plan, &names[j], &edge_names[j], &names[j + 1], edge, edge.direction, nodes[j + 1]);
        }
        for j in (0..anchor).rev() {
            let edge = &path.segments[j].edge;
            plan = self.expand(plan, &names[j + 1], &edge_names[j], &names[j], edge, edge.direction.reverse(), nodes[j]);
        }

        for (i, node) in nodes.iter().enumerate() {
            for (p, (property, value)) in node.properties.iter().enumerate() {
                if consumed_inline != Some((i, p)) {
                    filters.push(property_eq(&names[i], property, value.clone()));
                }
            }
        }
        for (segment, name) in path.segments.iter().zip(&edge_names) {
            for (property, value) in &segment.edge.properties {
                filters.push(property_eq(name, property, value.clone()));
            }
        }
        Ok(plan)
    }

    #[allow(clippy::too_many_arguments)]
    fn expand(
        &mut self,
        input: PhysicalPlan,
        from: &str,
        edge_variable: &str,
        to: &str,
        edge: &EdgePattern,
        direction: Direction,
        to_node: &NodePattern,
    ) -> PhysicalPlan {
        let spec = ExpandSpec {
            from: from.to_string(),
            edge_variable: edge_variable.to_string(),
            to: to.to_string(),
            types: edge.types.clone(),
            direction,
            to_labels: to_node.labels.clone(),
            to_bound: self.bound.contains(to),
            distinct_from: self.relationships.clone(),
        };
        self.bound.insert(edge_variable.to_string());
        self.bound.insert(to.to_string());
        self.relationships.push(edge_variable.to_string());
        PhysicalPlan::Expand {
            input: Box::new(input),
            spec,
        }
    }

    /// MATCH + WHERE, shared by read queries and CREATE
    fn plan_reading(
        &mut self,
        match_clause: Option<&MatchClause>,
        where_clause: Option<&WhereClause>,
    ) -> CompileResult<Option<PhysicalPlan>> {
        let mut conjuncts = Vec::new();
        if let Some(where_clause) = where_clause {
            split_conjuncts(&where_clause.predicate, &mut conjuncts);
        }

        let (plan, mut predicates) = match match_clause {
            Some(clause) => {
                let (plan, filters) = self.plan_match(clause, &mut conjuncts)?;
                (Some(plan), filters)
            }
            None => (None, Vec::new()),
        };
        predicates.extend(conjuncts);
        for predicate in &predicates {
            self.check_expression(predicate, false)?;
        }

        Ok(match conjoin(predicates) {
            Some(predicate) => Some(PhysicalPlan::Filter {
                input: Box::new(plan.unwrap_or_else(unit)),
                predicate,
            }),
            None => plan,
        })
    }

    // ============================================================
    // RETURN / ORDER BY / SKIP / LIMIT
    // ============================================================

    fn plan_query(&mut self, query: &Query) -> CompileResult<CompiledQuery> {
        let plan = self.plan_reading(query.match_clause.as_ref(), query.where_clause.as_ref())?;

        let items = &query.return_clause.items;
        let mut columns = Vec::with_capacity(items.len());
        let mut seen = HashSet::new();
        for item in items {
            self.check_expression(&item.expression, true)?;
            let column = item.column_name();
            if !seen.insert(column.clone()) {
                return Err(CompileError::DuplicateColumn(column));
            }
            columns.push(column);
        }

        let order_items = query.order_by.as_ref().map(|o| o.items.as_slice()).unwrap_or(&[]);
        let aggregating = items.iter().any(|item| item.expression.contains_aggregate());
        let (mut plan, keys) = if aggregating {
            self.plan_aggregation(plan, items, &columns, order_items)?
        } else {
            self.plan_projection(plan, items, &columns, order_items, query.return_clause.distinct)?
        };

        if !keys.is_empty() {
            plan = PhysicalPlan::OrderBy {
                input: Box::new(plan),
                keys,
            };
        }
        if query.skip.is_some() || query.limit.is_some() {
            for expr in query.skip.iter().chain(query.limit.iter()) {
                if let Some(variable) = expr.variables().first() {
                    return Err(CompileError::UnknownVariable(variable.to_string()));
                }
            }
            plan = PhysicalPlan::Limit {
                input: Box::new(plan),
                skip: query.skip.clone(),
                limit: query.limit.clone(),
            };
        }
        Ok(CompiledQuery { plan, columns })
    }

    fn plan_projection(
        &self,
        input: Option<PhysicalPlan>,
        items: &[ReturnItem],
        columns: &[String],
        order_items: &[OrderByItem],
        distinct: bool,
    ) -> CompileResult<(PhysicalPlan, Vec<(String, bool)>)> {
        let mut projected: Vec<(String, Expression)> = columns
            .iter()
            .cloned()
            .zip(items.iter().map(|item| item.expression.clone()))
            .collect();
        let mut keys = Vec::with_capacity(order_items.len());
        for (i, order) in order_items.iter().enumerate() {
            if let Some(column) = resolve_column(&order.expression, items, columns) {
                keys.push((column, order.ascending));
                continue;
            }
            if distinct {
                return Err(CompileError::OrderByNotProjected(order.expression.to_string()));
            }
            if order.expression.contains_aggregate() {
                return Err(CompileError::InvalidAggregation(format!(
                    "cannot order by {} without aggregating in RETURN",
                    order.expression
                )));
            }
            self.check_expression(&order.expression, false)?;
            // Evaluated alongside the projection, hidden from the result
            let hidden = format!("__sort{}", i);
            projected.push((hidden.clone(), order.expression.clone()));
            keys.push((hidden, order.ascending));
        }
        let plan = PhysicalPlan::Project {
            input: input.map(Box::new),
            items: projected,
            distinct,
        };
        Ok((plan, keys))
    }

    fn plan_aggregation(
        &self,
        input: Option<PhysicalPlan>,
        items: &[ReturnItem],
        columns: &[String],
        order_items: &[OrderByItem],
    ) -> CompileResult<(PhysicalPlan, Vec<(String, bool)>)> {
        let mut pre_items = Vec::new();
        let mut group_keys = Vec::new();
        let mut aggregates = Vec::new();
        let mut outputs = Vec::with_capacity(items.len());

        for (item, column) in items.iter().zip(columns) {
            if item.expression.contains_aggregate() {
                let rewritten = rewrite_aggregates(&item.expression, &mut pre_items, &mut aggregates)?;
                outputs.push((column.clone(), rewritten));
            } else {
                pre_items.push((column.clone(), item.expression.clone()));
                group_keys.push(column.clone());
                outputs.push((column.clone(), Expression::Variable(column.clone())));
            }
        }

        let mut keys = Vec::with_capacity(order_items.len());
        for order in order_items {
            match resolve_column(&order.expression, items, columns) {
                Some(column) => keys.push((column, order.ascending)),
                None => return Err(CompileError::OrderByNotProjected(order.expression.to_string())),
            }
        }

        let project = PhysicalPlan::Project {
            input: input.map(Box::new),
            items: pre_items,
            distinct: false,
        };
        let plan = PhysicalPlan::Aggregate {
            input: Box::new(project),
            group_keys,
            aggregates,
            outputs,
        };
        Ok((plan, keys))
    }

    // ============================================================
    // CREATE
    // ============================================================

    fn plan_create(&mut self, statement: &CreateStatement) -> CompileResult<CreatePlan> {
        let input = self.plan_reading(statement.match_clause.as_ref(), statement.where_clause.as_ref())?;
        let mut steps = Vec::new();

        for path in &statement.create_clause.pattern.paths {
            let mut previous = self.create_node(&path.start, &mut steps)?;
            for segment in &path.segments {
                let next = self.create_node(&segment.node, &mut steps)?;
                let edge = &segment.edge;
                let edge_type = match edge.types.as_slice() {
                    [single] => single.clone(),
                    _ => {
                        return Err(CompileError::InvalidPattern(
                            "CREATE needs exactly one relationship type".to_string(),
                        ))
                    }
                };
                let (source, target) = match edge.direction {
                    Direction::Outgoing => (previous.clone(), next.clone()),
                    Direction::Incoming => (next.clone(), previous.clone()),
                    Direction::Both => {
                        return Err(CompileError::InvalidPattern(
                            "CREATE needs a relationship direction".to_string(),
                        ))
                    }
                };
                let variable = match &edge.variable {
                    Some(v) => {
                        if self.bound.contains(v) {
                            return Err(CompileError::InvalidPattern(format!(
                                "relationship variable `{}` is already bound",
                                v
                            )));
                        }
                        self.declare(v, VarKind::Relationship)?;
                        v.clone()
                    }
                    None => self.fresh("r"),
                };
                for (_, value) in &edge.properties {
                    self.check_expression(value, false)?;
                }
                self.bound.insert(variable.clone());
                steps.push(CreateStep::Relationship {
                    variable,
                    edge_type,
                    source,
                    target,
                    properties: edge.properties.clone(),
                });
                previous = next;
            }
        }
        Ok(CreatePlan { input, steps })
    }

    /// Reuse a bound node or add a creation step; returns the variable
    fn create_node(&mut self, node: &NodePattern, steps: &mut Vec<CreateStep>) -> CompileResult<String> {
        if let Some(v) = &node.variable {
            if self.bound.contains(v) {
                if self.kinds.get(v) != Some(&VarKind::Node) {
                    return Err(CompileError::VariableKindConflict {
                        variable: v.clone(),
                        existing: VarKind::Relationship.name(),
                    });
                }
                if !node.labels.is_empty() || !node.properties.is_empty() {
                    return Err(CompileError::InvalidPattern(format!(
                        "variable `{}` is already bound and cannot be redeclared",
                        v
                    )));
                }
                return Ok(v.clone());
            }
        }
        let variable = match &node.variable {
            Some(v) => {
                self.declare(v, VarKind::Node)?;
                v.clone()
            }
            None => self.fresh("n"),
        };
        for (_, value) in &node.properties {
            self.check_expression(value, false)?;
        }
        self.bound.insert(variable.clone());
        steps.push(CreateStep::Node {
            variable: variable.clone(),
            labels: node.labels.clone(),
            properties: node.properties.clone(),
        });
        Ok(variable)
    }
}

/// A projection with no input that yields one empty row
fn unit() -> PhysicalPlan {
    PhysicalPlan::Project {
        input: None,
        items: Vec::new(),
        distinct: false,
    }
}

/// An ORDER BY key names a returned column by alias or by the same
/// expression
fn resolve_column(expr: &Expression, items: &[ReturnItem], columns: &[String]) -> Option<String> {
    if let Expression::Variable(name) = expr {
        if let Some(i) = items.iter().position(|item| item.alias.as_deref() == Some(name.as_str())) {
            return Some(columns[i].clone());
        }
    }
    items
        .iter()
        .position(|item| item.expression == *expr)
        .map(|i| columns[i].clone())
}

/// Replace each aggregate call by a reference to its result. Arguments are
/// projected into `__arg{i}` columns ahead of the Aggregate operator.
fn rewrite_aggregates(
    expr: &Expression,
    pre_items: &mut Vec<(String, Expression)>,
    aggregates: &mut Vec<AggregateSpec>,
) -> CompileResult<Expression> {
    let i = aggregates.len();
    match expr {
        Expression::CountStar => {
            aggregates.push(AggregateSpec {
                kind: AggregateKind::Count,
                distinct: false,
                argument: None,
                output: format!("__agg{}", i),
            });
            Ok(Expression::Variable(format!("__agg{}", i)))
        }
        Expression::Function { name, args, distinct } => match AggregateKind::from_name(name) {
            Some(kind) => {
                let argument = format!("__arg{}", i);
                pre_items.push((argument.clone(), args[0].clone()));
                aggregates.push(AggregateSpec {
                    kind,
                    distinct: *distinct,
                    argument: Some(argument),
                    output: format!("__agg{}", i),
                });
                Ok(Expression::Variable(format!("__agg{}", i)))
            }
            None => {
                let mut rewritten = Vec::with_capacity(args.len());
                for arg in args {
                    rewritten.push(rewrite_aggregates(arg, pre_items, aggregates)?);
                }
                Ok(Expression::Function {
                    name: name.clone(),
                    args: rewritten,
                    distinct: *distinct,
                })
            }
        },
        Expression::Variable(_) | Expression::Property { .. } => Err(CompileError::InvalidAggregation(format!(
            "{} mixes an aggregate with a non-grouped value; return it as its own column",
            expr
        ))),
        Expression::Binary { left, op, right } => Ok(Expression::Binary {
            left: Box::new(rewrite_aggregates(left, pre_items, aggregates)?),
            op: *op,
            right: Box::new(rewrite_aggregates(right, pre_items, aggregates)?),
        }),
        Expression::Unary { op, expr } => Ok(Expression::Unary {
            op: *op,
            expr: Box::new(rewrite_aggregates(expr, pre_items, aggregates)?),
        }),
        Expression::List(items) => {
            let mut rewritten = Vec::with_capacity(items.len());
            for item in items {
                rewritten.push(rewrite_aggregates(item, pre_items, aggregates)?);
            }
            Ok(Expression::List(rewritten))
        }
        Expression::Literal(_) | Expression::Parameter(_) => Ok(expr.clone()),
    }
}
