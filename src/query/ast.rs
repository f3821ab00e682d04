//! Abstract Syntax Tree for the Cypher subset
//!
//! AST nodes are plain values produced by the parser. They carry no knowledge
//! of the live graph; binding and access-path choice happen in the compiler.

use crate::graph::{EdgeType, Label, PropertyValue};
use std::fmt;

/// A parsed statement
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// MATCH ... WHERE ... RETURN ...
    Query(Query),
    /// [MATCH ... [WHERE ...]] CREATE pattern
    Create(CreateStatement),
    /// CREATE/DROP INDEX, CREATE/DROP CONSTRAINT
    Schema(SchemaCommand),
    /// EXPLAIN wrapping a read query
    Explain(Query),
}

impl Statement {
    /// Check if this is a read-only statement
    pub fn is_read_only(&self) -> bool {
        matches!(self, Statement::Query(_) | Statement::Explain(_))
    }
}

/// Read query: MatchClause? WhereClause? ReturnClause OrderByClause? Skip? Limit?
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// MATCH clause (optional)
    pub match_clause: Option<MatchClause>,
    /// WHERE clause (optional)
    pub where_clause: Option<WhereClause>,
    pub return_clause: ReturnClause,
    /// ORDER BY clause (optional)
    pub order_by: Option<OrderByClause>,
    /// SKIP (integer literal or parameter)
    pub skip: Option<Expression>,
    /// LIMIT (integer literal or parameter)
    pub limit: Option<Expression>,
}

/// CREATE, optionally driven by the rows of a MATCH
#[derive(Debug, Clone, PartialEq)]
pub struct CreateStatement {
    pub match_clause: Option<MatchClause>,
    pub where_clause: Option<WhereClause>,
    pub create_clause: CreateClause,
}

/// Index and constraint DDL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaCommand {
    pub action: SchemaAction,
    pub kind: SchemaKind,
    pub label: Label,
    pub property: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaAction {
    Create,
    Drop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    Index,
    UniqueConstraint,
}

/// MATCH clause: MATCH (n:Person)-[:KNOWS]->(m), (c:City)
#[derive(Debug, Clone, PartialEq)]
pub struct MatchClause {
    /// Pattern to match
    pub pattern: Pattern,
}

/// Graph pattern, a comma-separated list of paths
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    /// Path patterns in this clause
    pub paths: Vec<PathPattern>,
}

/// Path pattern: (n:Person)-[:KNOWS]->(m:Person)
#[derive(Debug, Clone, PartialEq)]
pub struct PathPattern {
    /// Start node
    pub start: NodePattern,
    /// Edges and nodes
    pub segments: Vec<PathSegment>,
}

/// Segment of a path (edge + node)
#[derive(Debug, Clone, PartialEq)]
pub struct PathSegment {
    pub edge: EdgePattern,
    pub node: NodePattern,
}

/// Node pattern: (n:Person:Employee {name: "Alice"})
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NodePattern {
    /// Variable name (e.g., "n")
    pub variable: Option<String>,
    /// Labels (e.g., ["Person", "Employee"])
    pub labels: Vec<Label>,
    /// Inline property constraints, in source order
    pub properties: Vec<(String, Expression)>,
}

/// Edge pattern: -[r:KNOWS|FOLLOWS {since: 2020}]->
#[derive(Debug, Clone, PartialEq)]
pub struct EdgePattern {
    /// Variable name (e.g., "r")
    pub variable: Option<String>,
    /// Edge types; empty matches any type
    pub types: Vec<EdgeType>,
    pub direction: Direction,
    /// Inline property constraints, in source order
    pub properties: Vec<(String, Expression)>,
}

/// Edge direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Outgoing: ->
    Outgoing,
    /// Incoming: <-
    Incoming,
    /// Both: -
    Both,
}

impl Direction {
    /// Direction as seen from the other end of the relationship
    pub fn reverse(self) -> Self {
        match self {
            Direction::Outgoing => Direction::Incoming,
            Direction::Incoming => Direction::Outgoing,
            Direction::Both => Direction::Both,
        }
    }
}

/// WHERE clause with predicates
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    /// Root predicate expression
    pub predicate: Expression,
}

/// Expression in WHERE, RETURN, ORDER BY or an inline property map
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Property access: n.name
    Property {
        /// Variable name (e.g., "n")
        variable: String,
        /// Property name (e.g., "name")
        property: String,
    },
    /// Literal value
    Literal(PropertyValue),
    /// Query parameter: $name
    Parameter(String),
    /// Variable reference
    Variable(String),
    /// List literal: [1, 2, 3]
    List(Vec<Expression>),
    Binary {
        left: Box<Expression>,
        op: BinaryOp,
        right: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expression>,
    },
    /// Function call, aggregate or scalar
    Function {
        /// Function name as written
        name: String,
        args: Vec<Expression>,
        distinct: bool,
    },
    /// count(*)
    CountStar,
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Xor,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    StartsWith,
    EndsWith,
    Contains,
    In,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    IsNull,
    IsNotNull,
}

/// Aggregate function kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl AggregateKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "count" => Some(AggregateKind::Count),
            "sum" => Some(AggregateKind::Sum),
            "avg" => Some(AggregateKind::Avg),
            "min" => Some(AggregateKind::Min),
            "max" => Some(AggregateKind::Max),
            _ => None,
        }
    }
}

impl Expression {
    /// True if this node itself is an aggregate call
    pub fn is_aggregate_call(&self) -> bool {
        match self {
            Expression::CountStar => true,
            Expression::Function { name, .. } => AggregateKind::from_name(name).is_some(),
            _ => false,
        }
    }

    /// True if an aggregate call appears anywhere in this expression
    pub fn contains_aggregate(&self) -> bool {
        if self.is_aggregate_call() {
            return true;
        }
        self.children().iter().any(|child| child.contains_aggregate())
    }

    /// Direct sub-expressions
    pub fn children(&self) -> Vec<&Expression> {
        match self {
            Expression::List(items) => items.iter().collect(),
            Expression::Binary { left, right, .. } => vec![left, right],
            Expression::Unary { expr, .. } => vec![expr],
            Expression::Function { args, .. } => args.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Variables referenced by this expression
    pub fn variables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_variables(&mut out);
        out
    }

    fn collect_variables<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Expression::Variable(name) | Expression::Property { variable: name, .. } => out.push(name),
            _ => {
                for child in self.children() {
                    child.collect_variables(out);
                }
            }
        }
    }
}

/// RETURN clause
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnClause {
    pub items: Vec<ReturnItem>,
    /// Whether to return distinct results
    pub distinct: bool,
}

/// Return item: n, n.name AS name, count(n)
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnItem {
    pub expression: Expression,
    pub alias: Option<String>,
}

impl ReturnItem {
    /// Column name: the alias, or the expression as written
    pub fn column_name(&self) -> String {
        self.alias.clone().unwrap_or_else(|| self.expression.to_string())
    }
}

/// CREATE clause
#[derive(Debug, Clone, PartialEq)]
pub struct CreateClause {
    pub pattern: Pattern,
}

/// ORDER BY clause
#[derive(Debug, Clone, PartialEq)]
pub struct OrderByClause {
    pub items: Vec<OrderByItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByItem {
    pub expression: Expression,
    pub ascending: bool,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Xor => "XOR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::StartsWith => "STARTS WITH",
            BinaryOp::EndsWith => "ENDS WITH",
            BinaryOp::Contains => "CONTAINS",
            BinaryOp::In => "IN",
        };
        f.write_str(s)
    }
}

fn write_literal(f: &mut fmt::Formatter<'_>, value: &PropertyValue) -> fmt::Result {
    match value {
        PropertyValue::String(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
        PropertyValue::Null => f.write_str("null"),
        other => write!(f, "{}", other),
    }
}

/// Renders expressions the way they are written; used for column names
impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Property { variable, property } => write!(f, "{}.{}", variable, property),
            Expression::Literal(value) => write_literal(f, value),
            Expression::Parameter(name) => write!(f, "${}", name),
            Expression::Variable(name) => f.write_str(name),
            Expression::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Expression::Binary { left, op, right } => write!(f, "{} {} {}", left, op, right),
            Expression::Unary { op, expr } => match op {
                UnaryOp::Minus => write!(f, "-{}", expr),
                UnaryOp::IsNull => write!(f, "{} IS NULL", expr),
                UnaryOp::IsNotNull => write!(f, "{} IS NOT NULL", expr),
            },
            Expression::Function { name, args, distinct } => {
                write!(f, "{}(", name)?;
                if *distinct {
                    f.write_str("DISTINCT ")?;
                }
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                f.write_str(")")
            }
            Expression::CountStar => f.write_str("count(*)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(var: &str, key: &str) -> Expression {
        Expression::Property {
            variable: var.to_string(),
            property: key.to_string(),
        }
    }

    #[test]
    fn test_expression_display() {
        assert_eq!(prop("a", "name").to_string(), "a.name");
        let count = Expression::Function {
            name: "count".to_string(),
            args: vec![Expression::Variable("n".to_string())],
            distinct: false,
        };
        assert_eq!(count.to_string(), "count(n)");
        assert_eq!(Expression::CountStar.to_string(), "count(*)");

        let sum = Expression::Binary {
            left: Box::new(prop("n", "age")),
            op: BinaryOp::Add,
            right: Box::new(Expression::Literal(PropertyValue::Integer(1))),
        };
        assert_eq!(sum.to_string(), "n.age + 1");
        assert_eq!(Expression::Literal("x".into()).to_string(), "'x'");
    }

    #[test]
    fn test_aggregate_detection() {
        let inner = Expression::Function {
            name: "SUM".to_string(),
            args: vec![prop("n", "age")],
            distinct: false,
        };
        assert!(inner.is_aggregate_call());
        let wrapped = Expression::Binary {
            left: Box::new(inner),
            op: BinaryOp::Mul,
            right: Box::new(Expression::Literal(PropertyValue::Integer(2))),
        };
        assert!(!wrapped.is_aggregate_call());
        assert!(wrapped.contains_aggregate());
        assert!(!prop("n", "age").contains_aggregate());
    }

    #[test]
    fn test_variables() {
        let expr = Expression::Binary {
            left: Box::new(prop("a", "x")),
            op: BinaryOp::And,
            right: Box::new(Expression::Variable("b".to_string())),
        };
        assert_eq!(expr.variables(), vec!["a", "b"]);
    }

    #[test]
    fn test_edge_direction() {
        assert_eq!(Direction::Outgoing.reverse(), Direction::Incoming);
        assert_eq!(Direction::Both.reverse(), Direction::Both);
    }

    #[test]
    fn test_return_item_column_name() {
        let item = ReturnItem {
            expression: prop("b", "name"),
            alias: None,
        };
        assert_eq!(item.column_name(), "b.name");
        let aliased = ReturnItem {
            expression: prop("b", "name"),
            alias: Some("friend".to_string()),
        };
        assert_eq!(aliased.column_name(), "friend");
    }
}
