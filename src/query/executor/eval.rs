//! Expression evaluation
//!
//! Data-shape problems never raise: a missing property reads as null and a
//! comparison across incompatible types evaluates to null, which a filter
//! treats as false. Only undefined variables, missing parameters and
//! division by zero are errors.

use super::record::{Record, Value};
use super::{ExecContext, ExecutionError, ExecutionResult};
use crate::graph::{GraphStore, PropertyValue};
use crate::query::ast::{BinaryOp, Expression, UnaryOp};
use std::cmp::Ordering;

/// Scalar functions understood by the evaluator
pub const SCALAR_FUNCTIONS: &[&str] = &["id", "labels", "type", "coalesce", "toupper", "tolower", "size"];

pub fn is_scalar_function(name: &str) -> bool {
    SCALAR_FUNCTIONS.contains(&name.to_ascii_lowercase().as_str())
}

/// Evaluate `expr` against one record
pub fn evaluate(expr: &Expression, record: &Record, store: &GraphStore, ctx: &ExecContext) -> ExecutionResult<Value> {
    match expr {
        Expression::Literal(value) => Ok(Value::Property(value.clone())),
        Expression::Parameter(name) => ctx
            .param(name)
            .cloned()
            .map(Value::Property)
            .ok_or_else(|| ExecutionError::MissingParameter(name.clone())),
        Expression::Variable(name) => record
            .get(name)
            .cloned()
            .ok_or_else(|| ExecutionError::UndefinedVariable(name.clone())),
        Expression::Property { variable, property } => {
            let target = record
                .get(variable)
                .ok_or_else(|| ExecutionError::UndefinedVariable(variable.clone()))?;
            Ok(Value::Property(property_of(target, property, store)))
        }
        Expression::List(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                values.push(into_property(evaluate(item, record, store, ctx)?));
            }
            Ok(Value::Property(PropertyValue::Array(values)))
        }
        Expression::Binary { left, op, right } => {
            // AND/OR short-circuit only on a decisive left operand
            let l = evaluate(left, record, store, ctx)?;
            match (op, truth(&l)) {
                (BinaryOp::And, Some(false)) => return Ok(bool_value(false)),
                (BinaryOp::Or, Some(true)) => return Ok(bool_value(true)),
                _ => {}
            }
            let r = evaluate(right, record, store, ctx)?;
            binary(*op, l, r)
        }
        Expression::Unary { op, expr } => {
            let value = evaluate(expr, record, store, ctx)?;
            Ok(match op {
                UnaryOp::IsNull => bool_value(value.is_null()),
                UnaryOp::IsNotNull => bool_value(!value.is_null()),
                UnaryOp::Minus => Value::Property(match value.as_property() {
                    Some(PropertyValue::Integer(i)) => i
                        .checked_neg()
                        .map(PropertyValue::Integer)
                        .unwrap_or(PropertyValue::Float(-(*i as f64))),
                    Some(PropertyValue::Float(f)) => PropertyValue::Float(-f),
                    _ => PropertyValue::Null,
                }),
            })
        }
        Expression::Function { name, args, .. } => {
            let mut values = Vec::with_capacity(args.len());
            for arg in args {
                values.push(evaluate(arg, record, store, ctx)?);
            }
            scalar_function(name, values, store)
        }
        Expression::CountStar => Err(ExecutionError::Runtime(
            "count(*) cannot be evaluated outside an aggregation".to_string(),
        )),
    }
}

/// Evaluate a predicate; only a boolean `true` passes
pub fn evaluate_predicate(
    expr: &Expression,
    record: &Record,
    store: &GraphStore,
    ctx: &ExecContext,
) -> ExecutionResult<bool> {
    Ok(truth(&evaluate(expr, record, store, ctx)?) == Some(true))
}

fn property_of(target: &Value, property: &str, store: &GraphStore) -> PropertyValue {
    let found = match target {
        Value::Node(_, node) => node.get_property(property),
        Value::NodeRef(id) => store.get_property(*id, property),
        Value::Edge(_, edge) => edge.get_property(property),
        Value::EdgeRef(id) => store.get_edge(*id).and_then(|edge| edge.get_property(property)),
        Value::Property(PropertyValue::Map(map)) => map.get(property),
        Value::Property(_) => None,
    };
    found.cloned().unwrap_or(PropertyValue::Null)
}

fn into_property(value: Value) -> PropertyValue {
    match value {
        Value::Property(p) => p,
        Value::Node(id, _) | Value::NodeRef(id) => PropertyValue::Integer(id.as_u64() as i64),
        Value::Edge(id, _) | Value::EdgeRef(id) => PropertyValue::Integer(id.as_u64() as i64),
    }
}

fn bool_value(b: bool) -> Value {
    Value::Property(PropertyValue::Boolean(b))
}

fn null() -> Value {
    Value::null()
}

/// Three-valued truth: `None` for null or non-boolean values
fn truth(value: &Value) -> Option<bool> {
    value.as_property().and_then(PropertyValue::as_boolean)
}

fn binary(op: BinaryOp, left: Value, right: Value) -> ExecutionResult<Value> {
    match op {
        BinaryOp::And => Ok(match (truth(&left), truth(&right)) {
            (Some(false), _) | (_, Some(false)) => bool_value(false),
            (Some(true), Some(true)) => bool_value(true),
            _ => null(),
        }),
        BinaryOp::Or => Ok(match (truth(&left), truth(&right)) {
            (Some(true), _) | (_, Some(true)) => bool_value(true),
            (Some(false), Some(false)) => bool_value(false),
            _ => null(),
        }),
        BinaryOp::Xor => Ok(match (truth(&left), truth(&right)) {
            (Some(a), Some(b)) => bool_value(a != b),
            _ => null(),
        }),
        BinaryOp::Eq | BinaryOp::Ne => {
            if left.is_null() || right.is_null() {
                return Ok(null());
            }
            let equal = left == right;
            Ok(bool_value(if op == BinaryOp::Eq { equal } else { !equal }))
        }
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            if left.is_null() || right.is_null() {
                return Ok(null());
            }
            let ordering = match (left.as_property(), right.as_property()) {
                (Some(a), Some(b)) => a.compare_same_type(b),
                _ => None,
            };
            Ok(match ordering {
                Some(ord) => bool_value(match op {
                    BinaryOp::Lt => ord == Ordering::Less,
                    BinaryOp::Le => ord != Ordering::Greater,
                    BinaryOp::Gt => ord == Ordering::Greater,
                    _ => ord != Ordering::Less,
                }),
                // Values of different types never order against each other
                None => bool_value(false),
            })
        }
        BinaryOp::StartsWith | BinaryOp::EndsWith | BinaryOp::Contains => {
            let (Some(PropertyValue::String(a)), Some(PropertyValue::String(b))) =
                (left.as_property(), right.as_property())
            else {
                return Ok(null());
            };
            Ok(bool_value(match op {
                BinaryOp::StartsWith => a.starts_with(b.as_str()),
                BinaryOp::EndsWith => a.ends_with(b.as_str()),
                _ => a.contains(b.as_str()),
            }))
        }
        BinaryOp::In => {
            let Some(PropertyValue::Array(items)) = right.as_property() else {
                return Ok(null());
            };
            if left.is_null() {
                return Ok(null());
            }
            let needle = into_property(left);
            if items.iter().any(|item| !item.is_null() && *item == needle) {
                Ok(bool_value(true))
            } else if items.iter().any(PropertyValue::is_null) {
                Ok(null())
            } else {
                Ok(bool_value(false))
            }
        }
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod => {
            let (Some(a), Some(b)) = (left.as_property(), right.as_property()) else {
                return Ok(null());
            };
            arithmetic(op, a, b).map(Value::Property)
        }
    }
}

fn arithmetic(op: BinaryOp, a: &PropertyValue, b: &PropertyValue) -> ExecutionResult<PropertyValue> {
    use PropertyValue::*;

    if a.is_null() || b.is_null() {
        return Ok(Null);
    }

    if op == BinaryOp::Add {
        match (a, b) {
            (String(x), String(y)) => return Ok(String(format!("{}{}", x, y))),
            (String(x), y) if y.is_numeric() => return Ok(String(format!("{}{}", x, y))),
            (x, String(y)) if x.is_numeric() => return Ok(String(format!("{}{}", x, y))),
            (Array(x), Array(y)) => return Ok(Array(x.iter().chain(y).cloned().collect())),
            (Array(x), y) => {
                let mut items = x.clone();
                items.push(y.clone());
                return Ok(Array(items));
            }
            _ => {}
        }
    }

    if matches!(op, BinaryOp::Div | BinaryOp::Mod) && b.as_float() == Some(0.0) {
        return Err(ExecutionError::DivisionByZero);
    }

    match (a, b) {
        (Integer(x), Integer(y)) => {
            let checked = match op {
                BinaryOp::Add => x.checked_add(*y),
                BinaryOp::Sub => x.checked_sub(*y),
                BinaryOp::Mul => x.checked_mul(*y),
                BinaryOp::Div => x.checked_div(*y),
                _ => x.checked_rem(*y),
            };
            Ok(checked
                .map(Integer)
                .unwrap_or_else(|| float_arithmetic(op, *x as f64, *y as f64)))
        }
        (x, y) if x.is_numeric() && y.is_numeric() => match (x.as_float(), y.as_float()) {
            (Some(x), Some(y)) => Ok(float_arithmetic(op, x, y)),
            _ => Ok(Null),
        },
        _ => Ok(Null),
    }
}

fn float_arithmetic(op: BinaryOp, x: f64, y: f64) -> PropertyValue {
    PropertyValue::Float(match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        _ => x % y,
    })
}

fn scalar_function(name: &str, args: Vec<Value>, store: &GraphStore) -> ExecutionResult<Value> {
    let lowered = name.to_ascii_lowercase();
    let arg = args.first().cloned().unwrap_or_else(Value::null);
    let value = match lowered.as_str() {
        "id" => match (arg.node_id(), arg.edge_id()) {
            (Some(id), _) => PropertyValue::Integer(id.as_u64() as i64),
            (_, Some(id)) => PropertyValue::Integer(id.as_u64() as i64),
            _ => PropertyValue::Null,
        },
        "labels" => match arg {
            Value::Node(_, node) => label_list(&node),
            Value::NodeRef(id) => store.get_node(id).map(label_list).unwrap_or(PropertyValue::Null),
            _ => PropertyValue::Null,
        },
        "type" => {
            let edge_type = match &arg {
                Value::Edge(_, edge) => Some(edge.edge_type.as_str().to_string()),
                Value::EdgeRef(id) => store.get_edge(*id).map(|e| e.edge_type.as_str().to_string()),
                _ => None,
            };
            edge_type.map(PropertyValue::String).unwrap_or(PropertyValue::Null)
        }
        "coalesce" => {
            return Ok(args.into_iter().find(|v| !v.is_null()).unwrap_or_else(Value::null));
        }
        "toupper" => match arg.as_property() {
            Some(PropertyValue::String(s)) => PropertyValue::String(s.to_uppercase()),
            _ => PropertyValue::Null,
        },
        "tolower" => match arg.as_property() {
            Some(PropertyValue::String(s)) => PropertyValue::String(s.to_lowercase()),
            _ => PropertyValue::Null,
        },
        "size" => match arg.as_property() {
            Some(PropertyValue::String(s)) => PropertyValue::Integer(s.chars().count() as i64),
            Some(PropertyValue::Array(items)) => PropertyValue::Integer(items.len() as i64),
            _ => PropertyValue::Null,
        },
        _ => return Err(ExecutionError::Runtime(format!("Unknown function: {}", name))),
    };
    Ok(Value::Property(value))
}

fn label_list(node: &crate::graph::Node) -> PropertyValue {
    PropertyValue::Array(
        node.labels
            .iter()
            .map(|l| PropertyValue::String(l.as_str().to_string()))
            .collect(),
    )
}
