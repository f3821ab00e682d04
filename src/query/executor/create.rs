//! CREATE execution
//!
//! A CREATE never writes to the store directly. It reads its driving rows,
//! evaluates property expressions and turns every pattern element into a
//! `Mutation` with a pre-allocated id. The transaction layer stages them.

use super::eval::evaluate;
use super::planner::{CreatePlan, CreateStep};
use super::record::{Record, Value};
use super::{ExecContext, ExecutionError, ExecutionResult};
use crate::graph::{EdgeId, GraphStore, Mutation, NodeId, PropertyMap};
use crate::query::ast::Expression;

/// Mutations produced by one CREATE statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateOutcome {
    pub mutations: Vec<Mutation>,
    pub nodes_created: usize,
    pub relationships_created: usize,
}

fn evaluate_properties(
    properties: &[(String, Expression)],
    record: &Record,
    store: &GraphStore,
    ctx: &ExecContext,
) -> ExecutionResult<PropertyMap> {
    let mut map = PropertyMap::new();
    for (key, expr) in properties {
        match evaluate(expr, record, store, ctx)? {
            Value::Property(value) => {
                map.insert(key.clone(), value);
            }
            other => {
                return Err(ExecutionError::Runtime(format!(
                    "property {} cannot hold a node or relationship ({:?})",
                    key, other
                )))
            }
        }
    }
    Ok(map)
}

fn bound_node(record: &Record, variable: &str) -> ExecutionResult<NodeId> {
    record
        .get(variable)
        .and_then(Value::node_id)
        .ok_or_else(|| ExecutionError::UndefinedVariable(variable.to_string()))
}

/// Run the driving rows and build the mutations for every one of them
pub fn plan_mutations(plan: &CreatePlan, store: &GraphStore, ctx: &ExecContext) -> ExecutionResult<CreateOutcome> {
    // Driving rows are read in full before any id is handed out
    let mut rows = Vec::new();
    match &plan.input {
        Some(input) => {
            let mut root = input.build();
            while let Some(record) = root.next(store, ctx)? {
                rows.push(record);
            }
        }
        None => rows.push(Record::new()),
    }

    let mut outcome = CreateOutcome::default();
    let mut next_node = store.next_node_id();
    let mut next_edge = store.next_edge_id();
    for mut record in rows {
        ctx.check()?;
        for step in &plan.steps {
            match step {
                CreateStep::Node {
                    variable,
                    labels,
                    properties,
                } => {
                    let id = NodeId::new(next_node);
                    next_node += 1;
                    let properties = evaluate_properties(properties, &record, store, ctx)?;
                    outcome.mutations.push(Mutation::CreateNode {
                        id,
                        labels: labels.clone(),
                        properties,
                        entity_key: None,
                    });
                    outcome.nodes_created += 1;
                    record.bind(variable.clone(), Value::NodeRef(id));
                }
                CreateStep::Relationship {
                    variable,
                    edge_type,
                    source,
                    target,
                    properties,
                } => {
                    let id = EdgeId::new(next_edge);
                    next_edge += 1;
                    let source = bound_node(&record, source)?;
                    let target = bound_node(&record, target)?;
                    let properties = evaluate_properties(properties, &record, store, ctx)?;
                    outcome.mutations.push(Mutation::CreateEdge {
                        id,
                        source,
                        target,
                        edge_type: edge_type.clone(),
                        properties,
                    });
                    outcome.relationships_created += 1;
                    record.bind(variable.clone(), Value::EdgeRef(id));
                }
            }
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{Label, PropertyValue};
    use crate::props;
    use crate::query::ast::Statement;
    use crate::query::executor::planner::compile_create;
    use crate::query::parser::parse_query;
    use std::collections::HashMap;

    fn create_plan(text: &str, store: &GraphStore) -> CreatePlan {
        match parse_query(text).unwrap() {
            Statement::Create(statement) => compile_create(&statement, store.property_index()).unwrap(),
            other => panic!("expected CREATE, got {:?}", other),
        }
    }

    #[test]
    fn test_create_path_allocates_ids() {
        let mut store = GraphStore::new();
        store
            .insert_node(NodeId::new(1), &[Label::new("Person")], &props! { "name" => "Alice" }, None)
            .unwrap();
        let plan = create_plan("CREATE (a:Person {name: 'Bob', age: 40})-[:KNOWS {since: 2020}]->(b:Person)", &store);
        let outcome = plan_mutations(&plan, &store, &ExecContext::default()).unwrap();
        assert_eq!(outcome.nodes_created, 2);
        assert_eq!(outcome.relationships_created, 1);
        assert_eq!(
            outcome.mutations[0],
            Mutation::CreateNode {
                id: NodeId::new(2),
                labels: vec![Label::new("Person")],
                properties: props! { "name" => "Bob", "age" => 40 },
                entity_key: None,
            }
        );
        assert!(matches!(
            &outcome.mutations[2],
            Mutation::CreateEdge { id, source, target, .. }
                if *id == EdgeId::new(1) && *source == NodeId::new(2) && *target == NodeId::new(3)
        ));
    }

    #[test]
    fn test_create_per_matched_row() {
        let mut store = GraphStore::new();
        for i in 1..=3 {
            store
                .insert_node(NodeId::new(i), &[Label::new("Person")], &props! { "n" => i as i64 }, None)
                .unwrap();
        }
        let plan = create_plan("MATCH (p:Person) WHERE p.n > 1 CREATE (p)-[:OWNS]->(:Pet {owner: p.n})", &store);
        let outcome = plan_mutations(&plan, &store, &ExecContext::default()).unwrap();
        assert_eq!(outcome.nodes_created, 2);
        assert_eq!(outcome.relationships_created, 2);
        assert!(matches!(
            &outcome.mutations[0],
            Mutation::CreateNode { properties, .. } if properties.get("owner") == Some(&PropertyValue::Integer(2))
        ));
    }

    #[test]
    fn test_create_with_parameters() {
        let store = GraphStore::new();
        let plan = create_plan("CREATE (n:City {name: $name})", &store);
        let mut params = HashMap::new();
        params.insert("name".to_string(), PropertyValue::from("Pune"));
        let ctx = ExecContext::new(params, None, None);
        let outcome = plan_mutations(&plan, &store, &ctx).unwrap();
        assert!(matches!(
            &outcome.mutations[0],
            Mutation::CreateNode { properties, .. } if properties.get("name") == Some(&PropertyValue::from("Pune"))
        ));

        let missing = plan_mutations(&plan, &store, &ExecContext::default());
        assert_eq!(missing, Err(ExecutionError::MissingParameter("name".to_string())));
    }
}
