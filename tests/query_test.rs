use graphcore::{props, CancelHandle, ErrorKind, GraphDatabase, PropertyValue, QueryOptions, Row};
use std::collections::HashMap;
use std::time::Duration;

fn social_graph() -> GraphDatabase {
    let db = GraphDatabase::in_memory();
    let txn = db.begin_transaction().unwrap();
    db.add_entity(txn, "p1", "Person", props! { "name" => "Alice", "age" => 30i64, "city" => "Paris" })
        .unwrap();
    db.add_entity(txn, "p2", "Person", props! { "name" => "Bob", "age" => 25i64, "city" => "Berlin" })
        .unwrap();
    db.add_entity(txn, "p3", "Person", props! { "name" => "Carol", "age" => 35i64, "city" => "Paris" })
        .unwrap();
    db.add_entity(txn, "c1", "City", props! { "name" => "Paris" }).unwrap();
    db.add_relationship(txn, "p1", "p2", "KNOWS", props! { "since" => 2020i64 })
        .unwrap();
    db.add_relationship(txn, "p2", "p3", "KNOWS", props! { "since" => 2018i64 })
        .unwrap();
    db.add_relationship(txn, "p1", "c1", "LIVES_IN", props! {}).unwrap();
    db.commit_transaction(txn).unwrap();
    db
}

fn run(db: &GraphDatabase, text: &str) -> Vec<Row> {
    db.execute_query(text, HashMap::new())
        .unwrap()
        .collect_rows()
        .unwrap()
}

fn strings(rows: &[Row], column: &str) -> Vec<String> {
    rows.iter()
        .map(|row| match row.get_property(column) {
            Some(PropertyValue::String(s)) => s.clone(),
            other => panic!("expected string in {}, got {:?}", column, other),
        })
        .collect()
}

#[test]
fn test_knows_scenario() {
    let db = GraphDatabase::in_memory();
    let txn = db.begin_transaction().unwrap();
    db.add_entity(txn, "p1", "Person", props! { "name" => "Alice" }).unwrap();
    db.add_entity(txn, "p2", "Person", props! { "name" => "Bob" }).unwrap();
    db.add_relationship(txn, "p1", "p2", "KNOWS", props! { "since" => 2020i64 })
        .unwrap();
    db.commit_transaction(txn).unwrap();

    let result = db
        .execute_query("MATCH (a:Person)-[r:KNOWS]->(b:Person) RETURN a.name, b.name", HashMap::new())
        .unwrap();
    assert_eq!(result.columns(), &["a.name".to_string(), "b.name".to_string()]);
    let rows = result.collect_rows().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_property("a.name"), Some(&PropertyValue::from("Alice")));
    assert_eq!(rows[0].get_property("b.name"), Some(&PropertyValue::from("Bob")));
}

#[test]
fn test_count_on_empty_graph() {
    let db = GraphDatabase::in_memory();
    let rows = run(&db, "MATCH (n) RETURN count(n)");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_property("count(n)"), Some(&PropertyValue::Integer(0)));
}

#[test]
fn test_missing_colon_is_syntax_error() {
    let db = GraphDatabase::in_memory();
    let err = db.execute_query("MATCH (n Person) RETURN n", HashMap::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    match err {
        graphcore::DbError::Syntax(syntax) => {
            assert_eq!(syntax.position.offset, 9);
            assert_eq!(syntax.position.column, 10);
            assert_eq!(syntax.snippet, "Person");
        }
        other => panic!("expected syntax error, got {:?}", other),
    }
}

#[test]
fn test_where_and_string_predicates() {
    let db = social_graph();
    let rows = run(
        &db,
        "MATCH (n:Person) WHERE n.age >= 30 AND n.city STARTS WITH 'Pa' RETURN n.name ORDER BY n.name",
    );
    assert_eq!(strings(&rows, "n.name"), vec!["Alice", "Carol"]);

    let rows = run(&db, "MATCH (n:Person) WHERE n.name CONTAINS 'o' OR n.age < 26 RETURN n.name ORDER BY n.name");
    assert_eq!(strings(&rows, "n.name"), vec!["Bob", "Carol"]);

    // Missing property is null, type mismatch is false
    let rows = run(&db, "MATCH (n:Person) WHERE n.salary > 10 OR n.name > 3 RETURN n");
    assert!(rows.is_empty());

    let rows = run(&db, "MATCH (n:Person) WHERE (n.age < 'x') = false RETURN n.name ORDER BY n.name");
    assert_eq!(strings(&rows, "n.name"), vec!["Alice", "Bob", "Carol"]);

    let rows = run(&db, "RETURN 1 < 'a' AS r, null < 1 AS n");
    assert_eq!(rows[0].get_property("r"), Some(&PropertyValue::Boolean(false)));
    assert_eq!(rows[0].get_property("n"), Some(&PropertyValue::Null));
}

#[test]
fn test_grouped_aggregation() {
    let db = social_graph();
    let rows = run(
        &db,
        "MATCH (n:Person) RETURN n.city AS city, count(*) AS people, avg(n.age) AS age ORDER BY city",
    );
    assert_eq!(strings(&rows, "city"), vec!["Berlin", "Paris"]);
    assert_eq!(rows[1].get_property("people"), Some(&PropertyValue::Integer(2)));
    assert_eq!(rows[1].get_property("age"), Some(&PropertyValue::Float(32.5)));

    let rows = run(&db, "MATCH (n:Person) RETURN sum(n.age), min(n.name), max(n.age)");
    assert_eq!(rows[0].get_property("sum(n.age)"), Some(&PropertyValue::Integer(90)));
    assert_eq!(rows[0].get_property("min(n.name)"), Some(&PropertyValue::from("Alice")));
    assert_eq!(rows[0].get_property("max(n.age)"), Some(&PropertyValue::Integer(35)));
}

#[test]
fn test_order_by_is_deterministic() {
    let db = social_graph();
    let text = "MATCH (n:Person) RETURN n.city, n.name ORDER BY n.city DESC";
    let first: Vec<_> = run(&db, text).iter().map(Row::to_json).collect();
    for _ in 0..5 {
        let again: Vec<_> = run(&db, text).iter().map(Row::to_json).collect();
        assert_eq!(serde_json::to_string(&first).unwrap(), serde_json::to_string(&again).unwrap());
    }
    // Ties keep scan order (ascending node id)
    assert_eq!(
        first.iter().map(|r| r["n.name"].clone()).collect::<Vec<_>>(),
        vec![
            serde_json::json!("Alice"),
            serde_json::json!("Carol"),
            serde_json::json!("Bob")
        ]
    );
}

#[test]
fn test_directions_and_multi_hop() {
    let db = social_graph();
    let rows = run(&db, "MATCH (b:Person)<-[:KNOWS]-(a) RETURN a.name, b.name ORDER BY a.name");
    assert_eq!(strings(&rows, "a.name"), vec!["Alice", "Bob"]);

    let rows = run(&db, "MATCH (a {name: 'Bob'})-[:KNOWS]-(other) RETURN other.name ORDER BY other.name");
    assert_eq!(strings(&rows, "other.name"), vec!["Alice", "Carol"]);

    let rows = run(&db, "MATCH (a:Person)-[:KNOWS]->()-[:KNOWS]->(c) RETURN a.name, c.name");
    assert_eq!(strings(&rows, "c.name"), vec!["Carol"]);

    let rows = run(&db, "MATCH (a:Person)-[r:KNOWS|LIVES_IN]->(x) RETURN type(r) ORDER BY type(r)");
    assert_eq!(strings(&rows, "type(r)"), vec!["KNOWS", "KNOWS", "LIVES_IN"]);
}

#[test]
fn test_parameters_distinct_skip_limit() {
    let db = social_graph();
    let options = QueryOptions::new().param("city", "Paris");
    let rows = db
        .execute_query_with("MATCH (n:Person {city: $city}) RETURN n.name ORDER BY n.name", options)
        .unwrap()
        .collect_rows()
        .unwrap();
    assert_eq!(strings(&rows, "n.name"), vec!["Alice", "Carol"]);

    let rows = run(&db, "MATCH (n:Person) RETURN DISTINCT n.city ORDER BY n.city");
    assert_eq!(strings(&rows, "n.city"), vec!["Berlin", "Paris"]);

    let rows = run(&db, "MATCH (n:Person) RETURN n.name ORDER BY n.age SKIP 1 LIMIT 1");
    assert_eq!(strings(&rows, "n.name"), vec!["Alice"]);

    let err = db
        .execute_query("MATCH (n:Person {city: $missing}) RETURN n", HashMap::new())
        .unwrap()
        .collect_rows()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Runtime);
}

#[test]
fn test_node_values_are_materialized() {
    let db = social_graph();
    let rows = run(&db, "MATCH (n:City) RETURN n, labels(n)");
    let node = rows[0].get("n").and_then(|v| v.as_node()).unwrap();
    assert_eq!(node.get_property("name"), Some(&PropertyValue::from("Paris")));
    assert_eq!(
        rows[0].get_property("labels(n)"),
        Some(&PropertyValue::Array(vec![PropertyValue::from("City")]))
    );
}

#[test]
fn test_error_kinds() {
    let db = social_graph();
    for (text, kind) in [
        ("MATCH (n) RETURN m", ErrorKind::Compilation),
        ("MATCH (n) RETURN n.name, count(n) ORDER BY n.age", ErrorKind::Compilation),
        ("MATCH (n) DELETE n", ErrorKind::UnsupportedFeature),
        ("MERGE (n:Person)", ErrorKind::UnsupportedFeature),
        ("MATCH (n) WHERE NOT n.age = 1 RETURN n", ErrorKind::UnsupportedFeature),
        ("MATCH (n) RETURN n @", ErrorKind::Syntax),
    ] {
        let err = db.execute_query(text, HashMap::new()).unwrap_err();
        assert_eq!(err.kind(), kind, "{}", text);
    }

    let err = run_err(&db, "MATCH (n:Person) RETURN n.age / 0");
    assert_eq!(err, ErrorKind::Runtime);
}

fn run_err(db: &GraphDatabase, text: &str) -> ErrorKind {
    db.execute_query(text, HashMap::new())
        .unwrap()
        .collect_rows()
        .unwrap_err()
        .kind()
}

#[test]
fn test_cancellation_and_timeout() {
    let db = social_graph();
    let cancel = CancelHandle::new();
    let mut result = db
        .execute_query_with(
            "MATCH (a:Person), (b:Person) RETURN a.name, b.name",
            QueryOptions::new().with_cancel(cancel.clone()),
        )
        .unwrap();
    assert!(result.next().unwrap().is_ok());
    cancel.cancel();
    let err = result.next().unwrap().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert!(result.next().is_none());

    let err = db
        .execute_query_with(
            "MATCH (n:Person) RETURN n",
            QueryOptions::new().with_timeout(Duration::ZERO),
        )
        .unwrap()
        .collect_rows()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Cancelled);
}

#[test]
fn test_explain() {
    let db = social_graph();
    db.create_index("Person", "name").unwrap();
    let rows = run(&db, "EXPLAIN MATCH (n:Person) WHERE n.name = 'Bob' RETURN n.age");
    let operators: Vec<_> = strings(&rows, "operator").into_iter().map(|s| s.trim().to_string()).collect();
    assert_eq!(operators, vec!["Projection", "NodeIndexSeek"]);
}

#[test]
fn test_return_without_match() {
    let db = GraphDatabase::in_memory();
    let rows = run(&db, "RETURN 1 + 2 AS three, 'a' + 'b' AS ab, coalesce(null, 4) AS c");
    assert_eq!(rows[0].get_property("three"), Some(&PropertyValue::Integer(3)));
    assert_eq!(rows[0].get_property("ab"), Some(&PropertyValue::from("ab")));
    assert_eq!(rows[0].get_property("c"), Some(&PropertyValue::Integer(4)));
}
