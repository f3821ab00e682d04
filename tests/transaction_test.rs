use graphcore::{props, ErrorKind, GraphDatabase, Label, PropertyMap, PropertyValue, QueryOptions, TxnState};
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

fn count(db: &GraphDatabase, text: &str) -> i64 {
    let rows = db.execute_query(text, HashMap::new()).unwrap().collect_rows().unwrap();
    match rows[0].values()[0].as_property() {
        Some(PropertyValue::Integer(n)) => *n,
        other => panic!("expected integer, got {:?}", other),
    }
}

#[test]
fn test_second_begin_fails() {
    let db = GraphDatabase::in_memory();
    let first = db.begin_transaction().unwrap();
    let err = db.begin_transaction().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConcurrentTransaction);
    assert_eq!(db.transaction_state(first), Some(TxnState::Active));

    db.commit_transaction(first).unwrap();
    assert_eq!(db.transaction_state(first), Some(TxnState::Committed));
    let second = db.begin_transaction().unwrap();
    assert_ne!(first, second);
}

#[test]
fn test_rollback_leaves_store_untouched() {
    let db = GraphDatabase::in_memory();
    let txn = db.begin_transaction().unwrap();
    db.create_node(txn, vec![Label::new("Person")], props! { "name" => "Ghost" })
        .unwrap();
    db.rollback_transaction(txn).unwrap();
    assert_eq!(db.transaction_state(txn), Some(TxnState::RolledBack));
    assert_eq!(count(&db, "MATCH (n) RETURN count(n)"), 0);

    let err = db
        .set_property(txn, graphcore::NodeId::new(1), "name", "x")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoActiveTransaction);
}

#[test]
fn test_unique_violation_keeps_transaction_and_store() {
    let db = GraphDatabase::in_memory();
    db.create_constraint("Person", "email", true).unwrap();

    let txn = db.begin_transaction().unwrap();
    db.create_node(txn, vec![Label::new("Person")], props! { "email" => "a@example.com" })
        .unwrap();
    db.commit_transaction(txn).unwrap();
    let before = db.snapshot();

    let txn = db.begin_transaction().unwrap();
    let err = db
        .create_node(txn, vec![Label::new("Person")], props! { "email" => "a@example.com" })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert_eq!(db.transaction_state(txn), Some(TxnState::Active));

    // The caller may retry with a different value
    db.create_node(txn, vec![Label::new("Person")], props! { "email" => "b@example.com" })
        .unwrap();
    db.rollback_transaction(txn).unwrap();
    assert_eq!(*db.snapshot(), *before);

    // Setting a property into a clash is rejected too
    let txn = db.begin_transaction().unwrap();
    let id = db
        .create_node(txn, vec![Label::new("Person")], props! { "email" => "c@example.com" })
        .unwrap();
    let err = db.set_property(txn, id, "email", "a@example.com").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    db.commit_transaction(txn).unwrap();
    assert_eq!(count(&db, "MATCH (n:Person) RETURN count(*)"), 2);
}

#[test]
fn test_constraint_on_duplicates_fails() {
    let db = GraphDatabase::in_memory();
    let txn = db.begin_transaction().unwrap();
    for _ in 0..2 {
        db.create_node(txn, vec![Label::new("Person")], props! { "name" => "Twin" })
            .unwrap();
    }
    db.commit_transaction(txn).unwrap();
    let err = db.create_constraint("Person", "name", true).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    assert!(db.create_index("Person", "name").unwrap());
}

#[test]
fn test_schema_rejected_during_transaction() {
    let db = GraphDatabase::in_memory();
    let txn = db.begin_transaction().unwrap();
    assert_eq!(
        db.create_index("Person", "name").unwrap_err().kind(),
        ErrorKind::ConcurrentTransaction
    );
    let err = db
        .execute_query("CREATE INDEX ON :Person(name)", HashMap::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConcurrentTransaction);
    db.rollback_transaction(txn).unwrap();

    let rows = db
        .execute_query("CREATE INDEX ON :Person(name)", HashMap::new())
        .unwrap()
        .collect_rows()
        .unwrap();
    assert_eq!(rows[0].get_property("created"), Some(&PropertyValue::Boolean(true)));
    let rows = db
        .execute_query("DROP INDEX ON :Person(name)", HashMap::new())
        .unwrap()
        .collect_rows()
        .unwrap();
    assert_eq!(rows[0].get_property("dropped"), Some(&PropertyValue::Boolean(true)));
}

#[test]
fn test_match_create_in_transaction() {
    let db = GraphDatabase::in_memory();
    let txn = db.begin_transaction().unwrap();
    let options = QueryOptions::new().in_transaction(txn);
    for name in ["Alice", "Bob"] {
        db.execute_query_with(
            "CREATE (p:Person {name: $name})",
            options.clone().param("name", name),
        )
        .unwrap();
    }
    let rows = db
        .execute_query_with(
            "MATCH (a:Person {name: 'Alice'}), (b:Person {name: 'Bob'}) CREATE (a)-[:KNOWS {since: 2021}]->(b)",
            options,
        )
        .unwrap()
        .collect_rows()
        .unwrap();
    assert_eq!(rows[0].get_property("relationships_created"), Some(&PropertyValue::Integer(1)));
    assert_eq!(rows[0].get_property("nodes_created"), Some(&PropertyValue::Integer(0)));
    db.commit_transaction(txn).unwrap();

    assert_eq!(
        count(&db, "MATCH (:Person)-[r:KNOWS]->(:Person) RETURN count(r)"),
        1
    );
}

#[test]
fn test_readers_see_consistent_snapshots() {
    let db = Arc::new(GraphDatabase::in_memory());
    let txn = db.begin_transaction().unwrap();
    for i in 0..50i64 {
        db.create_node(txn, vec![Label::new("Item")], props! { "n" => i }).unwrap();
    }

    // A result started before the commit keeps its own snapshot
    let pending = db
        .execute_query("MATCH (n:Item) RETURN n.n", HashMap::new())
        .unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let db = Arc::clone(&db);
            thread::spawn(move || {
                let c = count(&db, "MATCH (n:Item) RETURN count(n)");
                assert!(c == 0 || c == 50, "observed partial transaction: {}", c);
            })
        })
        .collect();
    db.commit_transaction(txn).unwrap();
    for reader in readers {
        reader.join().unwrap();
    }

    assert!(pending.collect_rows().unwrap().is_empty());
    assert_eq!(count(&db, "MATCH (n:Item) RETURN count(n)"), 50);
}

#[test]
fn test_empty_commit_and_property_updates() {
    let db = GraphDatabase::in_memory();
    let txn = db.begin_transaction().unwrap();
    let sequence = db.commit_transaction(txn).unwrap();
    assert_eq!(sequence, 0);

    let txn = db.begin_transaction().unwrap();
    let a = db.create_node(txn, vec![Label::new("A")], PropertyMap::new()).unwrap();
    let b = db.create_node(txn, vec![Label::new("A")], PropertyMap::new()).unwrap();
    let r = db.create_relationship(txn, "LINK", a, b, PropertyMap::new()).unwrap();
    db.set_property(txn, a, "score", 10i64).unwrap();
    db.set_relationship_property(txn, r, "weight", 0.5).unwrap();
    db.commit_transaction(txn).unwrap();

    assert_eq!(db.get_property(a, "score"), Some(PropertyValue::Integer(10)));
    assert_eq!(
        db.get_relationship(r).and_then(|e| e.get_property("weight").cloned()),
        Some(PropertyValue::Float(0.5))
    );

    let txn = db.begin_transaction().unwrap();
    db.set_property(txn, a, "score", PropertyValue::Null).unwrap();
    db.commit_transaction(txn).unwrap();
    assert_eq!(db.get_property(a, "score"), None);
}

#[test]
fn test_many_small_transactions() {
    let db = GraphDatabase::in_memory();
    db.create_index("Event", "seq").unwrap();
    let mut held = None;
    for i in 0..3000i64 {
        let txn = db.begin_transaction().unwrap();
        db.add_entity(txn, format!("e{}", i), "Event", props! { "seq" => i }).unwrap();
        if i > 0 {
            db.add_relationship(txn, &format!("e{}", i - 1), &format!("e{}", i), "NEXT", PropertyMap::new())
                .unwrap();
        }
        db.commit_transaction(txn).unwrap();
        if i == 999 {
            held = Some(db.snapshot());
        }
    }

    // A snapshot taken mid-way is never touched by later commits
    let held = held.unwrap();
    assert_eq!(held.node_count(), 1000);
    assert_eq!(held.edge_count(), 999);
    assert_eq!(held.node_ids_by_label("Event").len(), 1000);

    let stats = db.statistics();
    assert_eq!(stats.node_count, 3000);
    assert_eq!(stats.edge_count, 2999);
    assert_eq!(stats.indices[0].entries, 3000);
    assert_eq!(count(&db, "MATCH (a:Event {seq: 2998})-[:NEXT]->(b) RETURN b.seq"), 2999);
}
