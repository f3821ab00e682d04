use graphcore::{props, ErrorKind, GraphDatabase, IndexKind, Label, PropertyValue};
use std::collections::HashMap;

fn products(db: &GraphDatabase, n: i64) {
    let txn = db.begin_transaction().unwrap();
    for i in 0..n {
        db.create_node(
            txn,
            vec![Label::new("Product")],
            props! { "sku" => i, "price" => i * 10, "category" => if i % 2 == 0 { "even" } else { "odd" } },
        )
        .unwrap();
    }
    db.commit_transaction(txn).unwrap();
}

fn plan(db: &GraphDatabase, query: &str) -> Vec<(String, String)> {
    db.execute_query(&format!("EXPLAIN {}", query), HashMap::new())
        .unwrap()
        .map(|row| {
            let row = row.unwrap();
            let text = |c: &str| match row.get_property(c) {
                Some(PropertyValue::String(s)) => s.trim().to_string(),
                other => panic!("unexpected {:?}", other),
            };
            (text("operator"), text("details"))
        })
        .collect()
}

#[test]
fn test_index_seek_matches_scan() {
    let db = GraphDatabase::in_memory();
    products(&db, 100);
    let query = "MATCH (n:Product) WHERE n.sku = 50 RETURN n.price";
    let scanned = db.execute_query(query, HashMap::new()).unwrap().collect_rows().unwrap();

    assert!(db.create_index("Product", "sku").unwrap());
    let operators: Vec<_> = plan(&db, query).into_iter().map(|(op, _)| op).collect();
    assert_eq!(operators, vec!["Projection", "NodeIndexSeek"]);

    let seeked = db.execute_query(query, HashMap::new()).unwrap().collect_rows().unwrap();
    assert_eq!(scanned.len(), 1);
    assert_eq!(seeked[0].get_property("n.price"), Some(&PropertyValue::Integer(500)));
    assert_eq!(
        seeked.iter().map(|r| r.to_json()).collect::<Vec<_>>(),
        scanned.iter().map(|r| r.to_json()).collect::<Vec<_>>()
    );
}

#[test]
fn test_range_predicate_uses_scan() {
    let db = GraphDatabase::in_memory();
    products(&db, 10);
    db.create_index("Product", "price").unwrap();
    let query = "MATCH (n:Product) WHERE n.price > 50 RETURN n.sku";
    let operators: Vec<_> = plan(&db, query).into_iter().map(|(op, _)| op).collect();
    assert_eq!(operators, vec!["Projection", "Filter", "NodeByLabelScan"]);
    let rows = db.execute_query(query, HashMap::new()).unwrap().collect_rows().unwrap();
    assert_eq!(rows.len(), 4);
}

#[test]
fn test_most_selective_index_wins() {
    let db = GraphDatabase::in_memory();
    products(&db, 20);
    db.create_index("Product", "category").unwrap();
    db.create_index("Product", "sku").unwrap();

    let steps = plan(
        &db,
        "MATCH (n:Product) WHERE n.category = 'even' AND n.sku = 4 RETURN n",
    );
    let (operator, details) = &steps[steps.len() - 1];
    assert_eq!(operator, "NodeIndexSeek");
    assert!(details.contains("sku"), "{}", details);
}

#[test]
fn test_index_maintained_on_writes() {
    let db = GraphDatabase::in_memory();
    db.create_index("Product", "sku").unwrap();
    products(&db, 3);

    let txn = db.begin_transaction().unwrap();
    let id = db.snapshot().node_ids_by_label("Product")[0];
    db.set_property(txn, id, "sku", 99i64).unwrap();
    db.commit_transaction(txn).unwrap();

    let snapshot = db.snapshot();
    let index = snapshot.property_index();
    let label = Label::new("Product");
    assert_eq!(index.lookup(&label, "sku", &PropertyValue::Integer(99)), Some(vec![id]));
    assert_eq!(index.lookup(&label, "sku", &PropertyValue::Integer(0)), Some(vec![]));

    let rows = db
        .execute_query("MATCH (n:Product {sku: 99}) RETURN id(n)", HashMap::new())
        .unwrap()
        .collect_rows()
        .unwrap();
    assert_eq!(rows[0].get_property("id(n)"), Some(&PropertyValue::Integer(id.as_u64() as i64)));
}

#[test]
fn test_definition_rules() {
    let db = GraphDatabase::in_memory();
    assert!(db.create_index("Person", "name").unwrap());
    assert!(!db.create_index("Person", "name").unwrap());
    assert_eq!(
        db.create_constraint("Person", "name", true).unwrap_err().kind(),
        ErrorKind::DuplicateDefinition
    );
    assert_eq!(
        db.drop_constraint("Person", "name").unwrap_err().kind(),
        ErrorKind::DuplicateDefinition
    );
    assert!(db.drop_index("Person", "name").unwrap());
    assert!(!db.drop_index("Person", "name").unwrap());

    let definitions = db.snapshot().property_index().definitions();
    assert!(definitions.is_empty());

    assert!(db.create_constraint("Person", "email", true).unwrap());
    let definitions = db.snapshot().property_index().definitions();
    assert_eq!(definitions.len(), 1);
    assert_eq!(definitions[0].kind, IndexKind::UniqueConstraint);
}

#[test]
fn test_unknown_label_matches_nothing() {
    let db = GraphDatabase::in_memory();
    products(&db, 3);
    let rows = db
        .execute_query("MATCH (n:Nope) RETURN count(n) AS c", HashMap::new())
        .unwrap()
        .collect_rows()
        .unwrap();
    assert_eq!(rows[0].get_property("c"), Some(&PropertyValue::Integer(0)));
}
