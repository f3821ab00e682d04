/// Tests for target node label and property filtering in MATCH patterns.
///
/// Property filters on the far end of a relationship pattern must restrict
/// the results, e.g.
///   MATCH (t:Trial)-[:STUDIES]->(d:Disease {name: 'Diabetes'})
/// returns only Diabetes trials, never every disease.
use graphcore::{GraphDatabase, PropertyValue, QueryOptions, Row};
use std::collections::HashMap;

/// Run CREATE statements in one transaction
fn build(statements: &[String]) -> GraphDatabase {
    let db = GraphDatabase::in_memory();
    let txn = db.begin_transaction().unwrap();
    for statement in statements {
        db.execute_query_with(statement, QueryOptions::new().in_transaction(txn))
            .unwrap();
    }
    db.commit_transaction(txn).unwrap();
    db
}

fn query(db: &GraphDatabase, text: &str) -> Vec<Row> {
    db.execute_query(text, HashMap::new()).unwrap().collect_rows().unwrap()
}

fn text(row: &Row, column: &str) -> String {
    row.get_property(column)
        .and_then(PropertyValue::as_string)
        .unwrap_or_else(|| panic!("no string in {}", column))
        .to_string()
}

/// Set up a clinical trials graph with multiple diseases and trials
fn setup_trials_graph() -> GraphDatabase {
    let mut statements = Vec::new();

    // Disease categories
    for disease in &["Diabetes", "Cancer", "Alzheimers", "Asthma"] {
        statements.push(format!("CREATE (d:DiseaseCategory {{name: '{}'}})", disease));
    }

    // Trials studying specific diseases
    let trials = vec![
        ("T001", "Phase3", "Diabetes"),
        ("T002", "Phase3", "Cancer"),
        ("T003", "Phase2", "Diabetes"),
        ("T004", "Phase3", "Alzheimers"),
        ("T005", "Phase1", "Asthma"),
        ("T006", "Phase3", "Diabetes"),
    ];

    for (trial_id, phase, disease) in &trials {
        statements.push(format!("CREATE (t:Trial {{trial_id: '{}', phase: '{}'}})", trial_id, phase));
        statements.push(format!(
            "MATCH (t:Trial {{trial_id: '{}'}}), (d:DiseaseCategory {{name: '{}'}}) CREATE (t)-[:STUDIES]->(d)",
            trial_id, disease
        ));
    }

    build(&statements)
}

#[test]
fn test_target_node_property_filter() {
    let db = setup_trials_graph();

    let rows = query(
        &db,
        "MATCH (t:Trial {phase: 'Phase3'})-[:STUDIES]->(d:DiseaseCategory {name: 'Diabetes'}) RETURN d.name, t.trial_id, t.phase",
    );

    // Phase3 trials studying Diabetes: T001, T006
    assert_eq!(rows.len(), 2, "Expected 2 results but got {}", rows.len());
    for row in &rows {
        assert_eq!(text(row, "d.name"), "Diabetes");
        assert_eq!(text(row, "t.phase"), "Phase3");
    }
    let ids: Vec<_> = rows.iter().map(|r| text(r, "t.trial_id")).collect();
    assert_eq!(ids, vec!["T001", "T006"]);
}

#[test]
fn test_target_node_label_filter() {
    let db = build(&[
        "CREATE (p:Person {name: 'Alice'})".to_string(),
        "CREATE (c:Company {name: 'Acme'})".to_string(),
        "CREATE (s:School {name: 'MIT'})".to_string(),
        "MATCH (p:Person), (c:Company) CREATE (p)-[:WORKS_AT]->(c)".to_string(),
        "MATCH (p:Person), (s:School) CREATE (p)-[:WORKS_AT]->(s)".to_string(),
    ]);

    let rows = query(&db, "MATCH (p:Person)-[:WORKS_AT]->(c:Company) RETURN c.name");
    assert_eq!(rows.len(), 1);
    assert_eq!(text(&rows[0], "c.name"), "Acme");
}

#[test]
fn test_target_property_filter_no_match() {
    let db = setup_trials_graph();
    let rows = query(
        &db,
        "MATCH (t:Trial {phase: 'Phase3'})-[:STUDIES]->(d:DiseaseCategory {name: 'Asthma'}) RETURN t.trial_id",
    );
    assert!(rows.is_empty());
}

#[test]
fn test_target_property_filter_all_phases() {
    let db = setup_trials_graph();
    let rows = query(
        &db,
        "MATCH (t:Trial)-[:STUDIES]->(d:DiseaseCategory {name: 'Diabetes'}) RETURN t.trial_id, t.phase ORDER BY t.trial_id",
    );
    let ids: Vec<_> = rows.iter().map(|r| text(r, "t.trial_id")).collect();
    assert_eq!(ids, vec!["T001", "T003", "T006"]);
}

#[test]
fn test_multi_hop_with_target_properties() {
    let db = build(&[
        "CREATE (p:Person {name: 'Alice'})".to_string(),
        "CREATE (p:Person {name: 'Bob'})".to_string(),
        "CREATE (c:Company {name: 'TechCorp', size: 'large'})".to_string(),
        "CREATE (c:Company {name: 'SmallCo', size: 'small'})".to_string(),
        "CREATE (s:Sector {name: 'Technology'})".to_string(),
        "CREATE (s:Sector {name: 'Finance'})".to_string(),
        // Alice -> TechCorp -> Technology
        "MATCH (p:Person {name: 'Alice'}), (c:Company {name: 'TechCorp'}) CREATE (p)-[:WORKS_AT]->(c)".to_string(),
        "MATCH (c:Company {name: 'TechCorp'}), (s:Sector {name: 'Technology'}) CREATE (c)-[:IN_SECTOR]->(s)"
            .to_string(),
        // Bob -> SmallCo -> Finance
        "MATCH (p:Person {name: 'Bob'}), (c:Company {name: 'SmallCo'}) CREATE (p)-[:WORKS_AT]->(c)".to_string(),
        "MATCH (c:Company {name: 'SmallCo'}), (s:Sector {name: 'Finance'}) CREATE (c)-[:IN_SECTOR]->(s)".to_string(),
    ]);

    let rows = query(
        &db,
        "MATCH (p:Person)-[:WORKS_AT]->(c:Company {size: 'large'})-[:IN_SECTOR]->(s:Sector {name: 'Technology'}) RETURN p.name",
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(text(&rows[0], "p.name"), "Alice");
}

#[test]
fn test_target_property_with_where_clause() {
    let db = setup_trials_graph();
    let rows = query(
        &db,
        "MATCH (t:Trial)-[:STUDIES]->(d:DiseaseCategory {name: 'Diabetes'}) WHERE t.phase = 'Phase3' RETURN t.trial_id",
    );
    let ids: Vec<_> = rows.iter().map(|r| text(r, "t.trial_id")).collect();
    assert_eq!(ids, vec!["T001", "T006"]);
}

#[test]
fn test_target_multiple_properties() {
    let mut statements = vec![
        "CREATE (s:Store {name: 'MainStreet'})".to_string(),
        "CREATE (p:Product {name: 'Widget', color: 'red', size: 'large'})".to_string(),
        "CREATE (p:Product {name: 'Gadget', color: 'red', size: 'small'})".to_string(),
        "CREATE (p:Product {name: 'Doohickey', color: 'blue', size: 'large'})".to_string(),
    ];
    for product in &["Widget", "Gadget", "Doohickey"] {
        statements.push(format!(
            "MATCH (s:Store {{name: 'MainStreet'}}), (p:Product {{name: '{}'}}) CREATE (s)-[:SELLS]->(p)",
            product
        ));
    }
    let db = build(&statements);

    // Filter target by TWO properties: red AND large
    let rows = query(&db, "MATCH (s:Store)-[:SELLS]->(p:Product {color: 'red', size: 'large'}) RETURN p.name");
    assert_eq!(rows.len(), 1);
    assert_eq!(text(&rows[0], "p.name"), "Widget");
}

#[test]
fn test_start_and_target_both_filtered() {
    let db = setup_trials_graph();
    let rows = query(
        &db,
        "MATCH (t:Trial {phase: 'Phase2'})-[:STUDIES]->(d:DiseaseCategory {name: 'Diabetes'}) RETURN t.trial_id",
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(text(&rows[0], "t.trial_id"), "T003");
}

#[test]
fn test_target_property_with_count() {
    let db = setup_trials_graph();
    let rows = query(
        &db,
        "MATCH (t:Trial {phase: 'Phase3'})-[:STUDIES]->(d:DiseaseCategory {name: 'Diabetes'}) RETURN count(t)",
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_property("count(t)"), Some(&PropertyValue::Integer(2)));
}

/// Trials, diseases, countries, and relationships for multi-path joins
fn setup_multi_path_graph() -> GraphDatabase {
    let mut statements = Vec::new();
    for country in &["India", "USA", "UK"] {
        statements.push(format!("CREATE (c:Country {{name: '{}'}})", country));
    }
    for disease in &["Diabetes", "Cancer", "Respiratory"] {
        statements.push(format!("CREATE (d:DiseaseCategory {{name: '{}'}})", disease));
    }

    let trials = vec![
        ("T001", "India", "Diabetes"),
        ("T002", "India", "Cancer"),
        ("T003", "USA", "Diabetes"),
        ("T004", "UK", "Respiratory"),
        ("T005", "India", "Respiratory"),
    ];
    for (tid, country, disease) in &trials {
        statements.push(format!("CREATE (t:Trial {{trial_id: '{}'}})", tid));
        statements.push(format!(
            "MATCH (t:Trial {{trial_id: '{}'}}), (c:Country {{name: '{}'}}) CREATE (t)-[:CONDUCTED_IN]->(c)",
            tid, country
        ));
        statements.push(format!(
            "MATCH (t:Trial {{trial_id: '{}'}}), (d:DiseaseCategory {{name: '{}'}}) CREATE (t)-[:STUDIES]->(d)",
            tid, disease
        ));
    }
    build(&statements)
}

#[test]
fn test_multi_path_join_shared_variable() {
    let db = setup_multi_path_graph();

    // Shared variable t joins the two paths instead of a cross product
    let rows = query(
        &db,
        "MATCH (t:Trial)-[:CONDUCTED_IN]->(c:Country {name: 'India'}), (t)-[:STUDIES]->(d:DiseaseCategory) RETURN d.name, t.trial_id LIMIT 20",
    );
    assert_eq!(rows.len(), 3, "Expected 3 India trials but got {}", rows.len());

    let mut trial_disease: Vec<(String, String)> =
        rows.iter().map(|r| (text(r, "t.trial_id"), text(r, "d.name"))).collect();
    trial_disease.sort();
    assert_eq!(
        trial_disease,
        vec![
            ("T001".to_string(), "Diabetes".to_string()),
            ("T002".to_string(), "Cancer".to_string()),
            ("T005".to_string(), "Respiratory".to_string()),
        ]
    );
}

#[test]
fn test_multi_path_join_with_both_target_filters() {
    let db = setup_multi_path_graph();
    let rows = query(
        &db,
        "MATCH (t:Trial)-[:CONDUCTED_IN]->(c:Country {name: 'India'}), (t)-[:STUDIES]->(d:DiseaseCategory {name: 'Diabetes'}) RETURN t.trial_id",
    );
    assert_eq!(rows.len(), 1, "Expected 1 result but got {}", rows.len());
    assert_eq!(text(&rows[0], "t.trial_id"), "T001");
}

#[test]
fn test_multi_path_no_shared_variable() {
    let db = setup_multi_path_graph();

    // Two independent paths: cartesian product
    let rows = query(
        &db,
        "MATCH (c:Country {name: 'India'}), (d:DiseaseCategory {name: 'Diabetes'}) RETURN c.name, d.name",
    );
    assert_eq!(rows.len(), 1);
    assert_eq!(text(&rows[0], "c.name"), "India");
    assert_eq!(text(&rows[0], "d.name"), "Diabetes");
}
