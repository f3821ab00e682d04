use anyhow::Context;
use graphcore::{props, GraphConfig, GraphDatabase, QueryOptions};
use std::collections::HashMap;

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    println!("Graphcore v{}", graphcore::version());
    println!("==========================================");
    println!();

    // Optional data directory as the first argument
    let config = match std::env::args().nth(1) {
        Some(dir) => GraphConfig::persistent(dir),
        None => GraphConfig::in_memory(),
    };
    let db = GraphDatabase::open(config).context("opening graph")?;
    let stats = db.recovery_stats();
    if stats.replayed_transactions > 0 || stats.snapshot_watermark.is_some() {
        println!(
            "Recovered {} transactions (snapshot watermark {:?})",
            stats.replayed_transactions, stats.snapshot_watermark
        );
    }

    // Demo 1: Entities and relationships
    demo_property_graph(&db)?;

    // Demo 2: Cypher queries
    demo_cypher_queries(&db)?;

    if db.config().is_persistent() {
        db.checkpoint().context("checkpoint")?;
        println!("\n✓ Checkpoint written");
    }
    db.close()?;
    Ok(())
}

fn demo_property_graph(db: &GraphDatabase) -> anyhow::Result<()> {
    println!("=== Demo 1: Property Graph ===");
    if db.entity("alice").is_some() {
        println!("✓ Demo data already present");
        return Ok(());
    }

    db.create_constraint("Person", "name", true)?;
    let txn = db.begin_transaction()?;
    db.add_entity(txn, "alice", "Person", props! { "name" => "Alice", "age" => 30i64, "city" => "New York" })?;
    db.add_entity(txn, "bob", "Person", props! { "name" => "Bob", "age" => 25i64, "city" => "San Francisco" })?;
    db.add_entity(txn, "charlie", "Person", props! { "name" => "Charlie", "age" => 35i64, "city" => "New York" })?;
    db.add_relationship(txn, "alice", "bob", "KNOWS", props! { "since" => 2020i64, "strength" => 0.9 })?;
    db.add_relationship(txn, "bob", "charlie", "KNOWS", props! { "since" => 2019i64, "strength" => 0.8 })?;
    db.add_relationship(txn, "alice", "charlie", "FOLLOWS", props! {})?;
    let sequence = db.commit_transaction(txn)?;
    println!("✓ Committed 3 people and 3 relationships (sequence {})", sequence);

    let stats = db.statistics();
    println!("\nGraph Statistics:");
    println!("  Total nodes: {}", stats.node_count);
    println!("  Total edges: {}", stats.edge_count);
    Ok(())
}

fn demo_cypher_queries(db: &GraphDatabase) -> anyhow::Result<()> {
    println!("\n=== Demo 2: Cypher Queries ===");

    let queries = [
        "MATCH (n:Person) RETURN n.name ORDER BY n.name",
        "MATCH (n:Person) WHERE n.age > 28 RETURN n.name, n.age",
        "MATCH (a:Person)-[:KNOWS]->(b:Person) RETURN a.name, b.name",
        "MATCH (n:Person) RETURN n.city, count(n) AS people ORDER BY people DESC",
        "EXPLAIN MATCH (n:Person) WHERE n.name = 'Bob' RETURN n",
    ];
    for (i, text) in queries.iter().enumerate() {
        println!("\nQuery {}: {}", i + 1, text);
        let result = db.execute_query(text, HashMap::new())?;
        println!("  columns: {:?}", result.columns());
        for row in result {
            println!("  {}", row?.to_json());
        }
    }

    println!("\nQuery 6: MATCH (n:Person {{name: $name}}) RETURN n.city");
    let options = QueryOptions::new().param("name", "Charlie");
    for row in db.execute_query_with("MATCH (n:Person {name: $name}) RETURN n.city", options)? {
        println!("  {}", row?.to_json());
    }

    println!("\n✅ All queries executed successfully!");
    Ok(())
}
