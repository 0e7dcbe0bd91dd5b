//! Contract tests for the Planner module.
//!
//! These tests verify the optimizer contracts:
//! - Only optional sub-graphs of a stage change
//! - Unchanged queries come back as the same allocation
//! - Configuration round-trips through serde

use std::sync::Arc;

use graphopt::binder::{Direction, Expression, PatternRelationship, QueryGraph};
use graphopt::planner::{QueryShuffle, SortExpr};
use graphopt::{OptimizerConfig, Planner, PlannerQuery, QueryProjection};

/// MATCH (a)-[m]->(c) OPTIONAL MATCH (a)-[r]->(b) WITH DISTINCT a ORDER BY a RETURN a
fn create_test_query() -> Arc<PlannerQuery> {
    let graph = QueryGraph::new()
        .with_nodes(["a", "c"])
        .with_relationship(PatternRelationship::new("m", "a", "c", Direction::Forward))
        .with_optional_match(
            QueryGraph::new()
                .with_arguments(["a"])
                .with_node("b")
                .with_relationship(PatternRelationship::new("r", "a", "b", Direction::Forward)),
        );
    let horizon = QueryProjection::distinct(vec![("a".into(), Expression::variable("a"))])
        .with_shuffle(QueryShuffle {
            sort_items: vec![SortExpr::asc(Expression::variable("a"))],
            skip: None,
            limit: Some(10),
        });
    let tail = PlannerQuery::new(
        QueryGraph::new().with_arguments(["a"]),
        QueryProjection::regular(vec![("a".into(), Expression::variable("a"))]),
    );
    Arc::new(PlannerQuery::new(graph, horizon).with_tail(tail))
}

#[test]
fn test_mandatory_part_preserved() {
    // Contract: nodes, relationships, predicates and arguments of the
    //           mandatory pattern are never touched
    let query = create_test_query();
    let optimized = Planner::default().optimize(Arc::clone(&query)).unwrap();

    assert!(optimized.graph.optional_matches.is_empty());
    assert_eq!(optimized.graph.pattern_nodes, query.graph.pattern_nodes);
    assert_eq!(
        optimized.graph.pattern_relationships,
        query.graph.pattern_relationships
    );
    assert_eq!(optimized.graph.selections, query.graph.selections);
    assert_eq!(optimized.graph.argument_ids, query.graph.argument_ids);
}

#[test]
fn test_horizon_and_tail_preserved() {
    // Contract: the rewrite never changes a horizon, and an unchanged tail is shared
    let query = create_test_query();
    let optimized = Planner::default().optimize(Arc::clone(&query)).unwrap();

    assert_eq!(optimized.horizon, query.horizon);
    let (Some(before), Some(after)) = (&query.tail, &optimized.tail) else {
        panic!("tail should survive optimization");
    };
    assert!(Arc::ptr_eq(before, after));
}

#[test]
fn test_unchanged_query_is_same_allocation() {
    // Contract: a query nothing can be pruned from is returned as-is
    let graph = QueryGraph::new().with_node("a").with_optional_match(
        QueryGraph::new()
            .with_arguments(["a"])
            .with_node("b")
            .with_relationship(PatternRelationship::new("r", "a", "b", Direction::Forward)),
    );
    let query = Arc::new(PlannerQuery::new(
        graph,
        QueryProjection::distinct(vec![("b".into(), Expression::variable("b"))]),
    ));

    let (optimized, applied) = Planner::default()
        .optimize_with_tracking(Arc::clone(&query))
        .unwrap();
    assert!(Arc::ptr_eq(&query, &optimized));
    assert!(applied.is_empty(), "No rule should report a rewrite");
}

#[test]
fn test_reduced_graph_keeps_arguments() {
    // Contract: a reduced optional graph keeps every argument, used or not
    let graph = QueryGraph::new().with_nodes(["a", "d"]).with_optional_match(
        QueryGraph::new()
            .with_arguments(["a", "d"])
            .with_nodes(["b", "c"])
            .with_relationship(PatternRelationship::new("r1", "a", "b", Direction::Forward))
            .with_relationship(PatternRelationship::new("r2", "b", "c", Direction::Forward)),
    );
    let query = Arc::new(PlannerQuery::new(
        graph,
        QueryProjection::distinct(vec![("b".into(), Expression::variable("b"))]),
    ));

    let optimized = Planner::default().optimize(query).unwrap();
    let optional = &optimized.graph.optional_matches[0];
    assert_eq!(
        optional.argument_ids,
        ["a", "d"].iter().map(|s| (*s).to_string()).collect()
    );
    assert!(optional.relationship("r1").is_some());
    assert!(optional.relationship("r2").is_none());
    assert!(!optional.pattern_nodes.contains("c"));
}

#[test]
fn test_explain_verbose_sections() {
    // Contract: EXPLAIN shows the query, the applied rules and the result
    let planner = Planner::default();
    let output = planner.explain_verbose(create_test_query()).unwrap();

    let query_pos = output.find("=== Planner Query ===").unwrap();
    let rules_pos = output.find("=== Applied Rules ===").unwrap();
    let optimized_pos = output.find("=== Optimized Query ===").unwrap();
    assert!(query_pos < rules_pos && rules_pos < optimized_pos);
    assert!(output.contains("  OptionalMatchRemover"));
    assert!(output[query_pos..rules_pos].contains("OPTIONAL MATCH"));
    assert!(!output[optimized_pos..].contains("OPTIONAL MATCH"));
}

#[test]
fn test_config_serde_round_trip() {
    // Contract: configuration can be loaded from JSON; missing fields take defaults
    let config = OptimizerConfig::new()
        .with_rewrite_regular_projections(false)
        .with_max_fixed_point_iterations(16);
    let json = serde_json::to_string(&config).unwrap();
    let parsed: OptimizerConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);

    let partial: OptimizerConfig =
        serde_json::from_str(r#"{"remove_optional_matches": false}"#).unwrap();
    assert!(!partial.remove_optional_matches);
    assert!(partial.rewrite_regular_projections);
    assert_eq!(partial.max_fixed_point_iterations, None);
}

#[test]
fn test_disabled_config_registers_no_rule() {
    let planner = Planner::new(OptimizerConfig::new().with_remove_optional_matches(false)).unwrap();
    assert!(planner.rule_names().is_empty());
    assert_eq!(Planner::default().rule_names(), vec!["OptionalMatchRemover"]);
}
