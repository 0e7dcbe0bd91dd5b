//! OPTIONAL MATCH pruning rule.
//!
//! An OPTIONAL MATCH never removes rows, it only adds columns (or NULLs).
//! When the horizon of a stage collapses duplicates (DISTINCT, or
//! aggregation over DISTINCT inputs only), any part of an optional pattern
//! whose variables are never read afterwards can be removed. A dropped
//! relationship that still restricts a kept node is replaced by an
//! existence predicate on that node, so the kept columns keep the same
//! values.
//!
//! Per optional sub-graph the rule grows a set of kept elements to a fixed
//! point:
//! 1. connect everything required through [`smallest_graph_including`]
//! 2. keep relationships that share an unkept node with another one
//! 3. fold label checks of dropped endpoints, keep every other predicate
//!
//! Sub-graphs with nothing required are dropped entirely.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use log::{debug, trace};

use crate::binder::{
    Expression, ExistsPattern, NodePattern, PatternRelationship, QueryGraph, RelationshipPattern,
    Selections,
};
use crate::error::{GraphOptError, Result};
use crate::planner::config::OptimizerConfig;
use crate::planner::planner_query::{PlannerQuery, QueryProjection};

use super::connectivity::{overlapping_relationships, smallest_graph_including};
use super::dependencies::DependencyAnalyzer;
use super::predicates::{partition_predicates, PredicatePartition};
use super::{OptimizerContext, OptimizerRule, Transformed};

/// Prefix of the local variable naming the anonymous node of a dropped self-loop.
const UNNAMED_PREFIX: &str = "  UNNAMED_";

/// Removes the unused parts of OPTIONAL MATCH sub-graphs.
///
/// Applies to every stage of a [`PlannerQuery`] whose horizon allows it
/// (see [`horizon_allows_pruning`]).
#[derive(Debug, Clone, Copy, Default)]
pub struct OptionalMatchRemover;

impl OptimizerRule for OptionalMatchRemover {
    fn name(&self) -> &'static str {
        "OptionalMatchRemover"
    }

    fn rewrite(
        &self,
        query: Arc<PlannerQuery>,
        ctx: &OptimizerContext,
    ) -> Result<Transformed<Arc<PlannerQuery>>> {
        if !ctx.config().remove_optional_matches {
            return Ok(Transformed::No(query));
        }
        rewrite_stage(&query, ctx.config())
    }
}

/// Rewrites one stage and, recursively, its tail.
fn rewrite_stage(
    query: &Arc<PlannerQuery>,
    config: &OptimizerConfig,
) -> Result<Transformed<Arc<PlannerQuery>>> {
    let tail = match &query.tail {
        Some(tail) => Some(rewrite_stage(tail, config)?),
        None => None,
    };

    let graph = if query.graph.has_optional_matches()
        && horizon_allows_pruning(&query.horizon, config)
    {
        rewrite_graph(&query.graph, &query.horizon.dependencies(), config)?
    } else {
        Transformed::No(Arc::clone(&query.graph))
    };

    let tail_changed = tail.as_ref().is_some_and(Transformed::was_transformed);
    if !graph.was_transformed() && !tail_changed {
        return Ok(Transformed::No(Arc::clone(query)));
    }

    Ok(Transformed::Yes(Arc::new(PlannerQuery {
        graph: graph.into_inner(),
        horizon: query.horizon.clone(),
        tail: tail.map(Transformed::into_inner),
    })))
}

/// Returns true if removing rows that differ only in optional columns the
/// horizon never reads cannot change its result.
///
/// A distinct projection always qualifies. An aggregating projection
/// qualifies when every aggregate is a DISTINCT aggregate over an input
/// (`count(*)` does not). A plain projection qualifies only when
/// [`OptimizerConfig::rewrite_regular_projections`] is set.
#[must_use]
pub fn horizon_allows_pruning(horizon: &QueryProjection, config: &OptimizerConfig) -> bool {
    match horizon {
        QueryProjection::Regular { .. } => config.rewrite_regular_projections,
        QueryProjection::Distinct { .. } => true,
        QueryProjection::Aggregating { aggregations, .. } => {
            aggregations.iter().all(|(_, expr)| {
                matches!(
                    expr,
                    Expression::Aggregate {
                        input: Some(_),
                        distinct: true,
                        ..
                    }
                )
            })
        }
    }
}

/// Prunes every optional sub-graph of `graph`.
fn rewrite_graph(
    graph: &Arc<QueryGraph>,
    horizon_deps: &BTreeSet<String>,
    config: &OptimizerConfig,
) -> Result<Transformed<Arc<QueryGraph>>> {
    graph.validate()?;

    // Later sub-graphs are rewritten first so that only the ones that stay
    // keep elements of earlier ones alive.
    let mut analyzer = DependencyAnalyzer::new(graph, horizon_deps);
    let mut optionals = Vec::with_capacity(graph.optional_matches.len());
    let mut changed = false;

    for (index, optional) in graph.optional_matches.iter().enumerate().rev() {
        let must_include = analyzer.must_include(optional);
        let rewritten = match prune_optional_match(optional, &must_include, config)? {
            PruneOutcome::Unchanged => Arc::clone(optional),
            PruneOutcome::Reduced(reduced) => {
                debug!("optional match #{index} reduced to:\n{reduced}");
                changed = true;
                Arc::new(reduced)
            }
            PruneOutcome::Dropped => {
                debug!("optional match #{index} dropped, nothing read from it");
                changed = true;
                continue;
            }
        };
        analyzer.record_surviving(&rewritten);
        optionals.push(rewritten);
    }
    optionals.reverse();

    if !changed {
        return Ok(Transformed::No(Arc::clone(graph)));
    }
    Ok(Transformed::Yes(Arc::new(
        graph.as_ref().clone().with_optional_matches(optionals),
    )))
}

/// Result of pruning one optional sub-graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneOutcome {
    /// Everything in the sub-graph is still needed.
    Unchanged,
    /// Some elements were removed.
    Reduced(QueryGraph),
    /// Nothing in the sub-graph is needed.
    Dropped,
}

/// Computes the pruned form of one optional sub-graph.
///
/// `must_include` lists the variables later computation reads from this
/// sub-graph (arguments excluded).
///
/// # Errors
///
/// Returns [`GraphOptError::InternalError`] if the kept-element set does not
/// settle within the configured bound, or if the result would violate an
/// invariant of the rewrite.
pub fn prune_optional_match(
    optional: &QueryGraph,
    must_include: &BTreeSet<String>,
    config: &OptimizerConfig,
) -> Result<PruneOutcome> {
    let must_keep = smallest_graph_including(optional, must_include)?;
    if must_keep.is_empty() {
        return Ok(PruneOutcome::Dropped);
    }

    let endpoints: BTreeSet<String> = optional
        .pattern_relationships
        .iter()
        .flat_map(|rel| [rel.left.clone(), rel.right.clone()])
        .collect();

    // Nodes without relationships cannot be expressed as existence checks.
    // Every round only grows this set inside the covered ids, so the number
    // of rounds (the confirming one included) never exceeds the element count.
    let covered = optional.all_covered_ids();
    let mut elements: BTreeSet<String> = must_include
        .iter()
        .chain(&optional.argument_ids)
        .chain(optional.pattern_nodes.iter().filter(|n| !endpoints.contains(*n)))
        .filter(|id| covered.contains(*id))
        .cloned()
        .collect();

    let bound = config
        .max_fixed_point_iterations
        .unwrap_or(covered.len());
    let mut iteration = 0;
    loop {
        iteration += 1;
        if iteration > bound {
            return Err(GraphOptError::internal(format!(
                "optional match pruning did not converge after {bound} iterations"
            )));
        }

        let before = elements.clone();
        elements = smallest_graph_including(optional, &elements)?;
        for rel in overlapping_relationships(&optional.pattern_relationships, &elements) {
            elements.insert(rel.left.clone());
            elements.insert(rel.right.clone());
        }
        elements = smallest_graph_including(optional, &elements)?;
        let partition =
            partition_predicates(optional.selections.predicates(), &elements, &endpoints);
        elements.extend(partition.dependencies());
        elements = smallest_graph_including(optional, &elements)?;

        trace!("iteration {iteration}: keeping {elements:?}");
        if elements == before {
            break;
        }
    }

    let partition = partition_predicates(optional.selections.predicates(), &elements, &endpoints);
    let pruned = build_pruned_graph(optional, must_include, &elements, partition)?;
    if pruned == *optional {
        Ok(PruneOutcome::Unchanged)
    } else {
        Ok(PruneOutcome::Reduced(pruned))
    }
}

/// Assembles the rewritten sub-graph from the settled kept-element set.
fn build_pruned_graph(
    optional: &QueryGraph,
    must_include: &BTreeSet<String>,
    elements: &BTreeSet<String>,
    partition: PredicatePartition,
) -> Result<QueryGraph> {
    let covered = optional.all_covered_ids();
    if let Some(missing) = must_include
        .iter()
        .find(|id| covered.contains(*id) && !elements.contains(*id))
    {
        return Err(GraphOptError::internal(format!(
            "required element '{missing}' was pruned"
        )));
    }

    let (kept_rels, dropped_rels): (Vec<&PatternRelationship>, Vec<&PatternRelationship>) =
        optional
            .pattern_relationships
            .iter()
            .partition(|rel| elements.contains(&rel.name));

    // Each dropped node must hang off exactly one dropped relationship.
    let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
    for rel in &dropped_rels {
        for endpoint in [&rel.left, &rel.right] {
            if elements.contains(endpoint) {
                continue;
            }
            if let Some(previous) = owners.insert(endpoint, &rel.name) {
                if previous != rel.name {
                    return Err(GraphOptError::internal(format!(
                        "'{endpoint}' is shared by dropped relationships '{previous}' and '{}'",
                        rel.name
                    )));
                }
            }
        }
    }

    let mut selections = Selections::from_predicates(partition.kept);
    for rel in &dropped_rels {
        let pattern = existence_pattern(rel, elements, &partition.label_folds);
        selections = selections.with_expression(Expression::exists(pattern));
    }

    Ok(QueryGraph {
        pattern_nodes: optional
            .pattern_nodes
            .iter()
            .filter(|n| elements.contains(*n))
            .cloned()
            .collect(),
        pattern_relationships: kept_rels.into_iter().cloned().collect(),
        selections,
        argument_ids: optional.argument_ids.clone(),
        optional_matches: optional.optional_matches.clone(),
        mutating_patterns: optional.mutating_patterns.clone(),
    })
}

/// Builds the existence check replacing a dropped relationship.
///
/// Kept endpoints are referenced by name. A dropped endpoint becomes an
/// anonymous node carrying its folded labels; for a self-loop both ends
/// share one pattern-local variable.
fn existence_pattern(
    rel: &PatternRelationship,
    elements: &BTreeSet<String>,
    label_folds: &BTreeMap<String, Vec<String>>,
) -> ExistsPattern {
    let labels = |var: &str| label_folds.get(var).cloned().unwrap_or_default();

    let mut local_variables = BTreeSet::new();
    let (left, right) = if rel.is_self_loop() && !elements.contains(&rel.left) {
        let local = format!("{UNNAMED_PREFIX}{}", rel.name);
        local_variables.insert(local.clone());
        (
            NodePattern {
                variable: Some(local.clone()),
                labels: labels(rel.left.as_str()),
            },
            NodePattern::bound(local),
        )
    } else {
        let node = |var: &String| {
            if elements.contains(var) {
                NodePattern::bound(var.clone())
            } else {
                NodePattern::anonymous(labels(var.as_str()))
            }
        };
        (node(&rel.left), node(&rel.right))
    };

    ExistsPattern {
        left,
        relationship: RelationshipPattern {
            variable: None,
            types: rel.types.clone(),
            direction: rel.direction,
            path_bounds: rel.path_bounds,
        },
        right,
        local_variables,
    }
}
