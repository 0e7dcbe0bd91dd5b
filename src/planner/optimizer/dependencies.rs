//! Variables an OPTIONAL MATCH must keep alive for later computation.

use std::collections::BTreeSet;

use crate::binder::QueryGraph;

/// Computes, per optional sub-graph, which variables are read after it.
///
/// Optional sub-graphs are visited last to first. Once a sub-graph has been
/// rewritten, [`DependencyAnalyzer::record_surviving`] adds what its
/// rewritten form reads; a dropped sub-graph is never recorded and so keeps
/// nothing alive in the sub-graphs before it.
#[derive(Debug, Clone)]
pub struct DependencyAnalyzer {
    /// Horizon and update dependencies.
    base: BTreeSet<String>,
    /// Variables the mandatory pattern already guarantees.
    guaranteed: BTreeSet<String>,
    /// Arguments and predicate dependencies of the surviving sub-graphs recorded so far.
    later: BTreeSet<String>,
}

impl DependencyAnalyzer {
    /// Prepares the analysis for `graph` whose horizon reads `horizon_deps`.
    #[must_use]
    pub fn new(graph: &QueryGraph, horizon_deps: &BTreeSet<String>) -> Self {
        let mut base = horizon_deps.clone();
        for update in &graph.mutating_patterns {
            base.extend(update.dependencies());
        }

        DependencyAnalyzer {
            base,
            guaranteed: graph.ids_without_optional_matches_or_updates(),
            later: BTreeSet::new(),
        }
    }

    /// Records a sub-graph that stays in the plan, after its rewrite.
    pub fn record_surviving(&mut self, optional: &QueryGraph) {
        self.later.extend(optional.argument_ids.iter().cloned());
        self.later.extend(optional.selections.dependencies());
    }

    /// Returns every variable read after the sub-graph being processed
    /// that the mandatory pattern does not already provide.
    #[must_use]
    pub fn required_variables(&self) -> BTreeSet<String> {
        self.base
            .union(&self.later)
            .filter(|v| !self.guaranteed.contains(*v))
            .cloned()
            .collect()
    }

    /// Returns the required variables `optional` must produce itself
    /// (those not already bound when entering it).
    #[must_use]
    pub fn must_include(&self, optional: &QueryGraph) -> BTreeSet<String> {
        self.required_variables()
            .into_iter()
            .filter(|v| !optional.argument_ids.contains(v))
            .collect()
    }
}

/// Returns the variables that must survive the `index`-th optional sub-graph
/// of `graph`, assuming every later sub-graph stays as it is.
#[must_use]
pub fn required_variables(
    graph: &QueryGraph,
    horizon_deps: &BTreeSet<String>,
    index: usize,
) -> BTreeSet<String> {
    let mut analyzer = DependencyAnalyzer::new(graph, horizon_deps);
    for optional in graph.optional_matches.iter().skip(index + 1) {
        analyzer.record_surviving(optional);
    }
    analyzer.required_variables()
}
