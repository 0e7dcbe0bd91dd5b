//! Splitting optional-pattern predicates into kept predicates and label
//! checks folded into existence patterns.

use std::collections::{BTreeMap, BTreeSet};

use crate::binder::{Predicate, PredicateShape};

/// Outcome of [`partition_predicates`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredicatePartition {
    /// Labels to require on the anonymous end of a synthesized existence
    /// pattern, keyed by the dropped node variable.
    pub label_folds: BTreeMap<String, Vec<String>>,
    /// Predicates that stay in the rewritten selections, in original order.
    pub kept: Vec<Predicate>,
}

impl PredicatePartition {
    /// Returns every variable the kept predicates read.
    #[must_use]
    pub fn dependencies(&self) -> BTreeSet<String> {
        self.kept
            .iter()
            .flat_map(|p| p.dependencies().iter().cloned())
            .collect()
    }
}

/// Partitions `predicates` given the elements currently kept.
///
/// A single-label check on a variable that is not kept and is an endpoint of
/// a relationship of the pattern (`relationship_endpoints`) is folded into
/// that variable's label list. Every other predicate is kept verbatim, so
/// its dependencies pull its variables back into the kept set.
#[must_use]
pub fn partition_predicates(
    predicates: &[Predicate],
    kept: &BTreeSet<String>,
    relationship_endpoints: &BTreeSet<String>,
) -> PredicatePartition {
    let mut partition = PredicatePartition::default();
    for predicate in predicates {
        match predicate.shape() {
            PredicateShape::LabelCheck { variable, label }
                if !kept.contains(variable) && relationship_endpoints.contains(variable) =>
            {
                let labels = partition.label_folds.entry(variable.to_string()).or_default();
                if !labels.iter().any(|l| l == label) {
                    labels.push(label.to_string());
                }
            }
            _ => partition.kept.push(predicate.clone()),
        }
    }
    partition
}
