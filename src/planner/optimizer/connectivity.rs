//! Minimal connected sub-pattern search.
//!
//! Given a set of element names that must survive, these functions find a
//! small connected part of an optional pattern that still contains all of
//! them. Paths between pairs of nodes are found with a bidirectional
//! breadth-first search over pattern relationships.

use std::collections::{BTreeMap, BTreeSet};

use log::{trace, warn};

use crate::binder::{PatternRelationship, QueryGraph};
use crate::error::{GraphOptError, Result};

/// Adjacency view of one query graph.
struct PatternGraph<'a> {
    graph: &'a QueryGraph,
    nodes: BTreeSet<&'a str>,
    adjacency: BTreeMap<&'a str, Vec<&'a PatternRelationship>>,
    relationships: BTreeMap<&'a str, &'a PatternRelationship>,
}

/// A partial path grown from one side of the search.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct PathSoFar<'a> {
    end: &'a str,
    visited: BTreeSet<&'a str>,
}

impl<'a> PatternGraph<'a> {
    fn new(graph: &'a QueryGraph) -> Self {
        let mut nodes: BTreeSet<&str> = graph.pattern_nodes.iter().map(String::as_str).collect();
        let mut adjacency: BTreeMap<&str, Vec<&PatternRelationship>> = BTreeMap::new();
        let mut relationships = BTreeMap::new();
        for rel in &graph.pattern_relationships {
            nodes.insert(&rel.left);
            nodes.insert(&rel.right);
            adjacency.entry(rel.left.as_str()).or_default().push(rel);
            if !rel.is_self_loop() {
                adjacency.entry(rel.right.as_str()).or_default().push(rel);
            }
            relationships.insert(rel.name.as_str(), rel);
        }
        PatternGraph {
            graph,
            nodes,
            adjacency,
            relationships,
        }
    }

    fn node(&self, name: &str) -> Result<&'a str> {
        self.nodes.get(name).copied().ok_or_else(|| {
            GraphOptError::internal(format!("'{name}' is not a node of the optional pattern"))
        })
    }

    fn covered_ids(&self, rels: &BTreeSet<&str>) -> BTreeSet<String> {
        rels.iter()
            .filter_map(|name| self.relationships.get(name))
            .flat_map(|rel| rel.covered_ids())
            .collect()
    }

    fn expand(&self, frontier: &BTreeSet<PathSoFar<'a>>) -> BTreeSet<PathSoFar<'a>> {
        let mut next = BTreeSet::new();
        for path in frontier {
            let Some(rels) = self.adjacency.get(path.end) else {
                continue;
            };
            for &rel in rels {
                if path.visited.contains(rel.name.as_str()) {
                    continue;
                }
                if let Some(other) = rel.other_side(path.end) {
                    let mut visited = path.visited.clone();
                    visited.insert(rel.name.as_str());
                    next.insert(PathSoFar {
                        end: other,
                        visited,
                    });
                }
            }
        }
        next
    }

    /// Returns the relationship sets formed where a path in `from` reaches a
    /// node touched by a relationship already used by a path in `into`.
    fn joins(
        &self,
        from: &BTreeSet<PathSoFar<'a>>,
        into: &BTreeSet<PathSoFar<'a>>,
    ) -> Vec<BTreeSet<&'a str>> {
        let mut found = Vec::new();
        for lhs in from {
            for rhs in into {
                let meets = rhs.visited.iter().any(|name| {
                    self.relationships
                        .get(name)
                        .is_some_and(|rel| rel.touches(lhs.end))
                });
                if meets {
                    found.push(lhs.visited.union(&rhs.visited).copied().collect());
                }
            }
        }
        found
    }

    /// Picks the smallest join by covered ids, then relationship count, then names.
    fn best(&self, joins: Vec<BTreeSet<&'a str>>) -> Option<BTreeSet<String>> {
        joins
            .into_iter()
            .map(|rels| (self.covered_ids(&rels), rels))
            .min_by(|(ids_a, rels_a), (ids_b, rels_b)| {
                ids_a
                    .len()
                    .cmp(&ids_b.len())
                    .then(rels_a.len().cmp(&rels_b.len()))
                    .then_with(|| rels_a.cmp(rels_b))
            })
            .map(|(ids, _)| ids)
    }

    fn find_path(&self, start: &str, end: &str) -> Result<BTreeSet<String>> {
        let start = self.node(start)?;
        let end = self.node(end)?;

        let mut left = BTreeSet::from([PathSoFar {
            end: start,
            visited: BTreeSet::new(),
        }]);
        let mut right = BTreeSet::from([PathSoFar {
            end,
            visited: BTreeSet::new(),
        }]);

        let rel_count = self.graph.pattern_relationships.len();
        for step in 0..=rel_count {
            let joins = if step % 2 == 0 {
                left = self.expand(&left);
                self.joins(&left, &right)
            } else {
                right = self.expand(&right);
                self.joins(&right, &left)
            };
            if let Some(ids) = self.best(joins) {
                trace!("path {start} .. {end} found after {} steps: {ids:?}", step + 1);
                return Ok(ids);
            }
        }

        warn!("no path between '{start}' and '{end}', keeping every relationship");
        Ok(self
            .graph
            .pattern_relationships
            .iter()
            .flat_map(PatternRelationship::covered_ids)
            .collect())
    }
}

/// Returns a connected set of element names of `graph` containing every
/// element of `must_include` that the graph covers.
///
/// Fewer than two required elements need no connecting path; a lone
/// relationship still brings its endpoints. Otherwise every pair of seed
/// nodes is joined by [`find_path_between`] and the results are unioned.
///
/// # Errors
///
/// Returns [`GraphOptError::InternalError`] if the path search is handed a
/// node that is not part of the graph.
pub fn smallest_graph_including(
    graph: &QueryGraph,
    must_include: &BTreeSet<String>,
) -> Result<BTreeSet<String>> {
    let covered = graph.all_covered_ids();

    if must_include.len() < 2 {
        return Ok(must_include
            .iter()
            .filter(|id| covered.contains(*id))
            .flat_map(|id| match graph.relationship(id) {
                Some(rel) => rel.covered_ids(),
                None => BTreeSet::from([id.clone()]),
            })
            .collect());
    }

    let pattern = PatternGraph::new(graph);
    let mut seeds: BTreeSet<&str> = BTreeSet::new();
    for id in must_include {
        if let Some(&node) = pattern.nodes.get(id.as_str()) {
            seeds.insert(node);
        } else if let Some(&rel) = pattern.relationships.get(id.as_str()) {
            seeds.insert(&rel.left);
            seeds.insert(&rel.right);
        }
    }

    let mut result: BTreeSet<String> = seeds.iter().map(|s| (*s).to_string()).collect();
    for (i, a) in seeds.iter().enumerate() {
        for b in seeds.iter().skip(i + 1) {
            result.extend(pattern.find_path(a, b)?);
        }
    }
    result.extend(must_include.iter().filter(|id| covered.contains(*id)).cloned());
    Ok(result)
}

/// Returns the covered ids of the cheapest relationship path joining
/// `start` and `end` inside `graph`.
///
/// Falls back to every relationship of the graph (with a warning) when the
/// two nodes are not connected.
///
/// # Errors
///
/// Returns [`GraphOptError::InternalError`] if either endpoint is not a node
/// of `graph`.
pub fn find_path_between(graph: &QueryGraph, start: &str, end: &str) -> Result<BTreeSet<String>> {
    PatternGraph::new(graph).find_path(start, end)
}

/// Returns the relationships that must be kept alongside `elements_to_keep`:
/// those already kept, plus every other relationship whose unkept elements
/// overlap with those of another unkept relationship.
///
/// Two dropped relationships sharing an unkept node could not be replaced by
/// independent existence checks, so both are kept instead.
#[must_use]
pub fn overlapping_relationships<'a>(
    relationships: &'a [PatternRelationship],
    elements_to_keep: &BTreeSet<String>,
) -> Vec<&'a PatternRelationship> {
    let (kept, not_yet_kept): (Vec<_>, Vec<_>) = relationships
        .iter()
        .partition(|rel| elements_to_keep.contains(&rel.name));

    let residuals: Vec<BTreeSet<String>> = not_yet_kept
        .iter()
        .map(|rel| {
            rel.covered_ids()
                .into_iter()
                .filter(|id| !elements_to_keep.contains(id))
                .collect()
        })
        .collect();

    let promoted = not_yet_kept.iter().enumerate().filter(|(i, _)| {
        residuals
            .iter()
            .enumerate()
            .any(|(j, other)| *i != j && !residuals[*i].is_disjoint(other))
    });

    kept.into_iter()
        .chain(promoted.map(|(_, rel)| *rel))
        .collect()
}
