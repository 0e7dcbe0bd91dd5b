//! Query graph representation for bound patterns.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{GraphOptError, Result};

use super::expression::{Expression, LogicalOp};

/// Bound query graph representing a MATCH pattern and everything attached to it.
///
/// Query graphs are immutable once built: rewrites construct new graphs and
/// share untouched optional sub-graphs through `Arc`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryGraph {
    /// Node variables introduced by this pattern.
    pub pattern_nodes: BTreeSet<String>,
    /// Relationship patterns. Names are unique within the graph.
    pub pattern_relationships: Vec<PatternRelationship>,
    /// WHERE predicates.
    pub selections: Selections,
    /// Variables bound by an enclosing scope.
    pub argument_ids: BTreeSet<String>,
    /// OPTIONAL MATCH sub-graphs, in query order.
    pub optional_matches: Vec<Arc<QueryGraph>>,
    /// Update clauses evaluated against this graph's rows.
    pub mutating_patterns: Vec<MutatingPattern>,
}

impl QueryGraph {
    /// Creates a new empty query graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node variable.
    #[must_use]
    pub fn with_node(mut self, variable: impl Into<String>) -> Self {
        self.pattern_nodes.insert(variable.into());
        self
    }

    /// Adds several node variables.
    #[must_use]
    pub fn with_nodes<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pattern_nodes.extend(variables.into_iter().map(Into::into));
        self
    }

    /// Replaces the node variables.
    #[must_use]
    pub fn with_pattern_nodes(mut self, nodes: BTreeSet<String>) -> Self {
        self.pattern_nodes = nodes;
        self
    }

    /// Adds a relationship pattern.
    #[must_use]
    pub fn with_relationship(mut self, rel: PatternRelationship) -> Self {
        self.pattern_relationships.push(rel);
        self
    }

    /// Replaces the relationship patterns.
    #[must_use]
    pub fn with_pattern_relationships(mut self, rels: Vec<PatternRelationship>) -> Self {
        self.pattern_relationships = rels;
        self
    }

    /// Adds a WHERE predicate, normalizing conjunctions and multi-label checks.
    #[must_use]
    pub fn with_predicate(mut self, expr: Expression) -> Self {
        self.selections = self.selections.with_expression(expr);
        self
    }

    /// Replaces the selections.
    #[must_use]
    pub fn with_selections(mut self, selections: Selections) -> Self {
        self.selections = selections;
        self
    }

    /// Adds argument variables.
    #[must_use]
    pub fn with_arguments<I, S>(mut self, variables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argument_ids.extend(variables.into_iter().map(Into::into));
        self
    }

    /// Appends an OPTIONAL MATCH sub-graph.
    #[must_use]
    pub fn with_optional_match(mut self, optional: QueryGraph) -> Self {
        self.optional_matches.push(Arc::new(optional));
        self
    }

    /// Replaces the OPTIONAL MATCH sub-graphs.
    #[must_use]
    pub fn with_optional_matches(mut self, optionals: Vec<Arc<QueryGraph>>) -> Self {
        self.optional_matches = optionals;
        self
    }

    /// Appends an update clause.
    #[must_use]
    pub fn with_mutating_pattern(mut self, pattern: MutatingPattern) -> Self {
        self.mutating_patterns.push(pattern);
        self
    }

    /// Returns the relationship with the given name.
    #[must_use]
    pub fn relationship(&self, name: &str) -> Option<&PatternRelationship> {
        self.pattern_relationships.iter().find(|r| r.name == name)
    }

    /// Returns true if the query graph has any relationships.
    #[must_use]
    pub fn has_relationships(&self) -> bool {
        !self.pattern_relationships.is_empty()
    }

    /// Returns true if any OPTIONAL MATCH is attached.
    #[must_use]
    pub fn has_optional_matches(&self) -> bool {
        !self.optional_matches.is_empty()
    }

    /// Returns every node of the pattern: declared nodes plus relationship
    /// endpoints (argument nodes used by a relationship included).
    #[must_use]
    pub fn node_ids(&self) -> BTreeSet<String> {
        let mut nodes = self.pattern_nodes.clone();
        for rel in &self.pattern_relationships {
            nodes.insert(rel.left.clone());
            nodes.insert(rel.right.clone());
        }
        nodes
    }

    /// Returns all node and relationship names of this pattern.
    ///
    /// Optional sub-graphs are not included.
    #[must_use]
    pub fn all_covered_ids(&self) -> BTreeSet<String> {
        let mut ids = self.node_ids();
        ids.extend(self.pattern_relationships.iter().map(|r| r.name.clone()));
        ids
    }

    /// Returns the variables guaranteed by the mandatory part of this graph:
    /// its arguments, nodes and relationships, excluding anything introduced
    /// only by an optional sub-graph or an update clause.
    #[must_use]
    pub fn ids_without_optional_matches_or_updates(&self) -> BTreeSet<String> {
        let mut ids = self.argument_ids.clone();
        ids.extend(self.pattern_nodes.iter().cloned());
        ids.extend(self.pattern_relationships.iter().map(|r| r.name.clone()));
        ids
    }

    /// Counts pattern elements (nodes and relationships) of this graph.
    #[must_use]
    pub fn element_count(&self) -> usize {
        self.all_covered_ids().len()
    }

    /// Checks the structural invariants of this graph and its optional sub-graphs.
    ///
    /// # Errors
    ///
    /// Returns [`GraphOptError::InvalidPlan`] if a relationship name is reused,
    /// a relationship endpoint is neither a pattern node nor an argument, or an
    /// optional sub-graph redeclares an element of its enclosing graph.
    pub fn validate(&self) -> Result<()> {
        let mut seen = BTreeSet::new();
        for rel in &self.pattern_relationships {
            if !seen.insert(rel.name.as_str()) || self.pattern_nodes.contains(&rel.name) {
                return Err(GraphOptError::InvalidPlan(format!(
                    "duplicate pattern element '{}'",
                    rel.name
                )));
            }
            for endpoint in [&rel.left, &rel.right] {
                if !self.pattern_nodes.contains(endpoint) && !self.argument_ids.contains(endpoint) {
                    return Err(GraphOptError::InvalidPlan(format!(
                        "relationship '{}' references unknown node '{endpoint}'",
                        rel.name
                    )));
                }
            }
        }

        let own = self.ids_without_optional_matches_or_updates();
        for optional in &self.optional_matches {
            let introduced = optional
                .pattern_nodes
                .iter()
                .chain(optional.pattern_relationships.iter().map(|r| &r.name));
            for id in introduced {
                if own.contains(id) {
                    return Err(GraphOptError::InvalidPlan(format!(
                        "optional pattern redeclares '{id}'; it must be an argument"
                    )));
                }
            }
            optional.validate()?;
        }
        Ok(())
    }
}

/// Bound relationship pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PatternRelationship {
    /// Relationship variable (anonymous relationships get generated names).
    pub name: String,
    /// Left node variable.
    pub left: String,
    /// Right node variable.
    pub right: String,
    /// Traversal direction relative to left -> right.
    pub direction: Direction,
    /// Allowed relationship types (empty = any).
    pub types: Vec<String>,
    /// For variable-length paths: (min, max) hops, `None` max = unbounded.
    pub path_bounds: Option<(usize, Option<usize>)>,
}

impl PatternRelationship {
    /// Creates a new relationship pattern.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        left: impl Into<String>,
        right: impl Into<String>,
        direction: Direction,
    ) -> Self {
        PatternRelationship {
            name: name.into(),
            left: left.into(),
            right: right.into(),
            direction,
            types: Vec::new(),
            path_bounds: None,
        }
    }

    /// Adds an allowed relationship type.
    #[must_use]
    pub fn with_type(mut self, rel_type: impl Into<String>) -> Self {
        self.types.push(rel_type.into());
        self
    }

    /// Sets path bounds for variable-length paths.
    #[must_use]
    pub fn with_path_bounds(mut self, min: usize, max: Option<usize>) -> Self {
        self.path_bounds = Some((min, max));
        self
    }

    /// Returns the names this relationship touches: itself and both endpoints.
    #[must_use]
    pub fn covered_ids(&self) -> BTreeSet<String> {
        BTreeSet::from([self.name.clone(), self.left.clone(), self.right.clone()])
    }

    /// Returns true if `node` is one of the endpoints.
    #[must_use]
    pub fn touches(&self, node: &str) -> bool {
        self.left == node || self.right == node
    }

    /// Returns the endpoint that is not `node`, or `None` if `node` is not an endpoint.
    ///
    /// For a self-loop the other side is the node itself.
    #[must_use]
    pub fn other_side(&self, node: &str) -> Option<&str> {
        if self.left == node {
            Some(&self.right)
        } else if self.right == node {
            Some(&self.left)
        } else {
            None
        }
    }

    /// Returns true if both endpoints are the same node.
    #[must_use]
    pub fn is_self_loop(&self) -> bool {
        self.left == self.right
    }

    /// Returns true if this is a variable-length path.
    #[must_use]
    pub fn is_variable_length(&self) -> bool {
        self.path_bounds.is_some()
    }
}

/// Traversal direction for relationships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// Forward direction (->).
    Forward,
    /// Backward direction (<-).
    Backward,
    /// Both directions (-).
    Both,
}

impl Direction {
    /// Returns the opposite direction.
    #[must_use]
    pub fn reverse(&self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
            Direction::Both => Direction::Both,
        }
    }
}

// =============================================================================
// Predicates
// =============================================================================

/// A WHERE conjunct together with the variables it reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    expression: Expression,
    dependencies: BTreeSet<String>,
}

/// How the optimizer may treat a predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PredicateShape<'a> {
    /// Single-label test on one variable.
    LabelCheck { variable: &'a str, label: &'a str },
    /// Anything else; only its dependency set may be relied on.
    Opaque,
}

impl Predicate {
    /// Creates a predicate, computing its dependencies.
    #[must_use]
    pub fn new(expression: Expression) -> Self {
        let dependencies = expression.free_variables();
        Predicate {
            expression,
            dependencies,
        }
    }

    /// Returns the predicate expression.
    #[must_use]
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Returns the variables this predicate reads.
    #[must_use]
    pub fn dependencies(&self) -> &BTreeSet<String> {
        &self.dependencies
    }

    /// Classifies this predicate.
    #[must_use]
    pub fn shape(&self) -> PredicateShape<'_> {
        match &self.expression {
            Expression::HasLabels { variable, labels } if labels.len() == 1 => {
                PredicateShape::LabelCheck {
                    variable,
                    label: &labels[0],
                }
            }
            _ => PredicateShape::Opaque,
        }
    }
}

/// The set of predicates attached to a query graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selections {
    predicates: Vec<Predicate>,
}

impl Selections {
    /// Creates empty selections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds selections from WHERE expressions.
    ///
    /// Top-level ANDs are split into conjuncts and each multi-label check
    /// becomes one check per label.
    #[must_use]
    pub fn from_expressions<I>(expressions: I) -> Self
    where
        I: IntoIterator<Item = Expression>,
    {
        expressions
            .into_iter()
            .fold(Selections::new(), Selections::with_expression)
    }

    /// Wraps already-normalized predicates.
    #[must_use]
    pub fn from_predicates(predicates: Vec<Predicate>) -> Self {
        Selections { predicates }
    }

    /// Adds an expression, normalizing it first.
    #[must_use]
    pub fn with_expression(mut self, expr: Expression) -> Self {
        match expr {
            Expression::Logical {
                op: LogicalOp::And,
                operands,
            } => {
                for operand in operands {
                    self = self.with_expression(operand);
                }
            }
            Expression::HasLabels { variable, labels } if labels.len() > 1 => {
                for label in labels {
                    self = self.with_expression(Expression::has_labels(variable.clone(), [label]));
                }
            }
            other => {
                let predicate = Predicate::new(other);
                if !self.predicates.contains(&predicate) {
                    self.predicates.push(predicate);
                }
            }
        }
        self
    }

    /// Returns the predicates in insertion order.
    #[must_use]
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    /// Returns an iterator over the predicate expressions.
    pub fn expressions(&self) -> impl Iterator<Item = &Expression> {
        self.predicates.iter().map(Predicate::expression)
    }

    /// Returns the union of all predicate dependencies.
    #[must_use]
    pub fn dependencies(&self) -> BTreeSet<String> {
        self.predicates
            .iter()
            .flat_map(|p| p.dependencies().iter().cloned())
            .collect()
    }

    /// Returns the number of predicates.
    #[must_use]
    pub fn len(&self) -> usize {
        self.predicates.len()
    }

    /// Returns true if there are no predicates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }
}

// =============================================================================
// Update clauses
// =============================================================================

/// Update clause attached to a query graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutatingPattern {
    /// CREATE (variable:Labels {props}).
    CreateNode {
        variable: String,
        labels: Vec<String>,
        properties: Vec<(String, Expression)>,
    },
    /// CREATE (left)-[variable:TYPE {props}]->(right).
    CreateRelationship {
        variable: String,
        left: String,
        right: String,
        rel_type: String,
        properties: Vec<(String, Expression)>,
    },
    /// SET variable.property = value.
    SetProperty {
        variable: String,
        property: String,
        value: Expression,
    },
    /// SET variable:Labels.
    SetLabels { variable: String, labels: Vec<String> },
    /// [DETACH] DELETE expression.
    Delete { expression: Expression, detach: bool },
}

impl MutatingPattern {
    /// Returns the variables this update reads.
    #[must_use]
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = BTreeSet::new();
        match self {
            MutatingPattern::CreateNode { properties, .. } => {
                for (_, value) in properties {
                    value.collect_free_variables(&mut deps);
                }
            }
            MutatingPattern::CreateRelationship {
                left,
                right,
                properties,
                ..
            } => {
                deps.insert(left.clone());
                deps.insert(right.clone());
                for (_, value) in properties {
                    value.collect_free_variables(&mut deps);
                }
            }
            MutatingPattern::SetProperty {
                variable, value, ..
            } => {
                deps.insert(variable.clone());
                value.collect_free_variables(&mut deps);
            }
            MutatingPattern::SetLabels { variable, .. } => {
                deps.insert(variable.clone());
            }
            MutatingPattern::Delete { expression, .. } => {
                expression.collect_free_variables(&mut deps);
            }
        }
        deps
    }
}

// =============================================================================
// Display implementation (Cypher-like)
// =============================================================================

impl fmt::Display for PatternRelationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (open, close) = match self.direction {
            Direction::Forward => ("-[", "]->"),
            Direction::Backward => ("<-[", "]-"),
            Direction::Both => ("-[", "]-"),
        };
        write!(f, "({}){open}{}", self.left, self.name)?;
        if !self.types.is_empty() {
            write!(f, ":{}", self.types.join("|"))?;
        }
        if let Some((min, max)) = self.path_bounds {
            match max {
                Some(max) => write!(f, "*{min}..{max}")?,
                None => write!(f, "*{min}..")?,
            }
        }
        write!(f, "{close}({})", self.right)
    }
}

impl fmt::Display for MutatingPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutatingPattern::CreateNode {
                variable, labels, ..
            } => {
                write!(f, "CREATE ({variable}")?;
                for label in labels {
                    write!(f, ":{label}")?;
                }
                f.write_str(")")
            }
            MutatingPattern::CreateRelationship {
                variable,
                left,
                right,
                rel_type,
                ..
            } => write!(f, "CREATE ({left})-[{variable}:{rel_type}]->({right})"),
            MutatingPattern::SetProperty {
                variable,
                property,
                value,
            } => write!(f, "SET {variable}.{property} = {value}"),
            MutatingPattern::SetLabels { variable, labels } => {
                write!(f, "SET {variable}:{}", labels.join(":"))
            }
            MutatingPattern::Delete { expression, detach } => {
                let detach = if *detach { "DETACH " } else { "" };
                write!(f, "{detach}DELETE {expression}")
            }
        }
    }
}

impl fmt::Display for QueryGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.format_graph(f, "MATCH", 0)
    }
}

impl QueryGraph {
    /// Formats the graph as clauses, one per line.
    pub(crate) fn format_graph(
        &self,
        f: &mut fmt::Formatter<'_>,
        keyword: &str,
        indent: usize,
    ) -> fmt::Result {
        let prefix = "  ".repeat(indent);

        let mut parts: Vec<String> = self
            .pattern_relationships
            .iter()
            .map(ToString::to_string)
            .collect();
        let endpoints: BTreeSet<&str> = self
            .pattern_relationships
            .iter()
            .flat_map(|r| [r.left.as_str(), r.right.as_str()])
            .collect();
        parts.extend(
            self.pattern_nodes
                .iter()
                .filter(|n| !endpoints.contains(n.as_str()))
                .map(|n| format!("({n})")),
        );

        write!(f, "{prefix}{keyword} {}", parts.join(", "))?;
        if !self.argument_ids.is_empty() {
            let args: Vec<_> = self.argument_ids.iter().map(String::as_str).collect();
            write!(f, " [args: {}]", args.join(", "))?;
        }
        writeln!(f)?;

        if !self.selections.is_empty() {
            let preds: Vec<_> = self.selections.expressions().map(ToString::to_string).collect();
            writeln!(f, "{prefix}  WHERE {}", preds.join(" AND "))?;
        }
        for optional in &self.optional_matches {
            optional.format_graph(f, "OPTIONAL MATCH", indent + 1)?;
        }
        for update in &self.mutating_patterns {
            writeln!(f, "{prefix}{update}")?;
        }
        Ok(())
    }
}
