//! Planner query: a chain of query graphs, each followed by a horizon.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::binder::{Expression, QueryGraph};

/// One stage of a query (MATCH ... WITH/RETURN), optionally followed by more stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannerQuery {
    /// Pattern of this stage.
    pub graph: Arc<QueryGraph>,
    /// Projection ending this stage.
    pub horizon: QueryProjection,
    /// Remainder of the pipeline.
    pub tail: Option<Arc<PlannerQuery>>,
}

impl PlannerQuery {
    /// Creates a single-stage query.
    #[must_use]
    pub fn new(graph: QueryGraph, horizon: QueryProjection) -> Self {
        PlannerQuery {
            graph: Arc::new(graph),
            horizon,
            tail: None,
        }
    }

    /// Sets the continuation of this stage.
    #[must_use]
    pub fn with_tail(mut self, tail: PlannerQuery) -> Self {
        self.tail = Some(Arc::new(tail));
        self
    }

    /// Returns a copy of this stage with a different graph, sharing horizon and tail.
    #[must_use]
    pub fn with_graph(&self, graph: Arc<QueryGraph>) -> Self {
        PlannerQuery {
            graph,
            horizon: self.horizon.clone(),
            tail: self.tail.clone(),
        }
    }

    /// Returns the stages of this query, first to last.
    pub fn stages(&self) -> impl Iterator<Item = &PlannerQuery> {
        std::iter::successors(Some(self), |stage| stage.tail.as_deref())
    }

    /// Returns the last stage.
    #[must_use]
    pub fn last(&self) -> &PlannerQuery {
        self.stages().last().unwrap_or(self)
    }
}

/// Horizon of a query stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryProjection {
    /// Plain projection (WITH / RETURN).
    Regular {
        projections: Vec<(String, Expression)>,
        shuffle: QueryShuffle,
    },
    /// Duplicate-eliminating projection (WITH DISTINCT / RETURN DISTINCT).
    Distinct {
        projections: Vec<(String, Expression)>,
        shuffle: QueryShuffle,
    },
    /// Grouping with aggregation.
    Aggregating {
        grouping: Vec<(String, Expression)>,
        aggregations: Vec<(String, Expression)>,
        shuffle: QueryShuffle,
    },
}

impl QueryProjection {
    /// Creates a plain projection.
    #[must_use]
    pub fn regular(projections: Vec<(String, Expression)>) -> Self {
        QueryProjection::Regular {
            projections,
            shuffle: QueryShuffle::default(),
        }
    }

    /// Creates a distinct projection.
    #[must_use]
    pub fn distinct(projections: Vec<(String, Expression)>) -> Self {
        QueryProjection::Distinct {
            projections,
            shuffle: QueryShuffle::default(),
        }
    }

    /// Creates an aggregating projection.
    #[must_use]
    pub fn aggregating(
        grouping: Vec<(String, Expression)>,
        aggregations: Vec<(String, Expression)>,
    ) -> Self {
        QueryProjection::Aggregating {
            grouping,
            aggregations,
            shuffle: QueryShuffle::default(),
        }
    }

    /// Sets ORDER BY / SKIP / LIMIT.
    #[must_use]
    pub fn with_shuffle(mut self, new_shuffle: QueryShuffle) -> Self {
        match &mut self {
            QueryProjection::Regular { shuffle, .. }
            | QueryProjection::Distinct { shuffle, .. }
            | QueryProjection::Aggregating { shuffle, .. } => *shuffle = new_shuffle,
        }
        self
    }

    /// Returns ORDER BY / SKIP / LIMIT.
    #[must_use]
    pub fn shuffle(&self) -> &QueryShuffle {
        match self {
            QueryProjection::Regular { shuffle, .. }
            | QueryProjection::Distinct { shuffle, .. }
            | QueryProjection::Aggregating { shuffle, .. } => shuffle,
        }
    }

    /// Returns the aggregation expressions (empty unless aggregating).
    #[must_use]
    pub fn aggregations(&self) -> &[(String, Expression)] {
        match self {
            QueryProjection::Aggregating { aggregations, .. } => aggregations,
            _ => &[],
        }
    }

    /// Returns the projected (or grouping) items.
    #[must_use]
    pub fn items(&self) -> &[(String, Expression)] {
        match self {
            QueryProjection::Regular { projections, .. }
            | QueryProjection::Distinct { projections, .. } => projections,
            QueryProjection::Aggregating { grouping, .. } => grouping,
        }
    }

    /// Returns the free variables read by all projection, aggregation and
    /// sort expressions.
    #[must_use]
    pub fn dependencies(&self) -> BTreeSet<String> {
        let mut deps = BTreeSet::new();
        for (_, expr) in self.items().iter().chain(self.aggregations()) {
            expr.collect_free_variables(&mut deps);
        }
        let projected: BTreeSet<&str> = self
            .items()
            .iter()
            .chain(self.aggregations())
            .map(|(name, _)| name.as_str())
            .collect();
        for sort in &self.shuffle().sort_items {
            // Sort keys may refer to projected columns by alias.
            for var in sort.expr.free_variables() {
                if !projected.contains(var.as_str()) {
                    deps.insert(var);
                }
            }
        }
        deps
    }

    fn keyword(&self) -> &'static str {
        match self {
            QueryProjection::Regular { .. } | QueryProjection::Aggregating { .. } => "",
            QueryProjection::Distinct { .. } => "DISTINCT ",
        }
    }
}

/// ORDER BY / SKIP / LIMIT of a horizon.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryShuffle {
    pub sort_items: Vec<SortExpr>,
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

impl QueryShuffle {
    /// Returns true if there is nothing to sort, skip or limit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sort_items.is_empty() && self.skip.is_none() && self.limit.is_none()
    }
}

/// Sort expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortExpr {
    pub expr: Expression,
    pub ascending: bool,
}

impl SortExpr {
    /// Creates a new ascending sort expression.
    #[must_use]
    pub fn asc(expr: Expression) -> Self {
        SortExpr {
            expr,
            ascending: true,
        }
    }

    /// Creates a new descending sort expression.
    #[must_use]
    pub fn desc(expr: Expression) -> Self {
        SortExpr {
            expr,
            ascending: false,
        }
    }
}

// =============================================================================
// Display implementation for EXPLAIN output
// =============================================================================

impl fmt::Display for PlannerQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stage in self.stages() {
            stage.graph.format_graph(f, "MATCH", 0)?;
            let keyword = if stage.tail.is_some() { "WITH" } else { "RETURN" };
            writeln!(f, "{keyword} {}", stage.horizon)?;
        }
        Ok(())
    }
}

impl fmt::Display for QueryProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let items: Vec<String> = self
            .items()
            .iter()
            .chain(self.aggregations())
            .map(|(name, expr)| {
                let rendered = expr.to_string();
                if rendered == *name {
                    rendered
                } else {
                    format!("{rendered} AS {name}")
                }
            })
            .collect();
        write!(f, "{}{}", self.keyword(), items.join(", "))?;

        let shuffle = self.shuffle();
        if !shuffle.sort_items.is_empty() {
            let orders: Vec<_> = shuffle
                .sort_items
                .iter()
                .map(|s| {
                    let dir = if s.ascending { "ASC" } else { "DESC" };
                    format!("{} {dir}", s.expr)
                })
                .collect();
            write!(f, " ORDER BY {}", orders.join(", "))?;
        }
        if let Some(skip) = shuffle.skip {
            write!(f, " SKIP {skip}")?;
        }
        if let Some(limit) = shuffle.limit {
            write!(f, " LIMIT {limit}")?;
        }
        Ok(())
    }
}
