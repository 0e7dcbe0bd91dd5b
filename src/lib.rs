//! graphopt - logical-plan optimizer for Cypher-style graph queries.
//!
//! The optimizer works on bound [`PlannerQuery`] chains. Its main rule,
//! [`OptionalMatchRemover`], removes the parts of OPTIONAL MATCH patterns
//! that a stage's DISTINCT or DISTINCT-aggregating horizon never reads,
//! replacing dangling relationships with existence checks.
//!
//! ```
//! use std::sync::Arc;
//!
//! use graphopt::binder::{Direction, Expression, PatternRelationship, QueryGraph};
//! use graphopt::{OptimizerConfig, Planner, PlannerQuery, QueryProjection};
//!
//! // MATCH (a) OPTIONAL MATCH (a)-[r]->(b) RETURN DISTINCT a
//! let graph = QueryGraph::new().with_node("a").with_optional_match(
//!     QueryGraph::new()
//!         .with_arguments(["a"])
//!         .with_node("b")
//!         .with_relationship(PatternRelationship::new("r", "a", "b", Direction::Forward)),
//! );
//! let query = PlannerQuery::new(
//!     graph,
//!     QueryProjection::distinct(vec![("a".into(), Expression::variable("a"))]),
//! );
//!
//! let planner = Planner::new(OptimizerConfig::default())?;
//! let optimized = planner.optimize(Arc::new(query))?;
//! assert!(optimized.graph.optional_matches.is_empty());
//! # Ok::<(), graphopt::GraphOptError>(())
//! ```

pub mod binder;
pub mod error;
pub mod planner;
pub mod types;

use std::sync::Arc;

pub use error::{GraphOptError, Result};
pub use planner::{
    OptimizerConfig, OptimizerContext, OptimizerRule, OptionalMatchRemover, Planner, PlannerQuery,
    QueryProjection, Transformed,
};
pub use types::Value;

/// Runs OPTIONAL MATCH pruning alone over `query`.
///
/// # Errors
///
/// Returns an error if `config` is invalid, the query is malformed, or an
/// internal invariant of the rewrite is broken.
pub fn remove_optional_matches(
    query: Arc<PlannerQuery>,
    config: &OptimizerConfig,
) -> Result<Transformed<Arc<PlannerQuery>>> {
    config.validate()?;
    OptionalMatchRemover.rewrite(query, &OptimizerContext::new(config.clone()))
}
