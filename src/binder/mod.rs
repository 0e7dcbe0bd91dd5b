//! Bound query representation.
//!
//! Earlier compiler phases resolve names and produce these structures:
//! - Expressions with their free variables
//! - Query graphs (pattern nodes, relationships, predicates, arguments)
//! - OPTIONAL MATCH sub-graphs and update clauses
//!
//! The planner consumes them as immutable values.

mod expression;
mod query_graph;

pub use expression::{
    AggregateFunction, ArithmeticOp, ComparisonOp, ExistsPattern, Expression, LogicalOp,
    NodePattern, RelationshipPattern,
};
pub use query_graph::{
    Direction, MutatingPattern, PatternRelationship, Predicate, PredicateShape, QueryGraph,
    Selections,
};
