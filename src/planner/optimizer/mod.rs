//! Query optimization rules.
//!
//! This module contains optimizer rules that rewrite planner queries
//! into cheaper but equivalent forms.

pub mod connectivity;
pub mod dependencies;
mod optional_match_remover;
pub mod predicates;

pub use optional_match_remover::{
    horizon_allows_pruning, prune_optional_match, OptionalMatchRemover, PruneOutcome,
};

use std::sync::Arc;

use crate::error::Result;

use super::config::OptimizerConfig;
use super::planner_query::PlannerQuery;

/// Result of optimization transformation.
#[derive(Debug)]
pub enum Transformed<T> {
    /// Plan was modified.
    Yes(T),
    /// Plan unchanged.
    No(T),
}

impl<T> Transformed<T> {
    /// Returns the inner value.
    pub fn into_inner(self) -> T {
        match self {
            Transformed::Yes(v) | Transformed::No(v) => v,
        }
    }

    /// Returns true if the plan was modified.
    #[must_use]
    pub fn was_transformed(&self) -> bool {
        matches!(self, Transformed::Yes(_))
    }
}

/// Context threaded through every rule invocation.
#[derive(Debug, Clone, Default)]
pub struct OptimizerContext {
    config: OptimizerConfig,
}

impl OptimizerContext {
    /// Creates a context from a configuration.
    #[must_use]
    pub fn new(config: OptimizerConfig) -> Self {
        OptimizerContext { config }
    }

    /// Returns the optimizer configuration.
    #[must_use]
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}

/// Optimizer rule trait.
pub trait OptimizerRule: Send + Sync {
    /// Returns the name of this rule.
    fn name(&self) -> &str;

    /// Rewrites the planner query if applicable.
    fn rewrite(
        &self,
        query: Arc<PlannerQuery>,
        ctx: &OptimizerContext,
    ) -> Result<Transformed<Arc<PlannerQuery>>>;
}
