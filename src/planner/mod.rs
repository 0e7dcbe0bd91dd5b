//! Query planner module.
//!
//! The planner takes bound planner queries and applies optimization rules
//! to produce cheaper but equivalent queries.

pub mod config;
pub mod optimizer;
mod planner_query;

pub use config::OptimizerConfig;
pub use optimizer::{
    OptimizerContext, OptimizerRule, OptionalMatchRemover, PruneOutcome, Transformed,
};
pub use planner_query::{PlannerQuery, QueryProjection, QueryShuffle, SortExpr};

use std::fmt::Write;
use std::sync::Arc;

use log::debug;
use rayon::prelude::*;

use crate::error::Result;

/// Query planner.
pub struct Planner {
    context: OptimizerContext,
    optimizer_rules: Vec<Box<dyn OptimizerRule>>,
}

impl Planner {
    /// Creates a new planner with the default optimizer rules for `config`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GraphOptError::ConfigError`] if the configuration is invalid.
    pub fn new(config: OptimizerConfig) -> Result<Self> {
        config.validate()?;

        let mut optimizer_rules: Vec<Box<dyn OptimizerRule>> = Vec::new();
        if config.remove_optional_matches {
            optimizer_rules.push(Box::new(OptionalMatchRemover));
        }

        Ok(Planner {
            context: OptimizerContext::new(config),
            optimizer_rules,
        })
    }

    /// Creates a planner without any optimizer rules.
    #[must_use]
    pub fn without_optimization() -> Self {
        Planner {
            context: OptimizerContext::default(),
            optimizer_rules: Vec::new(),
        }
    }

    /// Adds an optimizer rule.
    pub fn add_rule(&mut self, rule: Box<dyn OptimizerRule>) {
        self.optimizer_rules.push(rule);
    }

    /// Returns the names of the registered rules, in application order.
    #[must_use]
    pub fn rule_names(&self) -> Vec<&str> {
        self.optimizer_rules.iter().map(|r| r.name()).collect()
    }

    /// Returns the configuration rules run with.
    #[must_use]
    pub fn config(&self) -> &OptimizerConfig {
        self.context.config()
    }

    /// Applies all optimizer rules to the query.
    pub fn optimize(&self, query: Arc<PlannerQuery>) -> Result<Arc<PlannerQuery>> {
        let mut current = query;

        for rule in &self.optimizer_rules {
            let transformed = rule.rewrite(current, &self.context)?;
            current = transformed.into_inner();
        }

        Ok(current)
    }

    /// Applies all optimizer rules and returns both the query and applied rules.
    pub fn optimize_with_tracking(
        &self,
        query: Arc<PlannerQuery>,
    ) -> Result<(Arc<PlannerQuery>, Vec<String>)> {
        let mut current = query;
        let mut applied_rules = Vec::new();

        for rule in &self.optimizer_rules {
            let transformed = rule.rewrite(current, &self.context)?;
            if transformed.was_transformed() {
                debug!("rule {} rewrote the query", rule.name());
                applied_rules.push(rule.name().to_string());
            }
            current = transformed.into_inner();
        }

        Ok((current, applied_rules))
    }

    /// Optimizes independent queries in parallel.
    ///
    /// Results are returned in input order; the first error wins.
    pub fn optimize_all(&self, queries: &[Arc<PlannerQuery>]) -> Result<Vec<Arc<PlannerQuery>>> {
        queries
            .par_iter()
            .map(|query| self.optimize(Arc::clone(query)))
            .collect()
    }

    /// Returns a textual description of the query for EXPLAIN.
    #[must_use]
    pub fn explain(&self, query: &PlannerQuery) -> String {
        format!("{query}")
    }

    /// Returns a detailed EXPLAIN showing the query before and after optimization.
    pub fn explain_verbose(&self, query: Arc<PlannerQuery>) -> Result<String> {
        let mut output = String::new();

        output.push_str("=== Planner Query ===\n");
        let _ = write!(output, "{query}");

        let (optimized, applied) = self.optimize_with_tracking(query)?;
        output.push_str("\n=== Applied Rules ===\n");
        for rule in &applied {
            let _ = writeln!(output, "  {rule}");
        }

        output.push_str("\n=== Optimized Query ===\n");
        let _ = write!(output, "{optimized}");

        Ok(output)
    }
}

impl Default for Planner {
    fn default() -> Self {
        Planner {
            context: OptimizerContext::default(),
            optimizer_rules: vec![Box::new(OptionalMatchRemover)],
        }
    }
}
