//! Optimizer configuration.

use serde::{Deserialize, Serialize};

use crate::error::{GraphOptError, Result};

/// Configuration for the logical-plan optimizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Enables OPTIONAL MATCH pruning.
    pub remove_optional_matches: bool,
    /// Whether plain (non-distinct, non-aggregating) horizons qualify for pruning.
    pub rewrite_regular_projections: bool,
    /// Upper bound on fixed-point iterations per optional sub-graph
    /// (`None` = number of pattern elements).
    pub max_fixed_point_iterations: Option<usize>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            remove_optional_matches: true,
            rewrite_regular_projections: true,
            max_fixed_point_iterations: None,
        }
    }
}

impl OptimizerConfig {
    /// Creates a new optimizer configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables OPTIONAL MATCH pruning.
    #[must_use]
    pub fn with_remove_optional_matches(mut self, enabled: bool) -> Self {
        self.remove_optional_matches = enabled;
        self
    }

    /// Enables or disables pruning under plain projections.
    #[must_use]
    pub fn with_rewrite_regular_projections(mut self, enabled: bool) -> Self {
        self.rewrite_regular_projections = enabled;
        self
    }

    /// Sets the fixed-point iteration bound.
    #[must_use]
    pub fn with_max_fixed_point_iterations(mut self, max: usize) -> Self {
        self.max_fixed_point_iterations = Some(max);
        self
    }

    /// Checks that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns [`GraphOptError::ConfigError`] for a zero iteration bound.
    pub fn validate(&self) -> Result<()> {
        if self.max_fixed_point_iterations == Some(0) {
            return Err(GraphOptError::ConfigError(
                "max_fixed_point_iterations must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
