//! Bound expression definitions.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::Value;

use super::query_graph::Direction;

/// Expression after semantic analysis.
///
/// Variables are referenced by name; equality is structural.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    /// Literal value (constant).
    Literal { value: Value },

    /// Query parameter (`$name`).
    Parameter { name: String },

    /// Reference to an entire node/relationship/value variable.
    VariableRef { variable: String },

    /// Reference to a variable's property.
    PropertyAccess { variable: String, property: String },

    /// Binary comparison.
    Comparison {
        left: Box<Expression>,
        op: ComparisonOp,
        right: Box<Expression>,
    },

    /// Logical AND/OR/NOT.
    Logical {
        op: LogicalOp,
        operands: Vec<Expression>,
    },

    /// Arithmetic operations.
    Arithmetic {
        left: Box<Expression>,
        op: ArithmeticOp,
        right: Box<Expression>,
    },

    /// Aggregation function call.
    Aggregate {
        function: AggregateFunction,
        input: Option<Box<Expression>>, // None for COUNT(*)
        distinct: bool,
    },

    /// IS NULL / IS NOT NULL.
    IsNull {
        operand: Box<Expression>,
        negated: bool,
    },

    /// Label test on a node variable (`n:Person:Admin`).
    HasLabels {
        variable: String,
        labels: Vec<String>,
    },

    /// Scalar function call.
    FunctionCall { name: String, args: Vec<Expression> },

    /// Existence check of a single-relationship pattern.
    PatternExists { pattern: ExistsPattern },
}

impl Expression {
    /// Creates a literal expression.
    #[must_use]
    pub fn literal(value: Value) -> Self {
        Expression::Literal { value }
    }

    /// Creates a parameter reference.
    #[must_use]
    pub fn parameter(name: impl Into<String>) -> Self {
        Expression::Parameter { name: name.into() }
    }

    /// Creates a variable reference.
    #[must_use]
    pub fn variable(variable: impl Into<String>) -> Self {
        Expression::VariableRef {
            variable: variable.into(),
        }
    }

    /// Creates a property access expression.
    #[must_use]
    pub fn property(variable: impl Into<String>, property: impl Into<String>) -> Self {
        Expression::PropertyAccess {
            variable: variable.into(),
            property: property.into(),
        }
    }

    /// Creates a comparison expression.
    #[must_use]
    pub fn comparison(left: Expression, op: ComparisonOp, right: Expression) -> Self {
        Expression::Comparison {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Creates an arithmetic expression.
    #[must_use]
    pub fn arithmetic(left: Expression, op: ArithmeticOp, right: Expression) -> Self {
        Expression::Arithmetic {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Creates a logical AND expression.
    #[must_use]
    pub fn and(operands: Vec<Expression>) -> Self {
        Expression::Logical {
            op: LogicalOp::And,
            operands,
        }
    }

    /// Creates a logical OR expression.
    #[must_use]
    pub fn or(operands: Vec<Expression>) -> Self {
        Expression::Logical {
            op: LogicalOp::Or,
            operands,
        }
    }

    /// Creates a logical NOT expression.
    #[must_use]
    pub fn not(operand: Expression) -> Self {
        Expression::Logical {
            op: LogicalOp::Not,
            operands: vec![operand],
        }
    }

    /// Creates an IS NULL (or IS NOT NULL when `negated`) test.
    #[must_use]
    pub fn is_null(operand: Expression, negated: bool) -> Self {
        Expression::IsNull {
            operand: Box::new(operand),
            negated,
        }
    }

    /// Creates a label test.
    #[must_use]
    pub fn has_labels<I, S>(variable: impl Into<String>, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Expression::HasLabels {
            variable: variable.into(),
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    /// Creates a function call.
    #[must_use]
    pub fn function(name: impl Into<String>, args: Vec<Expression>) -> Self {
        Expression::FunctionCall {
            name: name.into(),
            args,
        }
    }

    /// Creates an aggregate expression.
    #[must_use]
    pub fn aggregate(function: AggregateFunction, input: Expression, distinct: bool) -> Self {
        Expression::Aggregate {
            function,
            input: Some(Box::new(input)),
            distinct,
        }
    }

    /// Creates a COUNT(*) expression.
    #[must_use]
    pub fn count_star() -> Self {
        Expression::Aggregate {
            function: AggregateFunction::Count,
            input: None,
            distinct: false,
        }
    }

    /// Creates an existence check for a pattern.
    #[must_use]
    pub fn exists(pattern: ExistsPattern) -> Self {
        Expression::PatternExists { pattern }
    }

    /// Returns true if this expression is an aggregate function call.
    #[must_use]
    pub fn is_aggregate(&self) -> bool {
        matches!(self, Expression::Aggregate { .. })
    }

    /// Returns the free variables this expression reads.
    #[must_use]
    pub fn free_variables(&self) -> BTreeSet<String> {
        let mut variables = BTreeSet::new();
        self.collect_free_variables(&mut variables);
        variables
    }

    /// Recursively collects free variables into `variables`.
    pub fn collect_free_variables(&self, variables: &mut BTreeSet<String>) {
        match self {
            Expression::VariableRef { variable }
            | Expression::PropertyAccess { variable, .. }
            | Expression::HasLabels { variable, .. } => {
                variables.insert(variable.clone());
            }
            Expression::Comparison { left, right, .. }
            | Expression::Arithmetic { left, right, .. } => {
                left.collect_free_variables(variables);
                right.collect_free_variables(variables);
            }
            Expression::Logical { operands, .. } => {
                for operand in operands {
                    operand.collect_free_variables(variables);
                }
            }
            Expression::FunctionCall { args, .. } => {
                for arg in args {
                    arg.collect_free_variables(variables);
                }
            }
            Expression::Aggregate { input, .. } => {
                if let Some(inner) = input {
                    inner.collect_free_variables(variables);
                }
            }
            Expression::IsNull { operand, .. } => operand.collect_free_variables(variables),
            Expression::PatternExists { pattern } => {
                variables.extend(pattern.free_variables());
            }
            Expression::Literal { .. } | Expression::Parameter { .. } => {}
        }
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    /// Equal (=).
    Eq,
    /// Not equal (<>).
    Neq,
    /// Less than (<).
    Lt,
    /// Less than or equal (<=).
    Lte,
    /// Greater than (>).
    Gt,
    /// Greater than or equal (>=).
    Gte,
}

impl ComparisonOp {
    /// Returns the string representation of this operator.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::Neq => "<>",
            ComparisonOp::Lt => "<",
            ComparisonOp::Lte => "<=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Gte => ">=",
        }
    }
}

/// Logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogicalOp {
    And,
    Or,
    Not,
}

/// Arithmetic operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl ArithmeticOp {
    /// Returns the string representation of this operator.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ArithmeticOp::Add => "+",
            ArithmeticOp::Sub => "-",
            ArithmeticOp::Mul => "*",
            ArithmeticOp::Div => "/",
            ArithmeticOp::Mod => "%",
        }
    }
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregateFunction {
    Count,
    Sum,
    Avg,
    Min,
    Max,
    Collect,
}

impl AggregateFunction {
    /// Returns the name of this aggregate function.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            AggregateFunction::Count => "count",
            AggregateFunction::Sum => "sum",
            AggregateFunction::Avg => "avg",
            AggregateFunction::Min => "min",
            AggregateFunction::Max => "max",
            AggregateFunction::Collect => "collect",
        }
    }
}

// =============================================================================
// Existence patterns
// =============================================================================

/// Node end of an [`ExistsPattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodePattern {
    /// Bound variable, or `None` for an anonymous node.
    pub variable: Option<String>,
    /// Labels the node must carry.
    pub labels: Vec<String>,
}

impl NodePattern {
    /// Creates a node pattern referencing a bound variable.
    #[must_use]
    pub fn bound(variable: impl Into<String>) -> Self {
        NodePattern {
            variable: Some(variable.into()),
            labels: Vec::new(),
        }
    }

    /// Creates an anonymous node pattern with the given labels.
    #[must_use]
    pub fn anonymous(labels: Vec<String>) -> Self {
        NodePattern {
            variable: None,
            labels,
        }
    }
}

/// Relationship of an [`ExistsPattern`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipPattern {
    /// Bound variable, or `None` for an anonymous relationship.
    pub variable: Option<String>,
    /// Allowed relationship types (empty = any).
    pub types: Vec<String>,
    /// Direction relative to left -> right.
    pub direction: Direction,
    /// Variable-length bounds (min, max).
    pub path_bounds: Option<(usize, Option<usize>)>,
}

/// A `(left)-[rel]-(right)` pattern used as a boolean predicate.
///
/// Variables listed in `local_variables` are introduced by the pattern
/// itself and are not free in the enclosing scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExistsPattern {
    pub left: NodePattern,
    pub relationship: RelationshipPattern,
    pub right: NodePattern,
    pub local_variables: BTreeSet<String>,
}

impl ExistsPattern {
    /// Returns the variables of the enclosing scope this pattern reads.
    #[must_use]
    pub fn free_variables(&self) -> BTreeSet<String> {
        [
            self.left.variable.as_ref(),
            self.relationship.variable.as_ref(),
            self.right.variable.as_ref(),
        ]
        .into_iter()
        .flatten()
        .filter(|v| !self.local_variables.contains(*v))
        .cloned()
        .collect()
    }
}

// =============================================================================
// Display implementation (Cypher-like)
// =============================================================================

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Literal { value } => write!(f, "{value}"),
            Expression::Parameter { name } => write!(f, "${name}"),
            Expression::VariableRef { variable } => write!(f, "{variable}"),
            Expression::PropertyAccess { variable, property } => {
                write!(f, "{variable}.{property}")
            }
            Expression::Comparison { left, op, right } => {
                write!(f, "{left} {} {right}", op.as_str())
            }
            Expression::Arithmetic { left, op, right } => {
                write!(f, "({left} {} {right})", op.as_str())
            }
            Expression::Logical { op, operands } => match op {
                LogicalOp::Not => {
                    f.write_str("NOT ")?;
                    write_list(f, operands, " ")
                }
                LogicalOp::And | LogicalOp::Or => {
                    let sep = if *op == LogicalOp::And { " AND " } else { " OR " };
                    f.write_str("(")?;
                    write_list(f, operands, sep)?;
                    f.write_str(")")
                }
            },
            Expression::Aggregate {
                function,
                input,
                distinct,
            } => {
                let distinct = if *distinct { "DISTINCT " } else { "" };
                match input {
                    Some(inner) => write!(f, "{}({distinct}{inner})", function.name()),
                    None => write!(f, "{}(*)", function.name()),
                }
            }
            Expression::IsNull { operand, negated } => {
                let not = if *negated { " NOT" } else { "" };
                write!(f, "{operand} IS{not} NULL")
            }
            Expression::HasLabels { variable, labels } => {
                write!(f, "{variable}")?;
                for label in labels {
                    write!(f, ":{label}")?;
                }
                Ok(())
            }
            Expression::FunctionCall { name, args } => {
                write!(f, "{name}(")?;
                write_list(f, args, ", ")?;
                f.write_str(")")
            }
            Expression::PatternExists { pattern } => write!(f, "exists({pattern})"),
        }
    }
}

impl fmt::Display for NodePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        if let Some(variable) = &self.variable {
            f.write_str(variable.trim())?;
        }
        for label in &self.labels {
            write!(f, ":{label}")?;
        }
        f.write_str(")")
    }
}

impl fmt::Display for ExistsPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rel = &self.relationship;
        let (open, close) = match rel.direction {
            Direction::Forward => ("-[", "]->"),
            Direction::Backward => ("<-[", "]-"),
            Direction::Both => ("-[", "]-"),
        };
        write!(f, "{}{open}", self.left)?;
        if let Some(variable) = &rel.variable {
            f.write_str(variable)?;
        }
        if !rel.types.is_empty() {
            write!(f, ":{}", rel.types.join("|"))?;
        }
        if let Some((min, max)) = rel.path_bounds {
            match max {
                Some(max) => write!(f, "*{min}..{max}")?,
                None => write!(f, "*{min}..")?,
            }
        }
        write!(f, "{close}{}", self.right)
    }
}
