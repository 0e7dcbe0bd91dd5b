//! Brute-force reference evaluator shared by the integration tests.
//!
//! Matches a single-stage `PlannerQuery` against a tiny in-memory graph by
//! enumerating every assignment, so the optimizer's output can be compared
//! with its input on real data.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use graphopt::binder::{
    AggregateFunction, ComparisonOp, Direction, ExistsPattern, Expression, LogicalOp, NodePattern,
    PatternRelationship, QueryGraph,
};
use graphopt::{PlannerQuery, QueryProjection, Value};

/// Node of a test graph.
#[derive(Debug, Clone, Default)]
pub struct InstanceNode {
    pub labels: BTreeSet<String>,
    pub props: BTreeMap<String, i64>,
}

/// Relationship of a test graph.
#[derive(Debug, Clone)]
pub struct InstanceRel {
    pub src: usize,
    pub dst: usize,
    pub rel_type: String,
}

/// In-memory property graph.
#[derive(Debug, Clone, Default)]
pub struct Instance {
    pub nodes: Vec<InstanceNode>,
    pub rels: Vec<InstanceRel>,
}

impl Instance {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, labels: &[&str], props: &[(&str, i64)]) -> usize {
        self.nodes.push(InstanceNode {
            labels: labels.iter().map(|l| (*l).to_string()).collect(),
            props: props.iter().map(|(k, v)| ((*k).to_string(), *v)).collect(),
        });
        self.nodes.len() - 1
    }

    pub fn add_rel(&mut self, src: usize, dst: usize, rel_type: &str) -> usize {
        self.rels.push(InstanceRel {
            src,
            dst,
            rel_type: rel_type.to_string(),
        });
        self.rels.len() - 1
    }
}

/// Evaluated cell of a result row.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Cell {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    Node(usize),
    Rel(usize),
    List(Vec<Cell>),
}

impl From<&Value> for Cell {
    fn from(value: &Value) -> Self {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(b) => Cell::Bool(*b),
            Value::Int64(i) => Cell::Int(*i),
            Value::String(s) => Cell::Str(s.clone()),
            Value::Float64(_) => panic!("floats are not evaluated"),
        }
    }
}

pub type Row = BTreeMap<String, Cell>;

// =============================================================================
// Pattern matching
// =============================================================================

fn rel_matches(e: &InstanceRel, left: usize, right: usize, rel: &PatternRelationship) -> bool {
    if !rel.types.is_empty() && !rel.types.contains(&e.rel_type) {
        return false;
    }
    match rel.direction {
        Direction::Forward => e.src == left && e.dst == right,
        Direction::Backward => e.src == right && e.dst == left,
        Direction::Both => {
            (e.src == left && e.dst == right) || (e.src == right && e.dst == left)
        }
    }
}

/// Returns every extension of `input` matching `graph`, optional sub-graphs included.
pub fn match_graph(inst: &Instance, graph: &QueryGraph, input: &Row) -> Vec<Row> {
    let mut rows = vec![input.clone()];

    for node in &graph.pattern_nodes {
        let mut next = Vec::new();
        for row in &rows {
            for id in 0..inst.nodes.len() {
                let mut extended = row.clone();
                extended.insert(node.clone(), Cell::Node(id));
                next.push(extended);
            }
        }
        rows = next;
    }

    for rel in &graph.pattern_relationships {
        assert!(
            !rel.is_variable_length(),
            "variable-length relationships are not evaluated"
        );
        let mut next = Vec::new();
        for row in &rows {
            let (Some(Cell::Node(left)), Some(Cell::Node(right))) =
                (row.get(&rel.left), row.get(&rel.right))
            else {
                continue;
            };
            for (id, e) in inst.rels.iter().enumerate() {
                if rel_matches(e, *left, *right, rel) {
                    let mut extended = row.clone();
                    extended.insert(rel.name.clone(), Cell::Rel(id));
                    next.push(extended);
                }
            }
        }
        rows = next;
    }

    rows.retain(|row| {
        graph
            .selections
            .expressions()
            .all(|expr| eval_predicate(inst, expr, row) == Some(true))
    });

    for optional in &graph.optional_matches {
        let introduced: Vec<&String> = optional
            .pattern_nodes
            .iter()
            .chain(optional.pattern_relationships.iter().map(|r| &r.name))
            .collect();
        let mut next = Vec::new();
        for row in &rows {
            let matches = match_graph(inst, optional, row);
            if matches.is_empty() {
                let mut padded = row.clone();
                for var in &introduced {
                    padded.insert((*var).clone(), Cell::Null);
                }
                next.push(padded);
            } else {
                next.extend(matches);
            }
        }
        rows = next;
    }

    rows
}

// =============================================================================
// Expressions
// =============================================================================

fn lookup(row: &Row, variable: &str) -> Cell {
    row.get(variable)
        .cloned()
        .unwrap_or_else(|| panic!("unbound variable '{variable}'"))
}

pub fn eval(inst: &Instance, expr: &Expression, row: &Row) -> Cell {
    match expr {
        Expression::Literal { value } => Cell::from(value),
        Expression::VariableRef { variable } => lookup(row, variable),
        Expression::PropertyAccess { variable, property } => match lookup(row, variable) {
            Cell::Node(id) => inst.nodes[id]
                .props
                .get(property)
                .map_or(Cell::Null, |v| Cell::Int(*v)),
            _ => Cell::Null,
        },
        Expression::Comparison { .. }
        | Expression::Logical { .. }
        | Expression::IsNull { .. }
        | Expression::HasLabels { .. }
        | Expression::PatternExists { .. } => match eval_predicate(inst, expr, row) {
            Some(b) => Cell::Bool(b),
            None => Cell::Null,
        },
        other => panic!("expression not evaluated by the reference matcher: {other}"),
    }
}

fn compare(a: &Cell, b: &Cell) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Cell::Int(x), Cell::Int(y)) => Some(x.cmp(y)),
        (Cell::Bool(x), Cell::Bool(y)) => Some(x.cmp(y)),
        (Cell::Str(x), Cell::Str(y)) => Some(x.cmp(y)),
        (Cell::Node(x), Cell::Node(y)) | (Cell::Rel(x), Cell::Rel(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Three-valued evaluation; `None` is NULL.
pub fn eval_predicate(inst: &Instance, expr: &Expression, row: &Row) -> Option<bool> {
    match expr {
        Expression::Comparison { left, op, right } => {
            let ord = compare(&eval(inst, left, row), &eval(inst, right, row))?;
            Some(match op {
                ComparisonOp::Eq => ord.is_eq(),
                ComparisonOp::Neq => ord.is_ne(),
                ComparisonOp::Lt => ord.is_lt(),
                ComparisonOp::Lte => ord.is_le(),
                ComparisonOp::Gt => ord.is_gt(),
                ComparisonOp::Gte => ord.is_ge(),
            })
        }
        Expression::Logical { op, operands } => {
            let values: Vec<Option<bool>> = operands
                .iter()
                .map(|o| eval_predicate(inst, o, row))
                .collect();
            match op {
                LogicalOp::And => {
                    if values.contains(&Some(false)) {
                        Some(false)
                    } else if values.contains(&None) {
                        None
                    } else {
                        Some(true)
                    }
                }
                LogicalOp::Or => {
                    if values.contains(&Some(true)) {
                        Some(true)
                    } else if values.contains(&None) {
                        None
                    } else {
                        Some(false)
                    }
                }
                LogicalOp::Not => values.first().copied().flatten().map(|b| !b),
            }
        }
        Expression::IsNull { operand, negated } => {
            Some((eval(inst, operand, row) == Cell::Null) != *negated)
        }
        Expression::HasLabels { variable, labels } => match lookup(row, variable) {
            Cell::Node(id) => Some(labels.iter().all(|l| inst.nodes[id].labels.contains(l))),
            _ => None,
        },
        Expression::PatternExists { pattern } => pattern_exists(inst, pattern, row),
        other => match eval(inst, other, row) {
            Cell::Bool(b) => Some(b),
            Cell::Null => None,
            cell => panic!("not a boolean: {cell:?}"),
        },
    }
}

/// Resolves one end of an existence pattern: `Err(())` for a NULL binding,
/// `Ok(None)` for an unconstrained end.
fn resolve_end(node: &NodePattern, pattern: &ExistsPattern, row: &Row) -> Result<Option<usize>, ()> {
    match &node.variable {
        Some(var) if !pattern.local_variables.contains(var) => match lookup(row, var) {
            Cell::Node(id) => Ok(Some(id)),
            _ => Err(()),
        },
        _ => Ok(None),
    }
}

fn pattern_exists(inst: &Instance, pattern: &ExistsPattern, row: &Row) -> Option<bool> {
    let left = resolve_end(&pattern.left, pattern, row).ok()?;
    let right = resolve_end(&pattern.right, pattern, row).ok()?;
    let same_local = match (&pattern.left.variable, &pattern.right.variable) {
        (Some(l), Some(r)) => l == r && pattern.local_variables.contains(l),
        _ => false,
    };
    let rel = &pattern.relationship;
    assert!(rel.path_bounds.is_none(), "variable-length patterns are not evaluated");

    let has_labels = |id: usize, labels: &[String]| {
        labels.iter().all(|l| inst.nodes[id].labels.contains(l))
    };

    let found = inst.rels.iter().any(|e| {
        if !rel.types.is_empty() && !rel.types.contains(&e.rel_type) {
            return false;
        }
        let orientations = match rel.direction {
            Direction::Forward => vec![(e.src, e.dst)],
            Direction::Backward => vec![(e.dst, e.src)],
            Direction::Both => vec![(e.src, e.dst), (e.dst, e.src)],
        };
        orientations.iter().any(|&(ln, rn)| {
            left.map_or(true, |l| l == ln)
                && right.map_or(true, |r| r == rn)
                && has_labels(ln, &pattern.left.labels)
                && has_labels(rn, &pattern.right.labels)
                && (!same_local || ln == rn)
        })
    });
    Some(found)
}

// =============================================================================
// Horizons
// =============================================================================

fn project(inst: &Instance, items: &[(String, Expression)], row: &Row) -> Vec<Cell> {
    items.iter().map(|(_, expr)| eval(inst, expr, row)).collect()
}

#[allow(clippy::cast_possible_wrap)]
fn aggregate(inst: &Instance, expr: &Expression, rows: &[&Row]) -> Cell {
    let Expression::Aggregate {
        function,
        input,
        distinct,
    } = expr
    else {
        panic!("not an aggregate: {expr}");
    };
    let Some(input) = input else {
        return Cell::Int(rows.len() as i64);
    };
    let mut values: Vec<Cell> = rows
        .iter()
        .map(|row| eval(inst, input, row))
        .filter(|c| *c != Cell::Null)
        .collect();
    if *distinct {
        values = values.into_iter().collect::<BTreeSet<_>>().into_iter().collect();
    }
    match function {
        AggregateFunction::Count => Cell::Int(values.len() as i64),
        AggregateFunction::Collect => {
            values.sort();
            Cell::List(values)
        }
        AggregateFunction::Min => values.into_iter().min().unwrap_or(Cell::Null),
        AggregateFunction::Max => values.into_iter().max().unwrap_or(Cell::Null),
        AggregateFunction::Sum => Cell::Int(
            values
                .iter()
                .map(|c| match c {
                    Cell::Int(i) => *i,
                    other => panic!("cannot sum {other:?}"),
                })
                .sum(),
        ),
        AggregateFunction::Avg => panic!("avg is not evaluated"),
    }
}

/// Evaluates a single-stage query; result rows are sorted so bags compare with `==`.
pub fn run(inst: &Instance, query: &PlannerQuery) -> Vec<Vec<Cell>> {
    assert!(query.tail.is_none(), "multi-stage queries are not evaluated");
    let rows = match_graph(inst, &query.graph, &Row::new());

    let mut out: Vec<Vec<Cell>> = match &query.horizon {
        QueryProjection::Regular { projections, .. } => {
            rows.iter().map(|r| project(inst, projections, r)).collect()
        }
        QueryProjection::Distinct { projections, .. } => rows
            .iter()
            .map(|r| project(inst, projections, r))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
        QueryProjection::Aggregating {
            grouping,
            aggregations,
            ..
        } => {
            let mut groups: BTreeMap<Vec<Cell>, Vec<&Row>> = BTreeMap::new();
            for row in &rows {
                groups.entry(project(inst, grouping, row)).or_default().push(row);
            }
            if groups.is_empty() && grouping.is_empty() {
                groups.insert(Vec::new(), Vec::new());
            }
            groups
                .into_iter()
                .map(|(mut key, members)| {
                    key.extend(aggregations.iter().map(|(_, e)| aggregate(inst, e, &members)));
                    key
                })
                .collect()
        }
    };
    out.sort();
    out
}

/// Compares two queries on `inst`: as sets for plain horizons, as bags otherwise.
pub fn same_results(inst: &Instance, before: &PlannerQuery, after: &PlannerQuery) -> bool {
    let lhs = run(inst, before);
    let rhs = run(inst, after);
    match before.horizon {
        QueryProjection::Regular { .. } => {
            lhs.into_iter().collect::<BTreeSet<_>>() == rhs.into_iter().collect::<BTreeSet<_>>()
        }
        _ => lhs == rhs,
    }
}

/// Wraps a query graph and horizon into a single-stage query.
pub fn single_stage(graph: QueryGraph, horizon: QueryProjection) -> Arc<PlannerQuery> {
    Arc::new(PlannerQuery::new(graph, horizon))
}

/// Initializes test logging once.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
