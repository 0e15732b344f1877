//! Interpreted conjunctive predicates.
//!
//! Filter specs compile into a small tree of comparison nodes evaluated
//! directly against the row — constants are parsed once at compile time,
//! and there is never any generated code.

use crate::error::{OpError, Result};
use crate::spec::{index_of, FilterOp, FilterSpec};
use crate::value::{field, parse_f64, RowError};

#[derive(Debug, Clone)]
enum CompareNode {
    Gt(f64),
    Ge(f64),
    Lt(f64),
    Le(f64),
    /// Inclusive on both ends.
    Between(f64, f64),
    EqualsAny(Vec<String>),
    NotEquals(Vec<String>),
}

#[derive(Debug, Clone)]
struct Term {
    idx: usize,
    name: String,
    node: CompareNode,
}

/// A conjunction of comparison terms over a positional row layout.
#[derive(Debug, Clone, Default)]
pub struct Predicate {
    terms: Vec<Term>,
}

impl Predicate {
    pub fn compile(filters: &[FilterSpec], layout: &[String]) -> Result<Self> {
        let mut terms = Vec::with_capacity(filters.len());
        for filter in filters {
            let idx = index_of(layout, &filter.field)?;
            let node = compile_node(filter)?;
            terms.push(Term {
                idx,
                name: filter.field.clone(),
                node,
            });
        }
        Ok(Self { terms })
    }

    /// True when every term accepts the row. A malformed field is a
    /// row-level error, never `false`.
    pub fn eval(&self, row: &[String]) -> std::result::Result<bool, RowError> {
        for term in &self.terms {
            let keep = match &term.node {
                CompareNode::Gt(c) => parse_f64(row, term.idx, &term.name)? > *c,
                CompareNode::Ge(c) => parse_f64(row, term.idx, &term.name)? >= *c,
                CompareNode::Lt(c) => parse_f64(row, term.idx, &term.name)? < *c,
                CompareNode::Le(c) => parse_f64(row, term.idx, &term.name)? <= *c,
                CompareNode::Between(lo, hi) => {
                    let v = parse_f64(row, term.idx, &term.name)?;
                    v >= *lo && v <= *hi
                }
                CompareNode::EqualsAny(set) => {
                    let v = field(row, term.idx, &term.name)?;
                    set.iter().any(|c| c == v)
                }
                CompareNode::NotEquals(set) => {
                    let v = field(row, term.idx, &term.name)?;
                    set.iter().all(|c| c != v)
                }
            };
            if !keep {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

fn compile_node(filter: &FilterSpec) -> Result<CompareNode> {
    let numeric = |pos: usize| -> Result<f64> {
        let raw = filter.constants.get(pos).ok_or_else(|| {
            OpError::Config(format!(
                "filter on '{}' needs {} constant(s)",
                filter.field,
                pos + 1
            ))
        })?;
        raw.parse::<f64>()
            .map_err(|_| OpError::Config(format!("filter constant '{raw}' is not numeric")))
    };

    Ok(match filter.op {
        FilterOp::Gt => CompareNode::Gt(numeric(0)?),
        FilterOp::Ge => CompareNode::Ge(numeric(0)?),
        FilterOp::Lt => CompareNode::Lt(numeric(0)?),
        FilterOp::Le => CompareNode::Le(numeric(0)?),
        FilterOp::Between => CompareNode::Between(numeric(0)?, numeric(1)?),
        FilterOp::EqualsAny => {
            if filter.constants.is_empty() {
                return Err(OpError::Config(format!(
                    "equals_any on '{}' needs at least one constant",
                    filter.field
                )));
            }
            CompareNode::EqualsAny(filter.constants.clone())
        }
        FilterOp::NotEquals => {
            if filter.constants.is_empty() {
                return Err(OpError::Config(format!(
                    "not_equals on '{}' needs at least one constant",
                    filter.field
                )));
            }
            CompareNode::NotEquals(filter.constants.clone())
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout() -> Vec<String> {
        vec!["amount".to_string(), "state".to_string()]
    }

    fn spec(field: &str, op: FilterOp, constants: &[&str]) -> FilterSpec {
        FilterSpec {
            field: field.to_string(),
            op,
            constants: constants.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn row(amount: &str, state: &str) -> Vec<String> {
        vec![amount.to_string(), state.to_string()]
    }

    #[test]
    fn numeric_comparisons() {
        let p = Predicate::compile(&[spec("amount", FilterOp::Ge, &["75"])], &layout()).unwrap();
        assert!(p.eval(&row("75", "TX")).unwrap());
        assert!(p.eval(&row("75.01", "TX")).unwrap());
        assert!(!p.eval(&row("74.99", "TX")).unwrap());
    }

    #[test]
    fn between_is_inclusive() {
        let p =
            Predicate::compile(&[spec("amount", FilterOp::Between, &["6", "22"])], &layout())
                .unwrap();
        assert!(p.eval(&row("6", "x")).unwrap());
        assert!(p.eval(&row("22", "x")).unwrap());
        assert!(!p.eval(&row("22.5", "x")).unwrap());
    }

    #[test]
    fn set_membership_and_exclusion() {
        let any =
            Predicate::compile(&[spec("state", FilterOp::EqualsAny, &["TX", "CA"])], &layout())
                .unwrap();
        assert!(any.eval(&row("0", "CA")).unwrap());
        assert!(!any.eval(&row("0", "NY")).unwrap());

        let none =
            Predicate::compile(&[spec("state", FilterOp::NotEquals, &["TX", "CA"])], &layout())
                .unwrap();
        assert!(none.eval(&row("0", "NY")).unwrap());
        assert!(!none.eval(&row("0", "TX")).unwrap());
    }

    #[test]
    fn conjunction_short_circuits_false() {
        let p = Predicate::compile(
            &[
                spec("amount", FilterOp::Gt, &["10"]),
                spec("state", FilterOp::EqualsAny, &["TX"]),
            ],
            &layout(),
        )
        .unwrap();
        assert!(p.eval(&row("11", "TX")).unwrap());
        assert!(!p.eval(&row("11", "CA")).unwrap());
        assert!(!p.eval(&row("9", "TX")).unwrap());
    }

    #[test]
    fn malformed_field_is_a_row_error() {
        let p = Predicate::compile(&[spec("amount", FilterOp::Gt, &["10"])], &layout()).unwrap();
        assert!(p.eval(&row("not-a-number", "TX")).is_err());
    }

    #[test]
    fn bad_constant_fails_compile() {
        let err = Predicate::compile(&[spec("amount", FilterOp::Gt, &["ten"])], &layout());
        assert!(matches!(err, Err(OpError::Config(_))));
    }
}
