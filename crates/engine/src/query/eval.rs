//! Predicate compilation and evaluation
//!
//! A [`Where`] compiles into clauses of comparisons. Within a clause every
//! relational operator compares the operands on either side of it; the
//! boolean operator between two comparisons joins them, and two relational
//! operators in a row (`1 < age < 9`) are joined with `and`. Comparisons and
//! then clauses are folded strictly left to right, so `a or b and c` is
//! `(a or b) and c`.
//!
//! Every comparison is evaluated, so a type error anywhere in the filter
//! surfaces regardless of the other results.

use std::cmp::Ordering;

use serde_json::Value;

use docstore_core::{Error, Path, Result};

use super::{Expr, Op, Where};
use crate::document::{field, Document};

#[derive(Debug, Clone)]
struct Comparison {
    left: Expr,
    op: Op,
    right: Expr,
}

#[derive(Debug, Clone)]
struct Clause {
    comparisons: Vec<(Option<Op>, Comparison)>,
}

/// A compiled filter
#[derive(Debug, Clone)]
pub struct Predicate {
    clauses: Vec<(Option<Op>, Clause)>,
}

/// A resolved operand
enum Operand<'a> {
    Int(i64),
    Float(f64),
    Str(&'a str),
    /// Field value with no ordering (bool, null, array, object)
    Other(&'static str),
}

impl Operand<'_> {
    fn type_name(&self) -> &'static str {
        match self {
            Operand::Int(_) => "int",
            Operand::Float(_) => "float",
            Operand::Str(_) => "string",
            Operand::Other(name) => *name,
        }
    }
}

fn from_value(value: &Value) -> Operand<'_> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Operand::Int(i),
            None => Operand::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => Operand::Str(s),
        Value::Bool(_) => Operand::Other("bool"),
        Value::Null => Operand::Other("null"),
        Value::Array(_) => Operand::Other("array"),
        Value::Object(_) => Operand::Other("object"),
    }
}

fn resolve<'a>(expr: &'a Expr, doc: &'a Document) -> Option<Operand<'a>> {
    match expr {
        Expr::Path(path) => field(doc, path).map(from_value),
        Expr::Str(s) => Some(Operand::Str(s)),
        Expr::Int(i) => Some(Operand::Int(*i)),
        Expr::Float(x) => Some(Operand::Float(*x)),
    }
}

/// `None` when the operands are unordered (NaN)
fn compare(left: &Operand<'_>, right: &Operand<'_>) -> Result<Option<Ordering>> {
    let ordering = match (left, right) {
        (Operand::Int(a), Operand::Int(b)) => Some(a.cmp(b)),
        (Operand::Int(a), Operand::Float(b)) => (*a as f64).partial_cmp(b),
        (Operand::Float(a), Operand::Int(b)) => a.partial_cmp(&(*b as f64)),
        (Operand::Float(a), Operand::Float(b)) => a.partial_cmp(b),
        (Operand::Str(a), Operand::Str(b)) => Some(a.cmp(b)),
        _ => {
            return Err(Error::TypeMismatch {
                left: left.type_name(),
                right: right.type_name(),
            })
        }
    };
    Ok(ordering)
}

impl Comparison {
    fn evaluate(&self, doc: &Document) -> Result<bool> {
        // an absent field fails the comparison without an error
        let (Some(left), Some(right)) = (resolve(&self.left, doc), resolve(&self.right, doc)) else {
            return Ok(false);
        };
        let Some(ordering) = compare(&left, &right)? else {
            return Ok(false);
        };
        Ok(match self.op {
            Op::Eq => ordering == Ordering::Equal,
            Op::Gt => ordering == Ordering::Greater,
            Op::Lt => ordering == Ordering::Less,
            Op::And | Op::Or => false,
        })
    }
}

/// Left fold of `(join, value)` pairs; a missing join means `and`
fn fold(acc: Option<bool>, join: Option<Op>, value: bool) -> bool {
    match (acc, join) {
        (None, _) => value,
        (Some(acc), Some(Op::Or)) => acc || value,
        (Some(acc), _) => acc && value,
    }
}

impl Clause {
    fn compile(links: &[(Option<Op>, &Expr)]) -> Result<Self> {
        let mut comparisons = Vec::new();
        let Some((_, first)) = links.first() else {
            return Ok(Clause { comparisons });
        };
        let mut previous: &Expr = *first;
        let mut compared = false;
        let mut join: Option<Op> = None;

        for (op, expr) in &links[1..] {
            let op = op.ok_or_else(|| Error::MalformedQuery("missing operator".to_string()))?;
            if op.is_relational() {
                let joined_by = if comparisons.is_empty() {
                    None
                } else {
                    Some(join.take().unwrap_or(Op::And))
                };
                comparisons.push((
                    joined_by,
                    Comparison {
                        left: previous.clone(),
                        op,
                        right: (*expr).clone(),
                    },
                ));
                compared = true;
            } else {
                if !compared {
                    return Err(Error::MalformedQuery(format!(
                        "operand {} is not part of any comparison",
                        previous
                    )));
                }
                join = Some(op);
                compared = false;
            }
            previous = *expr;
        }

        if !compared {
            return Err(Error::MalformedQuery(format!(
                "operand {} is not part of any comparison",
                previous
            )));
        }
        Ok(Clause { comparisons })
    }

    fn evaluate(&self, doc: &Document) -> Result<bool> {
        let mut acc = None;
        for (join, comparison) in &self.comparisons {
            let value = comparison.evaluate(doc)?;
            acc = Some(fold(acc, *join, value));
        }
        Ok(acc.unwrap_or(true))
    }
}

impl Predicate {
    /// Compile a filter
    ///
    /// # Errors
    ///
    /// `MalformedQuery` for a broken operand/operator chain, an operand that
    /// takes part in no comparison, a relational operator between clauses,
    /// or an empty clause anywhere but in an otherwise empty filter.
    pub fn compile(filter: &Where) -> Result<Self> {
        if filter.is_empty() {
            return Ok(Predicate {
                clauses: Vec::new(),
            });
        }

        let mut clauses = Vec::new();
        for (op, cond) in filter.clauses() {
            if let Some(op) = op {
                if !op.is_boolean() {
                    return Err(Error::MalformedQuery(format!(
                        "clauses must be joined by 'and' or 'or', not '{}'",
                        op
                    )));
                }
            }
            if cond.is_empty() {
                return Err(Error::MalformedQuery(format!(
                    "empty clause in '{}'",
                    filter
                )));
            }
            clauses.push((op, Clause::compile(&cond.links()?)?));
        }
        Ok(Predicate { clauses })
    }

    /// True for the empty filter
    pub fn matches_all(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Whether `doc` satisfies the filter
    ///
    /// # Errors
    ///
    /// `TypeMismatch` when a comparison meets operands it cannot order.
    pub fn evaluate(&self, doc: &Document) -> Result<bool> {
        let mut acc = None;
        for (join, clause) in &self.clauses {
            let value = clause.evaluate(doc)?;
            acc = Some(fold(acc, *join, value));
        }
        Ok(acc.unwrap_or(true))
    }

    /// Whether every operator joining comparisons or clauses is `and`
    pub fn is_conjunction(&self) -> bool {
        self.clauses.iter().all(|(join, clause)| {
            *join != Some(Op::Or)
                && clause
                    .comparisons
                    .iter()
                    .all(|(join, _)| *join != Some(Op::Or))
        })
    }

    /// The field and literal of a leading `field = literal` comparison
    pub fn leading_equality(&self) -> Option<(&Path, &Expr)> {
        let (_, clause) = self.clauses.first()?;
        let (_, comparison) = clause.comparisons.first()?;
        if comparison.op != Op::Eq {
            return None;
        }
        match (&comparison.left, &comparison.right) {
            (Expr::Path(_), Expr::Path(_)) => None,
            (Expr::Path(path), literal) | (literal, Expr::Path(path)) => Some((path, literal)),
            _ => None,
        }
    }
}
