//! Query representation
//!
//! A query is a collection plus one [`Where`]: a chain of [`Cond`] clauses
//! joined by `and`/`or`. Each `Cond` is itself a flat chain of [`Expr`]
//! operands separated by operators, e.g. `age = 30 and id = "c"`.
//!
//! ```
//! use docstore_engine::query::Where;
//!
//! let mut filter = Where::new();
//! filter.cond().path("age").eq().int(30);
//! filter.and().cond().path("id").eq().str("c");
//! assert_eq!(filter.to_string(), r#"age = 30 and id = "c""#);
//! ```
//!
//! There is no precedence between `and` and `or`: both chains fold strictly
//! left to right (see [`Predicate`]).

mod eval;
mod plan;

pub use eval::Predicate;
pub use plan::{QueryOutput, QueryPlan, QueryStats};

use std::fmt;

use docstore_core::{Error, Path, Result, Transaction};

use crate::collection::Collection;

/// Relational and boolean operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    /// `=`
    Eq,
    /// `>`
    Gt,
    /// `<`
    Lt,
    /// `and`
    And,
    /// `or`
    Or,
}

impl Op {
    /// `=`, `>` or `<`
    pub fn is_relational(self) -> bool {
        matches!(self, Op::Eq | Op::Gt | Op::Lt)
    }

    /// `and` or `or`
    pub fn is_boolean(self) -> bool {
        matches!(self, Op::And | Op::Or)
    }

    /// Textual form
    pub fn symbol(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Gt => ">",
            Op::Lt => "<",
            Op::And => "and",
            Op::Or => "or",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A query operand: a document field or a literal
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Field of the candidate document
    Path(Path),
    /// String literal
    Str(String),
    /// Integer literal
    Int(i64),
    /// Float literal
    Float(f64),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Path(path) => f.write_str(&field_name(path)),
            Expr::Str(s) => write!(f, "{:?}", s),
            Expr::Int(i) => write!(f, "{}", i),
            Expr::Float(x) => write!(f, "{:?}", x),
        }
    }
}

fn field_name(path: &Path) -> String {
    path.segments().join("/")
}

#[derive(Debug, Clone)]
enum Term {
    Expr(Expr),
    Op(Op),
}

/// One clause: operands and operators in the order they were appended
#[derive(Debug, Clone, Default)]
pub struct Cond {
    terms: Vec<Term>,
}

impl Cond {
    /// Empty clause
    pub fn new() -> Self {
        Cond::default()
    }

    /// Append an operand
    pub fn expr(&mut self, expr: Expr) -> &mut Self {
        self.terms.push(Term::Expr(expr));
        self
    }

    /// Append a field operand
    pub fn path(&mut self, path: impl Into<Path>) -> &mut Self {
        self.expr(Expr::Path(path.into()))
    }

    /// Append a string literal
    pub fn str(&mut self, value: impl Into<String>) -> &mut Self {
        self.expr(Expr::Str(value.into()))
    }

    /// Append an integer literal
    pub fn int(&mut self, value: i64) -> &mut Self {
        self.expr(Expr::Int(value))
    }

    /// Append a float literal
    pub fn float(&mut self, value: f64) -> &mut Self {
        self.expr(Expr::Float(value))
    }

    /// Append an operator
    pub fn op(&mut self, op: Op) -> &mut Self {
        self.terms.push(Term::Op(op));
        self
    }

    /// Append `=`
    pub fn eq(&mut self) -> &mut Self {
        self.op(Op::Eq)
    }

    /// Append `>`
    pub fn gt(&mut self) -> &mut Self {
        self.op(Op::Gt)
    }

    /// Append `<`
    pub fn lt(&mut self) -> &mut Self {
        self.op(Op::Lt)
    }

    /// Append `and`
    pub fn and(&mut self) -> &mut Self {
        self.op(Op::And)
    }

    /// Append `or`
    pub fn or(&mut self) -> &mut Self {
        self.op(Op::Or)
    }

    /// True when nothing has been appended
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// The chain as `(operator, operand)` links; the first has no operator
    ///
    /// # Errors
    ///
    /// `MalformedQuery` unless operands and operators alternate, starting
    /// and ending with an operand.
    pub fn links(&self) -> Result<Vec<(Option<Op>, &Expr)>> {
        let mut links = Vec::with_capacity(self.terms.len() / 2 + 1);
        let mut pending: Option<Op> = None;
        for term in &self.terms {
            match term {
                Term::Expr(expr) => {
                    if !links.is_empty() && pending.is_none() {
                        return Err(Error::MalformedQuery(format!(
                            "operand {} follows another operand in '{}'",
                            expr, self
                        )));
                    }
                    links.push((pending.take(), expr));
                }
                Term::Op(op) => {
                    if links.is_empty() || pending.is_some() {
                        return Err(Error::MalformedQuery(format!(
                            "operator '{}' is missing its left operand in '{}'",
                            op, self
                        )));
                    }
                    pending = Some(*op);
                }
            }
        }
        if let Some(op) = pending {
            return Err(Error::MalformedQuery(format!(
                "operator '{}' is missing its right operand in '{}'",
                op, self
            )));
        }
        Ok(links)
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, term) in self.terms.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            match term {
                Term::Expr(expr) => write!(f, "{}", expr)?,
                Term::Op(op) => write!(f, "{}", op)?,
            }
        }
        Ok(())
    }
}

/// Clauses joined by boolean operators
///
/// Always holds at least one clause; [`Where::cond`] is the last one.
#[derive(Debug, Clone, Default)]
pub struct Where {
    first: Cond,
    rest: Vec<(Op, Cond)>,
}

impl Where {
    /// A single empty clause, which matches every document
    pub fn new() -> Self {
        Where::default()
    }

    /// The clause being built
    pub fn cond(&mut self) -> &mut Cond {
        match self.rest.last_mut() {
            Some((_, cond)) => cond,
            None => &mut self.first,
        }
    }

    /// Start a new clause joined with `op`
    pub fn join(&mut self, op: Op) -> &mut Self {
        self.rest.push((op, Cond::new()));
        self
    }

    /// Start a new clause joined with `and`
    pub fn and(&mut self) -> &mut Self {
        self.join(Op::And)
    }

    /// Start a new clause joined with `or`
    pub fn or(&mut self) -> &mut Self {
        self.join(Op::Or)
    }

    /// Clauses in order; the first has no operator
    pub fn clauses(&self) -> impl Iterator<Item = (Option<Op>, &Cond)> {
        std::iter::once((None, &self.first))
            .chain(self.rest.iter().map(|(op, cond)| (Some(*op), cond)))
    }

    /// True for a single empty clause
    pub fn is_empty(&self) -> bool {
        self.rest.is_empty() && self.first.is_empty()
    }
}

impl fmt::Display for Where {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.first)?;
        for (op, cond) in &self.rest {
            write!(f, " {} {}", op, cond)?;
        }
        Ok(())
    }
}

/// A filter over one collection, with an optional projection
#[derive(Debug, Clone)]
pub struct Query {
    collection: Collection,
    filter: Where,
    projection: Option<Vec<Path>>,
}

/// Start a query over `collection` matching every document
pub fn select(collection: &Collection) -> Query {
    Query {
        collection: collection.clone(),
        filter: Where::new(),
        projection: None,
    }
}

impl Query {
    /// The queried collection
    pub fn collection(&self) -> &Collection {
        &self.collection
    }

    /// The root filter
    pub fn filter(&self) -> &Where {
        &self.filter
    }

    /// The root filter, for building
    pub fn filter_mut(&mut self) -> &mut Where {
        &mut self.filter
    }

    /// Shorthand for `filter_mut().cond()`
    pub fn cond(&mut self) -> &mut Cond {
        self.filter.cond()
    }

    /// Replace the filter
    pub fn with_filter(mut self, filter: Where) -> Self {
        self.filter = filter;
        self
    }

    /// Return only these fields of each match
    pub fn project<I, P>(mut self, paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<Path>,
    {
        self.projection = Some(paths.into_iter().map(Into::into).collect());
        self
    }

    /// The projection, if any
    pub fn projection(&self) -> Option<&[Path]> {
        self.projection.as_deref()
    }

    /// How [`Query::execute`] would find candidates
    ///
    /// With [`QueryPlan::IndexLookup`] only the documents listed under the
    /// looked-up value are evaluated; see [`Query::execute`].
    ///
    /// # Errors
    ///
    /// `MalformedQuery` if the filter does not compile.
    pub fn explain(&self) -> Result<QueryPlan> {
        let predicate = Predicate::compile(&self.filter)?;
        Ok(plan::plan(&self.collection, &predicate))
    }

    /// Run the query inside `tx`
    ///
    /// Dangling index references found on the way are removed when `tx` is
    /// writable and only counted otherwise.
    ///
    /// Under an index lookup the filter is evaluated only on the documents
    /// the index lists for the looked-up value. A document outside that set
    /// whose field would raise `TypeMismatch` (`age = 30` against
    /// `"age": "thirty"`) is never compared, so such a query can succeed with
    /// the index and fail as a full scan.
    ///
    /// # Errors
    ///
    /// `MalformedQuery`, `TypeMismatch` from a comparison, `NotFound` if the
    /// collection bucket is missing, codec errors.
    pub fn execute(&self, tx: &dyn Transaction) -> Result<QueryOutput> {
        plan::execute(self, tx)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("select ")?;
        match &self.projection {
            Some(paths) => {
                let names: Vec<String> = paths.iter().map(field_name).collect();
                f.write_str(&names.join(", "))?;
            }
            None => f.write_str("*")?,
        }
        write!(f, " from {}", self.collection.name())?;
        if !self.filter.is_empty() {
            write!(f, " where {}", self.filter)?;
        }
        Ok(())
    }
}
