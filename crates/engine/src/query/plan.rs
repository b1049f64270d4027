//! Query planning and execution
//!
//! Execution is a cursor pipeline over one transaction:
//!
//! ```text
//! source ──► MatchCursor(decode + predicate) ──► projection ──► documents
//! ```
//!
//! The source is either the collection cursor (full scan) or a
//! [`SliceCursor`] over the documents an index entry lists. Each stored
//! document is decoded once, by the match stage, which hands the decoded
//! value on for projection. The predicate always sees stored documents; the
//! projection only shapes the output.
//!
//! The first decode or evaluation error stops the pipeline.

use std::cell::{Cell, RefCell};
use std::fmt;

use serde_json::{Number, Value};
use tracing::{debug, warn};

use docstore_core::{Cursor, Error, MatchCursor, Result, SliceCursor, Transaction};

use super::{Expr, Predicate, Query};
use crate::collection::Collection;
use crate::document::{project, Document};
use crate::index::encoding;

/// How candidates are found
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    /// Every document is run through the predicate
    FullScan,
    /// Only the documents one index entry lists are run through the predicate
    IndexLookup {
        /// Index name
        index: String,
        /// Looked-up value
        value: Value,
    },
}

impl QueryPlan {
    /// True for [`QueryPlan::IndexLookup`]
    pub fn uses_index(&self) -> bool {
        matches!(self, QueryPlan::IndexLookup { .. })
    }
}

impl fmt::Display for QueryPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryPlan::FullScan => f.write_str("full scan"),
            QueryPlan::IndexLookup { index, value } => {
                write!(f, "index lookup on {} = {}", index, value)
            }
        }
    }
}

/// Counters from one execution
#[derive(Debug, Clone, PartialEq)]
pub struct QueryStats {
    /// Plan actually used
    pub plan: QueryPlan,
    /// Documents the predicate was evaluated on
    pub documents_examined: usize,
    /// Documents returned
    pub matches: usize,
    /// Index references to missing documents met on the way
    pub dangling: usize,
}

/// Matching documents in key order, plus execution counters
#[derive(Debug, Clone)]
pub struct QueryOutput {
    /// `(key, document)` pairs, projected if the query has a projection
    pub documents: Vec<(Vec<u8>, Document)>,
    /// Execution counters
    pub stats: QueryStats,
}

impl QueryOutput {
    /// Keys of the matching documents
    pub fn keys(&self) -> Vec<&[u8]> {
        self.documents.iter().map(|(k, _)| k.as_slice()).collect()
    }

    /// Number of matches
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// True when nothing matched
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}

fn literal_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Str(s) => Some(Value::String(s.clone())),
        Expr::Int(i) => Some(Value::from(*i)),
        Expr::Float(x) => Number::from_f64(*x).map(Value::Number),
        Expr::Path(_) => None,
    }
}

/// Pick an index when the filter is a conjunction led by `field = literal`
pub(super) fn plan(collection: &Collection, predicate: &Predicate) -> QueryPlan {
    if !predicate.is_conjunction() {
        return QueryPlan::FullScan;
    }
    let Some((field, literal)) = predicate.leading_equality() else {
        return QueryPlan::FullScan;
    };
    let Some(index) = collection.index_on(field) else {
        return QueryPlan::FullScan;
    };
    match literal_value(literal) {
        Some(value) => QueryPlan::IndexLookup {
            index: index.name().to_string(),
            value,
        },
        None => QueryPlan::FullScan,
    }
}

/// Documents listed under `value`, plus the number of dangling references
fn index_candidates(
    collection: &Collection,
    tx: &dyn Transaction,
    name: &str,
    value: &Value,
) -> Result<(SliceCursor, usize)> {
    let index = collection
        .index(name)
        .ok_or_else(|| Error::not_found(format!("index '{}' on '{}'", name, collection.name())))?;
    let Some(encoded) = encoding::encode_value(value) else {
        return Ok((SliceCursor::new(Vec::new()), 0));
    };

    let documents = collection.bucket(tx)?;
    let mut entries = Vec::new();
    let mut dangling = 0;
    for key in index.lookup(tx, &encoded)? {
        match documents.get(&key)? {
            Some(raw) => entries.push((key, Some(raw))),
            None => {
                dangling += 1;
                let corrupt = Error::IndexCorrupt {
                    index: name.to_string(),
                    key: key.clone(),
                };
                if tx.writable() {
                    index.remove_reference(tx, &encoded, &key)?;
                    warn!(target: "docstore::engine", error = %corrupt, "removed dangling index reference");
                } else {
                    warn!(target: "docstore::engine", error = %corrupt, "dangling index reference skipped");
                }
            }
        }
    }
    Ok((SliceCursor::new(entries), dangling))
}

pub(super) fn execute(query: &Query, tx: &dyn Transaction) -> Result<QueryOutput> {
    let collection = query.collection();
    let predicate = Predicate::compile(query.filter())?;
    let codec = collection.codec()?;
    let planned = plan(collection, &predicate);
    debug!(target: "docstore::engine", query = %query, plan = %planned, "executing query");

    let mut dangling = 0;
    let (source, used): (Box<dyn Cursor>, QueryPlan) = match &planned {
        QueryPlan::FullScan => (collection.cursor(tx)?, QueryPlan::FullScan),
        QueryPlan::IndexLookup { index, value } => {
            match index_candidates(collection, tx, index, value) {
                Ok((candidates, found)) => {
                    dangling = found;
                    (Box::new(candidates) as Box<dyn Cursor>, planned.clone())
                }
                Err(e @ (Error::IndexCorrupt { .. } | Error::NotFound(_))) => {
                    warn!(target: "docstore::engine", index = %index, error = %e, "index unusable, scanning");
                    (collection.cursor(tx)?, QueryPlan::FullScan)
                }
                Err(e) => return Err(e),
            }
        }
    };

    let examined = Cell::new(0usize);
    let failure: RefCell<Option<Error>> = RefCell::new(None);
    let matched: RefCell<Option<Document>> = RefCell::new(None);

    // a failure is reported as a match so the cursor stops on it
    let mut cursor = MatchCursor::new(source, |_key: &[u8], raw: Option<&[u8]>| {
        let Some(raw) = raw else {
            return false;
        };
        examined.set(examined.get() + 1);
        let outcome = codec.decode(raw).and_then(|doc| {
            let hit = predicate.evaluate(&doc)?;
            if hit {
                *matched.borrow_mut() = Some(doc);
            }
            Ok(hit)
        });
        match outcome {
            Ok(hit) => hit,
            Err(e) => {
                *failure.borrow_mut() = Some(e);
                true
            }
        }
    });

    let projection = query.projection();
    let mut documents = Vec::new();
    while let Some((key, _)) = cursor.next() {
        if failure.borrow().is_some() {
            break;
        }
        let Some(doc) = matched.take() else {
            continue;
        };
        let doc = match projection {
            Some(paths) => project(&doc, paths),
            None => doc,
        };
        documents.push((key, doc));
    }
    drop(cursor);

    if let Some(e) = failure.take() {
        debug!(target: "docstore::engine", query = %query, error = %e, "query aborted");
        return Err(e);
    }

    let stats = QueryStats {
        plan: used,
        documents_examined: examined.get(),
        matches: documents.len(),
        dangling,
    };
    debug!(
        target: "docstore::engine",
        examined = stats.documents_examined,
        matches = stats.matches,
        dangling = stats.dangling,
        "query finished"
    );
    Ok(QueryOutput { documents, stats })
}
