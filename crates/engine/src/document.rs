//! Documents and field paths
//!
//! Documents are `serde_json::Value`s. A field is addressed by a
//! [`Path`]: each segment names an object member, or an array element when
//! the segment is a decimal index (`"tags/0"`).

use serde_json::{Map, Value};

use docstore_core::Path;

/// A document as seen by collections, indexes and queries
pub type Document = Value;

/// The value at `path` inside `doc`, if present
///
/// The root path addresses the whole document.
pub fn field<'a>(doc: &'a Document, path: &Path) -> Option<&'a Value> {
    let mut current = doc;
    for segment in path.segments() {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// A copy of `doc` holding only the fields named in `paths`
///
/// Nesting is preserved: projecting `address/city` yields
/// `{"address": {"city": ...}}`. Missing fields are left out. Array
/// elements are projected as object members keyed by their index.
pub fn project(doc: &Document, paths: &[Path]) -> Document {
    let mut out = Map::new();
    for path in paths {
        if let Some(value) = field(doc, path) {
            insert_at(&mut out, path.segments(), value.clone());
        }
    }
    Value::Object(out)
}

fn insert_at(target: &mut Map<String, Value>, segments: &[String], value: Value) {
    match segments {
        [] => {}
        [last] => {
            target.insert(last.clone(), value);
        }
        [first, rest @ ..] => {
            let entry = target
                .entry(first.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            if let Value::Object(child) = entry {
                insert_at(child, rest, value);
            }
        }
    }
}
