//! Copy-on-write bucket tree
//!
//! Every bucket is a [`Node`]: an ordered map from key to either a value or a
//! nested node. Nodes are shared through `Arc`, and writers go through
//! `Arc::make_mut`, so a transaction only copies the nodes on the path it
//! modifies. A snapshot is just a clone of the root `Arc`.

use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use docstore_core::{Cursor, Entry, Error, Result};

/// One bucket's contents
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Node {
    entries: BTreeMap<Vec<u8>, Slot>,
}

/// A key holds either a value or a nested bucket, never both
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Slot {
    /// Plain value
    Value(Vec<u8>),
    /// Nested bucket
    Bucket(Arc<Node>),
}

impl Slot {
    fn as_entry_value(&self) -> Option<Vec<u8>> {
        match self {
            Slot::Value(v) => Some(v.clone()),
            Slot::Bucket(_) => None,
        }
    }
}

impl Node {
    /// Empty bucket
    pub fn new() -> Self {
        Node::default()
    }

    /// Value stored at `key`; `None` if absent or a sub-bucket
    pub fn get(&self, key: &[u8]) -> Option<&[u8]> {
        match self.entries.get(key) {
            Some(Slot::Value(v)) => Some(v),
            _ => None,
        }
    }

    /// Insert or overwrite a value
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if key.is_empty() {
            return Err(Error::InvalidKey("key must not be empty".to_string()));
        }
        if let Some(Slot::Bucket(_)) = self.entries.get(key) {
            return Err(Error::IncompatibleValue(key.to_vec()));
        }
        self.entries.insert(key.to_vec(), Slot::Value(value.to_vec()));
        Ok(())
    }

    /// Remove a value; missing keys are ignored
    pub fn delete(&mut self, key: &[u8]) -> Result<()> {
        match self.entries.get(key) {
            Some(Slot::Bucket(_)) => Err(Error::IncompatibleValue(key.to_vec())),
            Some(Slot::Value(_)) => {
                self.entries.remove(key);
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Child bucket at `name`
    pub fn child(&self, name: &[u8]) -> Option<&Arc<Node>> {
        match self.entries.get(name) {
            Some(Slot::Bucket(node)) => Some(node),
            _ => None,
        }
    }

    /// Whether `name` holds any slot
    pub fn contains(&self, name: &[u8]) -> bool {
        self.entries.contains_key(name)
    }

    /// Mutable access to a child bucket, copying it if shared
    pub fn child_mut(&mut self, name: &[u8]) -> Result<&mut Node> {
        match self.entries.get_mut(name) {
            Some(Slot::Bucket(node)) => Ok(Arc::make_mut(node)),
            Some(Slot::Value(_)) => Err(Error::IncompatibleValue(name.to_vec())),
            None => Err(Error::not_found(String::from_utf8_lossy(name).into_owned())),
        }
    }

    /// Add an empty child bucket
    pub fn create_child(&mut self, name: &[u8]) -> Result<()> {
        match self.entries.get(name) {
            Some(Slot::Bucket(_)) => Err(Error::already_exists(
                String::from_utf8_lossy(name).into_owned(),
            )),
            Some(Slot::Value(_)) => Err(Error::IncompatibleValue(name.to_vec())),
            None => {
                self.entries
                    .insert(name.to_vec(), Slot::Bucket(Arc::new(Node::new())));
                Ok(())
            }
        }
    }

    /// Drop a child bucket and its contents
    pub fn remove_child(&mut self, name: &[u8]) -> Result<()> {
        match self.entries.get(name) {
            Some(Slot::Bucket(_)) => {
                self.entries.remove(name);
                Ok(())
            }
            Some(Slot::Value(_)) => Err(Error::IncompatibleValue(name.to_vec())),
            None => Err(Error::not_found(String::from_utf8_lossy(name).into_owned())),
        }
    }

    /// Names of direct child buckets in key order
    pub fn child_names(&self) -> Vec<Vec<u8>> {
        self.entries
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Bucket(_)))
            .map(|(k, _)| k.clone())
            .collect()
    }

    /// Direct pairs in key order (`None` for sub-buckets)
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], Option<&[u8]>)> {
        self.entries.iter().map(|(k, slot)| {
            let v = match slot {
                Slot::Value(v) => Some(v.as_slice()),
                Slot::Bucket(_) => None,
            };
            (k.as_slice(), v)
        })
    }

    /// Number of value pairs
    pub fn value_count(&self) -> usize {
        self.entries
            .values()
            .filter(|slot| matches!(slot, Slot::Value(_)))
            .count()
    }

    /// Walk down `path` from this node
    pub fn resolve<'a>(self: &'a Arc<Self>, path: &[Vec<u8>]) -> Option<&'a Arc<Node>> {
        let mut current = self;
        for segment in path {
            current = current.child(segment)?;
        }
        Some(current)
    }

    /// Walk down `path`, copying shared nodes on the way
    pub fn resolve_mut<'a>(self: &'a mut Arc<Self>, path: &[Vec<u8>]) -> Result<&'a mut Node> {
        let mut current = Arc::make_mut(self);
        for segment in path {
            current = current.child_mut(segment)?;
        }
        Ok(current)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Position {
    BeforeFirst,
    At(Vec<u8>),
    AfterLast,
}

/// Cursor over one node snapshot
///
/// Holds its own `Arc` to the node, so later writes in the same transaction
/// copy the node instead of disturbing the walk. Every step is a `BTreeMap`
/// range lookup.
pub struct NodeCursor {
    node: Arc<Node>,
    pos: Position,
}

impl NodeCursor {
    /// Cursor positioned before the first pair of `node`
    pub fn new(node: Arc<Node>) -> Self {
        NodeCursor {
            node,
            pos: Position::BeforeFirst,
        }
    }

    fn land(&mut self, found: Option<(&Vec<u8>, &Slot)>, fallback: Position) -> Option<Entry> {
        match found {
            Some((k, slot)) => {
                self.pos = Position::At(k.clone());
                Some((k.clone(), slot.as_entry_value()))
            }
            None => {
                self.pos = fallback;
                None
            }
        }
    }
}

impl Cursor for NodeCursor {
    fn first(&mut self) -> Option<Entry> {
        let node = Arc::clone(&self.node);
        self.land(node.entries.iter().next(), Position::AfterLast)
    }

    fn last(&mut self) -> Option<Entry> {
        let node = Arc::clone(&self.node);
        self.land(node.entries.iter().next_back(), Position::BeforeFirst)
    }

    fn next(&mut self) -> Option<Entry> {
        let node = Arc::clone(&self.node);
        let found = match &self.pos {
            Position::BeforeFirst => node.entries.iter().next(),
            Position::At(k) => node
                .entries
                .range::<[u8], _>((Bound::Excluded(k.as_slice()), Bound::Unbounded))
                .next(),
            Position::AfterLast => return None,
        };
        self.land(found, Position::AfterLast)
    }

    fn prev(&mut self) -> Option<Entry> {
        let node = Arc::clone(&self.node);
        let found = match &self.pos {
            Position::BeforeFirst => return None,
            Position::At(k) => node
                .entries
                .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(k.as_slice())))
                .next_back(),
            Position::AfterLast => node.entries.iter().next_back(),
        };
        self.land(found, Position::BeforeFirst)
    }

    fn seek(&mut self, key: &[u8]) -> Option<Entry> {
        let node = Arc::clone(&self.node);
        let found = node
            .entries
            .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
            .next();
        self.land(found, Position::AfterLast)
    }
}
