//! Ordered iteration over a byte-keyed space
//!
//! A [`Cursor`] walks the pairs of one bucket in byte-lexicographic key
//! order. Its position is implicit: before the first pair, on a pair, or after
//! the last pair. A fresh cursor sits before the first pair.
//!
//! | call        | before-first | on pair `i`   | after-last |
//! |-------------|--------------|---------------|------------|
//! | `next()`    | pair 0       | pair `i + 1`  | `None`     |
//! | `prev()`    | `None`       | pair `i - 1`  | last pair  |
//! | `seek(k)`   | smallest key ≥ `k`, or after-last          |||
//!
//! Stepping off either end returns `None` and leaves the cursor at that end.
//! A pair's value is `None` when the key names a sub-bucket, or when a
//! [`SubstituteCursor`] mapped it away.

mod compose;

pub use compose::{MatchCursor, SubstituteCursor};

use std::sync::Arc;

/// One key and its value (`None` for sub-buckets)
pub type Entry = (Vec<u8>, Option<Vec<u8>>);

/// The iteration contract every storage engine must provide
pub trait Cursor {
    /// Move to the first pair
    fn first(&mut self) -> Option<Entry>;

    /// Move to the last pair
    fn last(&mut self) -> Option<Entry>;

    /// Move forward one pair
    fn next(&mut self) -> Option<Entry>;

    /// Move back one pair
    fn prev(&mut self) -> Option<Entry>;

    /// Move to the smallest key ≥ `key`
    fn seek(&mut self, key: &[u8]) -> Option<Entry>;

    /// Consume the cursor as a forward iterator starting at the current
    /// position
    fn entries(self) -> Entries<Self>
    where
        Self: Sized,
    {
        Entries { cursor: self }
    }
}

impl<C: Cursor + ?Sized> Cursor for Box<C> {
    fn first(&mut self) -> Option<Entry> {
        (**self).first()
    }

    fn last(&mut self) -> Option<Entry> {
        (**self).last()
    }

    fn next(&mut self) -> Option<Entry> {
        (**self).next()
    }

    fn prev(&mut self) -> Option<Entry> {
        (**self).prev()
    }

    fn seek(&mut self, key: &[u8]) -> Option<Entry> {
        (**self).seek(key)
    }
}

/// Forward iterator adapter returned by [`Cursor::entries`]
pub struct Entries<C> {
    cursor: C,
}

impl<C: Cursor> Iterator for Entries<C> {
    type Item = Entry;

    fn next(&mut self) -> Option<Entry> {
        self.cursor.next()
    }
}

/// Implicit cursor position over an indexed sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Position {
    BeforeFirst,
    At(usize),
    AfterLast,
}

/// Cursor over an owned, sorted list of pairs
///
/// Used for materialized snapshots (index key-sets, projections) and as a
/// reference implementation in tests. Input is sorted and deduplicated by key
/// on construction; the last pair for a duplicated key wins.
#[derive(Debug, Clone)]
pub struct SliceCursor {
    entries: Arc<Vec<Entry>>,
    pos: Position,
}

impl SliceCursor {
    /// Build a cursor from unsorted pairs
    pub fn new(mut entries: Vec<Entry>) -> Self {
        // stable sort keeps insertion order among equal keys, so the later
        // duplicate survives the reverse dedup below
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.reverse();
        entries.dedup_by(|a, b| a.0 == b.0);
        entries.reverse();
        SliceCursor {
            entries: Arc::new(entries),
            pos: Position::BeforeFirst,
        }
    }

    /// Build a cursor from key/value byte pairs
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        SliceCursor::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), Some(v.into())))
                .collect(),
        )
    }

    /// Number of pairs
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when there are no pairs
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn at(&mut self, idx: usize) -> Option<Entry> {
        self.pos = Position::At(idx);
        self.entries.get(idx).cloned()
    }
}

impl Cursor for SliceCursor {
    fn first(&mut self) -> Option<Entry> {
        if self.entries.is_empty() {
            self.pos = Position::AfterLast;
            return None;
        }
        self.at(0)
    }

    fn last(&mut self) -> Option<Entry> {
        if self.entries.is_empty() {
            self.pos = Position::BeforeFirst;
            return None;
        }
        self.at(self.entries.len() - 1)
    }

    fn next(&mut self) -> Option<Entry> {
        let idx = match self.pos {
            Position::BeforeFirst => 0,
            Position::At(i) => i + 1,
            Position::AfterLast => return None,
        };
        if idx >= self.entries.len() {
            self.pos = Position::AfterLast;
            return None;
        }
        self.at(idx)
    }

    fn prev(&mut self) -> Option<Entry> {
        let idx = match self.pos {
            Position::BeforeFirst => return None,
            Position::At(0) => {
                self.pos = Position::BeforeFirst;
                return None;
            }
            Position::At(i) => i - 1,
            Position::AfterLast if self.entries.is_empty() => return None,
            Position::AfterLast => self.entries.len() - 1,
        };
        self.at(idx)
    }

    fn seek(&mut self, key: &[u8]) -> Option<Entry> {
        let idx = self.entries.partition_point(|(k, _)| k.as_slice() < key);
        if idx >= self.entries.len() {
            self.pos = Position::AfterLast;
            return None;
        }
        self.at(idx)
    }
}
