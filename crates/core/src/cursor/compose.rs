//! Cursor adapters
//!
//! Both adapters implement [`Cursor`] themselves and own the cursor they
//! wrap, so they stack: `SubstituteCursor::new(MatchCursor::new(raw, p), f)`.
//! Put filters inside substitutions so predicates see the stored values.

use super::{Cursor, Entry};

/// Filters a cursor, skipping pairs for which the predicate is false
///
/// `next`, `prev`, `first` and `last` skip in their direction of travel.
/// `seek` positions the inner cursor and then skips forward only. Cost is
/// proportional to the distance to the next match, a full scan at worst.
pub struct MatchCursor<C, F> {
    inner: C,
    predicate: F,
}

impl<C, F> MatchCursor<C, F>
where
    C: Cursor,
    F: FnMut(&[u8], Option<&[u8]>) -> bool,
{
    /// Wrap `inner`, keeping only pairs accepted by `predicate`
    pub fn new(inner: C, predicate: F) -> Self {
        MatchCursor { inner, predicate }
    }

    /// Release the wrapped cursor
    pub fn into_inner(self) -> C {
        self.inner
    }

    fn accepts(&mut self, entry: &Entry) -> bool {
        (self.predicate)(&entry.0, entry.1.as_deref())
    }

    fn skip_forward(&mut self, mut current: Option<Entry>) -> Option<Entry> {
        while let Some(entry) = current {
            if self.accepts(&entry) {
                return Some(entry);
            }
            current = self.inner.next();
        }
        None
    }

    fn skip_backward(&mut self, mut current: Option<Entry>) -> Option<Entry> {
        while let Some(entry) = current {
            if self.accepts(&entry) {
                return Some(entry);
            }
            current = self.inner.prev();
        }
        None
    }
}

impl<C, F> Cursor for MatchCursor<C, F>
where
    C: Cursor,
    F: FnMut(&[u8], Option<&[u8]>) -> bool,
{
    fn first(&mut self) -> Option<Entry> {
        let start = self.inner.first();
        self.skip_forward(start)
    }

    fn last(&mut self) -> Option<Entry> {
        let start = self.inner.last();
        self.skip_backward(start)
    }

    fn next(&mut self) -> Option<Entry> {
        let start = self.inner.next();
        self.skip_forward(start)
    }

    fn prev(&mut self) -> Option<Entry> {
        let start = self.inner.prev();
        self.skip_backward(start)
    }

    fn seek(&mut self, key: &[u8]) -> Option<Entry> {
        let start = self.inner.seek(key);
        self.skip_forward(start)
    }
}

/// Replaces each value with `transform(key, value)`; keys pass through
///
/// The transform may return `None`, e.g. for a field the projection does not
/// include. Order and count of pairs are unchanged.
pub struct SubstituteCursor<C, F> {
    inner: C,
    transform: F,
}

impl<C, F> SubstituteCursor<C, F>
where
    C: Cursor,
    F: FnMut(&[u8], Option<&[u8]>) -> Option<Vec<u8>>,
{
    /// Wrap `inner`, rewriting values with `transform`
    pub fn new(inner: C, transform: F) -> Self {
        SubstituteCursor { inner, transform }
    }

    /// Release the wrapped cursor
    pub fn into_inner(self) -> C {
        self.inner
    }

    fn apply(&mut self, entry: Option<Entry>) -> Option<Entry> {
        entry.map(|(key, value)| {
            let replaced = (self.transform)(&key, value.as_deref());
            (key, replaced)
        })
    }
}

impl<C, F> Cursor for SubstituteCursor<C, F>
where
    C: Cursor,
    F: FnMut(&[u8], Option<&[u8]>) -> Option<Vec<u8>>,
{
    fn first(&mut self) -> Option<Entry> {
        let entry = self.inner.first();
        self.apply(entry)
    }

    fn last(&mut self) -> Option<Entry> {
        let entry = self.inner.last();
        self.apply(entry)
    }

    fn next(&mut self) -> Option<Entry> {
        let entry = self.inner.next();
        self.apply(entry)
    }

    fn prev(&mut self) -> Option<Entry> {
        let entry = self.inner.prev();
        self.apply(entry)
    }

    fn seek(&mut self, key: &[u8]) -> Option<Entry> {
        let entry = self.inner.seek(key);
        self.apply(entry)
    }
}
