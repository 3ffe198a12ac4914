//! Array iterators
//!
//! Iterators over random-access, binary-searchable sequences. The cursor
//! logic lives in [`BasicArrayIterator`]; [`ArrayIterator`] adds key/value
//! access and [`ArrayIteratorIndexer`] adds nested iterators.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::comparer::{BasicComparer, Comparer};
use crate::error::LarchError;
use crate::util::Releaser;

use super::{BoxedIterator, Cursor, Dir, IterState, IteratorIndexer, IteratorSeeker, StorageIterator};

/// Random-access sequence with a known length.
pub trait BasicArray: Send {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the first element >= `key`, `len()` if there is none.
    fn search(&self, key: &[u8]) -> usize;
}

/// Sequence of key/value pairs.
pub trait Array: BasicArray {
    fn index(&self, i: usize) -> (&[u8], &[u8]);
}

/// Sequence whose elements are themselves iterable.
pub trait ArrayIndexer: BasicArray {
    fn get(&self, i: usize) -> BoxedIterator;
}

// =============================================================================
// Basic Array Iterator
// =============================================================================

/// Cursor over a [`BasicArray`]; position -1 is before the first element and
/// `len` is past the last.
pub struct BasicArrayIterator<A: BasicArray> {
    array: A,
    pos: isize,
    cursor: Cursor,
}

impl<A: BasicArray> BasicArrayIterator<A> {
    pub fn new(array: A) -> Self {
        Self {
            array,
            pos: -1,
            cursor: Cursor::new(),
        }
    }

    pub fn array(&self) -> &A {
        &self.array
    }

    /// Current index, if positioned.
    pub fn position(&self) -> Option<usize> {
        self.valid().then_some(self.pos as usize)
    }

    fn len(&self) -> isize {
        self.array.len() as isize
    }

    /// Move to `pos`, clamping to the before-first / past-last sentinels.
    fn settle(&mut self, pos: isize) -> bool {
        let n = self.len();
        if pos < 0 {
            self.pos = -1;
            self.cursor.set_dir(Dir::Start);
            false
        } else if pos >= n {
            self.pos = n;
            self.cursor.set_dir(Dir::End);
            false
        } else {
            self.pos = pos;
            self.cursor.set_dir(Dir::Forward);
            true
        }
    }
}

impl<A: BasicArray> IteratorSeeker for BasicArrayIterator<A> {
    fn valid(&self) -> bool {
        !self.cursor.released() && self.pos >= 0 && self.pos < self.len()
    }

    fn first(&mut self) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        if self.array.is_empty() {
            return self.settle(self.len());
        }
        self.settle(0)
    }

    fn last(&mut self) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        self.settle(self.len() - 1)
    }

    fn seek(&mut self, key: &[u8]) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        let pos = self.array.search(key) as isize;
        self.settle(pos)
    }

    fn next(&mut self) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        if self.pos >= self.len() {
            return false;
        }
        self.settle(self.pos + 1)
    }

    fn prev(&mut self) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        if self.pos < 0 {
            return false;
        }
        self.settle(self.pos - 1)
    }

    fn error(&self) -> Option<&LarchError> {
        self.cursor.err()
    }

    fn state(&self) -> IterState {
        self.cursor.state()
    }

    fn release(&mut self) {
        self.cursor.release();
    }

    fn set_releaser(&mut self, releaser: Box<dyn Releaser>) {
        self.cursor.set_releaser(releaser);
    }
}

// =============================================================================
// Key/Value and Indexer Wrappers
// =============================================================================

macro_rules! forward_seeker {
    () => {
        fn valid(&self) -> bool {
            self.base.valid()
        }
        fn first(&mut self) -> bool {
            self.base.first()
        }
        fn last(&mut self) -> bool {
            self.base.last()
        }
        fn seek(&mut self, key: &[u8]) -> bool {
            self.base.seek(key)
        }
        fn next(&mut self) -> bool {
            self.base.next()
        }
        fn prev(&mut self) -> bool {
            self.base.prev()
        }
        fn error(&self) -> Option<&LarchError> {
            self.base.error()
        }
        fn state(&self) -> IterState {
            self.base.state()
        }
        fn release(&mut self) {
            self.base.release()
        }
        fn set_releaser(&mut self, releaser: Box<dyn Releaser>) {
            self.base.set_releaser(releaser)
        }
    };
}

/// Key/value iterator over an [`Array`].
pub struct ArrayIterator<A: Array> {
    base: BasicArrayIterator<A>,
}

impl<A: Array> ArrayIterator<A> {
    pub fn new(array: A) -> Self {
        Self {
            base: BasicArrayIterator::new(array),
        }
    }
}

impl<A: Array> IteratorSeeker for ArrayIterator<A> {
    forward_seeker!();
}

impl<A: Array> StorageIterator for ArrayIterator<A> {
    fn key(&self) -> &[u8] {
        match self.base.position() {
            Some(i) => self.base.array().index(i).0,
            None => &[],
        }
    }

    fn value(&self) -> &[u8] {
        match self.base.position() {
            Some(i) => self.base.array().index(i).1,
            None => &[],
        }
    }
}

/// Indexer over an [`ArrayIndexer`]; `get` yields the current element's
/// iterator.
pub struct ArrayIteratorIndexer<A: ArrayIndexer> {
    base: BasicArrayIterator<A>,
}

impl<A: ArrayIndexer> ArrayIteratorIndexer<A> {
    pub fn new(array: A) -> Self {
        Self {
            base: BasicArrayIterator::new(array),
        }
    }
}

impl<A: ArrayIndexer> IteratorSeeker for ArrayIteratorIndexer<A> {
    forward_seeker!();
}

impl<A: ArrayIndexer> IteratorIndexer for ArrayIteratorIndexer<A> {
    fn get(&mut self) -> BoxedIterator {
        match self.base.position() {
            Some(i) => self.base.array().get(i),
            None => Box::new(super::EmptyIterator::new()),
        }
    }
}

// =============================================================================
// Sorted Key/Value Array
// =============================================================================

/// In-memory sorted key/value pairs, searchable with any comparer.
pub struct KeyValueArray {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    cmp: Arc<dyn Comparer>,
}

impl KeyValueArray {
    /// `entries` must already be sorted by `cmp`.
    pub fn new(entries: Vec<(Vec<u8>, Vec<u8>)>, cmp: Arc<dyn Comparer>) -> Self {
        Self { entries, cmp }
    }

    /// Sort `entries` by `cmp` first. Equal keys keep their input order.
    pub fn from_unsorted(mut entries: Vec<(Vec<u8>, Vec<u8>)>, cmp: Arc<dyn Comparer>) -> Self {
        entries.sort_by(|a, b| cmp.compare(&a.0, &b.0));
        Self { entries, cmp }
    }
}

impl BasicArray for KeyValueArray {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn search(&self, key: &[u8]) -> usize {
        self.entries
            .partition_point(|(k, _)| self.cmp.compare(k, key) == Ordering::Less)
    }
}

impl Array for KeyValueArray {
    fn index(&self, i: usize) -> (&[u8], &[u8]) {
        let (k, v) = &self.entries[i];
        (k, v)
    }
}
