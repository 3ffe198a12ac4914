//! Merged iterator
//!
//! k-way merge over child iterators. Moving forward yields the smallest
//! current key among the children, moving backward the largest. Equal keys
//! from different children are all yielded, ordered by child index, so a
//! backward pass is the exact reverse of a forward one. The layer above
//! decides what duplicates mean.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::comparer::{BasicComparer, Comparer};
use crate::error::LarchError;
use crate::util::Releaser;

use super::{BoxedIterator, Cursor, Dir, ErrorCallback, IterState, IteratorSeeker, StorageIterator};

/// k-way merging iterator.
pub struct MergedIterator {
    cmp: Arc<dyn Comparer>,
    iters: Vec<BoxedIterator>,
    strict: bool,
    /// Copy of each child's current key; `None` for exhausted children.
    keys: Vec<Option<Vec<u8>>>,
    index: usize,
    cursor: Cursor,
    on_error: Option<ErrorCallback>,
}

impl MergedIterator {
    /// Merge `iters` under `cmp`.
    ///
    /// With `strict` set, any child error halts the merge. Otherwise a child
    /// failing with a corruption error is treated as exhausted and the merge
    /// continues over the others.
    pub fn new(iters: Vec<BoxedIterator>, cmp: Arc<dyn Comparer>, strict: bool) -> Self {
        let keys = vec![None; iters.len()];
        Self {
            cmp,
            iters,
            strict,
            keys,
            index: 0,
            cursor: Cursor::new(),
            on_error: None,
        }
    }

    /// Receive every child error, including skipped ones.
    pub fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.on_error = Some(callback);
    }

    fn store_key(&mut self, x: usize) {
        let key = self.iters[x].key();
        match &mut self.keys[x] {
            Some(buf) => {
                buf.clear();
                buf.extend_from_slice(key);
            }
            slot @ None => *slot = Some(key.to_vec()),
        }
    }

    /// Record child `x`'s position after a motion that returned `moved`.
    /// Returns false if a child error halts the merge.
    fn settle_child(&mut self, x: usize, moved: bool) -> bool {
        if moved {
            self.store_key(x);
            return true;
        }
        self.keys[x] = None;
        !self.child_err(x)
    }

    fn child_err(&mut self, x: usize) -> bool {
        let err = match self.iters[x].error() {
            Some(err) => err.clone(),
            None => return false,
        };
        if let Some(callback) = self.on_error.as_mut() {
            callback(&err);
        }
        if self.strict || !err.is_corrupted() {
            self.cursor.set_err(err);
            return true;
        }
        tracing::warn!(child = x, error = %err, "skipping corrupted child iterator");
        false
    }

    fn compare_slots(&self, a: usize, b: usize) -> Ordering {
        match (&self.keys[a], &self.keys[b]) {
            (Some(ka), Some(kb)) => self.cmp.compare(ka, kb),
            _ => Ordering::Equal,
        }
    }

    /// Select the smallest child key, lowest child index on ties.
    fn merge_forward(&mut self) -> bool {
        let mut best: Option<usize> = None;
        for x in 0..self.keys.len() {
            if self.keys[x].is_none() {
                continue;
            }
            match best {
                Some(b) if self.compare_slots(x, b) != Ordering::Less => {}
                _ => best = Some(x),
            }
        }
        match best {
            Some(b) => {
                self.index = b;
                self.cursor.set_dir(Dir::Forward);
                true
            }
            None => {
                self.cursor.set_dir(Dir::End);
                false
            }
        }
    }

    /// Select the largest child key, highest child index on ties.
    fn merge_backward(&mut self) -> bool {
        let mut best: Option<usize> = None;
        for x in 0..self.keys.len() {
            if self.keys[x].is_none() {
                continue;
            }
            match best {
                Some(b) if self.compare_slots(x, b) == Ordering::Less => {}
                _ => best = Some(x),
            }
        }
        match best {
            Some(b) => {
                self.index = b;
                self.cursor.set_dir(Dir::Backward);
                true
            }
            None => {
                self.cursor.set_dir(Dir::Start);
                false
            }
        }
    }

    /// Move child `x` to its first entry after `(key, self.index)` in merge
    /// order: past `key` for lower indices, at or past it for higher ones.
    fn step_child_after(&mut self, x: usize, key: &[u8]) -> bool {
        let inclusive = x > self.index;
        let iter = &mut self.iters[x];
        let mut moved = iter.seek(key);
        if moved && !inclusive && self.cmp.compare(iter.key(), key) == Ordering::Equal {
            moved = iter.next();
        }
        self.settle_child(x, moved)
    }

    /// Move child `x` to its last entry before `(key, self.index)` in merge
    /// order: at or before `key` for lower indices, before it for higher ones.
    fn step_child_before(&mut self, x: usize, key: &[u8]) -> bool {
        let inclusive = x < self.index;
        let iter = &mut self.iters[x];
        let moved = if iter.seek(key) {
            (inclusive && self.cmp.compare(iter.key(), key) == Ordering::Equal) || iter.prev()
        } else if iter.error().is_some() {
            false
        } else {
            iter.last()
        };
        self.settle_child(x, moved)
    }
}

impl IteratorSeeker for MergedIterator {
    fn valid(&self) -> bool {
        self.cursor.is_positioned()
    }

    fn first(&mut self) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        for x in 0..self.iters.len() {
            let moved = self.iters[x].first();
            if !self.settle_child(x, moved) {
                return false;
            }
        }
        self.cursor.set_dir(Dir::Start);
        self.merge_forward()
    }

    fn last(&mut self) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        for x in 0..self.iters.len() {
            let moved = self.iters[x].last();
            if !self.settle_child(x, moved) {
                return false;
            }
        }
        self.cursor.set_dir(Dir::End);
        self.merge_backward()
    }

    fn seek(&mut self, key: &[u8]) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        for x in 0..self.iters.len() {
            let moved = self.iters[x].seek(key);
            if !self.settle_child(x, moved) {
                return false;
            }
        }
        self.cursor.set_dir(Dir::Start);
        self.merge_forward()
    }

    fn next(&mut self) -> bool {
        if self.cursor.dir() == Dir::End || self.cursor.err().is_some() {
            return false;
        }
        if !self.cursor.begin_move() {
            return false;
        }
        match self.cursor.dir() {
            Dir::Start => return self.first(),
            Dir::Backward => {
                let key = self.keys[self.index].clone().unwrap_or_default();
                for x in 0..self.iters.len() {
                    if x != self.index && !self.step_child_after(x, &key) {
                        return false;
                    }
                }
            }
            _ => {}
        }
        let x = self.index;
        let moved = self.iters[x].next();
        if !self.settle_child(x, moved) {
            return false;
        }
        self.merge_forward()
    }

    fn prev(&mut self) -> bool {
        if self.cursor.dir() == Dir::Start || self.cursor.err().is_some() {
            return false;
        }
        if !self.cursor.begin_move() {
            return false;
        }
        match self.cursor.dir() {
            Dir::End => return self.last(),
            Dir::Forward => {
                let key = self.keys[self.index].clone().unwrap_or_default();
                for x in 0..self.iters.len() {
                    if x != self.index && !self.step_child_before(x, &key) {
                        return false;
                    }
                }
            }
            _ => {}
        }
        let x = self.index;
        let moved = self.iters[x].prev();
        if !self.settle_child(x, moved) {
            return false;
        }
        self.merge_backward()
    }

    fn error(&self) -> Option<&LarchError> {
        self.cursor.err()
    }

    fn state(&self) -> IterState {
        self.cursor.state()
    }

    fn release(&mut self) {
        if self.cursor.released() {
            return;
        }
        for iter in &mut self.iters {
            iter.release();
        }
        self.iters.clear();
        self.keys.clear();
        self.cursor.release();
    }

    fn set_releaser(&mut self, releaser: Box<dyn Releaser>) {
        self.cursor.set_releaser(releaser);
    }
}

impl StorageIterator for MergedIterator {
    fn key(&self) -> &[u8] {
        if self.valid() {
            self.iters[self.index].key()
        } else {
            &[]
        }
    }

    fn value(&self) -> &[u8] {
        if self.valid() {
            self.iters[self.index].value()
        } else {
            &[]
        }
    }
}
