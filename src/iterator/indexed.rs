//! Indexed iterator
//!
//! Two-level iteration: an index iterator whose every position yields a data
//! iterator (a table's index block over its data blocks, or a level's file
//! list over its tables). Data iterators are opened lazily and released as
//! soon as iteration leaves them.

use crate::error::LarchError;
use crate::util::Releaser;

use super::{BoxedIterator, Cursor, Dir, ErrorCallback, IterState, IteratorIndexer, IteratorSeeker, StorageIterator};

/// Concatenation of the data iterators yielded by an index.
pub struct IndexedIterator {
    index: Box<dyn IteratorIndexer>,
    data: Option<BoxedIterator>,
    strict: bool,
    cursor: Cursor,
    on_error: Option<ErrorCallback>,
}

impl IndexedIterator {
    /// Iterate every data iterator `index` yields, in index order.
    ///
    /// Index errors always halt iteration. A data iterator failing with a
    /// corruption error is skipped unless `strict` is set; other data errors
    /// halt.
    pub fn new(index: Box<dyn IteratorIndexer>, strict: bool) -> Self {
        Self {
            index,
            data: None,
            strict,
            cursor: Cursor::new(),
            on_error: None,
        }
    }

    /// Receive every index and data error, including skipped ones.
    pub fn set_error_callback(&mut self, callback: ErrorCallback) {
        self.on_error = Some(callback);
    }

    fn set_data(&mut self) {
        self.clear_data();
        self.data = Some(self.index.get());
    }

    fn clear_data(&mut self) {
        if let Some(mut data) = self.data.take() {
            data.release();
        }
    }

    fn index_err(&mut self) {
        if let Some(err) = self.index.error() {
            let err = err.clone();
            if let Some(callback) = self.on_error.as_mut() {
                callback(&err);
            }
            self.cursor.set_err(err);
        }
    }

    /// Returns true if the current data iterator's error halts iteration.
    fn data_err(&mut self) -> bool {
        let err = match self.data.as_ref().and_then(|d| d.error()) {
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
        tracing::warn!(error = %err, "skipping corrupted data iterator");
        false
    }

    /// Leave the current data iterator empty-handed: stop on a halting error,
    /// otherwise drop it so the caller moves on through the index.
    fn abandon_data(&mut self) -> bool {
        if self.data_err() {
            return false;
        }
        self.clear_data();
        true
    }

    fn halt_on_index(&mut self, dir: Dir) -> bool {
        self.index_err();
        self.clear_data();
        self.cursor.set_dir(dir);
        false
    }

    fn advance(&mut self) -> bool {
        loop {
            if let Some(data) = self.data.as_mut() {
                if data.next() {
                    self.cursor.set_dir(Dir::Forward);
                    return true;
                }
                if !self.abandon_data() {
                    return false;
                }
            }
            if !self.index.next() {
                return self.halt_on_index(Dir::End);
            }
            self.set_data();
        }
    }

    fn retreat(&mut self) -> bool {
        loop {
            if let Some(data) = self.data.as_mut() {
                if data.prev() {
                    self.cursor.set_dir(Dir::Backward);
                    return true;
                }
                if !self.abandon_data() {
                    return false;
                }
            }
            if !self.index.prev() {
                return self.halt_on_index(Dir::Start);
            }
            self.set_data();
            if self.last_in_data() {
                return true;
            }
            if !self.abandon_data() {
                return false;
            }
        }
    }

    fn last_in_data(&mut self) -> bool {
        if let Some(data) = self.data.as_mut() {
            if data.last() {
                self.cursor.set_dir(Dir::Backward);
                return true;
            }
        }
        false
    }
}

impl IteratorSeeker for IndexedIterator {
    fn valid(&self) -> bool {
        self.cursor.is_positioned() && self.data.as_ref().is_some_and(|d| d.valid())
    }

    fn first(&mut self) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        if !self.index.first() {
            return self.halt_on_index(Dir::End);
        }
        self.set_data();
        self.advance()
    }

    fn last(&mut self) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        if !self.index.last() {
            return self.halt_on_index(Dir::Start);
        }
        self.set_data();
        if self.last_in_data() {
            return true;
        }
        if !self.abandon_data() {
            return false;
        }
        self.retreat()
    }

    fn seek(&mut self, key: &[u8]) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        if !self.index.seek(key) {
            return self.halt_on_index(Dir::End);
        }
        self.set_data();
        if let Some(data) = self.data.as_mut() {
            if data.seek(key) {
                self.cursor.set_dir(Dir::Forward);
                return true;
            }
        }
        if !self.abandon_data() {
            return false;
        }
        self.advance()
    }

    fn next(&mut self) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        match self.cursor.dir() {
            Dir::Start => self.first(),
            Dir::End => false,
            _ => self.advance(),
        }
    }

    fn prev(&mut self) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        match self.cursor.dir() {
            Dir::End => self.last(),
            Dir::Start => false,
            _ => self.retreat(),
        }
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
        self.clear_data();
        self.index.release();
        self.cursor.release();
    }

    fn set_releaser(&mut self, releaser: Box<dyn Releaser>) {
        self.cursor.set_releaser(releaser);
    }
}

impl StorageIterator for IndexedIterator {
    fn key(&self) -> &[u8] {
        match &self.data {
            Some(data) if self.cursor.is_positioned() => data.key(),
            _ => &[],
        }
    }

    fn value(&self) -> &[u8] {
        match &self.data {
            Some(data) if self.cursor.is_positioned() => data.value(),
            _ => &[],
        }
    }
}
