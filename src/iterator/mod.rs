//! Iterator Module
//!
//! Composable, seekable, bidirectional iterators for the read path.
//!
//! ## Composition
//! ```text
//!                 MergedIterator            (k-way merge over tables/levels)
//!                /      |       \
//!   IndexedIterator   ...    ArrayIterator
//!     index: IteratorIndexer ──get()──▶ data iterator (one per block/table)
//! ```
//!
//! ## State Machine
//! ```text
//!   Unpositioned ──first/last/seek──▶ Positioned | Exhausted
//!   Positioned   ──next/prev────────▶ Positioned | Exhausted
//!   any          ──release──────────▶ Released (every later move → false)
//!   any          ──error────────────▶ Errored  (sticky)
//! ```
//! `next` on a fresh iterator behaves as `first`; `prev` on an iterator
//! exhausted at the end behaves as `last`. Exhaustion is never an error.
//!
//! Iterators are `Send` but single-owner: share the underlying table, not
//! the iterator.

mod array;
mod indexed;
mod merged;

use crate::error::LarchError;
use crate::util::{BasicReleaser, Releaser};

pub use array::{
    Array, ArrayIndexer, ArrayIterator, ArrayIteratorIndexer, BasicArray, BasicArrayIterator,
    KeyValueArray,
};
pub use indexed::IndexedIterator;
pub use merged::MergedIterator;

/// Owned, type-erased iterator.
pub type BoxedIterator = Box<dyn StorageIterator>;

/// Callback receiving every child error a composite iterator observes,
/// including the ones it decides to skip.
pub type ErrorCallback = Box<dyn FnMut(&LarchError) + Send>;

// =============================================================================
// Traits
// =============================================================================

/// Positioning half of an iterator: motion, validity, errors, lifecycle.
pub trait IteratorSeeker: Send {
    /// Whether the iterator is positioned at an entry.
    fn valid(&self) -> bool;

    /// Move to the first entry. Returns `valid()`.
    fn first(&mut self) -> bool;

    /// Move to the last entry. Returns `valid()`.
    fn last(&mut self) -> bool;

    /// Move to the first entry with key >= `key`. Returns `valid()`.
    fn seek(&mut self, key: &[u8]) -> bool;

    /// Move to the next entry. Returns `valid()`.
    fn next(&mut self) -> bool;

    /// Move to the previous entry. Returns `valid()`.
    fn prev(&mut self) -> bool;

    /// Sticky error, if any. Querying has no side effects.
    fn error(&self) -> Option<&LarchError>;

    fn state(&self) -> IterState;

    /// Release held resources. Idempotent.
    fn release(&mut self);

    /// Attach a releaser run on `release`.
    ///
    /// # Panics
    /// Panics if a releaser is already attached or the iterator is released.
    fn set_releaser(&mut self, releaser: Box<dyn Releaser>);
}

/// An iterator over key/value entries.
pub trait StorageIterator: IteratorSeeker {
    /// Current key; empty when not valid.
    fn key(&self) -> &[u8];

    /// Current value; empty when not valid.
    fn value(&self) -> &[u8];
}

/// An iterator whose every position yields a nested data iterator.
pub trait IteratorIndexer: IteratorSeeker {
    /// Data iterator for the current position. Failures are reported through
    /// the returned iterator's `error()`.
    fn get(&mut self) -> BoxedIterator;
}

// =============================================================================
// Shared Cursor State
// =============================================================================

/// Observable iterator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterState {
    Unpositioned,
    Positioned,
    Exhausted,
    Released,
    Errored,
}

/// Direction of the last motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dir {
    Released,
    /// Before the first entry.
    Start,
    /// After the last entry.
    End,
    Backward,
    Forward,
}

/// Cursor state every iterator embeds: direction, sticky error, releaser.
#[derive(Debug)]
pub struct Cursor {
    dir: Dir,
    moved: bool,
    err: Option<LarchError>,
    releaser: BasicReleaser,
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

impl Cursor {
    pub fn new() -> Self {
        Self {
            dir: Dir::Start,
            moved: false,
            err: None,
            releaser: BasicReleaser::new(),
        }
    }

    /// Cursor that starts out in the errored state.
    pub fn with_error(err: LarchError) -> Self {
        let mut cursor = Self::new();
        cursor.err = Some(err);
        cursor
    }

    pub fn dir(&self) -> Dir {
        self.dir
    }

    pub fn set_dir(&mut self, dir: Dir) {
        self.dir = dir;
    }

    pub fn is_positioned(&self) -> bool {
        self.err.is_none() && matches!(self.dir, Dir::Forward | Dir::Backward)
    }

    pub fn err(&self) -> Option<&LarchError> {
        self.err.as_ref()
    }

    pub fn set_err(&mut self, err: LarchError) {
        self.err = Some(err);
    }

    /// Gate every motion goes through: false once errored, and a motion on a
    /// released iterator records the released error.
    pub fn begin_move(&mut self) -> bool {
        if self.err.is_some() {
            return false;
        }
        if self.dir == Dir::Released {
            self.err = Some(LarchError::Released("iterator"));
            return false;
        }
        self.moved = true;
        true
    }

    pub fn released(&self) -> bool {
        self.dir == Dir::Released
    }

    pub fn release(&mut self) {
        if self.dir != Dir::Released {
            self.dir = Dir::Released;
            self.releaser.release();
        }
    }

    pub fn set_releaser(&mut self, releaser: Box<dyn Releaser>) {
        self.releaser.set_releaser(releaser);
    }

    pub fn state(&self) -> IterState {
        if self.dir == Dir::Released {
            return IterState::Released;
        }
        if self.err.is_some() {
            return IterState::Errored;
        }
        match self.dir {
            Dir::Forward | Dir::Backward => IterState::Positioned,
            Dir::Start if !self.moved => IterState::Unpositioned,
            _ => IterState::Exhausted,
        }
    }
}

// =============================================================================
// Empty Iterator
// =============================================================================

/// Iterator with no entries, optionally carrying an error.
#[derive(Debug, Default)]
pub struct EmptyIterator {
    cursor: Cursor,
}

impl EmptyIterator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error(err: LarchError) -> Self {
        Self {
            cursor: Cursor::with_error(err),
        }
    }

    fn exhaust(&mut self, dir: Dir) -> bool {
        if self.cursor.begin_move() {
            self.cursor.set_dir(dir);
        }
        false
    }
}

impl IteratorSeeker for EmptyIterator {
    fn valid(&self) -> bool {
        false
    }

    fn first(&mut self) -> bool {
        self.exhaust(Dir::End)
    }

    fn last(&mut self) -> bool {
        self.exhaust(Dir::Start)
    }

    fn seek(&mut self, _key: &[u8]) -> bool {
        self.exhaust(Dir::End)
    }

    fn next(&mut self) -> bool {
        self.exhaust(Dir::End)
    }

    fn prev(&mut self) -> bool {
        self.exhaust(Dir::Start)
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

impl StorageIterator for EmptyIterator {
    fn key(&self) -> &[u8] {
        &[]
    }

    fn value(&self) -> &[u8] {
        &[]
    }
}
