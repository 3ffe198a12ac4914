//! Block Writer / Reader
//!
//! Prefix-compressed sorted entries with periodic restart points.
//!
//! ## Block Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Entry: varint(shared) varint(unshared) varint(value_len)     │
//! │        key[shared..] value                                   │
//! │ ... repeated for each entry ...                              │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Restart offsets: LE u32 each                                 │
//! │ Restart count:   LE u32                                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//! Every `restart_interval`-th entry is a restart point: its key is stored
//! whole (`shared == 0`), so decoding can begin there.

use std::cmp::Ordering;
use std::ops::Range as ByteRange;
use std::sync::Arc;

use bytes::{Buf, BufMut};

use crate::comparer::{BasicComparer, Comparer};
use crate::error::{LarchError, Result};
use crate::iterator::{Cursor, Dir, IterState, IteratorSeeker, StorageIterator};
use crate::util::coding::{get_uvarint, put_uvarint};
use crate::util::{BufferPool, Range, Releaser};

// =============================================================================
// Block Writer
// =============================================================================

/// Builds one block from entries appended in increasing key order.
#[derive(Debug)]
pub struct BlockWriter {
    restart_interval: usize,
    buf: Vec<u8>,
    restarts: Vec<u32>,
    prev_key: Vec<u8>,
    entries: usize,
}

impl BlockWriter {
    pub fn new(restart_interval: usize) -> Self {
        Self {
            restart_interval: restart_interval.max(1),
            buf: Vec::new(),
            restarts: Vec::new(),
            prev_key: Vec::new(),
            entries: 0,
        }
    }

    /// Append an entry. Keys must arrive in increasing order; the writer does
    /// not check.
    pub fn append(&mut self, key: &[u8], value: &[u8]) {
        let shared = if self.entries % self.restart_interval == 0 {
            self.restarts.push(self.buf.len() as u32);
            0
        } else {
            shared_prefix_len(&self.prev_key, key)
        };

        put_uvarint(&mut self.buf, shared as u64);
        put_uvarint(&mut self.buf, (key.len() - shared) as u64);
        put_uvarint(&mut self.buf, value.len() as u64);
        self.buf.extend_from_slice(&key[shared..]);
        self.buf.extend_from_slice(value);

        self.prev_key.clear();
        self.prev_key.extend_from_slice(key);
        self.entries += 1;
    }

    /// Append the restart trailer and return the finished block.
    pub fn finish(&mut self) -> &[u8] {
        if self.entries == 0 {
            // An empty block still has one restart point.
            self.restarts.push(0);
        }
        for &restart in &self.restarts {
            self.buf.put_u32_le(restart);
        }
        self.buf.put_u32_le(self.restarts.len() as u32);
        &self.buf
    }

    /// Clear the writer for the next block.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.restarts.clear();
        self.prev_key.clear();
        self.entries = 0;
    }

    /// Size the block would have if finished now.
    pub fn bytes_len(&self) -> usize {
        let restarts = self.restarts.len().max(1);
        self.buf.len() + restarts * 4 + 4
    }

    pub fn entries_len(&self) -> usize {
        self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries == 0
    }
}

fn shared_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

// =============================================================================
// Block
// =============================================================================

/// A decoded-trailer view over one block's bytes.
///
/// When the bytes came from a [`BufferPool`] they go back to it when the
/// block is dropped.
pub struct Block {
    data: Vec<u8>,
    restarts_offset: usize,
    restarts_len: usize,
    pool: Option<Arc<BufferPool>>,
}

/// One decoded entry, as ranges into the block's bytes.
struct Entry {
    shared: usize,
    unshared: ByteRange<usize>,
    value: ByteRange<usize>,
    next: usize,
}

impl Block {
    /// Validate the restart trailer of `data`.
    pub fn new(data: Vec<u8>, pool: Option<Arc<BufferPool>>) -> Result<Self> {
        let (restarts_offset, restarts_len) = match Self::parse_trailer(&data) {
            Ok(parsed) => parsed,
            Err(e) => {
                if let Some(pool) = pool {
                    pool.put(data);
                }
                return Err(e);
            }
        };
        Ok(Self {
            data,
            restarts_offset,
            restarts_len,
            pool,
        })
    }

    fn parse_trailer(data: &[u8]) -> Result<(usize, usize)> {
        if data.len() < 4 {
            return Err(LarchError::corrupted("block too small"));
        }
        let restarts_len = (&data[data.len() - 4..]).get_u32_le() as usize;
        let trailer_len = restarts_len
            .checked_add(1)
            .and_then(|n| n.checked_mul(4))
            .filter(|&n| n <= data.len());
        match trailer_len {
            Some(n) if restarts_len > 0 => Ok((data.len() - n, restarts_len)),
            _ => Err(LarchError::corrupted("bad restart count")),
        }
    }

    /// Block with no entries.
    fn empty() -> Self {
        Self {
            data: Vec::new(),
            restarts_offset: 0,
            restarts_len: 0,
            pool: None,
        }
    }

    /// Size of the block's bytes, restart trailer included.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.restarts_offset == 0
    }

    pub fn restarts_len(&self) -> usize {
        self.restarts_len
    }

    fn restart(&self, i: usize) -> usize {
        let at = self.restarts_offset + 4 * i;
        (&self.data[at..at + 4]).get_u32_le() as usize
    }

    /// Number of leading restart points satisfying `pred`, which must hold
    /// for a prefix of the restart array.
    fn partition_restarts(&self, pred: impl Fn(usize) -> bool) -> usize {
        let (mut lo, mut hi) = (0, self.restarts_len);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if pred(mid) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Key stored whole at restart point `i`.
    fn restart_key(&self, i: usize) -> Option<&[u8]> {
        let entry = self.entry(self.restart(i)).ok()??;
        (entry.shared == 0).then(|| &self.data[entry.unshared])
    }

    /// Last restart point whose key is <= `key`, or the first one.
    fn seek_restart(&self, cmp: &dyn Comparer, key: &[u8]) -> usize {
        self.partition_restarts(|i| {
            self.restart_key(i)
                .is_some_and(|k| cmp.compare(k, key) != Ordering::Greater)
        })
        .saturating_sub(1)
    }

    /// Decode the entry at `offset`; `None` past the last entry.
    fn entry(&self, offset: usize) -> Result<Option<Entry>> {
        if offset >= self.restarts_offset {
            return Ok(None);
        }
        let src = &self.data[offset..self.restarts_offset];
        let bad = || LarchError::corrupted(format!("bad entry in block at offset {offset}"));

        let mut pos = 0;
        let mut field = || -> Result<usize> {
            let (v, n) = get_uvarint(&src[pos..]).ok_or_else(bad)?;
            pos += n;
            usize::try_from(v).map_err(|_| bad())
        };
        let shared = field()?;
        let unshared = field()?;
        let value_len = field()?;

        let key_start = offset + pos;
        let value_start = key_start.checked_add(unshared).ok_or_else(bad)?;
        let next = value_start.checked_add(value_len).ok_or_else(bad)?;
        if next > self.restarts_offset {
            return Err(bad());
        }
        Ok(Some(Entry {
            shared,
            unshared: key_start..value_start,
            value: value_start..next,
            next,
        }))
    }
}

impl Drop for Block {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            pool.put(std::mem::take(&mut self.data));
        }
    }
}

impl std::fmt::Debug for Block {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Block")
            .field("len", &self.data.len())
            .field("restarts", &self.restarts_len)
            .finish()
    }
}

// =============================================================================
// Block Iterator
// =============================================================================

/// Bidirectional iterator over a [`Block`], optionally restricted to a key
/// range.
pub struct BlockIter {
    block: Arc<Block>,
    cmp: Arc<dyn Comparer>,
    cursor: Cursor,

    /// Visible entries are those starting in `[offset_start, offset_limit)`.
    offset_start: usize,
    offset_limit: usize,

    key: Vec<u8>,
    value: ByteRange<usize>,
    offset: usize,
    next_offset: usize,
}

impl BlockIter {
    /// Iterate `block`, hiding entries outside `slice`.
    ///
    /// With `incl_limit` the first entry at or past the slice limit stays
    /// visible. Index blocks use this: the block keyed by that entry may
    /// still hold keys below the limit.
    pub fn new(
        block: Arc<Block>,
        cmp: Arc<dyn Comparer>,
        slice: Option<&Range>,
        incl_limit: bool,
    ) -> Self {
        let offset_limit = block.restarts_offset;
        let mut iter = Self {
            block,
            cmp,
            cursor: Cursor::new(),
            offset_start: 0,
            offset_limit,
            key: Vec::new(),
            value: 0..0,
            offset: 0,
            next_offset: 0,
        };
        if let Some(slice) = slice {
            if let Err(e) = iter.restrict(slice, incl_limit) {
                iter.cursor.set_err(e);
            }
        }
        iter
    }

    fn restrict(&mut self, slice: &Range, incl_limit: bool) -> Result<()> {
        let end = self.block.restarts_offset;
        if let Some(start) = &slice.start {
            self.offset_start = match self.scan_to(start)? {
                true => self.offset,
                false => end,
            };
        }
        if let Some(limit) = &slice.limit {
            self.offset_limit = match self.scan_to(limit)? {
                true if incl_limit => self.next_offset,
                true => self.offset,
                false => end,
            };
        }
        self.offset_limit = self.offset_limit.max(self.offset_start);
        self.key.clear();
        Ok(())
    }

    /// Position on the first entry of the whole block with key >= `key`.
    fn scan_to(&mut self, key: &[u8]) -> Result<bool> {
        let r = self.block.seek_restart(self.cmp.as_ref(), key);
        self.reset_to_restart(r);
        while self.step()? {
            if self.cmp.compare(&self.key, key) != Ordering::Less {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Positioned on the first visible entry.
    pub(crate) fn is_first(&self) -> bool {
        self.valid() && self.offset == self.offset_start
    }

    /// Positioned on the last visible entry.
    pub(crate) fn is_last(&self) -> bool {
        self.valid() && self.next_offset >= self.offset_limit
    }

    fn reset_to_restart(&mut self, r: usize) {
        self.key.clear();
        self.next_offset = self.block.restart(r);
    }

    /// Decode the entry at `next_offset`. False past the last entry.
    fn step(&mut self) -> Result<bool> {
        let entry = match self.block.entry(self.next_offset)? {
            Some(entry) => entry,
            None => return Ok(false),
        };
        if entry.shared > self.key.len() {
            return Err(LarchError::corrupted(format!(
                "bad entry in block at offset {}: shared prefix too long",
                self.next_offset
            )));
        }
        self.key.truncate(entry.shared);
        self.key.extend_from_slice(&self.block.data[entry.unshared]);
        self.value = entry.value;
        self.offset = self.next_offset;
        self.next_offset = entry.next;
        Ok(true)
    }

    fn fail(&mut self, err: LarchError) -> bool {
        self.cursor.set_err(err);
        false
    }

    fn exhaust(&mut self, dir: Dir) -> bool {
        self.cursor.set_dir(dir);
        false
    }

    /// Settle after a forward step onto the entry at `offset`.
    fn settle_forward(&mut self, stepped: Result<bool>) -> bool {
        match stepped {
            Err(e) => self.fail(e),
            Ok(false) => self.exhaust(Dir::End),
            Ok(true) if self.offset >= self.offset_limit => self.exhaust(Dir::End),
            Ok(true) => {
                self.cursor.set_dir(Dir::Forward);
                true
            }
        }
    }

    fn first_visible(&mut self) -> bool {
        let start = self.offset_start;
        let r = self
            .block
            .partition_restarts(|i| self.block.restart(i) <= start)
            .saturating_sub(1);
        self.reset_to_restart(r);
        loop {
            match self.step() {
                Ok(true) if self.offset < start => continue,
                stepped => return self.settle_forward(stepped),
            }
        }
    }

    /// Position on the last visible entry starting before `target`.
    fn last_before(&mut self, target: usize) -> bool {
        if target <= self.offset_start {
            return self.exhaust(Dir::Start);
        }
        let r = self
            .block
            .partition_restarts(|i| self.block.restart(i) < target)
            .saturating_sub(1);
        self.reset_to_restart(r);
        loop {
            match self.step() {
                Err(e) => return self.fail(e),
                Ok(false) => return self.exhaust(Dir::Start),
                Ok(true) if self.next_offset < target => continue,
                Ok(true) => break,
            }
        }
        if self.offset < self.offset_start {
            return self.exhaust(Dir::Start);
        }
        self.cursor.set_dir(Dir::Backward);
        true
    }
}

impl IteratorSeeker for BlockIter {
    fn valid(&self) -> bool {
        self.cursor.is_positioned()
    }

    fn first(&mut self) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        self.first_visible()
    }

    fn last(&mut self) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        self.last_before(self.offset_limit)
    }

    fn seek(&mut self, key: &[u8]) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        let r = self.block.seek_restart(self.cmp.as_ref(), key);
        self.reset_to_restart(r);
        loop {
            match self.step() {
                Ok(true) if self.offset < self.offset_start => continue,
                Ok(true)
                    if self.offset < self.offset_limit
                        && self.cmp.compare(&self.key, key) == Ordering::Less =>
                {
                    continue
                }
                stepped => return self.settle_forward(stepped),
            }
        }
    }

    fn next(&mut self) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        match self.cursor.dir() {
            Dir::Start => self.first_visible(),
            Dir::End => false,
            _ => {
                let stepped = self.step();
                self.settle_forward(stepped)
            }
        }
    }

    fn prev(&mut self) -> bool {
        if !self.cursor.begin_move() {
            return false;
        }
        match self.cursor.dir() {
            Dir::End => self.last_before(self.offset_limit),
            Dir::Start => false,
            _ => self.last_before(self.offset),
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
        self.block = Arc::new(Block::empty());
        self.key = Vec::new();
        self.cursor.release();
    }

    fn set_releaser(&mut self, releaser: Box<dyn Releaser>) {
        self.cursor.set_releaser(releaser);
    }
}

impl StorageIterator for BlockIter {
    fn key(&self) -> &[u8] {
        if self.valid() {
            &self.key
        } else {
            &[]
        }
    }

    fn value(&self) -> &[u8] {
        if self.valid() {
            &self.block.data[self.value.clone()]
        } else {
            &[]
        }
    }
}
