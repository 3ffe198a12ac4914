//! Table Reader
//!
//! Opens a table, validates its footer and serves point lookups and
//! iterators. The index and filter blocks are read on first use and then
//! kept; data blocks are read per lookup, through the buffer pool when one is
//! configured.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::Arc;

use bytes::Buf;
use parking_lot::Mutex;

use crate::comparer::{BasicComparer, BytewiseComparer, Comparer};
use crate::config::Options;
use crate::error::{LarchError, Result};
use crate::filter::Filter;
use crate::iterator::{
    BoxedIterator, EmptyIterator, IndexedIterator, IterState, IteratorIndexer, IteratorSeeker,
    StorageIterator,
};
use crate::storage::{FileDesc, StorageReader};
use crate::util::{masked_crc32c, BufferPool, Range, Releaser};

use super::block::{Block, BlockIter};
use super::{
    BlockHandle, BLOCK_TRAILER_LEN, FILTER_KEY_PREFIX, FOOTER_LEN, MAGIC, NO_COMPRESSION,
    SNAPPY_COMPRESSION,
};

// =============================================================================
// Block Source
// =============================================================================

/// Everything needed to read and decode blocks of one file. Cloned into the
/// iterators a reader hands out.
#[derive(Clone)]
struct BlockSource {
    file: Arc<dyn StorageReader>,
    size: u64,
    fd: FileDesc,
    pool: Option<Arc<BufferPool>>,
    cmp: Arc<dyn Comparer>,
    verify_checksums: bool,
}

impl BlockSource {
    fn alloc(&self, n: usize) -> Vec<u8> {
        match &self.pool {
            Some(pool) => pool.get(n),
            None => vec![0; n],
        }
    }

    fn recycle(&self, buf: Vec<u8>) {
        if let Some(pool) = &self.pool {
            pool.put(buf);
        }
    }

    /// Read a block's payload, checking its trailer and decompressing.
    fn read_block(&self, handle: BlockHandle, verify: bool) -> Result<Vec<u8>> {
        let end = handle
            .offset
            .checked_add(handle.length)
            .and_then(|n| n.checked_add(BLOCK_TRAILER_LEN as u64))
            .filter(|&end| end <= self.size);
        if end.is_none() {
            return Err(LarchError::corrupted_in(
                self.fd,
                format!(
                    "block handle out of range: offset={} length={} file size={}",
                    handle.offset, handle.length, self.size
                ),
            ));
        }

        let n = handle.length as usize;
        let mut buf = self.alloc(n + BLOCK_TRAILER_LEN);
        if let Err(e) = self.file.read_at(&mut buf, handle.offset) {
            self.recycle(buf);
            return Err(e);
        }

        if verify {
            let stored = (&buf[n + 1..]).get_u32_le();
            let computed = masked_crc32c(&[&buf[..n + 1]]);
            if stored != computed {
                self.recycle(buf);
                return Err(LarchError::corrupted_in(
                    self.fd,
                    format!(
                        "checksum mismatch in block at offset {} (length {}): want={:#010x} got={:#010x}",
                        handle.offset, handle.length, stored, computed
                    ),
                ));
            }
        }

        match buf[n] {
            NO_COMPRESSION => {
                buf.truncate(n);
                Ok(buf)
            }
            SNAPPY_COMPRESSION => {
                let decoded = self.decompress(&buf[..n], handle);
                self.recycle(buf);
                decoded
            }
            tag => {
                self.recycle(buf);
                Err(LarchError::corrupted_in(
                    self.fd,
                    format!("bad block type {} at offset {}", tag, handle.offset),
                ))
            }
        }
    }

    fn decompress(&self, src: &[u8], handle: BlockHandle) -> Result<Vec<u8>> {
        let corrupt = |e: snap::Error| {
            LarchError::corrupted_in(
                self.fd,
                format!("bad snappy block at offset {}: {}", handle.offset, e),
            )
        };
        let len = snap::raw::decompress_len(src).map_err(corrupt)?;
        let mut out = self.alloc(len);
        match snap::raw::Decoder::new().decompress(src, &mut out) {
            Ok(n) => {
                out.truncate(n);
                Ok(out)
            }
            Err(e) => {
                self.recycle(out);
                Err(corrupt(e))
            }
        }
    }

    fn read_data_block(&self, handle: BlockHandle) -> Result<Arc<Block>> {
        let data = self.read_block(handle, self.verify_checksums)?;
        let block = Block::new(data, self.pool.clone()).map_err(|e| e.with_fd(self.fd))?;
        Ok(Arc::new(block))
    }

    fn data_iter(&self, handle: BlockHandle, slice: Option<&Range>) -> Result<BlockIter> {
        let block = self.read_data_block(handle)?;
        Ok(BlockIter::new(block, self.cmp.clone(), slice, false))
    }

    fn decode_handle(&self, src: &[u8]) -> Result<BlockHandle> {
        BlockHandle::decode(src)
            .map(|(handle, _)| handle)
            .map_err(|e| e.with_fd(self.fd))
    }
}

// =============================================================================
// Table Reader
// =============================================================================

/// Reader for one table file. Safe to share between threads.
pub struct TableReader {
    source: BlockSource,
    filter: Option<Arc<dyn Filter>>,
    strict: bool,

    index_handle: BlockHandle,
    filter_handle: Option<BlockHandle>,
    /// Offset where the data blocks end.
    data_end: u64,

    index_block: Mutex<Option<Arc<Block>>>,
    filter_block: Mutex<Option<Arc<Vec<u8>>>>,
    released: AtomicBool,
}

impl TableReader {
    /// Open the table in `file` of `size` bytes.
    ///
    /// Fails with a `Config` error for invalid options, and with a corruption
    /// error naming `fd` if the footer is missing or malformed.
    pub fn open(
        file: Arc<dyn StorageReader>,
        size: u64,
        fd: FileDesc,
        pool: Option<Arc<BufferPool>>,
        options: &Options,
    ) -> Result<Self> {
        options.validate()?;
        if size < FOOTER_LEN as u64 {
            return Err(LarchError::corrupted_in(
                fd,
                "file is too short to be an sstable",
            ));
        }
        let mut footer = [0u8; FOOTER_LEN];
        file.read_at(&mut footer, size - FOOTER_LEN as u64)?;
        if &footer[FOOTER_LEN - MAGIC.len()..] != MAGIC {
            return Err(LarchError::corrupted_in(fd, "bad magic number"));
        }

        let source = BlockSource {
            file,
            size,
            fd,
            pool,
            cmp: options.comparer.clone(),
            verify_checksums: options.verify_checksums,
        };
        let (metaindex_handle, n) = BlockHandle::decode(&footer).map_err(|e| e.with_fd(fd))?;
        let index_handle = source.decode_handle(&footer[n..])?;

        let mut reader = Self {
            source,
            filter: options.filter.clone(),
            strict: options.strict_reader,
            index_handle,
            filter_handle: None,
            data_end: metaindex_handle.offset,
            index_block: Mutex::new(None),
            filter_block: Mutex::new(None),
            released: AtomicBool::new(false),
        };
        reader.locate_filter(metaindex_handle)?;

        tracing::debug!(
            file = %fd,
            size,
            filter = reader.filter_handle.is_some(),
            "opened table"
        );
        Ok(reader)
    }

    /// Find the configured filter's block through the metaindex.
    fn locate_filter(&mut self, metaindex_handle: BlockHandle) -> Result<()> {
        let filter = match &self.filter {
            Some(filter) => filter.clone(),
            None => return Ok(()),
        };
        let data = self.source.read_block(metaindex_handle, true)?;
        let block = Block::new(data, self.source.pool.clone())
            .map_err(|e| e.with_fd(self.source.fd))?;
        let mut meta = BlockIter::new(Arc::new(block), Arc::new(BytewiseComparer), None, false);

        let key = format!("{}{}", FILTER_KEY_PREFIX, filter.name());
        if meta.seek(key.as_bytes()) && meta.key() == key.as_bytes() {
            let handle = self.source.decode_handle(meta.value())?;
            self.data_end = handle.offset;
            self.filter_handle = Some(handle);
        } else if let Some(err) = meta.error() {
            return Err(err.clone().with_fd(self.source.fd));
        }
        Ok(())
    }

    fn check_released(&self) -> Result<()> {
        if self.released.load(AtomicOrdering::Acquire) {
            return Err(LarchError::Released("table reader"));
        }
        Ok(())
    }

    fn index_block(&self) -> Result<Arc<Block>> {
        let mut cached = self.index_block.lock();
        if let Some(block) = cached.as_ref() {
            return Ok(block.clone());
        }
        let data = self.source.read_block(self.index_handle, true)?;
        let block = Block::new(data, self.source.pool.clone())
            .map_err(|e| e.with_fd(self.source.fd))?;
        let block = Arc::new(block);
        *cached = Some(block.clone());
        Ok(block)
    }

    /// Filter bytes, if this table has a usable filter. Read failures only
    /// disable filtering.
    fn filter_block(&self) -> Option<Arc<Vec<u8>>> {
        let handle = self.filter_handle?;
        let mut cached = self.filter_block.lock();
        if let Some(data) = cached.as_ref() {
            return Some(data.clone());
        }
        match self.source.read_block(handle, true) {
            Ok(data) => {
                let data = Arc::new(data);
                *cached = Some(data.clone());
                Some(data)
            }
            Err(e) => {
                tracing::warn!(
                    file = %self.source.fd,
                    error = %e,
                    "ignoring unreadable filter block"
                );
                None
            }
        }
    }

    fn index_iter(&self, slice: Option<&Range>, incl_limit: bool) -> Result<BlockIter> {
        let index = self.index_block()?;
        Ok(BlockIter::new(index, self.source.cmp.clone(), slice, incl_limit))
    }

    /// First entry with key >= `key`, as owned `(key, value)`.
    ///
    /// With `filtered` set a definite filter miss returns `NotFound` without
    /// reading the data block.
    pub fn find(&self, key: &[u8], filtered: bool) -> Result<(Vec<u8>, Vec<u8>)> {
        self.check_released()?;
        let mut index = self.index_iter(None, false)?;
        if !index.seek(key) {
            return Err(index.error().cloned().unwrap_or(LarchError::NotFound));
        }

        let handle = self.source.decode_handle(index.value())?;
        if filtered {
            if let (Some(filter), Some(data)) = (&self.filter, self.filter_block()) {
                if !filter.contains(&data, key) {
                    return Err(LarchError::NotFound);
                }
            }
        }

        let mut data = self.source.data_iter(handle, None)?;
        if !data.seek(key) {
            if let Some(err) = data.error() {
                return Err(err.clone());
            }
            // Past this block's last key: the answer opens the next block.
            if !index.next() {
                return Err(index.error().cloned().unwrap_or(LarchError::NotFound));
            }
            let handle = self.source.decode_handle(index.value())?;
            data = self.source.data_iter(handle, None)?;
            if !data.next() {
                return Err(data.error().cloned().unwrap_or(LarchError::NotFound));
            }
        }
        Ok((data.key().to_vec(), data.value().to_vec()))
    }

    /// Key of the first entry with key >= `key`.
    pub fn find_key(&self, key: &[u8], filtered: bool) -> Result<Vec<u8>> {
        self.find(key, filtered).map(|(k, _)| k)
    }

    /// Value stored under exactly `key`.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let (found, value) = self.find(key, true)?;
        if self.source.cmp.compare(&found, key) != Ordering::Equal {
            return Err(LarchError::NotFound);
        }
        Ok(value)
    }

    /// Iterator over the entries within `slice` (the whole table if `None`).
    ///
    /// Failures to open the iterator are reported through its `error()`.
    pub fn iter(&self, slice: Option<&Range>) -> BoxedIterator {
        if let Err(e) = self.check_released() {
            return Box::new(EmptyIterator::with_error(e));
        }
        let index = match self.index_iter(slice, true) {
            Ok(index) => index,
            Err(e) => return Box::new(EmptyIterator::with_error(e)),
        };
        let indexer = TableIndexer {
            index,
            source: self.source.clone(),
            slice: slice.cloned(),
        };
        Box::new(IndexedIterator::new(Box::new(indexer), self.strict))
    }

    /// Approximate file offset of `key`: the offset of the data block that
    /// would hold it, or the end of the data blocks.
    pub fn offset_of(&self, key: &[u8]) -> Result<u64> {
        self.check_released()?;
        let mut index = self.index_iter(None, false)?;
        if index.seek(key) {
            return Ok(self.source.decode_handle(index.value())?.offset);
        }
        match index.error() {
            Some(err) => Err(err.clone()),
            None => Ok(self.data_end),
        }
    }

    pub fn fd(&self) -> FileDesc {
        self.source.fd
    }

    /// Make later operations fail. Iterators already handed out keep working.
    pub fn release(&self) {
        if !self.released.swap(true, AtomicOrdering::AcqRel) {
            *self.index_block.lock() = None;
            *self.filter_block.lock() = None;
            tracing::debug!(file = %self.source.fd, "released table");
        }
    }
}

impl std::fmt::Debug for TableReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableReader")
            .field("fd", &self.source.fd)
            .field("size", &self.source.size)
            .field("data_end", &self.data_end)
            .field("filter", &self.filter_handle.is_some())
            .finish()
    }
}

// =============================================================================
// Table Indexer
// =============================================================================

/// Index block iterator yielding data block iterators.
struct TableIndexer {
    index: BlockIter,
    source: BlockSource,
    slice: Option<Range>,
}

impl IteratorSeeker for TableIndexer {
    fn valid(&self) -> bool {
        self.index.valid()
    }

    fn first(&mut self) -> bool {
        self.index.first()
    }

    fn last(&mut self) -> bool {
        self.index.last()
    }

    fn seek(&mut self, key: &[u8]) -> bool {
        self.index.seek(key)
    }

    fn next(&mut self) -> bool {
        self.index.next()
    }

    fn prev(&mut self) -> bool {
        self.index.prev()
    }

    fn error(&self) -> Option<&LarchError> {
        self.index.error()
    }

    fn state(&self) -> IterState {
        self.index.state()
    }

    fn release(&mut self) {
        self.index.release()
    }

    fn set_releaser(&mut self, releaser: Box<dyn Releaser>) {
        self.index.set_releaser(releaser)
    }
}

impl IteratorIndexer for TableIndexer {
    fn get(&mut self) -> BoxedIterator {
        let handle = match self.source.decode_handle(self.index.value()) {
            Ok(handle) => handle,
            Err(e) => return Box::new(EmptyIterator::with_error(e)),
        };
        // Only the edge blocks can hold keys outside the slice.
        let slice = self
            .slice
            .as_ref()
            .filter(|_| self.index.is_first() || self.index.is_last());
        match self.source.data_iter(handle, slice) {
            Ok(iter) => Box::new(iter),
            Err(e) => Box::new(EmptyIterator::with_error(e)),
        }
    }
}
