//! Table Writer
//!
//! Streams sorted entries into a new table.
//!
//! Data blocks are cut once they reach the configured block size. The index
//! entry for a finished block is only written when the next key arrives, so
//! it can be keyed by a short separator between the two blocks instead of
//! the block's full last key.

use std::cmp::Ordering;
use std::io::{self, Write};
use std::sync::Arc;

use crate::comparer::{BasicComparer, Comparer};
use crate::config::{Compression, Options};
use crate::error::{LarchError, Result};
use crate::filter::{Filter, FilterGenerator};
use crate::util::masked_crc32c;

use super::block::BlockWriter;
use super::{
    BlockHandle, TableStats, BLOCK_TRAILER_LEN, FILTER_KEY_PREFIX, FOOTER_LEN, MAGIC,
    NO_COMPRESSION, SNAPPY_COMPRESSION,
};

/// Writes physical blocks and tracks the file offset.
struct BlockSink<W: Write> {
    writer: W,
    offset: u64,
    compressed: Vec<u8>,
    encoder: snap::raw::Encoder,
}

impl<W: Write> BlockSink<W> {
    fn write_block(&mut self, raw: &[u8], compression: Compression) -> Result<BlockHandle> {
        let (payload, tag) = match compression {
            Compression::Snappy => {
                self.compressed
                    .resize(snap::raw::max_compress_len(raw.len()), 0);
                let n = self
                    .encoder
                    .compress(raw, &mut self.compressed)
                    .map_err(io::Error::from)?;
                // Keep the compressed form only if it saves at least 1/8.
                if n < raw.len() - raw.len() / 8 {
                    (&self.compressed[..n], SNAPPY_COMPRESSION)
                } else {
                    (raw, NO_COMPRESSION)
                }
            }
            Compression::None => (raw, NO_COMPRESSION),
        };

        let mut trailer = [0u8; BLOCK_TRAILER_LEN];
        trailer[0] = tag;
        let crc = masked_crc32c(&[payload, &[tag]]);
        trailer[1..].copy_from_slice(&crc.to_le_bytes());

        self.writer.write_all(payload)?;
        self.writer.write_all(&trailer)?;

        let handle = BlockHandle::new(self.offset, payload.len() as u64);
        self.offset += (payload.len() + BLOCK_TRAILER_LEN) as u64;
        Ok(handle)
    }
}

/// Builder for a new table from sorted entries
pub struct TableWriter<W: Write> {
    sink: BlockSink<W>,
    cmp: Arc<dyn Comparer>,
    filter: Option<Arc<dyn Filter>>,
    block_size: usize,
    compression: Compression,

    data_block: BlockWriter,
    index_block: BlockWriter,
    filter_gen: Option<Box<dyn FilterGenerator>>,

    /// Handle of the last finished data block, awaiting its index entry.
    pending: Option<BlockHandle>,
    last_key: Vec<u8>,

    entries: u64,
    data_blocks: u64,
    err: Option<LarchError>,
    closed: bool,
}

impl<W: Write> TableWriter<W> {
    /// Create a table writer; keys are ordered by `options.comparer`.
    ///
    /// Invalid options are reported by the first `append` or `close`.
    pub fn new(writer: W, options: &Options) -> Self {
        Self {
            sink: BlockSink {
                writer,
                offset: 0,
                compressed: Vec::new(),
                encoder: snap::raw::Encoder::new(),
            },
            cmp: options.comparer.clone(),
            filter: options.filter.clone(),
            block_size: options.block_size,
            compression: options.compression,
            data_block: BlockWriter::new(options.block_restart_interval),
            // Index entries are looked up by binary search only.
            index_block: BlockWriter::new(1),
            filter_gen: options.filter.as_ref().map(|f| f.new_generator()),
            pending: None,
            last_key: Vec::new(),
            entries: 0,
            data_blocks: 0,
            err: options.validate().err(),
            closed: false,
        }
    }

    /// Append an entry. Keys must be strictly increasing.
    pub fn append(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.check_usable()?;
        if self.entries > 0 && self.cmp.compare(&self.last_key, key) != Ordering::Less {
            return Err(LarchError::InvalidArgument(format!(
                "keys are not in increasing order: {:?}, {:?}",
                String::from_utf8_lossy(&self.last_key),
                String::from_utf8_lossy(key)
            )));
        }

        self.flush_pending_index(Some(key));
        self.data_block.append(key, value);
        if let Some(gen) = self.filter_gen.as_mut() {
            gen.add(key);
        }
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.entries += 1;

        if self.data_block.bytes_len() >= self.block_size {
            let res = self.finish_data_block();
            self.record(res)?;
        }
        Ok(())
    }

    /// Write the remaining blocks and the footer. The writer is unusable
    /// afterwards.
    pub fn close(&mut self) -> Result<TableStats> {
        self.check_usable()?;
        let res = self.write_tail();
        self.record(res)?;
        self.closed = true;

        let stats = TableStats {
            entries: self.entries,
            data_blocks: self.data_blocks,
            file_size: self.sink.offset,
        };
        tracing::debug!(
            entries = stats.entries,
            data_blocks = stats.data_blocks,
            file_size = stats.file_size,
            "table written"
        );
        Ok(stats)
    }

    /// Entries appended so far.
    pub fn entries_len(&self) -> u64 {
        self.entries
    }

    /// Bytes written so far, the unfinished block excluded.
    pub fn bytes_len(&self) -> u64 {
        self.sink.offset
    }

    /// Data blocks written so far.
    pub fn block_count(&self) -> u64 {
        self.data_blocks
    }

    pub fn get_ref(&self) -> &W {
        &self.sink.writer
    }

    /// Recover the underlying writer.
    pub fn into_inner(self) -> W {
        self.sink.writer
    }

    fn check_usable(&self) -> Result<()> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        if self.closed {
            return Err(LarchError::Released("table writer"));
        }
        Ok(())
    }

    /// Make a write failure sticky.
    fn record<T>(&mut self, res: Result<T>) -> Result<T> {
        if let Err(err) = &res {
            self.err = Some(err.clone());
        }
        res
    }

    fn finish_data_block(&mut self) -> Result<()> {
        let raw = self.data_block.finish();
        let handle = self.sink.write_block(raw, self.compression)?;
        self.data_block.reset();
        self.pending = Some(handle);
        self.data_blocks += 1;
        Ok(())
    }

    /// Add the index entry of the last finished block. `next_key` is the
    /// first key of the following block, `None` at the end of the table.
    fn flush_pending_index(&mut self, next_key: Option<&[u8]>) {
        let handle = match self.pending.take() {
            Some(handle) => handle,
            None => return,
        };
        let shortened = match next_key {
            Some(next) => self.cmp.separator(&self.last_key, next),
            None => self.cmp.successor(&self.last_key),
        };
        let index_key = shortened.as_deref().unwrap_or(&self.last_key);
        self.index_block.append(index_key, &handle.encode());
    }

    fn write_tail(&mut self) -> Result<()> {
        // A table always has at least one data block, possibly empty.
        if !self.data_block.is_empty() || self.entries == 0 {
            self.finish_data_block()?;
        }
        self.flush_pending_index(None);

        let filter_handle = match (self.filter.as_ref(), self.filter_gen.as_mut()) {
            (Some(filter), Some(gen)) => {
                let mut filter_data = Vec::new();
                gen.generate(&mut filter_data);
                let handle = self.sink.write_block(&filter_data, Compression::None)?;
                Some((format!("{}{}", FILTER_KEY_PREFIX, filter.name()), handle))
            }
            _ => None,
        };

        let mut meta_block = BlockWriter::new(1);
        if let Some((key, handle)) = &filter_handle {
            meta_block.append(key.as_bytes(), &handle.encode());
        }
        let metaindex = self.sink.write_block(meta_block.finish(), self.compression)?;
        let index = self
            .sink
            .write_block(self.index_block.finish(), self.compression)?;

        let mut footer = Vec::with_capacity(FOOTER_LEN);
        metaindex.encode_to(&mut footer);
        index.encode_to(&mut footer);
        footer.resize(FOOTER_LEN - MAGIC.len(), 0);
        footer.extend_from_slice(MAGIC);
        self.sink.writer.write_all(&footer)?;
        self.sink.writer.flush()?;
        self.sink.offset += FOOTER_LEN as u64;
        Ok(())
    }
}
