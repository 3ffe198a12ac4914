//! Table Module
//!
//! Sorted table: immutable on-disk sorted key-value storage.
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Data Block 0 .. Data Block N-1                          │
//! ├─────────────────────────────────────────────────────────┤
//! │ Filter Block (optional)                                 │
//! ├─────────────────────────────────────────────────────────┤
//! │ Metaindex Block   "filter.<name>" → filter handle       │
//! ├─────────────────────────────────────────────────────────┤
//! │ Index Block       separator key → data block handle     │
//! ├─────────────────────────────────────────────────────────┤
//! │ Footer (48 bytes)                                       │
//! │   metaindex handle | index handle | zero padding (→40)  │
//! │   Magic: 57 fb 80 8b 24 75 47 db (8)                    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Every block is followed by a 5-byte trailer:
//! ```text
//! ┌────────────────┬──────────────────────────────────────────┐
//! │ compression(1) │ LE u32 masked CRC32C(payload ‖ tag)      │
//! └────────────────┴──────────────────────────────────────────┘
//! ```
//! A block handle is `varint(offset) varint(length)`; length excludes the
//! trailer.

mod block;
mod reader;
mod writer;

use crate::error::{LarchError, Result};
use crate::util::coding::{get_uvarint, put_uvarint};

pub use block::{Block, BlockIter, BlockWriter};
pub use reader::TableReader;
pub use writer::TableWriter;

// =============================================================================
// Shared Constants (used by writer, reader, block)
// =============================================================================

/// Magic bytes closing every table file.
pub(crate) const MAGIC: &[u8; 8] = b"\x57\xfb\x80\x8b\x24\x75\x47\xdb";

/// Footer size: two max-length handles (40) + magic (8) = 48 bytes
pub(crate) const FOOTER_LEN: usize = 48;

/// Block trailer size: compression tag (1) + masked CRC (4) = 5 bytes
pub(crate) const BLOCK_TRAILER_LEN: usize = 5;

/// Upper bound of an encoded block handle.
pub(crate) const MAX_HANDLE_LEN: usize = 20;

pub(crate) const NO_COMPRESSION: u8 = 0;
pub(crate) const SNAPPY_COMPRESSION: u8 = 1;

/// Metaindex key prefix of a filter block.
pub(crate) const FILTER_KEY_PREFIX: &str = "filter.";

// =============================================================================
// Block Handle
// =============================================================================

/// Location of a block within a table file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockHandle {
    pub offset: u64,
    /// Payload length, trailer excluded.
    pub length: u64,
}

impl BlockHandle {
    pub fn new(offset: u64, length: u64) -> Self {
        Self { offset, length }
    }

    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        put_uvarint(dst, self.offset);
        put_uvarint(dst, self.length);
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut dst = Vec::with_capacity(MAX_HANDLE_LEN);
        self.encode_to(&mut dst);
        dst
    }

    /// Decode a handle from the front of `src`, returning it with the number
    /// of bytes consumed.
    pub fn decode(src: &[u8]) -> Result<(Self, usize)> {
        let (offset, n) = get_uvarint(src)
            .ok_or_else(|| LarchError::corrupted("bad block handle"))?;
        let (length, m) = get_uvarint(&src[n..])
            .ok_or_else(|| LarchError::corrupted("bad block handle"))?;
        Ok((Self { offset, length }, n + m))
    }
}

// =============================================================================
// Table Metrics
// =============================================================================

/// Summary of a finished table, returned by [`TableWriter::close`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Number of entries written
    pub entries: u64,
    /// Number of data blocks written
    pub data_blocks: u64,
    /// Size of the finished file in bytes
    pub file_size: u64,
}
