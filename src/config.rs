//! Configuration for larchkv
//!
//! Centralized table options with sensible defaults.

use std::fmt;
use std::sync::Arc;

use crate::comparer::{BytewiseComparer, Comparer};
use crate::error::{LarchError, Result};
use crate::filter::{Filter, InternalFilter};
use crate::key::InternalComparer;
use crate::util::BufferPool;

/// Default target size of an uncompressed data block.
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;

/// Default number of entries between restart points.
pub const DEFAULT_BLOCK_RESTART_INTERVAL: usize = 16;

/// Options shared by table writers and readers
#[derive(Clone)]
pub struct Options {
    // -------------------------------------------------------------------------
    // Ordering
    // -------------------------------------------------------------------------
    /// Ordering of the keys stored in tables. Tables holding internal keys
    /// use an [`InternalComparer`]; see [`Options::with_internal_keys`].
    pub comparer: Arc<dyn Comparer>,

    // -------------------------------------------------------------------------
    // Table Layout
    // -------------------------------------------------------------------------
    /// Filter policy; `None` writes tables without a filter block.
    pub filter: Option<Arc<dyn Filter>>,

    /// Target size of an uncompressed data block (in bytes)
    pub block_size: usize,

    /// Number of entries between restart points
    pub block_restart_interval: usize,

    /// Compression applied to each block
    pub compression: Compression,

    // -------------------------------------------------------------------------
    // Read Path
    // -------------------------------------------------------------------------
    /// Verify block checksums on every read
    pub verify_checksums: bool,

    /// Halt table iteration on a corrupted data block instead of skipping it
    pub strict_reader: bool,
}

/// Block compression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    /// Store blocks as-is
    None,

    /// Snappy, kept only when it saves at least 1/8 of the block
    Snappy,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            comparer: Arc::new(BytewiseComparer),
            filter: None,
            block_size: DEFAULT_BLOCK_SIZE,
            block_restart_interval: DEFAULT_BLOCK_RESTART_INTERVAL,
            compression: Compression::Snappy,
            verify_checksums: true,
            strict_reader: true,
        }
    }
}

impl Options {
    /// Create a new options builder
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Adapt these options for tables keyed by internal keys: the comparer
    /// is wrapped in an [`InternalComparer`] and the filter in an
    /// [`InternalFilter`].
    pub fn with_internal_keys(mut self) -> Self {
        self.comparer = Arc::new(InternalComparer::new(self.comparer));
        self.filter = self
            .filter
            .map(|f| Arc::new(InternalFilter::new(f)) as Arc<dyn Filter>);
        self
    }

    /// Buffer pool sized for this configuration's blocks.
    pub fn new_buffer_pool(&self) -> Arc<BufferPool> {
        Arc::new(BufferPool::new(self.block_size))
    }

    /// Check option values
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(LarchError::Config("block_size must be positive".into()));
        }
        if self.block_restart_interval == 0 {
            return Err(LarchError::Config(
                "block_restart_interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("comparer", &self.comparer.name())
            .field("filter", &self.filter.as_ref().map(|f| f.name().to_owned()))
            .field("block_size", &self.block_size)
            .field("block_restart_interval", &self.block_restart_interval)
            .field("compression", &self.compression)
            .field("verify_checksums", &self.verify_checksums)
            .field("strict_reader", &self.strict_reader)
            .finish()
    }
}

/// Builder for Options
#[derive(Default)]
pub struct OptionsBuilder {
    options: Options,
}

impl OptionsBuilder {
    /// Set the key comparer
    pub fn comparer(mut self, comparer: Arc<dyn Comparer>) -> Self {
        self.options.comparer = comparer;
        self
    }

    /// Set the filter policy
    pub fn filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.options.filter = Some(filter);
        self
    }

    /// Set the data block size (in bytes)
    pub fn block_size(mut self, size: usize) -> Self {
        self.options.block_size = size;
        self
    }

    /// Set the restart interval
    pub fn block_restart_interval(mut self, interval: usize) -> Self {
        self.options.block_restart_interval = interval;
        self
    }

    /// Set the block compression
    pub fn compression(mut self, compression: Compression) -> Self {
        self.options.compression = compression;
        self
    }

    /// Enable or disable checksum verification on reads
    pub fn verify_checksums(mut self, verify: bool) -> Self {
        self.options.verify_checksums = verify;
        self
    }

    /// Enable or disable strict table iteration
    pub fn strict_reader(mut self, strict: bool) -> Self {
        self.options.strict_reader = strict;
        self
    }

    pub fn build(self) -> Options {
        self.options
    }
}
