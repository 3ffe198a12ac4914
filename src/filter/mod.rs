//! Filter Module
//!
//! Filters are small per-table summaries consulted before reading a data
//! block: a negative answer means the key is definitely absent.

mod bloom;
mod internal;

pub use bloom::BloomFilter;
pub use internal::InternalFilter;

/// A filter policy: builds filters and probes them.
pub trait Filter: Send + Sync {
    /// Name stored in the table's metaindex; a reader only uses a filter
    /// block whose name matches its configured filter.
    fn name(&self) -> &str;

    /// Whether `filter` may contain `key`. False positives are allowed,
    /// false negatives are not.
    fn contains(&self, filter: &[u8], key: &[u8]) -> bool;

    fn new_generator(&self) -> Box<dyn FilterGenerator>;
}

/// Accumulates keys and emits one filter over all of them.
pub trait FilterGenerator: Send {
    fn add(&mut self, key: &[u8]);

    /// Append the filter for every key added so far to `dst` and reset the
    /// generator.
    fn generate(&mut self, dst: &mut Vec<u8>);
}
