//! Utility Module
//!
//! Small building blocks shared by every other module:
//! - [`Releaser`] / [`BasicReleaser`]: the explicit resource lifecycle contract
//! - [`BufferPool`]: size-classed reusable byte buffers
//! - [`Range`]: key range restriction for iterators
//! - checksum, hash and varint helpers

mod buffer_pool;
pub(crate) mod coding;
pub(crate) mod crc;
pub(crate) mod hash;

pub use buffer_pool::{BufferPool, PoolStats};
pub use crc::{masked_crc32c, unmask_crc};
pub use hash::hash;

// =============================================================================
// Resource Lifecycle
// =============================================================================

/// A resource that must be explicitly released.
///
/// `release` is idempotent: calling it again after the first time does
/// nothing.
pub trait Releaser: Send {
    fn release(&mut self);
}

/// Closures are the most common releaser: "run this when you are done".
impl<F: FnMut() + Send> Releaser for F {
    fn release(&mut self) {
        self()
    }
}

/// Release-once state plus an optional attached releaser.
///
/// Embedded by iterators and readers. Dropping a `BasicReleaser` that was
/// never released runs the attached releaser.
#[derive(Default)]
pub struct BasicReleaser {
    releaser: Option<Box<dyn Releaser>>,
    released: bool,
}

impl BasicReleaser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn released(&self) -> bool {
        self.released
    }

    pub fn release(&mut self) {
        if self.released {
            return;
        }
        if let Some(mut releaser) = self.releaser.take() {
            releaser.release();
        }
        self.released = true;
    }

    /// Attach `releaser`, to be run on release.
    ///
    /// # Panics
    /// Panics if a releaser is already attached or this is already released.
    /// Both are ownership bugs in the caller.
    pub fn set_releaser(&mut self, releaser: Box<dyn Releaser>) {
        if self.released {
            panic!("larchkv: set_releaser on a released resource");
        }
        if self.releaser.is_some() {
            panic!("larchkv: resource already has a releaser");
        }
        self.releaser = Some(releaser);
    }
}

impl Drop for BasicReleaser {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for BasicReleaser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicReleaser")
            .field("has_releaser", &self.releaser.is_some())
            .field("released", &self.released)
            .finish()
    }
}

// =============================================================================
// Key Ranges
// =============================================================================

/// Key range `[start, limit)`. A missing bound is unbounded on that side.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Range {
    pub start: Option<Vec<u8>>,
    pub limit: Option<Vec<u8>>,
}

impl Range {
    pub fn new(start: impl Into<Vec<u8>>, limit: impl Into<Vec<u8>>) -> Self {
        Self {
            start: Some(start.into()),
            limit: Some(limit.into()),
        }
    }

    /// Range covering every key that starts with `prefix` (bytewise order).
    pub fn prefix(prefix: &[u8]) -> Self {
        let mut limit = None;
        for i in (0..prefix.len()).rev() {
            if prefix[i] < 0xff {
                let mut l = prefix[..=i].to_vec();
                l[i] += 1;
                limit = Some(l);
                break;
            }
        }
        Self {
            start: Some(prefix.to_vec()),
            limit,
        }
    }
}
