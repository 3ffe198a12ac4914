//! Comparer Module
//!
//! Total orderings over raw keys.
//!
//! A comparer's name is persisted in the manifest; opening a database with a
//! comparer of a different name is refused by the collaborator, so the name
//! must change whenever the ordering does.

use std::cmp::Ordering;

/// Ordering only, no key shortening.
pub trait BasicComparer: Send + Sync {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Ordering plus the key-shortening hooks used to build compact index blocks.
pub trait Comparer: BasicComparer {
    /// Name recorded in the manifest.
    fn name(&self) -> &str;

    /// A key `k` with `a <= k < b`, ideally shorter than `a`.
    /// `None` means "no shorter key found, use `a`".
    fn separator(&self, a: &[u8], b: &[u8]) -> Option<Vec<u8>>;

    /// A key `k >= b`, ideally shorter than `b`.
    /// `None` means "no shorter key found, use `b`".
    fn successor(&self, b: &[u8]) -> Option<Vec<u8>>;
}

/// Lexicographic byte-wise ordering.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytewiseComparer;

impl BytewiseComparer {
    pub const NAME: &'static str = "leveldb.BytewiseComparator";
}

impl BasicComparer for BytewiseComparer {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

impl Comparer for BytewiseComparer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn separator(&self, a: &[u8], b: &[u8]) -> Option<Vec<u8>> {
        let shared = a.iter().zip(b).take_while(|(x, y)| x == y).count();
        if shared >= a.len().min(b.len()) {
            // One is a prefix of the other.
            return None;
        }
        let c = a[shared];
        if c < 0xff && c + 1 < b[shared] {
            let mut dst = a[..=shared].to_vec();
            dst[shared] += 1;
            return Some(dst);
        }
        None
    }

    fn successor(&self, b: &[u8]) -> Option<Vec<u8>> {
        let i = b.iter().position(|&c| c != 0xff)?;
        let mut dst = b[..=i].to_vec();
        dst[i] += 1;
        Some(dst)
    }
}
