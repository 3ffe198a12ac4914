//! Internal Key Module
//!
//! Every entry the engine stores is keyed by an *internal key*: the user key
//! followed by an 8-byte trailer packing the mutation's sequence number and
//! its kind.
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────────────┐
//! │ user key (variable)  │ LE u64: (sequence << 8) | key type   │
//! └──────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! Internal keys sort by user key ascending, then by the packed trailer
//! descending, so the newest entry for a user key comes first. See
//! [`InternalComparer`].

mod comparer;

use std::fmt;

use bytes::{Buf, BufMut};

use crate::error::{LarchError, Result};

pub use comparer::InternalComparer;

/// Largest sequence number that fits in the 56-bit field.
pub const MAX_SEQUENCE: u64 = (1 << 56) - 1;

/// Key type used when building seek keys: the highest tag, so a seek key
/// sorts before every entry of the same user key and sequence.
pub const KEY_TYPE_SEEK: KeyType = KeyType::Value;

/// Packed trailer of the largest possible internal key for a user key.
pub const MAX_NUM: u64 = (MAX_SEQUENCE << 8) | KEY_TYPE_SEEK as u64;

/// Trailer length in bytes.
pub const TRAILER_LEN: usize = 8;

// =============================================================================
// Key Type
// =============================================================================

/// Kind of mutation an internal key records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum KeyType {
    /// A tombstone.
    Deletion = 0,
    /// A live value.
    Value = 1,
}

impl TryFrom<u8> for KeyType {
    type Error = LarchError;

    fn try_from(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(KeyType::Deletion),
            1 => Ok(KeyType::Value),
            _ => Err(LarchError::InvalidArgument(format!("invalid key type {tag}"))),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyType::Deletion => f.write_str("d"),
            KeyType::Value => f.write_str("v"),
        }
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Append the internal key for `(user_key, seq, kt)` to `dst`.
///
/// # Panics
/// Panics if `seq` exceeds [`MAX_SEQUENCE`]. Callers validate sequence
/// numbers before building keys; an overflow here is a bug, not bad input.
pub fn append_internal_key(dst: &mut Vec<u8>, user_key: &[u8], seq: u64, kt: KeyType) {
    assert!(
        seq <= MAX_SEQUENCE,
        "larchkv: invalid sequence number {seq} (max {MAX_SEQUENCE})"
    );
    dst.reserve(user_key.len() + TRAILER_LEN);
    dst.extend_from_slice(user_key);
    dst.put_u64_le((seq << 8) | kt as u64);
}

/// Split an internal key into `(user_key, sequence, key_type)`.
pub fn parse_internal_key(ik: &[u8]) -> Result<(&[u8], u64, KeyType)> {
    if ik.len() < TRAILER_LEN {
        return Err(internal_key_corrupted(ik, "invalid length"));
    }
    let (ukey, mut trailer) = ik.split_at(ik.len() - TRAILER_LEN);
    let num = trailer.get_u64_le();
    let kt = KeyType::try_from((num & 0xff) as u8)
        .map_err(|_| internal_key_corrupted(ik, "invalid type"))?;
    Ok((ukey, num >> 8, kt))
}

fn internal_key_corrupted(ik: &[u8], reason: &str) -> LarchError {
    LarchError::corrupted(format!(
        "internal key {:?} corrupted: {}",
        String::from_utf8_lossy(ik),
        reason
    ))
}

/// User-key part of an internal key. Keys too short to carry a trailer are
/// returned whole.
pub(crate) fn user_key(ik: &[u8]) -> &[u8] {
    ik.len()
        .checked_sub(TRAILER_LEN)
        .map_or(ik, |n| &ik[..n])
}

/// Packed trailer of an internal key, 0 if the key is too short.
pub(crate) fn trailer_num(ik: &[u8]) -> u64 {
    match ik.len().checked_sub(TRAILER_LEN) {
        Some(n) => (&ik[n..]).get_u64_le(),
        None => 0,
    }
}

// =============================================================================
// Owned Internal Key
// =============================================================================

/// An owned, encoded internal key.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct InternalKey(Vec<u8>);

impl InternalKey {
    /// Build the internal key for `(user_key, seq, kt)`.
    ///
    /// # Panics
    /// Panics if `seq` exceeds [`MAX_SEQUENCE`].
    pub fn new(user_key: &[u8], seq: u64, kt: KeyType) -> Self {
        let mut buf = Vec::with_capacity(user_key.len() + TRAILER_LEN);
        append_internal_key(&mut buf, user_key, seq, kt);
        Self(buf)
    }

    /// Wrap already-encoded bytes without validating them.
    pub fn from_encoded(encoded: Vec<u8>) -> Self {
        Self(encoded)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn user_key(&self) -> &[u8] {
        user_key(&self.0)
    }

    /// Decode the sequence number and key type.
    pub fn parse(&self) -> Result<(&[u8], u64, KeyType)> {
        parse_internal_key(&self.0)
    }
}

impl AsRef<[u8]> for InternalKey {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match parse_internal_key(&self.0) {
            Ok((ukey, seq, kt)) => {
                write!(f, "{},{}{}", String::from_utf8_lossy(ukey), kt, seq)
            }
            Err(_) => write!(f, "<invalid:{:?}>", String::from_utf8_lossy(&self.0)),
        }
    }
}

impl fmt::Debug for InternalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
