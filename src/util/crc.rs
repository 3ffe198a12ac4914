//! Masked CRC32C
//!
//! Checksums stored next to the data they cover are masked so that a CRC
//! computed over bytes which themselves embed CRCs stays well distributed.

use crc_fast::{CrcAlgorithm, Digest};

const MASK_DELTA: u32 = 0xa282_ead8;

/// CRC32C (Castagnoli) over the concatenation of `parts`, masked.
pub fn masked_crc32c(parts: &[&[u8]]) -> u32 {
    let mut digest = Digest::new(CrcAlgorithm::Crc32Iscsi);
    for part in parts {
        digest.update(part);
    }
    mask(digest.finalize() as u32)
}

fn mask(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Recover the raw CRC from its masked representation.
pub fn unmask_crc(masked: u32) -> u32 {
    masked.wrapping_sub(MASK_DELTA).rotate_left(15)
}
