//! Varint helpers over `integer-encoding`.

use integer_encoding::VarInt;

/// Longest encoding of a u64 varint.
pub(crate) const MAX_VARINT_LEN64: usize = 10;

pub(crate) fn put_uvarint(dst: &mut Vec<u8>, v: u64) {
    let mut scratch = [0u8; MAX_VARINT_LEN64];
    let n = v.encode_var(&mut scratch);
    dst.extend_from_slice(&scratch[..n]);
}

/// Decode a varint from the front of `src`, returning the value and the
/// number of bytes consumed. `None` on truncated or overlong input, and on a
/// ten-byte encoding whose last byte carries bits past the 64th.
pub(crate) fn get_uvarint(src: &[u8]) -> Option<(u64, usize)> {
    let (v, n) = u64::decode_var(src)?;
    if n >= MAX_VARINT_LEN64 && src[MAX_VARINT_LEN64 - 1] > 1 {
        return None;
    }
    Some((v, n))
}

/// Length-prefixed byte string.
pub(crate) fn put_bytes(dst: &mut Vec<u8>, b: &[u8]) {
    put_uvarint(dst, b.len() as u64);
    dst.extend_from_slice(b);
}
