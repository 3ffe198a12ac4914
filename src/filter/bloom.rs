//! Bloom filter
//!
//! ```text
//! ┌──────────────────────────────────┬─────────┐
//! │ bit array (⌈n·bits_per_key/8⌉ B) │ k (1 B) │
//! └──────────────────────────────────┴─────────┘
//! ```
//!
//! Probes use double hashing from one 32-bit hash: `h`, `h + δ`, `h + 2δ`, …
//! with `δ = rotr(h, 17)`.

use crate::util::hash;

use super::{Filter, FilterGenerator};

const HASH_SEED: u32 = 0xbc9f_1d34;

fn bloom_hash(key: &[u8]) -> u32 {
    hash(key, HASH_SEED)
}

/// Bloom filter policy.
#[derive(Debug, Clone, Copy)]
pub struct BloomFilter {
    bits_per_key: usize,
    k: u8,
}

impl BloomFilter {
    pub const NAME: &'static str = "leveldb.BuiltinBloomFilter2";

    /// Filter using `bits_per_key` bits per key. 10 gives roughly a 1%
    /// false-positive rate.
    pub fn new(bits_per_key: usize) -> Self {
        let k = (bits_per_key as f64 * std::f64::consts::LN_2).round();
        Self {
            bits_per_key,
            k: k.clamp(1.0, 30.0) as u8,
        }
    }

    pub fn bits_per_key(&self) -> usize {
        self.bits_per_key
    }

    /// Number of probes per key.
    pub fn probes(&self) -> u8 {
        self.k
    }
}

impl Filter for BloomFilter {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn contains(&self, filter: &[u8], key: &[u8]) -> bool {
        if filter.len() < 2 {
            return false;
        }
        let n_bytes = filter.len() - 1;
        let n_bits = (n_bytes * 8) as u32;

        let k = filter[n_bytes];
        if k > 30 {
            // Reserved for other encodings; treat as a match.
            return true;
        }

        let mut h = bloom_hash(key);
        let delta = h.rotate_right(17);
        for _ in 0..k {
            let bit = h % n_bits;
            if filter[(bit / 8) as usize] & (1 << (bit % 8)) == 0 {
                return false;
            }
            h = h.wrapping_add(delta);
        }
        true
    }

    fn new_generator(&self) -> Box<dyn FilterGenerator> {
        Box::new(BloomGenerator {
            bits_per_key: self.bits_per_key,
            k: self.k,
            hashes: Vec::new(),
        })
    }
}

struct BloomGenerator {
    bits_per_key: usize,
    k: u8,
    hashes: Vec<u32>,
}

impl FilterGenerator for BloomGenerator {
    fn add(&mut self, key: &[u8]) {
        self.hashes.push(bloom_hash(key));
    }

    fn generate(&mut self, dst: &mut Vec<u8>) {
        // Small key counts would otherwise see a very high false-positive
        // rate, so never go below 64 bits.
        let n_bits = (self.hashes.len() * self.bits_per_key).max(64);
        let n_bytes = n_bits.div_ceil(8);
        let n_bits = (n_bytes * 8) as u32;

        let start = dst.len();
        dst.resize(start + n_bytes, 0);
        dst.push(self.k);
        let bits = &mut dst[start..start + n_bytes];

        for &kh in &self.hashes {
            let mut h = kh;
            let delta = h.rotate_right(17);
            for _ in 0..self.k {
                let bit = h % n_bits;
                bits[(bit / 8) as usize] |= 1 << (bit % 8);
                h = h.wrapping_add(delta);
            }
        }

        self.hashes.clear();
    }
}
