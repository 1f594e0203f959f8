use std::hash::Hasher;

use bytes::Bytes;
use rustc_hash::FxHasher;

/// Bloom filter over row (or row + qualifier) keys of one segment.
///
/// Probes are derived by double hashing two seeded `FxHasher` passes and
/// reduced into the bit space with a 128-bit multiply. False positives are
/// possible, false negatives are not.
#[derive(Debug, Clone)]
pub(crate) struct SegmentBloom {
    m_bits: u32,
    k_hashes: u8,
    bits: Vec<u8>,
}

impl SegmentBloom {
    const SEED1: u64 = 0x9E37_79B9_7F4A_7C15;
    const SEED2: u64 = 0xD1B5_4A32_D192_ED03;
    const BITS_PER_KEY: usize = 10;

    pub(crate) fn from_keys<I, K>(keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: AsRef<[u8]>,
    {
        let keys: Vec<K> = keys.into_iter().collect();
        let n = keys.len().max(1);
        let m_bits = u32::try_from((n * Self::BITS_PER_KEY).max(64)).unwrap_or(u32::MAX);
        // k ~= (m / n) ln 2
        let k_hashes = ((f64::from(m_bits) / n as f64) * std::f64::consts::LN_2)
            .round()
            .clamp(1.0, 16.0) as u8;

        let mut bits = vec![0u8; m_bits.div_ceil(8) as usize];
        for key in &keys {
            for bit in Self::probes(key.as_ref(), m_bits, k_hashes) {
                bits[(bit >> 3) as usize] |= 1 << (bit & 7);
            }
        }
        Self {
            m_bits,
            k_hashes,
            bits,
        }
    }

    /// `false` only when `key` is definitely absent.
    pub(crate) fn may_contain(&self, key: &[u8]) -> bool {
        Self::probes(key, self.m_bits, self.k_hashes)
            .all(|bit| self.bits[(bit >> 3) as usize] & (1 << (bit & 7)) != 0)
    }

    fn probes(key: &[u8], m_bits: u32, k_hashes: u8) -> impl Iterator<Item = u32> {
        let h1 = Self::hash(Self::SEED1, key);
        let h2 = Self::hash(Self::SEED2, key) | 1;
        (0..u64::from(k_hashes)).map(move |i| {
            let x = h1.wrapping_add(i.wrapping_mul(h2));
            ((u128::from(x) * u128::from(m_bits)) >> 64) as u32
        })
    }

    fn hash(seed: u64, key: &[u8]) -> u64 {
        let mut hasher = FxHasher::default();
        hasher.write_u64(seed);
        hasher.write(key);
        hasher.finish()
    }
}

/// Key probed in the row-column bloom: length-prefixed row, then qualifier.
pub(crate) fn row_col_key(row: &[u8], qualifier: &[u8]) -> Bytes {
    let mut key = Vec::with_capacity(4 + row.len() + qualifier.len());
    key.extend_from_slice(&(row.len() as u32).to_be_bytes());
    key.extend_from_slice(row);
    key.extend_from_slice(qualifier);
    Bytes::from(key)
}
