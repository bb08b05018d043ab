//! BBHash: place keys level by level. At each level, hash every remaining
//! key into a bit array sized `gamma * remaining.len()`; a key claims its
//! bit if it is the only key to land there. Colliding keys fall through to
//! the next, freshly-seeded level. A level's bitmap doubles as its own
//! rank structure (SPEC_FULL.md §4.4), so query is a handful of
//! O(1) rank lookups with no separate index.

use maph_core::error::Result;
use maph_core::fingerprint::fingerprint_of;
use maph_core::hasher::{HasherStatistics, PerfectHasher};

use crate::common::{dedupe_keys, primary_hash, verify_and_query};
use crate::format::{Writer, ALGO_BBHASH};
use crate::overflow::OverflowRegion;

const LEVEL_SEED_MIX: u64 = 0x2545_F491_4F6C_DD1D;
const DEFAULT_GAMMA: f64 = 1.0;
const DEFAULT_MAX_LEVELS: u32 = 25;

pub struct BbHashBuilder {
    keys: Vec<Vec<u8>>,
    seed: u64,
    gamma: f64,
    max_levels: u32,
}

impl Default for BbHashBuilder {
    fn default() -> Self {
        BbHashBuilder {
            keys: Vec::new(),
            seed: 0xBB44_A5A5,
            gamma: DEFAULT_GAMMA,
            max_levels: DEFAULT_MAX_LEVELS,
        }
    }
}

impl BbHashBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, key: impl Into<Vec<u8>>) -> Self {
        self.keys.push(key.into());
        self
    }

    pub fn add_all<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<Vec<u8>>,
    {
        self.keys.extend(keys.into_iter().map(Into::into));
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Per-level oversizing factor; 1.0 is classic BBHash, higher values
    /// place more keys per level at the cost of a larger bit array.
    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma.max(0.5);
        self
    }

    pub fn with_max_levels(mut self, levels: u32) -> Self {
        self.max_levels = levels.max(1);
        self
    }

    pub fn build(self) -> Result<BbHashHasher> {
        let keys = dedupe_keys(self.keys)?;
        let mut remaining: Vec<usize> = (0..keys.len()).collect();

        let mut levels = Vec::new();
        let mut level_offset = Vec::new();
        let mut perfect_fingerprints = Vec::new();
        let mut cumulative = 0u64;

        for level_idx in 0..self.max_levels {
            if remaining.is_empty() {
                break;
            }
            let level_size = ((remaining.len() as f64 * self.gamma).ceil() as u64).max(1);
            let seed = self.seed ^ (level_idx as u64).wrapping_mul(LEVEL_SEED_MIX);

            let mut counts = vec![0u8; level_size as usize];
            let mut positions = Vec::with_capacity(remaining.len());
            for &key_idx in &remaining {
                let p = primary_hash(&keys[key_idx], seed) % level_size;
                positions.push(p);
                counts[p as usize] = counts[p as usize].saturating_add(1);
            }

            let word_count = (level_size as usize).div_ceil(64);
            let mut bitmap = vec![0u64; word_count];
            for (p, &count) in counts.iter().enumerate() {
                if count == 1 {
                    bitmap[p / 64] |= 1u64 << (p % 64);
                }
            }
            let prefix = rank_prefix(&bitmap);
            let placed: u64 = bitmap.iter().map(|w| w.count_ones() as u64).sum();

            let mut level_fingerprints = vec![0u64; placed as usize];
            let mut next_remaining = Vec::with_capacity(remaining.len());
            for (i, &key_idx) in remaining.iter().enumerate() {
                let p = positions[i] as usize;
                if counts[p] == 1 {
                    let rank = rank_of(&bitmap, &prefix, p as u64);
                    level_fingerprints[rank as usize] = fingerprint_of(&keys[key_idx]).get();
                } else {
                    next_remaining.push(key_idx);
                }
            }

            level_offset.push(cumulative);
            cumulative += placed;
            perfect_fingerprints.extend(level_fingerprints);
            levels.push(Level { size: level_size, seed, bitmap, prefix });
            remaining = next_remaining;
        }

        let perfect_count = cumulative;
        let mut overflow = OverflowRegion::new();
        for (i, &key_idx) in remaining.iter().enumerate() {
            overflow.push(fingerprint_of(&keys[key_idx]), perfect_count + i as u64);
        }

        Ok(BbHashHasher {
            levels,
            level_offset,
            perfect_count,
            perfect_fingerprints,
            overflow,
        })
    }
}

/// Exclusive prefix sum of popcounts, one entry per word.
fn rank_prefix(bitmap: &[u64]) -> Vec<u64> {
    let mut prefix = Vec::with_capacity(bitmap.len());
    let mut acc = 0u64;
    for &word in bitmap {
        prefix.push(acc);
        acc += word.count_ones() as u64;
    }
    prefix
}

/// Number of set bits in `bitmap` strictly before position `pos`.
fn rank_of(bitmap: &[u64], prefix: &[u64], pos: u64) -> u64 {
    let word_idx = (pos / 64) as usize;
    let bit = pos % 64;
    let mask = if bit == 0 { 0 } else { (1u64 << bit) - 1 };
    prefix[word_idx] + (bitmap[word_idx] & mask).count_ones() as u64
}

#[derive(Debug, Clone)]
struct Level {
    size: u64,
    seed: u64,
    bitmap: Vec<u64>,
    prefix: Vec<u64>,
}

/// A built BBHash perfect hasher.
#[derive(Debug, Clone)]
pub struct BbHashHasher {
    levels: Vec<Level>,
    level_offset: Vec<u64>,
    perfect_count: u64,
    perfect_fingerprints: Vec<u64>,
    overflow: OverflowRegion,
}

impl BbHashHasher {
    fn candidate(&self, key: &[u8]) -> Option<u64> {
        for (level_idx, level) in self.levels.iter().enumerate() {
            if level.size == 0 {
                continue;
            }
            let p = primary_hash(key, level.seed) % level.size;
            let word_idx = (p / 64) as usize;
            let bit = p % 64;
            if level.bitmap[word_idx] & (1u64 << bit) != 0 {
                let rank = rank_of(&level.bitmap, &level.prefix, p);
                return Some(self.level_offset[level_idx] + rank);
            }
        }
        None
    }

    pub fn perfect_count(&self) -> u64 {
        self.perfect_count
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow.len() as u64
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let (_, mut r) = crate::format::read_header(bytes)?;
        let perfect_count = r.read_u64()?;
        let level_offset = r.read_u64_vec()?;
        let num_levels = r.read_u64()? as usize;
        let mut levels = Vec::with_capacity(num_levels);
        for _ in 0..num_levels {
            let size = r.read_u64()?;
            let seed = r.read_u64()?;
            let bitmap = r.read_u64_vec()?;
            let prefix = rank_prefix(&bitmap);
            levels.push(Level { size, seed, bitmap, prefix });
        }
        let perfect_fingerprints = r.read_u64_vec()?;
        let overflow_fingerprints = r.read_u64_vec()?;
        let overflow_slots = r.read_u64_vec()?;
        Ok(BbHashHasher {
            levels,
            level_offset,
            perfect_count,
            perfect_fingerprints,
            overflow: OverflowRegion::from_parts(overflow_fingerprints, overflow_slots),
        })
    }
}

impl PerfectHasher for BbHashHasher {
    fn slot_for(&self, key: &[u8]) -> Option<u64> {
        verify_and_query(self.candidate(key), key, &self.perfect_fingerprints, &self.overflow)
    }

    fn max_slots(&self) -> u64 {
        self.perfect_count + self.overflow.len() as u64
    }

    fn statistics(&self) -> HasherStatistics {
        let bitmap_bytes: usize = self.levels.iter().map(|l| l.bitmap.len() * 8 + l.prefix.len() * 8).sum();
        let memory_bytes = std::mem::size_of::<Self>()
            + bitmap_bytes
            + self.level_offset.len() * 8
            + self.perfect_fingerprints.len() * 8
            + self.overflow.len() * 16;
        let n = (self.perfect_count + self.overflow.len() as u64).max(1);
        HasherStatistics {
            perfect_count: self.perfect_count,
            overflow_count: self.overflow.len() as u64,
            bits_per_key: (memory_bytes as f64 * 8.0) / n as f64,
            memory_bytes,
        }
    }

    fn serialize(&self) -> Vec<u8> {
        let mut w = Writer::with_header(ALGO_BBHASH);
        w.write_u64(self.perfect_count);
        w.write_u64_vec(&self.level_offset);
        w.write_u64(self.levels.len() as u64);
        for level in &self.levels {
            w.write_u64(level.size);
            w.write_u64(level.seed);
            w.write_u64_vec(&level.bitmap);
        }
        w.write_u64_vec(&self.perfect_fingerprints);
        w.write_u64_vec(self.overflow.fingerprints());
        w.write_u64_vec(self.overflow.slots());
        w.finish()
    }

    fn algorithm_name(&self) -> &'static str {
        "bbhash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_rejected() {
        assert!(BbHashBuilder::new().build().is_err());
    }

    #[test]
    fn every_build_key_lands_on_a_distinct_slot() {
        let keys: Vec<String> = (0..500).map(|i| format!("bb-{i}")).collect();
        let hasher = BbHashBuilder::new().add_all(keys.clone()).build().unwrap();

        let mut slots: Vec<u64> = keys
            .iter()
            .map(|k| hasher.slot_for(k.as_bytes()).expect("key was in build set"))
            .collect();
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), keys.len());
    }

    #[test]
    fn absent_key_is_none() {
        let hasher = BbHashBuilder::new().add_all(["one", "two", "three"]).build().unwrap();
        assert_eq!(hasher.slot_for(b"four"), None);
    }

    #[test]
    fn duplicate_keys_are_deduplicated() {
        let hasher = BbHashBuilder::new().add("a").add("a").add("b").build().unwrap();
        assert_eq!(hasher.perfect_count() + hasher.overflow_count(), 2);
    }

    #[test]
    fn serialize_round_trip_agrees_on_every_key() {
        let keys: Vec<String> = (0..80).map(|i| format!("rt-{i}")).collect();
        let hasher = BbHashBuilder::new().add_all(keys.clone()).build().unwrap();
        let bytes = hasher.serialize();
        let restored = BbHashHasher::deserialize(&bytes).unwrap();
        for key in keys.iter().chain(std::iter::once(&"rt-missing".to_string())) {
            assert_eq!(hasher.slot_for(key.as_bytes()), restored.slot_for(key.as_bytes()));
        }
    }

    #[test]
    fn low_gamma_still_places_every_key_via_extra_levels() {
        let keys: Vec<String> = (0..1_000).map(|i| format!("tight-{i}")).collect();
        let hasher = BbHashBuilder::new()
            .add_all(keys.clone())
            .with_gamma(0.6)
            .with_max_levels(40)
            .build()
            .unwrap();
        for key in &keys {
            assert!(hasher.slot_for(key.as_bytes()).is_some());
        }
    }
}
