//! RecSplit: partition keys into small buckets, search a per-bucket seed
//! until that bucket's keys map bijectively onto `[0, |bucket|)`
//! (SPEC_FULL.md §4.4). Buckets are independent, so construction is
//! bucket-parallel via `rayon`.

use rayon::prelude::*;

use maph_core::error::Result;
use maph_core::fingerprint::fingerprint_of;
use maph_core::hasher::{HasherStatistics, PerfectHasher};

use crate::common::{bucket_count_for, dedupe_keys, partition_into_buckets, primary_hash, verify_and_query};
use crate::format::{Writer, ALGO_RECSPLIT};
use crate::overflow::OverflowRegion;

const OVERFLOWED_BUCKET: u64 = u64::MAX;
const BUCKET_SEED_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

/// Fluent builder for [`RecSplitHasher`].
pub struct RecSplitBuilder {
    keys: Vec<Vec<u8>>,
    leaf_size: u32,
    seed: u64,
    max_seed_tries: u32,
}

impl Default for RecSplitBuilder {
    fn default() -> Self {
        RecSplitBuilder {
            keys: Vec::new(),
            leaf_size: 8,
            seed: 0x5EC5_1157,
            max_seed_tries: 1_000,
        }
    }
}

impl RecSplitBuilder {
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

    /// Leaf size, clamped to `[4, 16]` per SPEC_FULL.md §4.4.
    pub fn with_leaf_size(mut self, leaf_size: u32) -> Self {
        self.leaf_size = leaf_size.clamp(4, 16);
        self
    }

    pub fn with_max_seed_tries(mut self, tries: u32) -> Self {
        self.max_seed_tries = tries.max(1);
        self
    }

    pub fn build(self) -> Result<RecSplitHasher> {
        let keys = dedupe_keys(self.keys)?;
        let n = keys.len();
        let bucket_count = bucket_count_for(n, self.leaf_size as usize);
        let buckets = partition_into_buckets(&keys, self.seed, bucket_count);
        let max_seed_tries = self.max_seed_tries;

        let placements: Vec<Option<(u64, Vec<usize>)>> = buckets
            .par_iter()
            .map(|idxs| try_place_bucket(&keys, idxs, self.seed, max_seed_tries))
            .collect();

        let mut bucket_seed = vec![OVERFLOWED_BUCKET; bucket_count];
        let mut bucket_offset = vec![0u64; bucket_count];
        let mut bucket_size = vec![0u64; bucket_count];
        let mut perfect_fingerprints = Vec::with_capacity(n);
        let mut overflow_keys: Vec<usize> = Vec::new();
        let mut next_offset = 0u64;

        for (b, placement) in placements.into_iter().enumerate() {
            bucket_size[b] = buckets[b].len() as u64;
            match placement {
                Some((seed, ordering)) => {
                    bucket_seed[b] = seed;
                    bucket_offset[b] = next_offset;
                    for &key_idx in &ordering {
                        perfect_fingerprints.push(fingerprint_of(&keys[key_idx]).get());
                    }
                    next_offset += ordering.len() as u64;
                }
                None => overflow_keys.extend(&buckets[b]),
            }
        }

        let perfect_count = next_offset;
        let mut overflow = OverflowRegion::new();
        for (i, &key_idx) in overflow_keys.iter().enumerate() {
            overflow.push(fingerprint_of(&keys[key_idx]), perfect_count + i as u64);
        }

        Ok(RecSplitHasher {
            seed: self.seed,
            leaf_size: self.leaf_size,
            bucket_count: bucket_count as u64,
            bucket_seed,
            bucket_offset,
            bucket_size,
            perfect_count,
            perfect_fingerprints,
            overflow,
        })
    }
}

/// Search seeds until `idxs`' keys map bijectively onto `[0, idxs.len())`,
/// or give up after `max_tries` (the bucket overflows).
fn try_place_bucket(
    keys: &[Vec<u8>],
    idxs: &[usize],
    base_seed: u64,
    max_tries: u32,
) -> Option<(u64, Vec<usize>)> {
    let m = idxs.len();
    if m == 0 {
        return Some((0, Vec::new()));
    }
    for trial in 0..max_tries as u64 {
        let seed = base_seed ^ trial.wrapping_mul(BUCKET_SEED_MIX);
        let mut ordering = vec![usize::MAX; m];
        let mut all_distinct = true;
        for &key_idx in idxs {
            let slot = (primary_hash(&keys[key_idx], seed) as usize) % m;
            if ordering[slot] != usize::MAX {
                all_distinct = false;
                break;
            }
            ordering[slot] = key_idx;
        }
        if all_distinct {
            return Some((seed, ordering));
        }
    }
    None
}

/// A built RecSplit perfect hasher.
#[derive(Debug, Clone)]
pub struct RecSplitHasher {
    seed: u64,
    leaf_size: u32,
    bucket_count: u64,
    bucket_seed: Vec<u64>,
    bucket_offset: Vec<u64>,
    bucket_size: Vec<u64>,
    perfect_count: u64,
    perfect_fingerprints: Vec<u64>,
    overflow: OverflowRegion,
}

impl RecSplitHasher {
    fn candidate(&self, key: &[u8]) -> Option<u64> {
        if self.bucket_count == 0 {
            return None;
        }
        let b = (primary_hash(key, self.seed) as usize) % self.bucket_count as usize;
        let seed = self.bucket_seed[b];
        if seed == OVERFLOWED_BUCKET {
            return None;
        }
        let size = self.bucket_size[b];
        if size == 0 {
            return None;
        }
        let intra = primary_hash(key, seed) % size;
        Some(self.bucket_offset[b] + intra)
    }

    pub fn perfect_count(&self) -> u64 {
        self.perfect_count
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow.len() as u64
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let (_, mut r) = crate::format::read_header(bytes)?;
        let leaf_size = r.read_u32()?;
        let seed = r.read_u64()?;
        let bucket_count = r.read_u64()?;
        let perfect_count = r.read_u64()?;
        let bucket_seed = r.read_u64_vec()?;
        let bucket_offset = r.read_u64_vec()?;
        let bucket_size = r.read_u64_vec()?;
        let perfect_fingerprints = r.read_u64_vec()?;
        let overflow_fingerprints = r.read_u64_vec()?;
        let overflow_slots = r.read_u64_vec()?;
        Ok(RecSplitHasher {
            seed,
            leaf_size,
            bucket_count,
            bucket_seed,
            bucket_offset,
            bucket_size,
            perfect_count,
            perfect_fingerprints,
            overflow: OverflowRegion::from_parts(overflow_fingerprints, overflow_slots),
        })
    }
}

impl PerfectHasher for RecSplitHasher {
    fn slot_for(&self, key: &[u8]) -> Option<u64> {
        verify_and_query(self.candidate(key), key, &self.perfect_fingerprints, &self.overflow)
    }

    fn max_slots(&self) -> u64 {
        self.perfect_count + self.overflow.len() as u64
    }

    fn statistics(&self) -> HasherStatistics {
        let memory_bytes = std::mem::size_of::<Self>()
            + self.bucket_seed.len() * 8
            + self.bucket_offset.len() * 8
            + self.bucket_size.len() * 8
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
        let mut w = Writer::with_header(ALGO_RECSPLIT);
        w.write_u32(self.leaf_size);
        w.write_u64(self.seed);
        w.write_u64(self.bucket_count);
        w.write_u64(self.perfect_count);
        w.write_u64_vec(&self.bucket_seed);
        w.write_u64_vec(&self.bucket_offset);
        w.write_u64_vec(&self.bucket_size);
        w.write_u64_vec(&self.perfect_fingerprints);
        w.write_u64_vec(self.overflow.fingerprints());
        w.write_u64_vec(self.overflow.slots());
        w.finish()
    }

    fn algorithm_name(&self) -> &'static str {
        "recsplit"
    }
}
