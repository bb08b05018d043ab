//! CHD (Compress, Hash, Displace): process buckets largest-first, search a
//! per-bucket displacement until none of its keys collide with an
//! already-placed slot (SPEC_FULL.md §4.4). Displacement is inherently
//! sequential — each bucket's search depends on every earlier bucket's
//! placements — so, unlike RecSplit, this builder does not parallelize
//! bucket construction.

use maph_core::error::Result;
use maph_core::fingerprint::fingerprint_of;
use maph_core::hasher::{HasherStatistics, PerfectHasher};

use crate::common::{bucket_count_for, dedupe_keys, partition_into_buckets, primary_hash, verify_and_query};
use crate::format::{Writer, ALGO_CHD};
use crate::overflow::OverflowRegion;

const OVERFLOWED_BUCKET: u64 = u64::MAX;
const DISPLACEMENT_MIX: u64 = 0xC2B2_AE3D_27D4_EB4F;

pub struct ChdBuilder {
    keys: Vec<Vec<u8>>,
    seed: u64,
    avg_bucket_size: usize,
    max_displacement_tries: u32,
}

impl Default for ChdBuilder {
    fn default() -> Self {
        ChdBuilder {
            keys: Vec::new(),
            seed: 0xC0FF_EE15,
            avg_bucket_size: 4,
            max_displacement_tries: 10_000,
        }
    }
}

impl ChdBuilder {
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

    pub fn with_avg_bucket_size(mut self, size: usize) -> Self {
        self.avg_bucket_size = size.max(1);
        self
    }

    pub fn with_max_displacement_tries(mut self, tries: u32) -> Self {
        self.max_displacement_tries = tries.max(1);
        self
    }

    pub fn build(self) -> Result<ChdHasher> {
        let keys = dedupe_keys(self.keys)?;
        let n = keys.len();
        let bucket_count = bucket_count_for(n, self.avg_bucket_size);
        let buckets = partition_into_buckets(&keys, self.seed, bucket_count);

        let mut bucket_order: Vec<usize> = (0..bucket_count).collect();
        bucket_order.sort_by_key(|&b| std::cmp::Reverse(buckets[b].len()));

        let mut taken = vec![false; n];
        let mut displacement = vec![OVERFLOWED_BUCKET; bucket_count];
        let mut perfect_fingerprints = vec![0u64; n];
        let mut overflow_keys: Vec<usize> = Vec::new();

        for &b in &bucket_order {
            if buckets[b].is_empty() {
                displacement[b] = 0;
                continue;
            }
            match try_displace_bucket(
                &keys,
                &buckets[b],
                self.seed,
                n as u64,
                &mut taken,
                self.max_displacement_tries,
            ) {
                Some((d, positions)) => {
                    displacement[b] = d;
                    for (i, &key_idx) in buckets[b].iter().enumerate() {
                        perfect_fingerprints[positions[i] as usize] = fingerprint_of(&keys[key_idx]).get();
                    }
                }
                None => overflow_keys.extend(&buckets[b]),
            }
        }

        let mut overflow = OverflowRegion::new();
        for (i, &key_idx) in overflow_keys.iter().enumerate() {
            overflow.push(fingerprint_of(&keys[key_idx]), n as u64 + i as u64);
        }

        Ok(ChdHasher {
            seed: self.seed,
            bucket_count: bucket_count as u64,
            perfect_count: n as u64,
            displacement,
            perfect_fingerprints,
            overflow,
        })
    }
}

/// Search displacements until every key in `idxs` lands on a distinct,
/// untaken slot in `[0, n)`. Returns the found displacement and each
/// key's final position (aligned with `idxs`'s order), or `None` if the
/// bucket overflows.
fn try_displace_bucket(
    keys: &[Vec<u8>],
    idxs: &[usize],
    base_seed: u64,
    n: u64,
    taken: &mut [bool],
    max_tries: u32,
) -> Option<(u64, Vec<u64>)> {
    'displacement: for d in 0..max_tries as u64 {
        let trial_seed = base_seed ^ d.wrapping_mul(DISPLACEMENT_MIX);
        let mut positions = Vec::with_capacity(idxs.len());
        let mut seen_this_trial = std::collections::HashSet::with_capacity(idxs.len());
        for &key_idx in idxs {
            let p = primary_hash(&keys[key_idx], trial_seed) % n;
            if taken[p as usize] || !seen_this_trial.insert(p) {
                continue 'displacement;
            }
            positions.push(p);
        }
        for &p in &positions {
            taken[p as usize] = true;
        }
        return Some((d, positions));
    }
    None
}

/// A built CHD perfect hasher.
#[derive(Debug, Clone)]
pub struct ChdHasher {
    seed: u64,
    bucket_count: u64,
    perfect_count: u64,
    displacement: Vec<u64>,
    perfect_fingerprints: Vec<u64>,
    overflow: OverflowRegion,
}

impl ChdHasher {
    fn candidate(&self, key: &[u8]) -> Option<u64> {
        if self.bucket_count == 0 || self.perfect_count == 0 {
            return None;
        }
        let b = (primary_hash(key, self.seed) as usize) % self.bucket_count as usize;
        let d = self.displacement[b];
        if d == OVERFLOWED_BUCKET {
            return None;
        }
        let trial_seed = self.seed ^ d.wrapping_mul(DISPLACEMENT_MIX);
        Some(primary_hash(key, trial_seed) % self.perfect_count)
    }

    pub fn perfect_count(&self) -> u64 {
        self.perfect_count
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow.len() as u64
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let (_, mut r) = crate::format::read_header(bytes)?;
        let seed = r.read_u64()?;
        let bucket_count = r.read_u64()?;
        let perfect_count = r.read_u64()?;
        let displacement = r.read_u64_vec()?;
        let perfect_fingerprints = r.read_u64_vec()?;
        let overflow_fingerprints = r.read_u64_vec()?;
        let overflow_slots = r.read_u64_vec()?;
        Ok(ChdHasher {
            seed,
            bucket_count,
            perfect_count,
            displacement,
            perfect_fingerprints,
            overflow: OverflowRegion::from_parts(overflow_fingerprints, overflow_slots),
        })
    }
}

impl PerfectHasher for ChdHasher {
    fn slot_for(&self, key: &[u8]) -> Option<u64> {
        verify_and_query(self.candidate(key), key, &self.perfect_fingerprints, &self.overflow)
    }

    fn max_slots(&self) -> u64 {
        self.perfect_count + self.overflow.len() as u64
    }

    fn statistics(&self) -> HasherStatistics {
        let memory_bytes = std::mem::size_of::<Self>()
            + self.displacement.len() * 8
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
        let mut w = Writer::with_header(ALGO_CHD);
        w.write_u64(self.seed);
        w.write_u64(self.bucket_count);
        w.write_u64(self.perfect_count);
        w.write_u64_vec(&self.displacement);
        w.write_u64_vec(&self.perfect_fingerprints);
        w.write_u64_vec(self.overflow.fingerprints());
        w.write_u64_vec(self.overflow.slots());
        w.finish()
    }

    fn algorithm_name(&self) -> &'static str {
        "chd"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_rejected() {
        assert!(ChdBuilder::new().build().is_err());
    }

    #[test]
    fn every_build_key_lands_on_a_distinct_slot() {
        let keys: Vec<String> = (0..200).map(|i| format!("item-{i}")).collect();
        let hasher = ChdBuilder::new().add_all(keys.clone()).build().unwrap();

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
        let hasher = ChdBuilder::new().add_all(["alpha", "beta", "gamma"]).build().unwrap();
        assert_eq!(hasher.slot_for(b"not-present"), None);
    }

    #[test]
    fn duplicate_keys_are_deduplicated() {
        let hasher = ChdBuilder::new().add("a").add("a").add("b").build().unwrap();
        assert_eq!(hasher.perfect_count(), 2);
    }

    #[test]
    fn serialize_round_trip_agrees_on_every_key() {
        let keys: Vec<String> = (0..50).map(|i| format!("k{i}")).collect();
        let hasher = ChdBuilder::new().add_all(keys.clone()).build().unwrap();
        let bytes = hasher.serialize();
        let restored = ChdHasher::deserialize(&bytes).unwrap();
        for key in keys.iter().chain(std::iter::once(&"missing".to_string())) {
            assert_eq!(hasher.slot_for(key.as_bytes()), restored.slot_for(key.as_bytes()));
        }
    }

    #[test]
    fn dense_key_set_places_every_key() {
        let keys: Vec<String> = (0..3_000).map(|i| format!("dense-{i}")).collect();
        let hasher = ChdBuilder::new().add_all(keys.clone()).build().unwrap();
        for key in &keys {
            assert!(hasher.slot_for(key.as_bytes()).is_some());
        }
        assert_eq!(hasher.max_slots(), hasher.perfect_count() + hasher.overflow_count());
    }
}
