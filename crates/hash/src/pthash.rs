//! PTHash: partition keys into buckets by a primary hash, then search a
//! per-bucket "pilot" value whose mixed hash sends every key in the
//! bucket to a still-free final slot (SPEC_FULL.md §4.4). Buckets are
//! processed largest-first so the hardest-to-place buckets get first pick
//! of the free slots, same as CHD/FCH; PTHash's distinguishing piece is
//! the pilot-mixing function itself, which multiplies rather than XORs
//! the pilot into the hash state.

use maph_core::error::Result;
use maph_core::fingerprint::fingerprint_of;
use maph_core::hasher::{HasherStatistics, PerfectHasher};

use crate::common::{dedupe_keys, partition_into_buckets, primary_hash, verify_and_query};
use crate::format::{Writer, ALGO_PTHASH};
use crate::overflow::OverflowRegion;

const OVERFLOWED_BUCKET: u64 = u64::MAX;
const PILOT_MULTIPLIER: u64 = 0x9E37_79B9_7F4A_7C15;

pub struct PtHashBuilder {
    keys: Vec<Vec<u8>>,
    seed: u64,
    avg_bucket_size: usize,
    max_pilot_tries: u32,
}

impl Default for PtHashBuilder {
    fn default() -> Self {
        PtHashBuilder {
            keys: Vec::new(),
            seed: 0x97_7653_01,
            avg_bucket_size: 5,
            max_pilot_tries: 20_000,
        }
    }
}

impl PtHashBuilder {
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

    pub fn with_max_pilot_tries(mut self, tries: u32) -> Self {
        self.max_pilot_tries = tries.max(1);
        self
    }

    pub fn build(self) -> Result<PtHashHasher> {
        let keys = dedupe_keys(self.keys)?;
        let n = keys.len();
        let bucket_count = n.div_ceil(self.avg_bucket_size.max(1)).max(1);
        let buckets = partition_into_buckets(&keys, self.seed, bucket_count);

        let mut bucket_order: Vec<usize> = (0..bucket_count).collect();
        bucket_order.sort_by_key(|&b| std::cmp::Reverse(buckets[b].len()));

        let mut taken = vec![false; n];
        let mut pilot = vec![OVERFLOWED_BUCKET; bucket_count];
        let mut perfect_fingerprints = vec![0u64; n];
        let mut overflow_keys: Vec<usize> = Vec::new();

        for &b in &bucket_order {
            if buckets[b].is_empty() {
                pilot[b] = 0;
                continue;
            }
            match search_pilot(&keys, &buckets[b], self.seed, n as u64, &mut taken, self.max_pilot_tries) {
                Some((p, positions)) => {
                    pilot[b] = p;
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

        Ok(PtHashHasher {
            seed: self.seed,
            bucket_count: bucket_count as u64,
            perfect_count: n as u64,
            pilot,
            perfect_fingerprints,
            overflow,
        })
    }
}

fn mix_pilot(hash: u64, pilot: u64) -> u64 {
    hash ^ (pilot.wrapping_mul(PILOT_MULTIPLIER))
}

fn search_pilot(
    keys: &[Vec<u8>],
    idxs: &[usize],
    seed: u64,
    n: u64,
    taken: &mut [bool],
    max_tries: u32,
) -> Option<(u64, Vec<u64>)> {
    let base_hashes: Vec<u64> = idxs.iter().map(|&key_idx| primary_hash(&keys[key_idx], seed)).collect();
    'pilot: for p in 0..max_tries as u64 {
        let mut positions = Vec::with_capacity(idxs.len());
        let mut seen_this_trial = std::collections::HashSet::with_capacity(idxs.len());
        for &h in &base_hashes {
            let slot = mix_pilot(h, p) % n;
            if taken[slot as usize] || !seen_this_trial.insert(slot) {
                continue 'pilot;
            }
            positions.push(slot);
        }
        for &slot in &positions {
            taken[slot as usize] = true;
        }
        return Some((p, positions));
    }
    None
}

/// A built PTHash perfect hasher.
#[derive(Debug, Clone)]
pub struct PtHashHasher {
    seed: u64,
    bucket_count: u64,
    perfect_count: u64,
    pilot: Vec<u64>,
    perfect_fingerprints: Vec<u64>,
    overflow: OverflowRegion,
}

impl PtHashHasher {
    fn candidate(&self, key: &[u8]) -> Option<u64> {
        if self.bucket_count == 0 || self.perfect_count == 0 {
            return None;
        }
        let b = (primary_hash(key, self.seed) as usize) % self.bucket_count as usize;
        let p = self.pilot[b];
        if p == OVERFLOWED_BUCKET {
            return None;
        }
        let h = primary_hash(key, self.seed);
        Some(mix_pilot(h, p) % self.perfect_count)
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
        let pilot = r.read_u64_vec()?;
        let perfect_fingerprints = r.read_u64_vec()?;
        let overflow_fingerprints = r.read_u64_vec()?;
        let overflow_slots = r.read_u64_vec()?;
        Ok(PtHashHasher {
            seed,
            bucket_count,
            perfect_count,
            pilot,
            perfect_fingerprints,
            overflow: OverflowRegion::from_parts(overflow_fingerprints, overflow_slots),
        })
    }
}

impl PerfectHasher for PtHashHasher {
    fn slot_for(&self, key: &[u8]) -> Option<u64> {
        verify_and_query(self.candidate(key), key, &self.perfect_fingerprints, &self.overflow)
    }

    fn max_slots(&self) -> u64 {
        self.perfect_count + self.overflow.len() as u64
    }

    fn statistics(&self) -> HasherStatistics {
        let memory_bytes = std::mem::size_of::<Self>()
            + self.pilot.len() * 8
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
        let mut w = Writer::with_header(ALGO_PTHASH);
        w.write_u64(self.seed);
        w.write_u64(self.bucket_count);
        w.write_u64(self.perfect_count);
        w.write_u64_vec(&self.pilot);
        w.write_u64_vec(&self.perfect_fingerprints);
        w.write_u64_vec(self.overflow.fingerprints());
        w.write_u64_vec(self.overflow.slots());
        w.finish()
    }

    fn algorithm_name(&self) -> &'static str {
        "pthash"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_rejected() {
        assert!(PtHashBuilder::new().build().is_err());
    }

    #[test]
    fn every_build_key_lands_on_a_distinct_slot() {
        let keys: Vec<String> = (0..400).map(|i| format!("pt-{i}")).collect();
        let hasher = PtHashBuilder::new().add_all(keys.clone()).build().unwrap();

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
        let hasher = PtHashBuilder::new().add_all(["u", "v", "w"]).build().unwrap();
        assert_eq!(hasher.slot_for(b"z"), None);
    }

    #[test]
    fn duplicate_keys_are_deduplicated() {
        let hasher = PtHashBuilder::new().add("m").add("m").add("n").build().unwrap();
        assert_eq!(hasher.perfect_count(), 2);
    }

    #[test]
    fn serialize_round_trip_agrees_on_every_key() {
        let keys: Vec<String> = (0..70).map(|i| format!("pr{i}")).collect();
        let hasher = PtHashBuilder::new().add_all(keys.clone()).build().unwrap();
        let bytes = hasher.serialize();
        let restored = PtHashHasher::deserialize(&bytes).unwrap();
        for key in keys.iter().chain(std::iter::once(&"pr-missing".to_string())) {
            assert_eq!(hasher.slot_for(key.as_bytes()), restored.slot_for(key.as_bytes()));
        }
    }

    #[test]
    fn dense_key_set_places_every_key() {
        let keys: Vec<String> = (0..3_000).map(|i| format!("ptdense-{i}")).collect();
        let hasher = PtHashBuilder::new().add_all(keys.clone()).build().unwrap();
        for key in &keys {
            assert!(hasher.slot_for(key.as_bytes()).is_some());
        }
        assert_eq!(hasher.max_slots(), hasher.perfect_count() + hasher.overflow_count());
    }
}
