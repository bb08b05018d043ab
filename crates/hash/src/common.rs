//! Shared builder scaffolding used by every variant in this crate:
//! deduplication, bucket assignment, and the overflow fallback, so each
//! algorithm file specifies only its own placement step per SPEC_FULL.md
//! §4.4 ("each variant specifies only how the candidate slot is
//! computed; the fingerprint check, overflow fallback, and stats are
//! shared").

use std::collections::HashSet;

use maph_core::error::{Error, Result};
use maph_core::fingerprint::fingerprint_of;
use xxhash_rust::xxh3::xxh3_64_with_seed;

use crate::overflow::OverflowRegion;

/// Deduplicate a builder's input keys, preserving first-seen order.
/// Construction contract step 1 (SPEC_FULL.md §4.4).
pub fn dedupe_keys(keys: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>> {
    if keys.is_empty() {
        return Err(Error::InvalidArgument(
            "MPHF builder requires at least one key".into(),
        ));
    }
    let mut seen = HashSet::with_capacity(keys.len());
    let mut out = Vec::with_capacity(keys.len());
    for key in keys {
        if seen.insert(key.clone()) {
            out.push(key);
        }
    }
    Ok(out)
}

/// A seeded 64-bit primary hash, independent from
/// `maph_core::fingerprint::fingerprint_of` and `maph_core::hash_tag::hash_tag_of`
/// (each uses its own seed) so collisions across the three digests are
/// uncorrelated.
pub fn primary_hash(key: &[u8], seed: u64) -> u64 {
    xxh3_64_with_seed(key, seed)
}

/// Partition `keys` into `num_buckets` buckets by `primary_hash(key, seed) % num_buckets`.
/// Returns a `Vec` of bucket -> key indices (into `keys`).
pub fn partition_into_buckets(keys: &[Vec<u8>], seed: u64, num_buckets: usize) -> Vec<Vec<usize>> {
    let mut buckets = vec![Vec::new(); num_buckets.max(1)];
    for (i, key) in keys.iter().enumerate() {
        let b = (primary_hash(key, seed) as usize) % buckets.len();
        buckets[b].push(i);
    }
    buckets
}

/// Expected bucket count so the average bucket holds `target_size` keys.
pub fn bucket_count_for(n: usize, target_size: usize) -> usize {
    n.div_ceil(target_size.max(1)).max(1)
}

/// Shared query step for every variant: confirm a placement-derived
/// candidate slot actually belongs to `key` via its stored fingerprint,
/// falling back to the overflow region otherwise (SPEC_FULL.md §4.4).
pub fn verify_and_query(
    candidate: Option<u64>,
    key: &[u8],
    perfect_fingerprints: &[u64],
    overflow: &OverflowRegion,
) -> Option<u64> {
    let fingerprint = fingerprint_of(key);
    if let Some(slot) = candidate {
        if let Some(&stored) = perfect_fingerprints.get(slot as usize) {
            if stored == fingerprint.get() {
                return Some(slot);
            }
        }
    }
    overflow.find(fingerprint)
}
