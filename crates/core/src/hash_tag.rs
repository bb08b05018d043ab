//! 32-bit hash tags stored in a slot header for cheap, header-level
//! comparison before a payload read.

use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Seed for the placement hash backing [`hash_tag_of`]. Distinct from
/// [`crate::fingerprint::FINGERPRINT_SEED`] so that a collision in one is
/// not correlated with a collision in the other (see SPEC_FULL.md §4.3).
const HASH_TAG_SEED: u64 = 0x6170_616d_6873_6168; // "hashmap" reversed, arbitrary

/// A 32-bit truncation of a key's placement hash. `0` is reserved to mean
/// "empty slot" and is never produced by [`hash_tag_of`] (remapped to `1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HashTag(pub u32);

impl HashTag {
    pub const EMPTY: HashTag = HashTag(0);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for HashTag {
    fn from(raw: u32) -> Self {
        HashTag(raw)
    }
}

/// Derive the 32-bit hash tag of `key`, remapping `0` to `1`.
pub fn hash_tag_of(key: &[u8]) -> HashTag {
    let full = xxh3_64_with_seed(key, HASH_TAG_SEED);
    let truncated = (full >> 32) as u32 ^ full as u32;
    HashTag(if truncated == 0 { 1 } else { truncated })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_produces_zero() {
        for key in [&b""[..], b"a", b"alpha", b"\0\0\0\0"] {
            assert!(!hash_tag_of(key).is_empty());
        }
    }

    #[test]
    fn deterministic() {
        assert_eq!(hash_tag_of(b"alpha"), hash_tag_of(b"alpha"));
    }

    #[test]
    fn distinct_seed_from_fingerprint() {
        // The two digests must not be trivially derivable from one another
        // for the same key: they should differ for at least one sample key.
        use crate::fingerprint::fingerprint_of;
        let tag = hash_tag_of(b"alpha").get() as u64;
        let fp = fingerprint_of(b"alpha").get();
        assert_ne!(tag, fp);
    }
}
