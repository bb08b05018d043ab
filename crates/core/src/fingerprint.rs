//! 64-bit key fingerprints used by the perfect-hash family to confirm a
//! queried key is the one that was actually placed at a candidate slot.
//!
//! Follows the `xxh3`-based dimension hashing used by `dolos-fjall`'s key
//! encoding (`xxh3_64` over arbitrary key bytes), with an
//! independent seed from [`crate::hash_tag`] so the two digests don't share
//! a failure mode.

use xxhash_rust::xxh3::xxh3_64_with_seed;

pub(crate) const FINGERPRINT_SEED: u64 = 0x4650_5248_4450_4e54; // "FPRHDPNT"-ish, arbitrary

/// A 64-bit digest of a key. `0` is reserved to mean "absent" and is never
/// produced by [`fingerprint_of`] (remapped to `1`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(pub u64);

impl Fingerprint {
    pub const EMPTY: Fingerprint = Fingerprint(0);

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for Fingerprint {
    fn from(raw: u64) -> Self {
        Fingerprint(raw)
    }
}

/// Derive the 64-bit fingerprint of `key`, remapping `0` to `1`.
pub fn fingerprint_of(key: &[u8]) -> Fingerprint {
    let digest = xxh3_64_with_seed(key, FINGERPRINT_SEED);
    Fingerprint(if digest == 0 { 1 } else { digest })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_produces_zero() {
        for key in [&b""[..], b"a", b"alpha", b"\0\0\0\0"] {
            assert!(!fingerprint_of(key).is_empty());
        }
    }

    #[test]
    fn deterministic_and_distinguishing() {
        assert_eq!(fingerprint_of(b"alpha"), fingerprint_of(b"alpha"));
        assert_ne!(fingerprint_of(b"alpha"), fingerprint_of(b"beta"));
    }
}
