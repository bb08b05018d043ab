//! The overflow region every variant falls back to when a bucket can't be
//! placed within its retry budget (SPEC_FULL.md §4.4). A parallel vector
//! of `(fingerprint, slot_index)` pairs, linear-scanned on query; a SIMD
//! implementation is a drop-in replacement for `find` (SPEC_FULL.md §9)
//! but correctness never depends on it, so this crate ships the scalar
//! fallback only.

use maph_core::fingerprint::Fingerprint;

#[derive(Debug, Clone, Default)]
pub struct OverflowRegion {
    fingerprints: Vec<u64>,
    slots: Vec<u64>,
}

impl OverflowRegion {
    pub fn new() -> Self {
        OverflowRegion::default()
    }

    pub fn push(&mut self, fingerprint: Fingerprint, slot: u64) {
        self.fingerprints.push(fingerprint.get());
        self.slots.push(slot);
    }

    pub fn len(&self) -> usize {
        self.fingerprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fingerprints.is_empty()
    }

    /// Scalar linear scan for `fingerprint`. Four-wide unrolled so an
    /// autovectorizer has an easy time; still correct with SIMD disabled.
    pub fn find(&self, fingerprint: Fingerprint) -> Option<u64> {
        let target = fingerprint.get();
        let chunks = self.fingerprints.chunks_exact(4);
        let remainder = chunks.remainder();
        let mut offset = 0;
        for chunk in chunks {
            for (i, &fp) in chunk.iter().enumerate() {
                if fp == target {
                    return Some(self.slots[offset + i]);
                }
            }
            offset += 4;
        }
        for (i, &fp) in remainder.iter().enumerate() {
            if fp == target {
                return Some(self.slots[offset + i]);
            }
        }
        None
    }

    pub fn fingerprints(&self) -> &[u64] {
        &self.fingerprints
    }

    pub fn slots(&self) -> &[u64] {
        &self.slots
    }

    pub fn from_parts(fingerprints: Vec<u64>, slots: Vec<u64>) -> Self {
        OverflowRegion { fingerprints, slots }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_pushed_entries() {
        let mut region = OverflowRegion::new();
        for i in 0..10u64 {
            region.push(Fingerprint::from(i + 1), 100 + i);
        }
        assert_eq!(region.find(Fingerprint::from(5)), Some(104));
        assert_eq!(region.find(Fingerprint::from(999)), None);
    }

    #[test]
    fn empty_region_finds_nothing() {
        let region = OverflowRegion::new();
        assert_eq!(region.find(Fingerprint::from(1)), None);
    }
}
