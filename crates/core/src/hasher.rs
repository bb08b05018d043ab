//! The capability-based perfect-hash abstraction called for in
//! SPEC_FULL.md §9: a trait with `slot_for`, `max_slots`, `statistics`,
//! `serialize`, satisfied by every variant in `maph-hash` (RecSplit, CHD,
//! BBHash, PTHash, FCH). Runtime variant selection then uses a
//! `Box<dyn PerfectHasher>` rather than a class hierarchy.

/// Bits-per-key and placement statistics for a built perfect hasher
/// (SPEC_FULL.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HasherStatistics {
    pub perfect_count: u64,
    pub overflow_count: u64,
    pub bits_per_key: f64,
    pub memory_bytes: usize,
}

impl HasherStatistics {
    pub fn total_count(&self) -> u64 {
        self.perfect_count + self.overflow_count
    }
}

/// Shared query contract for every minimal-perfect-hash variant
/// (SPEC_FULL.md §4.4). Implementations live in `maph-hash`; this trait
/// lives in `maph-core` so [`crate::table::Table`] can compose any variant
/// without a dependency cycle.
pub trait PerfectHasher: Send + Sync {
    /// The slot a key was placed at during construction, or `None` if the
    /// key was never in the build set (subject to the fingerprint false
    /// positive rate, ~2⁻⁶⁴).
    fn slot_for(&self, key: &[u8]) -> Option<u64>;

    /// Number of slots the owning storage must provide:
    /// `perfect_count + overflow_count`.
    fn max_slots(&self) -> u64;

    /// Bits-per-key, footprint, and perfect/overflow counts.
    fn statistics(&self) -> HasherStatistics;

    /// Serialize to the portable byte format of SPEC_FULL.md §6.
    fn serialize(&self) -> Vec<u8>;

    /// Short algorithm name, used in `optimize()` log events.
    fn algorithm_name(&self) -> &'static str;
}
