//! `maph-hash`: the minimal perfect hash function family — RecSplit, CHD,
//! BBHash, FCH, and PTHash — each satisfying `maph_core::hasher::PerfectHasher`.
//!
//! Every variant shares the same construction contract (SPEC_FULL.md
//! §4.4): deduplicate the build set, partition into buckets, place each
//! bucket within a retry budget or send it to the shared overflow region,
//! and verify every query against a stored fingerprint. What differs
//! between variants is only the placement step — see each module's
//! doc comment.

pub mod bbhash;
pub mod chd;
pub mod common;
pub mod fch;
pub mod format;
pub mod overflow;
pub mod pthash;
pub mod recsplit;

pub use bbhash::{BbHashBuilder, BbHashHasher};
pub use chd::{ChdBuilder, ChdHasher};
pub use fch::{FchBuilder, FchHasher};
pub use pthash::{PtHashBuilder, PtHashHasher};
pub use recsplit::{RecSplitBuilder, RecSplitHasher};

use maph_core::error::{Error, Result};
use maph_core::hasher::PerfectHasher;

use format::{ALGO_BBHASH, ALGO_CHD, ALGO_FCH, ALGO_PTHASH, ALGO_RECSPLIT};

/// Deserialize a `Box<dyn PerfectHasher>` from its portable byte
/// representation, dispatching on the algorithm id in the shared header
/// (SPEC_FULL.md §6).
pub fn deserialize(bytes: &[u8]) -> Result<Box<dyn PerfectHasher>> {
    let (algo_id, _) = format::read_header(bytes)?;
    match algo_id {
        ALGO_RECSPLIT => Ok(Box::new(RecSplitHasher::deserialize(bytes)?)),
        ALGO_CHD => Ok(Box::new(ChdHasher::deserialize(bytes)?)),
        ALGO_BBHASH => Ok(Box::new(BbHashHasher::deserialize(bytes)?)),
        ALGO_FCH => Ok(Box::new(FchHasher::deserialize(bytes)?)),
        ALGO_PTHASH => Ok(Box::new(PtHashHasher::deserialize(bytes)?)),
        other => Err(Error::InvalidFormat(format!("unknown algorithm id {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_round_trips_every_variant() {
        let keys = ["one", "two", "three", "four", "five"];

        let recsplit = RecSplitBuilder::new().add_all(keys).build().unwrap();
        let chd = ChdBuilder::new().add_all(keys).build().unwrap();
        let bbhash = BbHashBuilder::new().add_all(keys).build().unwrap();
        let fch = FchBuilder::new().add_all(keys).build().unwrap();
        let pthash = PtHashBuilder::new().add_all(keys).build().unwrap();

        let variants: Vec<Box<dyn PerfectHasher>> = vec![
            Box::new(recsplit),
            Box::new(chd),
            Box::new(bbhash),
            Box::new(fch),
            Box::new(pthash),
        ];

        for hasher in &variants {
            let bytes = hasher.serialize();
            let restored = deserialize(&bytes).unwrap();
            for key in keys {
                assert_eq!(hasher.slot_for(key.as_bytes()), restored.slot_for(key.as_bytes()));
            }
            assert_eq!(restored.algorithm_name(), hasher.algorithm_name());
        }
    }

    #[test]
    fn unknown_algorithm_id_rejected() {
        let mut w = format::Writer::with_header(99);
        w.write_u64(0);
        let bytes = w.finish();
        assert!(deserialize(&bytes).is_err());
    }
}
