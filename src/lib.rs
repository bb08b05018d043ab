//! `maph`: a single-file, memory-mapped key→value store backed by a
//! family of minimal perfect hash functions (SPEC_FULL.md §1).
//!
//! This crate is the thin top-level wiring the workspace's `-core`,
//! `-hash`, and `-storage-mmap` crates into one public surface, the way
//! a root `dolos` crate re-exports its `crates/*` satellites behind one
//! dependency. [`Maph`] is the facade readers and
//! writers actually hold; [`Algorithm`]/[`Optimizer`] select which
//! perfect-hash variant an [`Maph::optimize`] call builds.
//!
//! ```no_run
//! use maph::{Algorithm, Config, Maph, Optimizer};
//!
//! let maph = Maph::create_memory(Config { slot_count: 1024, ..Default::default() }).unwrap();
//! maph.set(b"alpha", b"1").unwrap();
//! assert_eq!(maph.get(b"alpha").unwrap(), b"1");
//!
//! // Once the key set is known to be stable, compile it into a perfect hash.
//! maph.optimize(&Optimizer::new(Algorithm::RecSplit)).unwrap();
//! assert_eq!(maph.get(b"alpha").unwrap(), b"1");
//! ```

use std::ops::Deref;
use std::path::Path;

pub use maph_core::config::Config;
pub use maph_core::error::{Error, Result};
pub use maph_core::facade::HasherBuilder;
pub use maph_core::hasher::{HasherStatistics, PerfectHasher};
pub use maph_core::storage::{BoxedStorage, Storage};

pub use maph_hash::{
    BbHashBuilder, BbHashHasher, ChdBuilder, ChdHasher, FchBuilder, FchHasher, PtHashBuilder,
    PtHashHasher, RecSplitBuilder, RecSplitHasher,
};

use maph_core::storage::memory::MemoryStorage;
use maph_storage_mmap::MmapStorage;

/// Which perfect-hash variant an [`Optimizer`] builds (SPEC_FULL.md §4.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    RecSplit,
    Chd,
    BbHash,
    Fch,
    PtHash,
}

/// A [`HasherBuilder`] that dispatches to one of the five variants in
/// `maph-hash`, with an optional seed override shared across variants.
/// Per-variant tuning (leaf size, load factor, retry budgets, ...) is
/// exposed on the variant's own builder in `maph-hash` directly; `Optimizer`
/// covers the common case of "just pick an algorithm" that
/// [`Maph::optimize`] needs.
pub struct Optimizer {
    algorithm: Algorithm,
    seed: Option<u64>,
}

impl Optimizer {
    pub fn new(algorithm: Algorithm) -> Self {
        Optimizer {
            algorithm,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

impl HasherBuilder for Optimizer {
    fn build(&self, keys: &[Vec<u8>]) -> Result<Box<dyn PerfectHasher>> {
        let keys = keys.to_vec();
        match self.algorithm {
            Algorithm::RecSplit => {
                let mut b = RecSplitBuilder::new().add_all(keys);
                if let Some(seed) = self.seed {
                    b = b.with_seed(seed);
                }
                Ok(Box::new(b.build()?))
            }
            Algorithm::Chd => {
                let mut b = ChdBuilder::new().add_all(keys);
                if let Some(seed) = self.seed {
                    b = b.with_seed(seed);
                }
                Ok(Box::new(b.build()?))
            }
            Algorithm::BbHash => {
                let mut b = BbHashBuilder::new().add_all(keys);
                if let Some(seed) = self.seed {
                    b = b.with_seed(seed);
                }
                Ok(Box::new(b.build()?))
            }
            Algorithm::Fch => {
                let mut b = FchBuilder::new().add_all(keys);
                if let Some(seed) = self.seed {
                    b = b.with_seed(seed);
                }
                Ok(Box::new(b.build()?))
            }
            Algorithm::PtHash => {
                let mut b = PtHashBuilder::new().add_all(keys);
                if let Some(seed) = self.seed {
                    b = b.with_seed(seed);
                }
                Ok(Box::new(b.build()?))
            }
        }
    }
}

/// Deserialize a previously-[`PerfectHasher::serialize`]d hasher,
/// dispatching on the algorithm id in its header (SPEC_FULL.md §6).
pub fn deserialize_hasher(bytes: &[u8]) -> Result<Box<dyn PerfectHasher>> {
    maph_hash::deserialize(bytes)
}

/// The top-level store (SPEC_FULL.md §4.8). Wraps [`maph_core::facade::Maph`],
/// adding the two concrete storage constructors (memory-mapped and heap)
/// the core crate deliberately stays agnostic of so it never depends on
/// `maph-storage-mmap`.
pub struct Maph(maph_core::facade::Maph);

impl Deref for Maph {
    type Target = maph_core::facade::Maph;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Maph {
    /// Create a new memory-mapped table at `path`, sized per `config.slot_count`.
    pub fn create(path: impl AsRef<Path>, config: Config) -> Result<Self> {
        config.validate()?;
        let storage = MmapStorage::create(path, config.slot_count)?;
        Ok(Maph(maph_core::facade::Maph::new(
            Box::new(storage),
            config,
        )?))
    }

    /// Open an existing memory-mapped table at `path`.
    ///
    /// `readonly` controls whether writes are rejected
    /// ([`Error::PermissionDenied`]) at the storage layer; the slot count
    /// in `Config` is overridden by the value recorded in the file header.
    pub fn open(path: impl AsRef<Path>, readonly: bool) -> Result<Self> {
        let storage = MmapStorage::open(path, readonly)?;
        let config = Config {
            slot_count: storage.slot_count(),
            ..Config::default()
        };
        Ok(Maph(maph_core::facade::Maph::new(
            Box::new(storage),
            config,
        )?))
    }

    /// Create a heap-backed table, sized per `config.slot_count`. No file
    /// is created; the table does not outlive the process.
    pub fn create_memory(config: Config) -> Result<Self> {
        config.validate()?;
        let storage = MemoryStorage::new(config.slot_count);
        Ok(Maph(maph_core::facade::Maph::new(
            Box::new(storage),
            config,
        )?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_basic_round_trip() {
        let maph = Maph::create_memory(Config {
            slot_count: 64,
            ..Config::default()
        })
        .unwrap();
        maph.set(b"alpha", b"1").unwrap();
        maph.set(b"beta", b"2").unwrap();
        maph.set(b"gamma", b"3").unwrap();

        assert_eq!(maph.get(b"alpha").unwrap(), b"1");
        assert_eq!(maph.get(b"beta").unwrap(), b"2");
        assert_eq!(maph.get(b"gamma").unwrap(), b"3");
        assert!(matches!(maph.get(b"delta"), Err(Error::KeyNotFound)));
    }

    #[test]
    fn optimize_swaps_in_a_perfect_hasher() {
        let maph = Maph::create_memory(Config {
            slot_count: 16,
            ..Config::default()
        })
        .unwrap();
        let keys: [&[u8]; 6] = [b"alpha", b"beta", b"gamma", b"delta", b"epsilon", b"zeta"];
        for (i, key) in keys.iter().enumerate() {
            maph.set(key, i.to_string().as_bytes()).unwrap();
        }

        maph.optimize(&Optimizer::new(Algorithm::RecSplit)).unwrap();

        for (i, key) in keys.iter().enumerate() {
            assert_eq!(maph.get(key).unwrap(), i.to_string().as_bytes());
        }
        assert!(matches!(maph.get(b"eta"), Err(Error::KeyNotFound)));
    }
}
