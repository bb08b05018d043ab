//! The public facade (SPEC_FULL.md §4.8): layers `get`/`set`/`remove`/
//! `optimize`/stats over a [`Table`], layering domain operations over
//! lower-level stores — with `tracing` at the state transitions an
//! operator cares about, and explicit rollback on `optimize` failure
//! rather than a panic.

use std::sync::{Arc, RwLock};

use tracing::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::hasher::PerfectHasher;
use crate::journal::{Journal, JournaledTable};
use crate::open_addressing::OpenAddressingHasher;
use crate::storage::cached::CachedStorage;
use crate::storage::{BoxedStorage, Storage};
use crate::table::{HasherMode, Table};

/// Builds a perfect-hash variant from a key set. Implemented by algorithm
/// crates (`maph-hash`) so this crate never needs to depend on them;
/// `optimize()` takes the builder as an explicit argument rather than
/// storing one, keeping `maph-core` free of any particular MPHF choice.
pub trait HasherBuilder {
    fn build(&self, keys: &[Vec<u8>]) -> Result<Box<dyn PerfectHasher>>;
}

enum Backing {
    Journaled(JournaledTable<BoxedStorage>),
    Plain(Table<BoxedStorage>),
}

impl Backing {
    fn table(&self) -> &Table<BoxedStorage> {
        match self {
            Backing::Journaled(jt) => jt.table(),
            Backing::Plain(t) => t,
        }
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        match self {
            Backing::Journaled(jt) => jt.get(key),
            Backing::Plain(t) => t.get(key),
        }
    }

    fn contains(&self, key: &[u8]) -> bool {
        match self {
            Backing::Journaled(jt) => jt.contains(key),
            Backing::Plain(t) => t.contains(key),
        }
    }

    fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        match self {
            Backing::Journaled(jt) => jt.set(key, value),
            Backing::Plain(t) => t.set(key, value),
        }
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        match self {
            Backing::Journaled(jt) => jt.remove(key),
            Backing::Plain(t) => t.remove(key),
        }
    }

    fn journal(&self) -> Option<&Journal> {
        match self {
            Backing::Journaled(jt) => Some(jt.journal()),
            Backing::Plain(_) => None,
        }
    }
}

/// Wraps `storage` in a [`CachedStorage`] when the config asks for it
/// (SPEC_FULL.md §4.8's `enable-cache`/`cache-size`). The decorator is not
/// safe to share across a mutating peer that bypasses it (SPEC_FULL.md
/// §4.2); that's fine here since the facade is the only handle onto this
/// storage instance.
fn wrap_cache(storage: BoxedStorage, config: &Config) -> BoxedStorage {
    if config.enable_cache {
        Box::new(CachedStorage::new(storage, config.cache_size))
    } else {
        storage
    }
}

/// The top-level store. Generic over nothing — storage is type-erased
/// behind [`BoxedStorage`] so the same facade serves both the in-memory
/// and memory-mapped backends (SPEC_FULL.md §9: "trait-object indirection
/// at the facade is acceptable for type erasure").
pub struct Maph {
    backing: RwLock<Arc<Backing>>,
    config: Config,
}

impl Maph {
    /// Build a facade over an already-constructed storage backend, in
    /// open-addressing mode (the pre-optimize state).
    pub fn new(storage: BoxedStorage, config: Config) -> Result<Self> {
        config.validate()?;
        let storage = wrap_cache(storage, &config);
        let hasher = OpenAddressingHasher::new(storage.slot_count(), config.max_probes);
        let table = Table::new(HasherMode::OpenAddressing(hasher), storage);
        let backing = if config.enable_journal {
            Backing::Journaled(JournaledTable::new(table))
        } else {
            Backing::Plain(table)
        };
        info!(
            slot_count = config.slot_count,
            max_probes = config.max_probes,
            "opened maph table"
        );
        Ok(Maph {
            backing: RwLock::new(Arc::new(backing)),
            config,
        })
    }

    fn snapshot(&self) -> Arc<Backing> {
        Arc::clone(&self.backing.read().expect("backing lock poisoned"))
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.snapshot().get(key)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.snapshot().contains(key)
    }

    pub fn get_or(&self, key: &[u8], default: Vec<u8>) -> Vec<u8> {
        self.get(key).unwrap_or(default)
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.snapshot().set(key, value)
    }

    pub fn remove(&self, key: &[u8]) -> Result<()> {
        self.snapshot().remove(key)
    }

    /// Read `key`, apply `f` to the current value, and write the result
    /// back. Returns `false` (no write) if `key` is absent; never creates
    /// a key that didn't already exist.
    pub fn update(&self, key: &[u8], f: impl FnOnce(&[u8]) -> Vec<u8>) -> Result<bool> {
        let snapshot = self.snapshot();
        let current = match snapshot.get(key) {
            Ok(value) => value,
            Err(Error::KeyNotFound) => return Ok(false),
            Err(e) => return Err(e),
        };
        let updated = f(&current);
        snapshot.set(key, &updated)?;
        Ok(true)
    }

    /// Best-effort batch write. Not atomic across keys (SPEC_FULL.md §4.8,
    /// §9): writes already applied before a failing entry are retained.
    pub fn set_all<I>(&self, pairs: I) -> Result<()>
    where
        I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    {
        let snapshot = self.snapshot();
        for (key, value) in pairs {
            snapshot.set(&key, &value)?;
        }
        Ok(())
    }

    /// Rebuild the hasher as a perfect-hash variant over the journal's key
    /// set, copy live values into a freshly sized backing, and atomically
    /// swap it in. On any failure the pre-optimize table is left
    /// untouched.
    pub fn optimize(&self, builder: &dyn HasherBuilder) -> Result<()> {
        let snapshot = self.snapshot();
        let journal = snapshot.journal().ok_or_else(|| {
            Error::OptimizationFailed("journal disabled; no key set to rebuild from".into())
        })?;
        let keys = journal.keys();
        if keys.is_empty() {
            return Err(Error::OptimizationFailed("no live keys to rebuild from".into()));
        }

        info!(algorithm = "perfect-hash", key_count = keys.len(), "optimize: start");

        let hasher = builder.build(&keys).map_err(|e| {
            Error::OptimizationFailed(format!("hasher build failed: {e}"))
        })?;
        let stats = hasher.statistics();
        if stats.overflow_count > keys.len() as u64 / 4 {
            warn!(
                overflow = stats.overflow_count,
                perfect = stats.perfect_count,
                "optimize: larger overflow region than expected"
            );
        }

        let new_storage = snapshot
            .table()
            .storage()
            .rebuilt(hasher.max_slots())
            .map_err(|e| Error::OptimizationFailed(format!("storage rebuild failed: {e}")))?;
        let new_storage = wrap_cache(new_storage, &self.config);

        let new_table = Table::new(HasherMode::Perfect(hasher), new_storage);
        for key in &keys {
            let value = snapshot.get(key)?;
            new_table
                .set(key, &value)
                .map_err(|e| Error::OptimizationFailed(format!("re-insert failed: {e}")))?;
        }

        let new_journal = Journal::new();
        for key in &keys {
            new_journal.record_insert(key);
        }
        let new_backing = if self.config.enable_journal {
            Backing::Journaled(JournaledTable::from_parts(new_table, new_journal))
        } else {
            Backing::Plain(new_table)
        };

        *self.backing.write().expect("backing lock poisoned") = Arc::new(new_backing);
        info!(
            perfect = stats.perfect_count,
            overflow = stats.overflow_count,
            "optimize: finished"
        );
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.snapshot().table().stats().used_slots
    }

    pub fn load_factor(&self) -> f64 {
        self.snapshot().table().stats().load_factor
    }

    pub fn empty(&self) -> bool {
        self.size() == 0
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::HasherStatistics;
    use crate::storage::memory::MemoryStorage;

    fn memory_facade(slot_count: u64) -> Maph {
        let config = Config {
            slot_count,
            ..Config::default()
        };
        Maph::new(Box::new(MemoryStorage::new(slot_count)), config).unwrap()
    }

    #[test]
    fn basic_round_trip_scenario() {
        let maph = memory_facade(64);
        maph.set(b"alpha", b"1").unwrap();
        maph.set(b"beta", b"2").unwrap();
        maph.set(b"gamma", b"3").unwrap();

        assert_eq!(maph.get(b"alpha").unwrap(), b"1");
        assert_eq!(maph.get(b"beta").unwrap(), b"2");
        assert_eq!(maph.get(b"gamma").unwrap(), b"3");
        assert!(matches!(maph.get(b"delta"), Err(Error::KeyNotFound)));
    }

    #[test]
    fn update_scenario() {
        let maph = memory_facade(64);
        maph.set(b"alpha", b"1").unwrap();
        maph.set(b"beta", b"2").unwrap();
        maph.set(b"gamma", b"3").unwrap();
        maph.set(b"beta", b"22").unwrap();
        assert_eq!(maph.get(b"beta").unwrap(), b"22");
        assert_eq!(maph.size(), 3);
    }

    #[test]
    fn remove_then_reinsert_scenario() {
        let maph = memory_facade(64);
        maph.set(b"beta", b"2").unwrap();
        maph.remove(b"beta").unwrap();
        assert!(matches!(maph.get(b"beta"), Err(Error::KeyNotFound)));
        maph.set(b"beta", b"222").unwrap();
        assert_eq!(maph.get(b"beta").unwrap(), b"222");
    }

    #[test]
    fn get_or_returns_default_on_miss() {
        let maph = memory_facade(16);
        assert_eq!(maph.get_or(b"missing", b"fallback".to_vec()), b"fallback");
        maph.set(b"present", b"value").unwrap();
        assert_eq!(maph.get_or(b"present", b"fallback".to_vec()), b"value");
    }

    #[test]
    fn update_without_existing_key_returns_false() {
        let maph = memory_facade(16);
        let applied = maph.update(b"missing", |_| b"x".to_vec()).unwrap();
        assert!(!applied);
    }

    #[test]
    fn update_applies_function_to_existing_value() {
        let maph = memory_facade(16);
        maph.set(b"counter", b"1").unwrap();
        let applied = maph.update(b"counter", |v| {
            let n: u32 = std::str::from_utf8(v).unwrap().parse().unwrap();
            (n + 1).to_string().into_bytes()
        }).unwrap();
        assert!(applied);
        assert_eq!(maph.get(b"counter").unwrap(), b"2");
    }

    #[test]
    fn set_all_is_best_effort_and_retains_partial_progress() {
        let maph = memory_facade(2);
        let pairs = vec![
            (b"a".to_vec(), b"1".to_vec()),
            (b"b".to_vec(), b"2".to_vec()),
        ];
        maph.set_all(pairs).unwrap();
        assert_eq!(maph.get(b"a").unwrap(), b"1");
        assert_eq!(maph.get(b"b").unwrap(), b"2");
    }

    struct FixedHasher {
        slots: std::collections::HashMap<Vec<u8>, u64>,
    }

    impl PerfectHasher for FixedHasher {
        fn slot_for(&self, key: &[u8]) -> Option<u64> {
            self.slots.get(key).copied()
        }
        fn max_slots(&self) -> u64 {
            self.slots.len() as u64
        }
        fn statistics(&self) -> HasherStatistics {
            HasherStatistics {
                perfect_count: self.slots.len() as u64,
                overflow_count: 0,
                bits_per_key: 8.0,
                memory_bytes: self.slots.len() * 8,
            }
        }
        fn serialize(&self) -> Vec<u8> {
            Vec::new()
        }
        fn algorithm_name(&self) -> &'static str {
            "fixed-test-hasher"
        }
    }

    struct FixedBuilder;
    impl HasherBuilder for FixedBuilder {
        fn build(&self, keys: &[Vec<u8>]) -> Result<Box<dyn PerfectHasher>> {
            let slots = keys
                .iter()
                .enumerate()
                .map(|(i, k)| (k.clone(), i as u64))
                .collect();
            Ok(Box::new(FixedHasher { slots }))
        }
    }

    #[test]
    fn optimize_preserves_values_under_a_new_hasher() {
        let maph = memory_facade(64);
        maph.set(b"alpha", b"1").unwrap();
        maph.set(b"beta", b"2").unwrap();
        maph.set(b"gamma", b"3").unwrap();

        maph.optimize(&FixedBuilder).unwrap();

        assert_eq!(maph.get(b"alpha").unwrap(), b"1");
        assert_eq!(maph.get(b"beta").unwrap(), b"2");
        assert_eq!(maph.get(b"gamma").unwrap(), b"3");
    }

    #[test]
    fn enable_cache_wraps_storage_transparently() {
        let config = Config {
            slot_count: 16,
            enable_cache: true,
            cache_size: 4,
            ..Config::default()
        };
        let maph = Maph::new(Box::new(MemoryStorage::new(16)), config).unwrap();
        maph.set(b"alpha", b"1").unwrap();
        assert_eq!(maph.get(b"alpha").unwrap(), b"1");
        maph.set(b"alpha", b"2").unwrap();
        assert_eq!(maph.get(b"alpha").unwrap(), b"2");
    }

    #[test]
    fn optimize_without_journal_fails() {
        let config = Config {
            slot_count: 16,
            enable_journal: false,
            ..Config::default()
        };
        let maph = Maph::new(Box::new(MemoryStorage::new(16)), config).unwrap();
        maph.set(b"alpha", b"1").unwrap();
        assert!(matches!(
            maph.optimize(&FixedBuilder),
            Err(Error::OptimizationFailed(_))
        ));
    }
}
