//! Composition of a hasher (perfect or open-addressing) with a
//! [`Storage`] backend into the key→value contract (SPEC_FULL.md §4.6).

use tracing::trace;

use crate::error::{Error, Result};
use crate::hash_tag::hash_tag_of;
use crate::hasher::PerfectHasher;
use crate::open_addressing::OpenAddressingHasher;
use crate::storage::Storage;

/// Which placement strategy a [`Table`] is using.
pub enum HasherMode {
    /// Linear-probe mode, used before a perfect-hash rebuild.
    OpenAddressing(OpenAddressingHasher),
    /// A built perfect hasher (any `maph-hash` variant).
    Perfect(Box<dyn PerfectHasher>),
}

impl HasherMode {
    pub fn max_slots(&self) -> u64 {
        match self {
            HasherMode::OpenAddressing(h) => h.max_slots(),
            HasherMode::Perfect(h) => h.max_slots(),
        }
    }

    pub fn is_perfect(&self) -> bool {
        matches!(self, HasherMode::Perfect(_))
    }
}

/// Slot-usage statistics (SPEC_FULL.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TableStats {
    pub total_slots: u64,
    pub used_slots: u64,
    pub load_factor: f64,
}

/// Composes one [`HasherMode`] with one [`Storage`] backend.
pub struct Table<S> {
    mode: HasherMode,
    storage: S,
}

impl<S: Storage> Table<S> {
    pub fn new(mode: HasherMode, storage: S) -> Self {
        Table { mode, storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn mode(&self) -> &HasherMode {
        &self.mode
    }

    fn locate(&self, key: &[u8]) -> Result<u64> {
        match &self.mode {
            HasherMode::OpenAddressing(hasher) => {
                let tag = hash_tag_of(key);
                for idx in hasher.probe_sequence(key) {
                    if self.storage.is_empty(idx) {
                        return Err(Error::KeyNotFound);
                    }
                    if self.storage.tag_at(idx) == tag {
                        return Ok(idx);
                    }
                }
                Err(Error::KeyNotFound)
            }
            HasherMode::Perfect(hasher) => hasher.slot_for(key).ok_or(Error::KeyNotFound),
        }
    }

    /// Read the value stored under `key`.
    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let idx = self.locate(key)?;
        self.storage.read(idx).ok_or(Error::KeyNotFound)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.get(key).is_ok()
    }

    /// Write `value` under `key`.
    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        match &self.mode {
            HasherMode::OpenAddressing(hasher) => {
                let tag = hash_tag_of(key);
                for idx in hasher.probe_sequence(key) {
                    if self.storage.is_empty(idx) || self.storage.tag_at(idx) == tag {
                        self.storage.write(idx, tag, value)?;
                        return Ok(());
                    }
                }
                Err(Error::TableFull)
            }
            HasherMode::Perfect(hasher) => {
                let idx = hasher.slot_for(key).ok_or(Error::KeyNotFound)?;
                let tag = hash_tag_of(key);
                self.storage.write(idx, tag, value)
            }
        }
    }

    /// Remove `key`, clearing its slot if found.
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        let idx = self.locate(key)?;
        self.storage.clear(idx)?;
        trace!(slot = idx, "cleared slot on remove");
        Ok(())
    }

    /// Full linear scan of empty flags, per SPEC_FULL.md §4.6.
    pub fn stats(&self) -> TableStats {
        let total_slots = self.storage.slot_count();
        let used_slots = (0..total_slots)
            .filter(|&idx| !self.storage.is_empty(idx))
            .count() as u64;
        let load_factor = if total_slots == 0 {
            0.0
        } else {
            used_slots as f64 / total_slots as f64
        };
        TableStats {
            total_slots,
            used_slots,
            load_factor,
        }
    }
}
