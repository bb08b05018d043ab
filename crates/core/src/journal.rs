//! Append-only record of the live key set (SPEC_FULL.md §4.7). Feeds a
//! perfect-hash rebuild; never consulted on `get`.

use std::collections::BTreeSet;
use std::sync::Mutex;

use crate::error::Result;
use crate::table::Table;

/// The live key set, in insertion order for display purposes but queried
/// as a set (`keys()` returns a sorted, deduplicated list).
#[derive(Debug, Default)]
pub struct Journal {
    keys: Mutex<BTreeSet<Vec<u8>>>,
}

impl Journal {
    pub fn new() -> Self {
        Journal {
            keys: Mutex::new(BTreeSet::new()),
        }
    }

    /// Idempotent on duplicate keys.
    pub fn record_insert(&self, key: &[u8]) {
        self.keys.lock().expect("journal mutex poisoned").insert(key.to_vec());
    }

    pub fn record_remove(&self, key: &[u8]) {
        self.keys.lock().expect("journal mutex poisoned").remove(key);
    }

    /// The current live key set, in ascending byte order.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        self.keys
            .lock()
            .expect("journal mutex poisoned")
            .iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.keys.lock().expect("journal mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.keys.lock().expect("journal mutex poisoned").clear();
    }
}

/// Decorates a [`Table`] so every successful `set`/`remove` also updates a
/// [`Journal`]. The journal is not consulted on `get`, so reads pass
/// straight through.
pub struct JournaledTable<S> {
    table: Table<S>,
    journal: Journal,
}

impl<S: crate::storage::Storage> JournaledTable<S> {
    pub fn new(table: Table<S>) -> Self {
        JournaledTable {
            table,
            journal: Journal::new(),
        }
    }

    /// Build a journaled table from an already-populated journal, used by
    /// `optimize()` to carry the live key set over to the rebuilt table.
    pub fn from_parts(table: Table<S>, journal: Journal) -> Self {
        JournaledTable { table, journal }
    }

    pub fn table(&self) -> &Table<S> {
        &self.table
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.table.get(key)
    }

    pub fn contains(&self, key: &[u8]) -> bool {
        self.table.contains(key)
    }

    pub fn set(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.table.set(key, value)?;
        self.journal.record_insert(key);
        Ok(())
    }

    pub fn remove(&self, key: &[u8]) -> Result<()> {
        self.table.remove(key)?;
        self.journal.record_remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::open_addressing::OpenAddressingHasher;
    use crate::storage::memory::MemoryStorage;
    use crate::table::HasherMode;

    fn journaled_table(slot_count: u64) -> JournaledTable<MemoryStorage> {
        JournaledTable::new(Table::new(
            HasherMode::OpenAddressing(OpenAddressingHasher::new(slot_count, 10)),
            MemoryStorage::new(slot_count),
        ))
    }

    #[test]
    fn journal_tracks_inserts_and_removes() {
        let jt = journaled_table(64);
        jt.set(b"alpha", b"1").unwrap();
        jt.set(b"beta", b"2").unwrap();
        assert_eq!(jt.journal().len(), 2);

        jt.remove(b"alpha").unwrap();
        assert_eq!(jt.journal().keys(), vec![b"beta".to_vec()]);
    }

    #[test]
    fn journal_fidelity_matches_live_keys() {
        let jt = journaled_table(64);
        for (k, v) in [(&b"a"[..], &b"1"[..]), (b"b", b"2"), (b"c", b"3")] {
            jt.set(k, v).unwrap();
        }
        jt.remove(b"b").unwrap();
        jt.set(b"b", b"22").unwrap();

        let mut journaled: Vec<Vec<u8>> = jt.journal().keys();
        journaled.sort();
        let mut live: Vec<Vec<u8>> = vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()];
        live.sort();
        assert_eq!(journaled, live);
        for key in &live {
            assert!(jt.contains(key));
        }
    }

    #[test]
    fn duplicate_insert_is_idempotent() {
        let journal = Journal::new();
        journal.record_insert(b"x");
        journal.record_insert(b"x");
        assert_eq!(journal.len(), 1);
    }
}
