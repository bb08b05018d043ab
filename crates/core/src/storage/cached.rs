//! A bounded read-memoizing decorator over any [`Storage`] (SPEC_FULL.md
//! §4.2). The cache's own bookkeeping is mutex-guarded so the decorator
//! can be shared the same way any other backend is, but per SPEC_FULL.md
//! §4.2 it is **not** safe under concurrent *mutation of the underlying
//! backend through a different handle*: a write that bypasses this
//! decorator leaves stale entries behind. Partition or avoid sharing a
//! cached backend across writers that don't go through it.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::Result;
use crate::hash_tag::HashTag;
use crate::storage::Storage;

struct Cache {
    capacity: usize,
    entries: HashMap<u64, Option<Vec<u8>>>,
    order: VecDeque<u64>,
}

impl Cache {
    fn new(capacity: usize) -> Self {
        Cache {
            capacity,
            entries: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&self, idx: u64) -> Option<&Option<Vec<u8>>> {
        self.entries.get(&idx)
    }

    fn insert(&mut self, idx: u64, value: Option<Vec<u8>>) {
        if self.capacity == 0 {
            return;
        }
        if !self.entries.contains_key(&idx) {
            if self.order.len() >= self.capacity {
                if let Some(evicted) = self.order.pop_front() {
                    self.entries.remove(&evicted);
                }
            }
            self.order.push_back(idx);
        }
        self.entries.insert(idx, value);
    }

    fn invalidate(&mut self, idx: u64) {
        self.entries.remove(&idx);
        if let Some(pos) = self.order.iter().position(|&i| i == idx) {
            self.order.remove(pos);
        }
    }
}

/// Wraps `inner` with a read cache bounded to `capacity` entries keyed by
/// slot index. Writes and clears invalidate the cached entry and always
/// forward to `inner`.
pub struct CachedStorage<S> {
    inner: S,
    cache: Mutex<Cache>,
}

impl<S: Storage> CachedStorage<S> {
    pub fn new(inner: S, capacity: usize) -> Self {
        CachedStorage {
            inner,
            cache: Mutex::new(Cache::new(capacity)),
        }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: Storage> Storage for CachedStorage<S> {
    fn read(&self, idx: u64) -> Option<Vec<u8>> {
        if let Some(cached) = self.cache.lock().expect("cache mutex poisoned").get(idx) {
            return cached.clone();
        }
        let value = self.inner.read(idx);
        self.cache
            .lock()
            .expect("cache mutex poisoned")
            .insert(idx, value.clone());
        value
    }

    fn write(&self, idx: u64, tag: HashTag, bytes: &[u8]) -> Result<()> {
        self.cache.lock().expect("cache mutex poisoned").invalidate(idx);
        self.inner.write(idx, tag, bytes)
    }

    fn clear(&self, idx: u64) -> Result<()> {
        self.cache.lock().expect("cache mutex poisoned").invalidate(idx);
        self.inner.clear(idx)
    }

    fn slot_count(&self) -> u64 {
        self.inner.slot_count()
    }

    fn is_empty(&self, idx: u64) -> bool {
        self.inner.is_empty(idx)
    }

    fn tag_at(&self, idx: u64) -> HashTag {
        self.inner.tag_at(idx)
    }

    fn payload_capacity(&self) -> usize {
        self.inner.payload_capacity()
    }

    fn is_read_only(&self) -> bool {
        self.inner.is_read_only()
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }

    fn rebuilt(&self, slot_count: u64) -> Result<Box<dyn Storage + Send + Sync>> {
        self.inner.rebuilt(slot_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;

    #[test]
    fn read_is_memoized() {
        let backend = MemoryStorage::new(4);
        backend.write(0, HashTag(1), b"v").unwrap();
        let cached = CachedStorage::new(backend, 2);
        assert_eq!(cached.read(0), Some(b"v".to_vec()));
        assert_eq!(cached.read(0), Some(b"v".to_vec()));
    }

    #[test]
    fn write_invalidates_cached_entry() {
        let backend = MemoryStorage::new(4);
        backend.write(0, HashTag(1), b"v1").unwrap();
        let cached = CachedStorage::new(backend, 2);
        assert_eq!(cached.read(0), Some(b"v1".to_vec()));
        cached.write(0, HashTag(2), b"v2").unwrap();
        assert_eq!(cached.read(0), Some(b"v2".to_vec()));
    }

    #[test]
    fn capacity_bound_evicts_oldest() {
        let backend = MemoryStorage::new(4);
        for i in 0..3 {
            backend.write(i, HashTag(1), b"x").unwrap();
        }
        let cached = CachedStorage::new(backend, 2);
        cached.read(0);
        cached.read(1);
        cached.read(2); // evicts slot 0 from the cache
        assert_eq!(cached.cache.lock().unwrap().entries.len(), 2);
    }
}
