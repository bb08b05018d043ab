//! Heap-backed [`Storage`] implementation: one contiguous allocation of
//! `slot_count * SLOT_SIZE` bytes, sliced into [`Slot`] views per access.

use std::cell::UnsafeCell;

use crate::error::{Error, Result};
use crate::hash_tag::HashTag;
use crate::slot::{Slot, SLOT_SIZE};
use crate::storage::Storage;

/// An in-memory slot array. Exists for the pre-persistence path (§4.2) and
/// as the fast fixture for tests and the concurrency scenario in §8.
///
/// The backing allocation is wrapped in [`UnsafeCell`] rather than held as
/// a plain `Box<[u8]>`: every slot access hands [`Slot`] a raw pointer
/// derived from the cell, never from a `&[u8]`, which is what makes the
/// concurrent reads and the single writer's atomic-header writes sound
/// under Rust's aliasing rules.
pub struct MemoryStorage {
    bytes: UnsafeCell<Box<[u8]>>,
    slot_count: u64,
    read_only: bool,
}

// SAFETY: concurrent access to `bytes` goes exclusively through `Slot`'s
// atomic-header read/write protocol, with single-writer discipline
// enforced by callers per `Storage::write`'s contract and SPEC_FULL.md §5.
unsafe impl Sync for MemoryStorage {}

impl MemoryStorage {
    /// Allocate a zeroed in-memory slot array of `slot_count` slots.
    pub fn new(slot_count: u64) -> Self {
        let len = (slot_count as usize)
            .checked_mul(SLOT_SIZE)
            .expect("slot_count * SLOT_SIZE overflows usize");
        MemoryStorage {
            bytes: UnsafeCell::new(vec![0u8; len].into_boxed_slice()),
            slot_count,
            read_only: false,
        }
    }

    fn slot_cell(&self, idx: u64) -> &UnsafeCell<[u8]> {
        let start = idx as usize * SLOT_SIZE;
        // SAFETY: `self.bytes.get()` is a raw pointer derived from the
        // `UnsafeCell`, not from a `&Box<[u8]>`; `as_mut_ptr` only reads
        // the box's (ptr, len) header, which no other code mutates after
        // construction. The resulting sub-slice stays within the
        // allocation for every `idx < slot_count`, and casting a `*mut
        // [u8]` to `*const UnsafeCell<[u8]>` is sound because `UnsafeCell<T>`
        // is guaranteed to have the same layout as `T`.
        unsafe {
            let base = (*self.bytes.get()).as_mut_ptr();
            let slice: *mut [u8] = std::slice::from_raw_parts_mut(base.add(start), SLOT_SIZE);
            &*(slice as *const UnsafeCell<[u8]>)
        }
    }

    fn slot(&self, idx: u64) -> Slot<'_> {
        Slot::new(self.slot_cell(idx))
    }

    fn check_bounds(&self, idx: u64) {
        assert!(idx < self.slot_count, "slot index {idx} out of bounds");
    }
}

impl Storage for MemoryStorage {
    fn read(&self, idx: u64) -> Option<Vec<u8>> {
        self.check_bounds(idx);
        self.slot(idx).read()
    }

    fn write(&self, idx: u64, tag: HashTag, bytes: &[u8]) -> Result<()> {
        self.check_bounds(idx);
        if self.read_only {
            return Err(Error::PermissionDenied);
        }
        // SAFETY: callers uphold the single-writer-per-index contract
        // documented on `Storage::write` and SPEC_FULL.md §5.
        unsafe { self.slot(idx).write(tag, bytes) }
    }

    fn clear(&self, idx: u64) -> Result<()> {
        self.check_bounds(idx);
        if self.read_only {
            return Err(Error::PermissionDenied);
        }
        // SAFETY: same single-writer contract as `write`.
        unsafe { self.slot(idx).clear() };
        Ok(())
    }

    fn slot_count(&self) -> u64 {
        self.slot_count
    }

    fn is_empty(&self, idx: u64) -> bool {
        self.check_bounds(idx);
        self.slot(idx).is_empty()
    }

    fn tag_at(&self, idx: u64) -> HashTag {
        self.check_bounds(idx);
        self.slot(idx).tag()
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn rebuilt(&self, slot_count: u64) -> Result<Box<dyn Storage + Send + Sync>> {
        Ok(Box::new(MemoryStorage::new(slot_count)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_backend_is_all_empty() {
        let storage = MemoryStorage::new(16);
        assert_eq!(storage.slot_count(), 16);
        for i in 0..16 {
            assert!(storage.is_empty(i));
            assert_eq!(storage.read(i), None);
        }
    }

    #[test]
    fn write_then_read_round_trips() {
        let storage = MemoryStorage::new(4);
        storage.write(2, HashTag(9), b"hello").unwrap();
        assert!(!storage.is_empty(2));
        assert_eq!(storage.tag_at(2), HashTag(9));
        assert_eq!(storage.read(2), Some(b"hello".to_vec()));
        assert!(storage.is_empty(0));
    }

    #[test]
    fn clear_empties_slot() {
        let storage = MemoryStorage::new(4);
        storage.write(1, HashTag(3), b"x").unwrap();
        storage.clear(1).unwrap();
        assert!(storage.is_empty(1));
        assert_eq!(storage.read(1), None);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn out_of_bounds_panics() {
        let storage = MemoryStorage::new(2);
        storage.read(5);
    }
}
