//! The storage backend contract (SPEC_FULL.md §4.2): owns a fixed-size
//! slot array, memory-mapped or heap-backed, decorable with a bounded
//! cache.

pub mod cached;
pub mod memory;

use crate::error::Result;
use crate::hash_tag::HashTag;

/// A fixed-size slot array. Implementors own the backing bytes (heap or
/// memory-mapped file) and expose the per-slot operations the [`crate::table::Table`]
/// composes with a hasher.
///
/// Every method takes `&self`: concurrent readers and a single writer share
/// one backend by reference, relying on the tear-free atomic protocol in
/// [`crate::slot::Slot`] rather than a lock. Enforcing single-writer
/// discipline is the caller's responsibility (SPEC_FULL.md §5).
pub trait Storage {
    /// Read the value stored at `idx`, or `None` if the slot is empty or
    /// caught mid-write after exhausting retries.
    fn read(&self, idx: u64) -> Option<Vec<u8>>;

    /// Write `bytes` under `tag` at `idx`. Fails with
    /// [`crate::error::Error::ValueTooLarge`] if `bytes` exceeds the
    /// backend's payload capacity, or with
    /// [`crate::error::Error::PermissionDenied`] if the backend is
    /// read-only.
    fn write(&self, idx: u64, tag: HashTag, bytes: &[u8]) -> Result<()>;

    /// Mark the slot at `idx` empty.
    fn clear(&self, idx: u64) -> Result<()>;

    /// Total number of slots this backend provides.
    fn slot_count(&self) -> u64;

    /// Whether the slot at `idx` is currently empty.
    fn is_empty(&self, idx: u64) -> bool;

    /// The hash tag currently stored at `idx` (`0` if empty).
    fn tag_at(&self, idx: u64) -> HashTag;

    /// Payload capacity per slot, in bytes.
    fn payload_capacity(&self) -> usize {
        crate::slot::PAYLOAD_CAPACITY
    }

    /// Whether writes to this backend are rejected.
    fn is_read_only(&self) -> bool {
        false
    }

    /// Optional durability hint (`msync`-style). A no-op for backends with
    /// no notion of "flush" (e.g. the in-memory backend).
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Produce a fresh, empty backend of the same kind sized for
    /// `slot_count` slots. Used by `optimize()` (SPEC_FULL.md §4.8) to
    /// build the replacement backing before the atomic swap; for a
    /// memory-mapped backend this recreates the underlying file, for the
    /// in-memory backend it is a plain reallocation.
    fn rebuilt(&self, slot_count: u64) -> Result<Box<dyn Storage + Send + Sync>>;
}

impl Storage for Box<dyn Storage + Send + Sync> {
    fn read(&self, idx: u64) -> Option<Vec<u8>> {
        (**self).read(idx)
    }

    fn write(&self, idx: u64, tag: HashTag, bytes: &[u8]) -> Result<()> {
        (**self).write(idx, tag, bytes)
    }

    fn clear(&self, idx: u64) -> Result<()> {
        (**self).clear(idx)
    }

    fn slot_count(&self) -> u64 {
        (**self).slot_count()
    }

    fn is_empty(&self, idx: u64) -> bool {
        (**self).is_empty(idx)
    }

    fn tag_at(&self, idx: u64) -> HashTag {
        (**self).tag_at(idx)
    }

    fn payload_capacity(&self) -> usize {
        (**self).payload_capacity()
    }

    fn is_read_only(&self) -> bool {
        (**self).is_read_only()
    }

    fn flush(&self) -> Result<()> {
        (**self).flush()
    }

    fn rebuilt(&self, slot_count: u64) -> Result<Box<dyn Storage + Send + Sync>> {
        (**self).rebuilt(slot_count)
    }
}

/// Convenience alias for the type-erased storage handle the facade holds.
pub type BoxedStorage = Box<dyn Storage + Send + Sync>;
