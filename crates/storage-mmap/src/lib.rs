//! Memory-mapped [`maph_core::storage::Storage`] backend (SPEC_FULL.md
//! §4.2, §6).
//!
//! Owns a file laid out as a fixed 512-byte header block followed by
//! `slot_count` contiguous [`maph_core::slot::Slot`]-sized records. Reads
//! and writes go through the same tear-free atomic slot protocol as
//! [`maph_core::storage::memory::MemoryStorage`]; the only difference is
//! that the backing bytes live in a file mapping instead of on the heap,
//! the way `examples/DanDo385-rust-edu/labs/38-memmap-search` maps a file
//! once and treats it as a byte slice, and the way
//! `examples/other_examples/48e51011_artemonad-QuiverDB__src-db-core.rs.rs`
//! validates a header before trusting the rest of a mapped file.

use std::cell::UnsafeCell;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use memmap2::{Mmap, MmapMut};
use tracing::{debug, warn};

use maph_core::error::{Error, Result};
use maph_core::hash_tag::HashTag;
use maph_core::slot::{Slot, SLOT_SIZE};
use maph_core::storage::Storage;

/// Size of the file header block (SPEC_FULL.md §6).
pub const HEADER_SIZE: usize = 512;

/// `"MAPH"`, the four-byte magic at the start of every file.
pub const MAGIC: &[u8; 4] = b"MAPH";

/// File format version. Bumped if the header layout ever changes.
pub const FORMAT_VERSION: u32 = 1;

const MAGIC_OFFSET: usize = 0;
const VERSION_OFFSET: usize = 4;
const SLOT_COUNT_OFFSET: usize = 8;
const GENERATION_OFFSET: usize = 24;

/// Either a read-write or a read-only memory mapping. Kept alive purely as
/// the owner of the mapped memory; once `MmapStorage` is constructed, byte
/// access never goes back through this type's `Deref<[u8]>` (that would
/// hand out a `&[u8]`/`&mut [u8]` aliasing memory a concurrent writer may
/// be touching). Instead `MmapStorage` caches the mapping's base pointer
/// directly off `MmapMut`/`Mmap`'s own inherent pointer accessors, which
/// read the mapping's internal (pointer, length) fields rather than
/// deriving through a slice reference.
enum Mapping {
    ReadWrite(MmapMut),
    ReadOnly(Mmap),
}

/// A single-file, memory-mapped slot array.
pub struct MmapStorage {
    path: PathBuf,
    /// Kept only to own the mapping for its lifetime and to flush it;
    /// never sliced for byte access after construction.
    mapping: Mapping,
    /// Raw pointer to the start of the mapping (header + slot array),
    /// valid for as long as `mapping` is alive. Every [`Slot`] handed out
    /// by this backend is built from a cast over this pointer, never from
    /// a `&[u8]`.
    base: *mut u8,
    slot_count: u64,
    read_only: bool,
}

// SAFETY: `base` is a raw pointer into memory this type exclusively owns
// via `mapping`. All concurrent access to it goes through `Slot`'s atomic
// header protocol or the generation counter's own `AtomicU64`, with
// single-writer discipline enforced by callers per `Storage::write`'s
// contract and SPEC_FULL.md §5 — the same contract `MemoryStorage` relies
// on for its manual `Sync` impl.
unsafe impl Send for MmapStorage {}
unsafe impl Sync for MmapStorage {}

fn total_len(slot_count: u64) -> u64 {
    HEADER_SIZE as u64 + slot_count * SLOT_SIZE as u64
}

impl MmapStorage {
    /// Create a new backing file at `path` sized for `slot_count` slots,
    /// write its header, and map it read-write.
    ///
    /// Truncates and overwrites any existing file at `path`.
    pub fn create(path: impl AsRef<Path>, slot_count: u64) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        file.set_len(total_len(slot_count))?;

        let mut mmap = unsafe { MmapMut::map_mut(&file)? };
        // Sound here even though `MmapStorage` later treats this memory as
        // `UnsafeCell`-backed: `mmap` is still exclusively owned by this
        // local binding, with no other handle onto the mapping in
        // existence yet.
        mmap[MAGIC_OFFSET..MAGIC_OFFSET + 4].copy_from_slice(MAGIC);
        mmap[VERSION_OFFSET..VERSION_OFFSET + 4].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        mmap[SLOT_COUNT_OFFSET..SLOT_COUNT_OFFSET + 8].copy_from_slice(&slot_count.to_le_bytes());
        mmap[16..HEADER_SIZE].fill(0);
        mmap.flush()?;

        let base = mmap.as_mut_ptr();
        debug!(path = %path.display(), slot_count, "created mmap-backed table");
        Ok(MmapStorage {
            path,
            mapping: Mapping::ReadWrite(mmap),
            base,
            slot_count,
            read_only: false,
        })
    }

    /// Open an existing backing file, validating its header.
    pub fn open(path: impl AsRef<Path>, readonly: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = open_file(&path, readonly)?;

        let len = file.metadata()?.len();
        if (len as usize) < HEADER_SIZE {
            return Err(Error::InvalidFormat(format!(
                "file too short to hold a header: {len} bytes"
            )));
        }

        let mut mapping = if readonly {
            Mapping::ReadOnly(unsafe { Mmap::map(&file)? })
        } else {
            Mapping::ReadWrite(unsafe { MmapMut::map_mut(&file)? })
        };

        // Sound here even though `MmapStorage` later treats this memory as
        // `UnsafeCell`-backed: `mapping` is still exclusively owned by this
        // local binding, with no other handle onto it yet, so reading a
        // `&[u8]` header view to validate it is fine.
        let header = match &mapping {
            Mapping::ReadWrite(m) => &m[..HEADER_SIZE],
            Mapping::ReadOnly(m) => &m[..HEADER_SIZE],
        };
        if &header[MAGIC_OFFSET..MAGIC_OFFSET + 4] != MAGIC {
            return Err(Error::InvalidFormat("bad magic".into()));
        }
        let version = u32::from_le_bytes(
            header[VERSION_OFFSET..VERSION_OFFSET + 4]
                .try_into()
                .expect("exactly 4 bytes"),
        );
        if version != FORMAT_VERSION {
            return Err(Error::InvalidFormat(format!(
                "unsupported format version {version}"
            )));
        }
        let slot_count = u64::from_le_bytes(
            header[SLOT_COUNT_OFFSET..SLOT_COUNT_OFFSET + 8]
                .try_into()
                .expect("exactly 8 bytes"),
        );
        let expected_len = total_len(slot_count);
        if len != expected_len {
            return Err(Error::InvalidFormat(format!(
                "file length {len} does not match header-declared slot count {slot_count} \
                 (expected {expected_len} bytes)"
            )));
        }

        let base = match &mut mapping {
            Mapping::ReadWrite(m) => m.as_mut_ptr(),
            Mapping::ReadOnly(m) => m.as_ptr() as *mut u8,
        };

        debug!(path = %path.display(), slot_count, readonly, "opened mmap-backed table");
        Ok(MmapStorage {
            path,
            mapping,
            base,
            slot_count,
            read_only: readonly,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current value of the advisory generation counter (SPEC_FULL.md §6).
    pub fn generation(&self) -> u64 {
        self.generation_word().load(Ordering::Acquire)
    }

    fn generation_word(&self) -> &AtomicU64 {
        // SAFETY: `self.base` is derived from the mapping's own pointer
        // accessor, not from a `&[u8]`; the header block is HEADER_SIZE
        // bytes at the start of a page-aligned mapping, so this 8-byte
        // field is validly aligned for the mapping's lifetime.
        unsafe { &*(self.base.add(GENERATION_OFFSET) as *const AtomicU64) }
    }

    fn slot_cell(&self, idx: u64) -> &UnsafeCell<[u8]> {
        let start = HEADER_SIZE + idx as usize * SLOT_SIZE;
        // SAFETY: `self.base` is derived from the mapping's own pointer
        // accessor and stays valid for as long as `self.mapping` is alive;
        // `start + SLOT_SIZE` stays within the mapped file for every
        // `idx < slot_count` (checked by callers via `check_bounds`).
        // Casting the resulting `*mut [u8]` to `*const UnsafeCell<[u8]>` is
        // sound because `UnsafeCell<T>` has the same layout as `T`.
        unsafe {
            let slice: *mut [u8] = std::slice::from_raw_parts_mut(self.base.add(start), SLOT_SIZE);
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

fn open_file(path: &Path, readonly: bool) -> Result<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(!readonly)
        .open(path)?)
}

impl Storage for MmapStorage {
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
        unsafe { self.slot(idx).write(tag, bytes) }?;
        self.generation_word().fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn clear(&self, idx: u64) -> Result<()> {
        self.check_bounds(idx);
        if self.read_only {
            return Err(Error::PermissionDenied);
        }
        // SAFETY: same single-writer contract as `write`.
        unsafe { self.slot(idx).clear() };
        self.generation_word().fetch_add(1, Ordering::AcqRel);
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

    fn flush(&self) -> Result<()> {
        match &self.mapping {
            Mapping::ReadWrite(m) => m.flush().map_err(Error::IoError),
            Mapping::ReadOnly(_) => Ok(()),
        }
    }

    /// Creates a fresh, empty backing file beside the original (suffixed
    /// `.rebuild`) rather than overwriting `path` in place. This keeps a
    /// failed `optimize()` from corrupting the file a concurrent reader in
    /// another process might have open, matching SPEC_FULL.md §4.8's "if
    /// optimize fails, the old table is preserved" at the file level too;
    /// promoting the rebuilt file into place is left to the caller.
    fn rebuilt(&self, slot_count: u64) -> Result<Box<dyn Storage + Send + Sync>> {
        let mut rebuild_path = self.path.clone();
        let file_name = rebuild_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        rebuild_path.set_file_name(format!("{file_name}.rebuild"));
        if rebuild_path.exists() {
            warn!(path = %rebuild_path.display(), "overwriting stale rebuild file");
        }
        Ok(Box::new(MmapStorage::create(rebuild_path, slot_count)?))
    }
}
