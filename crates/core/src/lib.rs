//! `maph-core`: the slot engine, storage trait, table composition, and
//! facade for the `maph` memory-mapped key-value store.
//!
//! This crate is deliberately backend-agnostic: it defines the [`Storage`]
//! trait and ships an in-memory implementation, and composes any storage
//! with any hasher (perfect or open-addressing) into a [`Table`]. The
//! memory-mapped backend lives in the sibling `maph-storage-mmap` crate;
//! the MPHF algorithm family lives in `maph-hash`. Both depend on this
//! crate for [`Storage`], [`PerfectHasher`], [`Fingerprint`], [`HashTag`],
//! and [`Error`].

pub mod config;
pub mod error;
pub mod facade;
pub mod fingerprint;
pub mod hash_tag;
pub mod hasher;
pub mod journal;
pub mod open_addressing;
pub mod slot;
pub mod storage;
pub mod table;

pub use config::Config;
pub use error::{Error, Result};
pub use facade::{HasherBuilder, Maph};
pub use fingerprint::{fingerprint_of, Fingerprint};
pub use hash_tag::{hash_tag_of, HashTag};
pub use hasher::{HasherStatistics, PerfectHasher};
pub use journal::{JournaledTable, Journal};
pub use open_addressing::OpenAddressingHasher;
pub use slot::{Slot, PAYLOAD_CAPACITY, SLOT_SIZE};
pub use storage::cached::CachedStorage;
pub use storage::memory::MemoryStorage;
pub use storage::{BoxedStorage, Storage};
pub use table::{HasherMode, Table};
