//! Crate-wide error taxonomy.
//!
//! Every fallible operation in `maph-core`, `maph-hash`, and
//! `maph-storage-mmap` returns this [`Error`] type. Lower-level errors
//! (`std::io::Error`) are wrapped rather than propagated verbatim, the way
//! a storage backend wraps its underlying engine's error type into one
//! crate-level enum.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Key absent, or no slot can be located for it.
    #[error("key not found")]
    KeyNotFound,

    /// Probe sequence exhausted without an empty or matching slot.
    #[error("table full")]
    TableFull,

    /// Payload exceeds slot capacity.
    #[error("value too large: {len} bytes exceeds capacity of {capacity} bytes")]
    ValueTooLarge { len: usize, capacity: usize },

    /// Caller misuse, e.g. an empty key set handed to an MPHF builder.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// File or serialized hasher failed a magic/version/bounds check.
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    /// OS-level failure opening, mapping, truncating, or syncing a file.
    #[error(transparent)]
    IoError(#[from] std::io::Error),

    /// Write attempted on a read-only backend.
    #[error("permission denied: backend is read-only")]
    PermissionDenied,

    /// `optimize()` aborted; the pre-optimize table is preserved.
    #[error("optimization failed: {0}")]
    OptimizationFailed(String),
}
