//! Append-only record archive for hkv.
//!
//! The archive is a single file of CRC-framed records. Each appended record
//! receives the next [`RecordNumber`](hkv_types::RecordNumber); records are
//! never rewritten. Besides its opaque payload every record carries the
//! [`HashKey`](hkv_types::HashKey) it was filed under and a tombstone flag,
//! which is all the key store needs to rebuild its index after a crash.
//!
//! # Design Rules
//!
//! 1. Appends are serialized by a writer mutex and flushed before returning.
//! 2. A record that was only partially written (crash tail) is truncated on
//!    open; corruption anywhere else, a damaged length field included, is
//!    reported and never skipped, because skipping would renumber every
//!    later record.
//! 3. A failed append is cut back to the last complete record before the
//!    error is returned.
//! 4. All I/O errors are propagated.

pub mod archive;
pub mod error;
pub mod frame;

pub use archive::{Archive, ArchiveConfig, Records, StoredRecord, SyncMode};
pub use error::{ArchiveError, ArchiveResult};
