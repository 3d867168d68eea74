use std::io;

use hkv_types::RecordNumber;

/// Errors produced by the record archive.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// I/O error from the archive file.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The file does not start with the archive magic.
    #[error("not an archive file: {0}")]
    InvalidHeader(String),

    /// The archive was written by an unknown format version.
    #[error("unsupported archive version {0}")]
    UnsupportedVersion(u32),

    /// A complete record failed its integrity check.
    #[error("corrupt record {record} at offset {offset}: {reason}")]
    Corrupt {
        record: u32,
        offset: u64,
        reason: String,
    },

    /// The requested record has not been written.
    #[error("record {record} out of range (archive holds {count} records)")]
    RecordOutOfRange { record: RecordNumber, count: u32 },

    /// Payload does not fit in a 32-bit length field.
    #[error("payload of {0} bytes is too large for one record")]
    PayloadTooLarge(usize),

    /// Every 32-bit record number has been used.
    #[error("archive is full")]
    Full,

    /// An append failed and the file could not be cut back to its last
    /// complete record.
    #[error("archive is unusable after a failed append")]
    Failed,

    /// An internal lock was poisoned by a panicking thread.
    #[error("archive {0} lock poisoned")]
    LockPoisoned(&'static str),
}

/// Convenience alias used throughout the archive crate.
pub type ArchiveResult<T> = Result<T, ArchiveError>;
