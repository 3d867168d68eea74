use hkv_archive::ArchiveError;
use hkv_index::IndexError;

/// Errors from key store operations.
///
/// A missing key is not an error: lookups return `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A packed record's declared key length does not fit its buffer.
    #[error("malformed record: declared key length {declared} but only {available} bytes follow")]
    MalformedRecord { declared: usize, available: usize },

    /// The configuration cannot be honored; raised when a store is opened.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The configuration file could not be parsed.
    #[error("config parse error: {0}")]
    ConfigParse(String),

    /// An encoded key exceeds the configured maximum key size.
    #[error("key is {actual} bytes, exceeding the configured maximum of {max}")]
    KeyTooLong { actual: usize, max: usize },

    /// A record's key bytes are not a 16-byte identifier.
    #[error("record key is {0} bytes, expected a 16-byte identifier")]
    InvalidIdentifier(usize),

    /// Stored bytes are not valid UTF-16LE text.
    #[error("stored value is not valid UTF-16LE text")]
    InvalidText,

    /// The store has been shut down.
    #[error("store is shut down")]
    Closed,

    /// Error from the record archive.
    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Error from the hash index or deletion bitmap.
    #[error("index error: {0}")]
    Index(#[from] IndexError),

    /// I/O error outside the archive and index (config files, worker threads).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal lock was poisoned by a panicking thread.
    #[error("{0} lock poisoned")]
    LockPoisoned(&'static str),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
