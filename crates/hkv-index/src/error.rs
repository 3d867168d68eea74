//! Error types for the index crate.

/// Errors that can occur while loading or persisting index structures.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// I/O error reading or writing a snapshot file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A snapshot file failed validation.
    #[error("corrupt snapshot {path}: {reason}")]
    Corrupt { path: String, reason: String },
}

/// Convenience alias for index results.
pub type IndexResult<T> = Result<T, IndexError>;
