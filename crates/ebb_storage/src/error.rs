//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The journal is corrupted beyond its trailing frame.
    #[error("journal corrupted at offset {offset}: {message}")]
    Corrupted {
        /// Byte offset of the bad frame.
        offset: u64,
        /// Description of the corruption.
        message: String,
    },

    /// A batch could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Another process holds the store open.
    #[error("store locked: another process has exclusive access")]
    Locked,
}

impl StorageError {
    /// Creates a corruption error.
    pub fn corrupted(offset: u64, message: impl Into<String>) -> Self {
        Self::Corrupted {
            offset,
            message: message.into(),
        }
    }
}
