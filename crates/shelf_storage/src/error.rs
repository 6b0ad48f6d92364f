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

    /// Another process holds the directory lock.
    #[error("storage directory locked: another process has exclusive access")]
    Locked,

    /// A database name cannot be used as a journal key.
    #[error("invalid database name: {0:?}")]
    InvalidName(String),

    /// The storage directory contains something that is not a journal.
    #[error("storage corrupted: {0}")]
    Corrupted(String),
}
