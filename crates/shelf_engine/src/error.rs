//! Error types for the engine.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors reported by the engine.
///
/// Variants follow the failure classes a versioned key-value platform
/// reports: a request either completes or fails with exactly one of these.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The requested version is lower than the persisted one.
    #[error("requested version {requested} is lower than the current version {current}")]
    Version {
        /// Version passed to open.
        requested: u64,
        /// Version the database is at.
        current: u64,
    },

    /// A database, store or index does not exist.
    #[error("not found: {message}")]
    NotFound {
        /// What was missing.
        message: String,
    },

    /// A write violates a constraint (duplicate key, unique index, existing
    /// store or index).
    #[error("constraint violation: {message}")]
    Constraint {
        /// Which constraint failed.
        message: String,
    },

    /// A key, range or argument is malformed.
    #[error("data error: {message}")]
    Data {
        /// What was malformed.
        message: String,
    },

    /// A write was issued against a read-only transaction.
    #[error("transaction is read-only")]
    ReadOnly,

    /// The transaction has already committed or aborted.
    #[error("transaction is not active")]
    TransactionInactive,

    /// The operation is not allowed in the current state.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Why the operation was refused.
        message: String,
    },

    /// The transaction was aborted and its changes discarded.
    #[error("transaction aborted")]
    Aborted,

    /// The upgrade handler failed; nothing from the upgrade persisted.
    #[error("upgrade aborted: {source}")]
    UpgradeAborted {
        /// The error that stopped the upgrade.
        source: Box<EngineError>,
    },

    /// A journal could not be replayed.
    #[error("journal corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] shelf_storage::StorageError),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] shelf_codec::CodecError),
}

impl EngineError {
    /// Creates a not found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    /// Creates a constraint error.
    pub fn constraint(message: impl Into<String>) -> Self {
        Self::Constraint {
            message: message.into(),
        }
    }

    /// Creates a data error.
    pub fn data(message: impl Into<String>) -> Self {
        Self::Data {
            message: message.into(),
        }
    }

    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Wraps the error that stopped an upgrade.
    pub fn upgrade_aborted(source: EngineError) -> Self {
        Self::UpgradeAborted {
            source: Box::new(source),
        }
    }
}
