//! Error types for the store client layer.

use shelf_codec::CodecError;
use shelf_engine::EngineError;
use thiserror::Error;

/// Result type for client operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Failure to open or upgrade a database.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The platform dropped the open request without reporting an outcome.
    #[error("storage unavailable")]
    Unavailable,

    /// The descriptor asks for an older version than the persisted one.
    #[error("version regression: requested {requested}, database is at {current}")]
    VersionRegression {
        /// Version the descriptor asked for.
        requested: u64,
        /// Persisted version.
        current: u64,
    },

    /// The descriptor is malformed; nothing was opened.
    #[error("invalid schema descriptor: {message}")]
    InvalidDescriptor {
        /// What is wrong with it.
        message: String,
    },

    /// The platform refused the open or the upgrade failed.
    #[error("platform error: {0}")]
    Platform(EngineError),
}

impl ConnectionError {
    /// Creates an invalid descriptor error.
    pub fn invalid_descriptor(message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            message: message.into(),
        }
    }
}

impl From<EngineError> for ConnectionError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Version { requested, current } => {
                Self::VersionRegression { requested, current }
            }
            other => Self::Platform(other),
        }
    }
}

/// Errors returned by [`crate::StoreClient`] and the other client types.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Opening the database failed.
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),

    /// A request or its transaction failed.
    #[error("transaction error: {0}")]
    Transaction(#[from] EngineError),

    /// No record under the requested key.
    #[error("no record with key {key} in store {store}")]
    NotFound {
        /// Store that was searched.
        store: String,
        /// Display form of the key.
        key: String,
    },

    /// A record or key could not be converted to or from its typed form.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// A request was dropped without an outcome.
    #[error("storage unavailable")]
    Unavailable,
}

impl CoreError {
    /// Returns `true` for [`CoreError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The engine error behind this error, if there is one.
    pub fn engine_error(&self) -> Option<&EngineError> {
        match self {
            Self::Transaction(err) | Self::Connection(ConnectionError::Platform(err)) => Some(err),
            _ => None,
        }
    }
}
