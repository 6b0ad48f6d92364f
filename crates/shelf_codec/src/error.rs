//! Codec errors.

use thiserror::Error;

/// Result alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Why a value could not be encoded, decoded, converted or used as a key.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended in the middle of an item.
    #[error("truncated CBOR input")]
    Truncated,

    /// Well-formed CBOR that breaks the canonical rules, or bytes that are
    /// not CBOR at all.
    #[error("invalid CBOR: {message}")]
    InvalidStructure {
        /// What was wrong.
        message: String,
    },

    /// Indefinite-length strings, arrays or maps.
    #[error("indefinite-length items are not allowed")]
    IndefiniteLength,

    /// A text string that is not UTF-8.
    #[error("text is not valid UTF-8")]
    InvalidUtf8,

    /// An integer outside the `i64` range.
    #[error("integer does not fit in i64")]
    IntegerOverflow,

    /// A declared length above the decoder's limit.
    #[error("length {claimed} exceeds limit {limit}")]
    TooLarge {
        /// Length declared by the input.
        claimed: u64,
        /// Largest accepted length.
        limit: u64,
    },

    /// A CBOR item with no [`crate::Value`] counterpart.
    #[error("unsupported CBOR item: {type_name}")]
    UnsupportedType {
        /// The item, e.g. `simple value 99`.
        type_name: String,
    },

    /// serde failed to turn a Rust value into a [`crate::Value`].
    #[error("serialize: {message}")]
    Serialize {
        /// serde's message.
        message: String,
    },

    /// A [`crate::Value`] did not have the shape the target type expects.
    #[error("deserialize: {message}")]
    Deserialize {
        /// serde's message.
        message: String,
    },

    /// A value or number that cannot be a [`crate::Key`].
    #[error("invalid key: {message}")]
    InvalidKey {
        /// Why.
        message: String,
    },
}

impl CodecError {
    pub(crate) fn invalid_structure(message: impl Into<String>) -> Self {
        Self::InvalidStructure {
            message: message.into(),
        }
    }

    pub(crate) fn unsupported_type(type_name: impl Into<String>) -> Self {
        Self::UnsupportedType {
            type_name: type_name.into(),
        }
    }

    pub(crate) fn serialize(message: impl Into<String>) -> Self {
        Self::Serialize {
            message: message.into(),
        }
    }

    pub(crate) fn deserialize(message: impl Into<String>) -> Self {
        Self::Deserialize {
            message: message.into(),
        }
    }

    /// An [`CodecError::InvalidKey`] with `message`.
    pub fn invalid_key(message: impl Into<String>) -> Self {
        Self::InvalidKey {
            message: message.into(),
        }
    }
}
