//! # ShelfDB Codec
//!
//! The data model shared by the ShelfDB engine and client.
//!
//! - [`Value`]: the dynamic form of every stored record
//! - [`Key`]: totally ordered record and index keys
//! - [`KeyPath`]: how indices pull keys out of records
//! - canonical CBOR: the byte form records take inside journals
//! - [`to_value`] / [`from_value`]: the serde bridge for typed records
//!
//! ## Canonical CBOR Rules
//!
//! - Maps are sorted by key (length-first, then bytewise on encoded keys)
//! - Integers use shortest encoding
//! - Floats are always 64-bit doubles
//! - Strings must be UTF-8
//! - No indefinite-length items
//!
//! ## Usage
//!
//! ```
//! use shelf_codec::{to_canonical_cbor, from_cbor, KeyPath, Key, Value};
//!
//! let record = Value::object([("title", Value::from("Dune"))]);
//! let bytes = to_canonical_cbor(&record).unwrap();
//! assert_eq!(from_cbor(&bytes).unwrap(), record);
//!
//! assert_eq!(KeyPath::from("title").evaluate(&record), Some(Key::from("Dune")));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod bridge;
mod decoder;
mod encoder;
mod error;
mod key;
mod key_path;
mod value;

pub use bridge::{from_value, to_value};
pub use decoder::{from_cbor, CanonicalDecoder};
pub use encoder::{encode_into, to_canonical_cbor};
pub use error::{CodecError, CodecResult};
pub use key::{Key, StoreKey};
pub use key_path::KeyPath;
pub use value::Value;
