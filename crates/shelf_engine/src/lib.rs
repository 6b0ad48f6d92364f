//! # ShelfDB Engine
//!
//! A local, durable, versioned key-value engine with secondary indices.
//!
//! The engine is organised the way browser storage platforms are:
//!
//! - a [`Factory`] opens databases by name and version, enumerates and
//!   deletes them
//! - opening at a higher version runs an [`UpgradeTransaction`], the only
//!   place where object stores and indices are created or removed
//! - a [`Connection`] starts [`Transaction`]s over one object store
//! - [`ObjectStore`] and [`Index`] handles issue [`Request`]s, whose
//!   outcomes are delivered to `on_success` / `on_error` handlers
//! - [`Cursor`]s walk stores and indices in any [`CursorDirection`]
//!
//! Each database is persisted as one journal in a
//! [`shelf_storage::StorageBackend`]: a snapshot frame followed by one frame
//! per committed transaction.
//!
//! ## Transactions
//!
//! Read-only transactions see the store as it was when they started.
//! Read-write transactions see their own writes, publish them on
//! [`Transaction::commit`], and discard them if dropped or aborted. A failing
//! request aborts its read-write transaction.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod connection;
mod cursor;
mod database;
mod error;
mod factory;
mod index;
mod journal;
mod key_range;
mod meta;
mod object_store;
mod request;
mod state;
mod transaction;
mod upgrade;

pub use config::Config;
pub use connection::Connection;
pub use cursor::{Cursor, CursorDirection};
pub use error::{EngineError, EngineResult};
pub use factory::Factory;
pub use index::Index;
pub use key_range::KeyRange;
pub use meta::{DatabaseInfo, IndexMeta, IndexOptions};
pub use object_store::ObjectStore;
pub use request::{Request, Responder};
pub use transaction::{Transaction, TransactionMode};
pub use upgrade::{UpgradeStore, UpgradeTransaction, VersionChangeEvent};

pub use shelf_codec::{Key, KeyPath, Value};
