//! # ShelfDB Core
//!
//! Typed, asynchronous access to one logical store inside a versioned
//! ShelfDB database.
//!
//! This crate provides:
//! - [`ConnectionManager`]: opens a database for a [`SchemaDescriptor`],
//!   creating the store and reconciling its indices in one upgrade
//!   transaction
//! - [`StoreClient`]: CRUD, range and cursor operations with serde records
//! - [`probe::exists`]: checks whether a store holds data without creating
//!   or upgrading anything
//! - [`ConnectionCache`]: an explicit map from database name to connection
//!
//! Engine requests are bridged to futures by [`request::settle`].
//!
//! ## Example
//!
//! ```
//! use shelf_core::{ConnectionManager, IndexDeclaration, SchemaDescriptor, StoreClient};
//! use shelf_engine::{Factory, KeyRange, Value};
//! use std::sync::Arc;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), shelf_core::CoreError> {
//! let manager = ConnectionManager::new(Arc::new(Factory::in_memory()));
//! let descriptor = SchemaDescriptor::new("scores")
//!     .with_index(IndexDeclaration::new("by_player", "player"));
//! let scores: StoreClient<Value, i64> = StoreClient::open(&manager, &descriptor).await?;
//!
//! for (id, player) in [(1, "ann"), (2, "bo"), (3, "ann")] {
//!     scores.put(id, &Value::object([("player", Value::from(player))])).await?;
//! }
//! assert_eq!(scores.index_keys("by_player", Some(KeyRange::only("ann"))).await?, vec![1, 3]);
//! assert_eq!(scores.count(None).await?, 3);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod client;
mod connection;
mod error;
pub mod probe;
pub mod reconcile;
pub mod request;
mod schema;

pub use client::{CursorOptions, StoreClient, StoreCursor};
pub use connection::{ConnectionCache, ConnectionManager};
pub use error::{ConnectionError, CoreError, CoreResult};
pub use reconcile::IndexAction;
pub use schema::{IndexDeclaration, SchemaDescriptor, UpgradeCallback};

pub use shelf_codec::{Key, KeyPath, StoreKey, Value};
pub use shelf_engine::{CursorDirection, KeyRange, TransactionMode};
