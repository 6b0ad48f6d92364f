//! # ShelfDB Storage
//!
//! Journal storage backends for ShelfDB.
//!
//! This crate is the lowest layer of the workspace. A backend is a
//! **database directory**: a flat namespace of database names, each mapped
//! to one opaque, append-only byte journal. Backends never interpret the
//! journals they hold.
//!
//! ## Design Principles
//!
//! - One journal per database name; names are stable identifiers
//! - Journals grow by appending and are rewritten atomically with `replace`
//! - No knowledge of frames, snapshots, stores or indices
//! - Must be `Send + Sync` so one backend can serve every open database
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - For testing and ephemeral databases
//! - [`FileBackend`] - One file per database under a locked root directory
//!
//! ## Example
//!
//! ```rust
//! use shelf_storage::{StorageBackend, InMemoryBackend};
//!
//! let backend = InMemoryBackend::new();
//! backend.append("notes--db", b"hello").unwrap();
//! backend.append("notes--db", b" world").unwrap();
//! assert_eq!(backend.read("notes--db").unwrap().unwrap(), b"hello world");
//! assert_eq!(backend.names().unwrap(), vec!["notes--db".to_string()]);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod file;
mod memory;

pub use backend::{validate_name, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
