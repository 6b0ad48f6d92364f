//! Storage backend trait definition.

use crate::error::{StorageError, StorageResult};

/// A database directory holding one byte journal per database name.
///
/// Backends are **opaque byte stores**. The engine owns the journal format;
/// a backend only knows how to read a whole journal, append to it, replace
/// it atomically, and list or remove journals by name.
///
/// # Invariants
///
/// - `read` returns exactly the concatenation of everything appended since
///   the last `replace` (or since creation)
/// - `append` creates the journal if it does not exist yet
/// - `replace` is atomic: readers observe either the old or the new journal
/// - `names` lists exactly the journals for which `read` returns `Some`
/// - Backends must be `Send + Sync`; all methods take `&self`
///
/// # Implementors
///
/// - [`super::InMemoryBackend`] - For testing
/// - [`super::FileBackend`] - For persistent storage
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Returns the names of all journals, in ascending order.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be listed.
    fn names(&self) -> StorageResult<Vec<String>>;

    /// Reads the whole journal of `name`, or `None` if there is none.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or an I/O error occurs.
    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>>;

    /// Appends `data` to the journal of `name`, creating it if needed.
    ///
    /// Returns the offset where the data was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or an I/O error occurs.
    fn append(&self, name: &str, data: &[u8]) -> StorageResult<u64>;

    /// Atomically replaces the journal of `name` with `data`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or an I/O error occurs. On
    /// error the previous journal is left untouched.
    fn replace(&self, name: &str, data: &[u8]) -> StorageResult<()>;

    /// Removes the journal of `name`. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid or an I/O error occurs.
    fn remove(&self, name: &str) -> StorageResult<bool>;

    /// Makes everything appended to `name` durable.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&self, name: &str) -> StorageResult<()>;
}

/// Checks that `name` can be used as a journal key.
///
/// Names must be non-empty and must not contain NUL characters.
///
/// # Errors
///
/// Returns [`StorageError::InvalidName`] otherwise.
pub fn validate_name(name: &str) -> StorageResult<()> {
    if name.is_empty() || name.contains('\0') {
        return Err(StorageError::InvalidName(name.to_string()));
    }
    Ok(())
}
