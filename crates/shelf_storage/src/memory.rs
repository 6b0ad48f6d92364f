//! In-memory storage backend for testing.

use crate::backend::{validate_name, StorageBackend};
use crate::error::StorageResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;

/// An in-memory database directory.
///
/// This backend keeps every journal in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral databases that don't need persistence
///
/// # Thread Safety
///
/// This backend is thread-safe and can be shared across threads.
///
/// # Example
///
/// ```rust
/// use shelf_storage::{StorageBackend, InMemoryBackend};
///
/// let backend = InMemoryBackend::new();
/// let offset = backend.append("db", b"test data").unwrap();
/// assert_eq!(offset, 0);
/// assert_eq!(backend.append("db", b"!").unwrap(), 9);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    journals: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates a new empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend pre-populated with one journal.
    ///
    /// Useful for testing recovery scenarios.
    #[must_use]
    pub fn with_journal(name: &str, data: Vec<u8>) -> Self {
        let backend = Self::new();
        backend.journals.write().insert(name.to_string(), data);
        backend
    }

    /// Returns the total number of bytes held across all journals.
    #[must_use]
    pub fn total_size(&self) -> usize {
        self.journals.read().values().map(Vec::len).sum()
    }
}

impl StorageBackend for InMemoryBackend {
    fn names(&self) -> StorageResult<Vec<String>> {
        Ok(self.journals.read().keys().cloned().collect())
    }

    fn read(&self, name: &str) -> StorageResult<Option<Vec<u8>>> {
        validate_name(name)?;
        Ok(self.journals.read().get(name).cloned())
    }

    fn append(&self, name: &str, data: &[u8]) -> StorageResult<u64> {
        validate_name(name)?;
        let mut journals = self.journals.write();
        let journal = journals.entry(name.to_string()).or_default();
        let offset = journal.len() as u64;
        journal.extend_from_slice(data);
        Ok(offset)
    }

    fn replace(&self, name: &str, data: &[u8]) -> StorageResult<()> {
        validate_name(name)?;
        self.journals.write().insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn remove(&self, name: &str) -> StorageResult<bool> {
        validate_name(name)?;
        Ok(self.journals.write().remove(name).is_some())
    }

    fn sync(&self, name: &str) -> StorageResult<()> {
        // Nothing to make durable
        validate_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StorageError;

    #[test]
    fn memory_new_is_empty() {
        let backend = InMemoryBackend::new();
        assert!(backend.names().unwrap().is_empty());
        assert_eq!(backend.total_size(), 0);
    }

    #[test]
    fn memory_read_missing_is_none() {
        let backend = InMemoryBackend::new();
        assert!(backend.read("missing").unwrap().is_none());
    }

    #[test]
    fn memory_append_returns_offsets() {
        let backend = InMemoryBackend::new();
        assert_eq!(backend.append("db", b"hello").unwrap(), 0);
        assert_eq!(backend.append("db", b" world").unwrap(), 5);
        assert_eq!(backend.read("db").unwrap().unwrap(), b"hello world");
    }

    #[test]
    fn memory_journals_are_independent() {
        let backend = InMemoryBackend::new();
        backend.append("a", b"one").unwrap();
        backend.append("b", b"two").unwrap();
        assert_eq!(backend.read("a").unwrap().unwrap(), b"one");
        assert_eq!(backend.read("b").unwrap().unwrap(), b"two");
        assert_eq!(backend.names().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn memory_replace_discards_previous_content() {
        let backend = InMemoryBackend::new();
        backend.append("db", b"old old old").unwrap();
        backend.replace("db", b"new").unwrap();
        assert_eq!(backend.read("db").unwrap().unwrap(), b"new");
        assert_eq!(backend.append("db", b"!").unwrap(), 3);
    }

    #[test]
    fn memory_remove() {
        let backend = InMemoryBackend::new();
        backend.append("db", b"data").unwrap();
        assert!(backend.remove("db").unwrap());
        assert!(!backend.remove("db").unwrap());
        assert!(backend.read("db").unwrap().is_none());
        assert!(backend.names().unwrap().is_empty());
    }

    #[test]
    fn memory_with_journal() {
        let backend = InMemoryBackend::with_journal("db", b"preloaded".to_vec());
        assert_eq!(backend.read("db").unwrap().unwrap(), b"preloaded");
    }

    #[test]
    fn memory_rejects_invalid_name() {
        let backend = InMemoryBackend::new();
        let result = backend.append("", b"x");
        assert!(matches!(result, Err(StorageError::InvalidName(_))));
    }

    #[test]
    fn memory_sync_succeeds() {
        let backend = InMemoryBackend::new();
        backend.append("db", b"data").unwrap();
        assert!(backend.sync("db").is_ok());
    }
}
