//! Schema metadata.

use shelf_codec::KeyPath;

/// Flags of a secondary index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IndexOptions {
    /// No two records may share an index key.
    pub unique: bool,
    /// An array at the key path yields one index entry per element.
    pub multi_entry: bool,
}

impl IndexOptions {
    /// Plain options: neither unique nor multi-entry.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            unique: false,
            multi_entry: false,
        }
    }

    /// Sets the unique flag.
    #[must_use]
    pub const fn unique(mut self, value: bool) -> Self {
        self.unique = value;
        self
    }

    /// Sets the multi-entry flag.
    #[must_use]
    pub const fn multi_entry(mut self, value: bool) -> Self {
        self.multi_entry = value;
        self
    }
}

/// Definition of an index as the engine stores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMeta {
    /// Index name, unique within its store.
    pub name: String,
    /// Where index keys come from.
    pub key_path: KeyPath,
    /// Index flags.
    pub options: IndexOptions,
}

/// A database as listed by [`crate::Factory::databases`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// Persisted version.
    pub version: u64,
}
