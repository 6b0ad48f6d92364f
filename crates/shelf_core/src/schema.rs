//! Schema descriptors.

use crate::error::ConnectionError;
use shelf_engine::{EngineResult, IndexMeta, IndexOptions, KeyPath, UpgradeStore, VersionChangeEvent};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Custom migration step run inside the upgrade transaction, after index
/// reconciliation.
pub type UpgradeCallback =
    Arc<dyn Fn(&VersionChangeEvent, &mut UpgradeStore<'_>) -> EngineResult<()> + Send + Sync>;

/// A secondary index the store should have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDeclaration {
    /// Index name, unique within the store.
    pub name: String,
    /// Field (or fields) the index keys come from.
    pub key_path: KeyPath,
    /// Unique and multi-entry flags.
    pub options: IndexOptions,
}

impl IndexDeclaration {
    /// A plain index on `key_path`.
    pub fn new(name: impl Into<String>, key_path: impl Into<KeyPath>) -> Self {
        Self {
            name: name.into(),
            key_path: key_path.into(),
            options: IndexOptions::new(),
        }
    }

    /// Sets the unique flag.
    #[must_use]
    pub fn unique(mut self, value: bool) -> Self {
        self.options.unique = value;
        self
    }

    /// Sets the multi-entry flag.
    #[must_use]
    pub fn multi_entry(mut self, value: bool) -> Self {
        self.options.multi_entry = value;
        self
    }

    /// Returns `true` if an existing index already realises this
    /// declaration.
    pub fn matches(&self, meta: &IndexMeta) -> bool {
        self.name == meta.name && self.key_path == meta.key_path && self.options == meta.options
    }
}

/// Everything needed to open one logical store.
///
/// Descriptors are cheap to clone and never persisted; only their effects
/// (database name, version, indices) are.
///
/// ```
/// use shelf_core::{IndexDeclaration, SchemaDescriptor};
///
/// let descriptor = SchemaDescriptor::new("notes")
///     .with_version(2)
///     .with_index(IndexDeclaration::new("by_title", "title").unique(true));
///
/// assert_eq!(descriptor.database_name(), "notes--db");
/// assert_eq!(descriptor.version(), 2);
/// ```
#[derive(Clone)]
pub struct SchemaDescriptor {
    store: String,
    database: Option<String>,
    version: u64,
    indexes: Vec<IndexDeclaration>,
    on_upgrade: Option<UpgradeCallback>,
}

impl SchemaDescriptor {
    /// A descriptor for `store` at version 1 with no indices.
    pub fn new(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            database: None,
            version: 1,
            indexes: Vec::new(),
            on_upgrade: None,
        }
    }

    /// Uses `name` as the database name instead of `"<store>--db"`.
    #[must_use]
    pub fn with_database(mut self, name: impl Into<String>) -> Self {
        self.database = Some(name.into());
        self
    }

    /// Sets the schema version.
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Declares a secondary index.
    #[must_use]
    pub fn with_index(mut self, index: IndexDeclaration) -> Self {
        self.indexes.push(index);
        self
    }

    /// Sets the custom upgrade callback.
    #[must_use]
    pub fn with_upgrade<F>(mut self, callback: F) -> Self
    where
        F: Fn(&VersionChangeEvent, &mut UpgradeStore<'_>) -> EngineResult<()> + Send + Sync + 'static,
    {
        self.on_upgrade = Some(Arc::new(callback));
        self
    }

    /// Logical store name.
    pub fn store(&self) -> &str {
        &self.store
    }

    /// Effective database name.
    pub fn database_name(&self) -> String {
        self.database
            .clone()
            .unwrap_or_else(|| format!("{}--db", self.store))
    }

    /// Schema version.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Declared indices, as given.
    pub fn indexes(&self) -> &[IndexDeclaration] {
        &self.indexes
    }

    /// The custom upgrade callback, if any.
    pub fn upgrade_callback(&self) -> Option<&UpgradeCallback> {
        self.on_upgrade.as_ref()
    }

    /// Checks the descriptor and returns its index declarations with
    /// identical duplicates collapsed, ordered by name.
    ///
    /// # Errors
    ///
    /// [`ConnectionError::InvalidDescriptor`] for an empty store, database
    /// or index name, version 0, or two conflicting declarations of one
    /// index.
    pub fn validate(&self) -> Result<Vec<IndexDeclaration>, ConnectionError> {
        if self.store.is_empty() {
            return Err(ConnectionError::invalid_descriptor("store name is empty"));
        }
        if self.database.as_deref() == Some("") {
            return Err(ConnectionError::invalid_descriptor("database name is empty"));
        }
        if self.version == 0 {
            return Err(ConnectionError::invalid_descriptor("version must be at least 1"));
        }

        let mut declared: BTreeMap<&str, &IndexDeclaration> = BTreeMap::new();
        for index in &self.indexes {
            if index.name.is_empty() {
                return Err(ConnectionError::invalid_descriptor("index name is empty"));
            }
            match declared.get(index.name.as_str()) {
                Some(existing) if *existing != index => {
                    return Err(ConnectionError::invalid_descriptor(format!(
                        "index {} is declared twice with different definitions",
                        index.name
                    )));
                }
                Some(_) => {}
                None => {
                    declared.insert(&index.name, index);
                }
            }
        }
        Ok(declared.into_values().cloned().collect())
    }
}

impl fmt::Debug for SchemaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaDescriptor")
            .field("store", &self.store)
            .field("database", &self.database_name())
            .field("version", &self.version)
            .field("indexes", &self.indexes)
            .field("on_upgrade", &self.on_upgrade.is_some())
            .finish()
    }
}
