//! Upgrade transactions.
//!
//! An upgrade runs when a database is opened at a higher version than the
//! persisted one. It is the only place where stores and indexes can be
//! created or removed. The handler sees a private copy of the database; the
//! copy replaces the committed state only if the handler succeeds.

use crate::error::{EngineError, EngineResult};
use crate::key_range::{validate_key, KeyRange};
use crate::meta::{IndexMeta, IndexOptions};
use crate::state::{DatabaseState, StoreData};
use shelf_codec::{Key, KeyPath, Value};
use std::sync::Arc;

/// Versions involved in an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionChangeEvent {
    /// Persisted version before the upgrade (0 for a new database).
    pub old_version: u64,
    /// Version being opened.
    pub new_version: u64,
}

/// The exclusive transaction an upgrade handler runs in.
#[derive(Debug)]
pub struct UpgradeTransaction {
    database: String,
    state: DatabaseState,
}

impl UpgradeTransaction {
    pub(crate) fn new(database: &str, mut state: DatabaseState, new_version: u64) -> Self {
        state.version = new_version;
        Self {
            database: database.to_string(),
            state,
        }
    }

    pub(crate) fn into_state(self) -> DatabaseState {
        self.state
    }

    /// Name of the database being upgraded.
    pub fn database_name(&self) -> &str {
        &self.database
    }

    /// Names of all stores, in ascending order.
    pub fn object_store_names(&self) -> Vec<String> {
        self.state.stores.keys().cloned().collect()
    }

    /// Returns `true` if a store called `name` exists.
    pub fn contains_object_store(&self, name: &str) -> bool {
        self.state.stores.contains_key(name)
    }

    /// Creates an empty store.
    ///
    /// # Errors
    ///
    /// [`EngineError::Constraint`] if the store exists, [`EngineError::Data`]
    /// if the name is empty.
    pub fn create_object_store(&mut self, name: &str) -> EngineResult<UpgradeStore<'_>> {
        if name.is_empty() {
            return Err(EngineError::data("store name must not be empty"));
        }
        if self.state.stores.contains_key(name) {
            return Err(EngineError::constraint(format!(
                "store {name} already exists in {}",
                self.database
            )));
        }
        let store = self
            .state
            .stores
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(StoreData::new(name)));
        Ok(UpgradeStore {
            store: Arc::make_mut(store),
        })
    }

    /// Opens an existing store.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] if there is no such store.
    pub fn object_store(&mut self, name: &str) -> EngineResult<UpgradeStore<'_>> {
        let store = self
            .state
            .stores
            .get_mut(name)
            .ok_or_else(|| EngineError::not_found(format!("store {name}")))?;
        Ok(UpgradeStore {
            store: Arc::make_mut(store),
        })
    }

    /// Removes a store and all its records.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] if there is no such store.
    pub fn delete_object_store(&mut self, name: &str) -> EngineResult<()> {
        self.state
            .stores
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found(format!("store {name}")))
    }
}

/// A store inside an upgrade transaction.
///
/// Besides schema changes it offers direct data access for migrations.
#[derive(Debug)]
pub struct UpgradeStore<'t> {
    store: &'t mut StoreData,
}

impl UpgradeStore<'_> {
    /// Store name.
    pub fn name(&self) -> &str {
        &self.store.name
    }

    /// Names of all indexes, in ascending order.
    pub fn index_names(&self) -> Vec<String> {
        self.store.indexes.keys().cloned().collect()
    }

    /// Definition of the index called `name`.
    pub fn index(&self, name: &str) -> Option<&IndexMeta> {
        self.store.indexes.get(name).map(|index| &index.meta)
    }

    /// Definitions of all indexes.
    pub fn indexes(&self) -> Vec<IndexMeta> {
        self.store
            .indexes
            .values()
            .map(|index| index.meta.clone())
            .collect()
    }

    /// Creates an index and fills it from the existing records.
    ///
    /// # Errors
    ///
    /// [`EngineError::Constraint`] if the index exists or existing records
    /// violate `unique`; [`EngineError::Data`] for an invalid key path.
    pub fn create_index(
        &mut self,
        name: &str,
        key_path: impl Into<KeyPath>,
        options: IndexOptions,
    ) -> EngineResult<()> {
        self.store.create_index(name, key_path.into(), options)
    }

    /// Removes an index.
    ///
    /// # Errors
    ///
    /// [`EngineError::NotFound`] if there is no such index.
    pub fn delete_index(&mut self, name: &str) -> EngineResult<()> {
        self.store.delete_index(name)
    }

    /// Reads one record.
    pub fn get(&self, key: impl Into<Key>) -> EngineResult<Option<Value>> {
        let key = key.into();
        validate_key(&key)?;
        Ok(self.store.records.get(&key).cloned())
    }

    /// Keys of all records in `range`, ascending.
    pub fn get_all_keys(&self, range: Option<KeyRange>) -> EngineResult<Vec<Key>> {
        let range = range.unwrap_or_default();
        range.validate()?;
        Ok(self.store.records.range(range).map(|(k, _)| k.clone()).collect())
    }

    /// Inserts or replaces a record.
    pub fn put(&mut self, key: impl Into<Key>, value: Value) -> EngineResult<Key> {
        let key = key.into();
        validate_key(&key)?;
        self.store.put(key.clone(), value, true)?;
        Ok(key)
    }

    /// Inserts a record; fails if the key exists.
    pub fn add(&mut self, key: impl Into<Key>, value: Value) -> EngineResult<Key> {
        let key = key.into();
        validate_key(&key)?;
        self.store.put(key.clone(), value, false)?;
        Ok(key)
    }

    /// Removes the records in `range`.
    pub fn delete(&mut self, range: impl Into<KeyRange>) -> EngineResult<()> {
        let range = range.into();
        range.validate()?;
        self.store.delete_range(&range);
        Ok(())
    }

    /// Removes every record.
    pub fn clear(&mut self) {
        self.store.clear();
    }

    /// Number of records in `range`.
    pub fn count(&self, range: Option<KeyRange>) -> EngineResult<u64> {
        let range = range.unwrap_or_default();
        range.validate()?;
        Ok(self.store.count(&range))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn txn() -> UpgradeTransaction {
        UpgradeTransaction::new("db", DatabaseState::default(), 1)
    }

    #[test]
    fn create_and_reopen_store() {
        let mut txn = txn();
        txn.create_object_store("notes").unwrap();
        assert!(matches!(
            txn.create_object_store("notes"),
            Err(EngineError::Constraint { .. })
        ));
        assert!(txn.object_store("notes").is_ok());
        assert!(matches!(
            txn.object_store("missing"),
            Err(EngineError::NotFound { .. })
        ));
        assert_eq!(txn.object_store_names(), vec!["notes".to_string()]);
        assert_eq!(txn.into_state().version, 1);
    }

    #[test]
    fn indexes_and_migration_data() {
        let mut txn = txn();
        let mut store = txn.create_object_store("notes").unwrap();
        store
            .put("a", Value::object([("tag", Value::from("x"))]))
            .unwrap();
        store
            .create_index("by_tag", "tag", IndexOptions::new())
            .unwrap();

        assert_eq!(store.index_names(), vec!["by_tag".to_string()]);
        assert_eq!(store.index("by_tag").unwrap().key_path, KeyPath::from("tag"));
        assert_eq!(store.count(None).unwrap(), 1);
        assert!(store.add("a", Value::Null).is_err());

        store.delete_index("by_tag").unwrap();
        assert!(store.indexes().is_empty());

        store.delete(Key::from("a")).unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn nan_keys_rejected() {
        let mut txn = txn();
        let mut store = txn.create_object_store("s").unwrap();
        assert!(matches!(
            store.put(Key::Number(f64::NAN), Value::Null),
            Err(EngineError::Data { .. })
        ));
    }

    #[test]
    fn delete_store() {
        let mut txn = txn();
        txn.create_object_store("s").unwrap();
        txn.delete_object_store("s").unwrap();
        assert!(!txn.contains_object_store("s"));
        assert!(txn.delete_object_store("s").is_err());
    }
}
