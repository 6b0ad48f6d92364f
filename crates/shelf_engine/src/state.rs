//! In-memory database state: stores, records and derived index entries.

use crate::error::{EngineError, EngineResult};
use crate::key_range::KeyRange;
use crate::meta::{IndexMeta, IndexOptions};
use shelf_codec::{Key, KeyPath, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// One write, as recorded in a transaction's log and in commit frames.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Op {
    Put {
        key: Key,
        value: Value,
        overwrite: bool,
    },
    Delete(KeyRange),
    Clear,
}

/// Entries of one secondary index: index key to the primary keys holding it.
#[derive(Debug, Clone)]
pub(crate) struct IndexData {
    pub meta: IndexMeta,
    pub entries: BTreeMap<Key, BTreeSet<Key>>,
}

impl IndexData {
    fn new(meta: IndexMeta) -> Self {
        Self {
            meta,
            entries: BTreeMap::new(),
        }
    }

    /// Index keys a record contributes to this index.
    pub fn keys_for(&self, value: &Value) -> Vec<Key> {
        index_keys(&self.meta, value)
    }

    fn insert(&mut self, index_key: Key, primary_key: &Key) {
        self.entries
            .entry(index_key)
            .or_default()
            .insert(primary_key.clone());
    }

    fn remove(&mut self, index_key: &Key, primary_key: &Key) {
        if let Some(keys) = self.entries.get_mut(index_key) {
            keys.remove(primary_key);
            if keys.is_empty() {
                self.entries.remove(index_key);
            }
        }
    }

    /// Returns the primary key that already holds `index_key`, other than
    /// `primary_key` itself.
    fn holder_other_than(&self, index_key: &Key, primary_key: &Key) -> Option<&Key> {
        self.entries
            .get(index_key)?
            .iter()
            .find(|holder| *holder != primary_key)
    }
}

/// Index keys for `value` under `meta`.
///
/// Records without a valid key at the path are simply not indexed.
pub(crate) fn index_keys(meta: &IndexMeta, value: &Value) -> Vec<Key> {
    if meta.options.multi_entry {
        if let Some(Value::Array(items)) = meta.key_path.resolve_value(value) {
            let unique: BTreeSet<Key> = items.iter().filter_map(|v| Key::from_value(v).ok()).collect();
            return unique.into_iter().collect();
        }
    }
    meta.key_path.evaluate(value).into_iter().collect()
}

/// Records and indexes of one object store.
#[derive(Debug, Clone)]
pub(crate) struct StoreData {
    pub name: String,
    pub records: BTreeMap<Key, Value>,
    pub indexes: BTreeMap<String, IndexData>,
}

impl StoreData {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            records: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    pub fn apply(&mut self, op: &Op) -> EngineResult<()> {
        match op {
            Op::Put {
                key,
                value,
                overwrite,
            } => self.put(key.clone(), value.clone(), *overwrite),
            Op::Delete(range) => {
                self.delete_range(range);
                Ok(())
            }
            Op::Clear => {
                self.clear();
                Ok(())
            }
        }
    }

    /// Stores `value` under `key`. Fails without changing anything if the
    /// key exists and `overwrite` is false, or if a unique index would hold
    /// a duplicate.
    pub fn put(&mut self, key: Key, value: Value, overwrite: bool) -> EngineResult<()> {
        if !overwrite && self.records.contains_key(&key) {
            return Err(EngineError::constraint(format!(
                "key {key} already exists in store {}",
                self.name
            )));
        }

        let mut new_entries = Vec::with_capacity(self.indexes.len());
        for index in self.indexes.values() {
            let keys = index.keys_for(&value);
            if index.meta.options.unique {
                if let Some(index_key) = keys
                    .iter()
                    .find(|k| index.holder_other_than(k, &key).is_some())
                {
                    return Err(EngineError::constraint(format!(
                        "unique index {} already holds {index_key}",
                        index.meta.name
                    )));
                }
            }
            new_entries.push((index.meta.name.clone(), keys));
        }

        self.remove_entries(&key);
        for (name, keys) in new_entries {
            if let Some(index) = self.indexes.get_mut(&name) {
                for index_key in keys {
                    index.insert(index_key, &key);
                }
            }
        }
        self.records.insert(key, value);
        Ok(())
    }

    /// Removes every record in `range`; returns how many were removed.
    pub fn delete_range(&mut self, range: &KeyRange) -> usize {
        let doomed: Vec<Key> = self
            .records
            .range(range.clone())
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            self.remove_entries(key);
            self.records.remove(key);
        }
        doomed.len()
    }

    pub fn clear(&mut self) {
        self.records.clear();
        for index in self.indexes.values_mut() {
            index.entries.clear();
        }
    }

    pub fn count(&self, range: &KeyRange) -> u64 {
        self.records.range(range.clone()).count() as u64
    }

    fn remove_entries(&mut self, key: &Key) {
        let Some(old) = self.records.get(key) else {
            return;
        };
        for index in self.indexes.values_mut() {
            for index_key in index_keys(&index.meta, old) {
                index.remove(&index_key, key);
            }
        }
    }

    /// Adds an index and fills it from the existing records.
    pub fn create_index(
        &mut self,
        name: &str,
        key_path: KeyPath,
        options: IndexOptions,
    ) -> EngineResult<()> {
        if name.is_empty() {
            return Err(EngineError::data("index name must not be empty"));
        }
        if self.indexes.contains_key(name) {
            return Err(EngineError::constraint(format!(
                "index {name} already exists on store {}",
                self.name
            )));
        }
        if !key_path.is_valid() {
            return Err(EngineError::data(format!("invalid key path {key_path}")));
        }
        if options.multi_entry && matches!(key_path, KeyPath::Sequence(_)) {
            return Err(EngineError::invalid_state(format!(
                "multi-entry index {name} cannot use a compound key path"
            )));
        }

        let mut index = IndexData::new(IndexMeta {
            name: name.to_string(),
            key_path,
            options,
        });
        populate(&mut index, &self.records)?;
        self.indexes.insert(name.to_string(), index);
        Ok(())
    }

    pub fn delete_index(&mut self, name: &str) -> EngineResult<()> {
        self.indexes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| EngineError::not_found(format!("index {name} on store {}", self.name)))
    }

    /// Restores an index from persisted metadata.
    pub fn restore_index(&mut self, meta: IndexMeta) -> EngineResult<()> {
        let mut index = IndexData::new(meta);
        populate(&mut index, &self.records)?;
        self.indexes.insert(index.meta.name.clone(), index);
        Ok(())
    }

    pub fn index(&self, name: &str) -> EngineResult<&IndexData> {
        self.indexes
            .get(name)
            .ok_or_else(|| EngineError::not_found(format!("index {name} on store {}", self.name)))
    }
}

fn populate(index: &mut IndexData, records: &BTreeMap<Key, Value>) -> EngineResult<()> {
    for (primary_key, value) in records {
        for index_key in index.keys_for(value) {
            if index.meta.options.unique && index.holder_other_than(&index_key, primary_key).is_some() {
                return Err(EngineError::constraint(format!(
                    "unique index {} cannot be built: duplicate key {index_key}",
                    index.meta.name
                )));
            }
            index.insert(index_key, primary_key);
        }
    }
    Ok(())
}

/// Committed state of a database.
#[derive(Debug, Clone, Default)]
pub(crate) struct DatabaseState {
    /// Persisted version; 0 means the database has never been created.
    pub version: u64,
    pub stores: BTreeMap<String, Arc<StoreData>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(title: &str, author: &str, tags: &[&str]) -> Value {
        Value::object([
            ("title", Value::from(title)),
            ("author", Value::from(author)),
            (
                "tags",
                Value::Array(tags.iter().map(|t| Value::from(*t)).collect()),
            ),
        ])
    }

    fn store_with_indexes() -> StoreData {
        let mut store = StoreData::new("books");
        store
            .create_index("by_title", KeyPath::from("title"), IndexOptions::new().unique(true))
            .unwrap();
        store
            .create_index("by_author", KeyPath::from("author"), IndexOptions::new())
            .unwrap();
        store
            .create_index("by_tag", KeyPath::from("tags"), IndexOptions::new().multi_entry(true))
            .unwrap();
        store
    }

    fn primary_keys(store: &StoreData, index: &str, key: &str) -> Vec<Key> {
        store.indexes[index]
            .entries
            .get(&Key::from(key))
            .map(|keys| keys.iter().cloned().collect())
            .unwrap_or_default()
    }

    #[test]
    fn put_maintains_indexes() {
        let mut store = store_with_indexes();
        store.put(Key::from(1), book("Dune", "Herbert", &["sf", "classic"]), true).unwrap();
        store.put(Key::from(2), book("Emma", "Austen", &["classic"]), true).unwrap();

        assert_eq!(primary_keys(&store, "by_title", "Dune"), vec![Key::from(1)]);
        assert_eq!(
            primary_keys(&store, "by_tag", "classic"),
            vec![Key::from(1), Key::from(2)]
        );

        store.put(Key::from(1), book("Dune", "Herbert", &["sf"]), true).unwrap();
        assert_eq!(primary_keys(&store, "by_tag", "classic"), vec![Key::from(2)]);
    }

    #[test]
    fn unique_violation_leaves_store_unchanged() {
        let mut store = store_with_indexes();
        store.put(Key::from(1), book("Dune", "Herbert", &[]), true).unwrap();

        let err = store.put(Key::from(2), book("Dune", "Someone", &[]), true);
        assert!(matches!(err, Err(EngineError::Constraint { .. })));
        assert_eq!(store.records.len(), 1);
        assert!(primary_keys(&store, "by_author", "Someone").is_empty());

        // Rewriting the holder itself is fine
        store.put(Key::from(1), book("Dune", "Frank", &[]), true).unwrap();
    }

    #[test]
    fn add_rejects_existing_key() {
        let mut store = StoreData::new("s");
        store.put(Key::from("a"), Value::Integer(1), false).unwrap();
        assert!(matches!(
            store.put(Key::from("a"), Value::Integer(2), false),
            Err(EngineError::Constraint { .. })
        ));
        assert_eq!(store.records[&Key::from("a")], Value::Integer(1));
    }

    #[test]
    fn multi_entry_deduplicates_elements() {
        let mut store = store_with_indexes();
        store.put(Key::from(1), book("X", "Y", &["a", "a", "b"]), true).unwrap();
        assert_eq!(primary_keys(&store, "by_tag", "a"), vec![Key::from(1)]);
        assert_eq!(store.indexes["by_tag"].entries.len(), 2);
    }

    #[test]
    fn records_without_key_are_not_indexed() {
        let mut store = store_with_indexes();
        store.put(Key::from(1), Value::object([("other", Value::Null)]), true).unwrap();
        assert!(store.indexes.values().all(|i| i.entries.is_empty()));
    }

    #[test]
    fn delete_range_and_clear() {
        let mut store = store_with_indexes();
        for i in 1..=5 {
            store
                .put(Key::from(i), book(&format!("t{i}"), "a", &[]), true)
                .unwrap();
        }
        let removed = store.delete_range(&KeyRange::bound(2, 4, false, false).unwrap());
        assert_eq!(removed, 3);
        assert_eq!(store.count(&KeyRange::default()), 2);
        assert_eq!(primary_keys(&store, "by_author", "a"), vec![Key::from(1), Key::from(5)]);

        store.clear();
        assert_eq!(store.count(&KeyRange::default()), 0);
        assert!(store.indexes["by_author"].entries.is_empty());
    }

    #[test]
    fn create_index_over_existing_records() {
        let mut store = StoreData::new("s");
        store.put(Key::from(1), book("A", "x", &[]), true).unwrap();
        store.put(Key::from(2), book("B", "x", &[]), true).unwrap();

        store
            .create_index("by_author", KeyPath::from("author"), IndexOptions::new())
            .unwrap();
        assert_eq!(primary_keys(&store, "by_author", "x").len(), 2);

        let unique = store.create_index(
            "unique_author",
            KeyPath::from("author"),
            IndexOptions::new().unique(true),
        );
        assert!(matches!(unique, Err(EngineError::Constraint { .. })));
        assert!(!store.indexes.contains_key("unique_author"));
    }

    #[test]
    fn create_index_validation() {
        let mut store = store_with_indexes();
        assert!(matches!(
            store.create_index("by_title", KeyPath::from("x"), IndexOptions::new()),
            Err(EngineError::Constraint { .. })
        ));
        assert!(matches!(
            store.create_index("bad", KeyPath::from("a..b"), IndexOptions::new()),
            Err(EngineError::Data { .. })
        ));
        assert!(matches!(
            store.create_index(
                "compound",
                KeyPath::from(&["a", "b"][..]),
                IndexOptions::new().multi_entry(true)
            ),
            Err(EngineError::InvalidState { .. })
        ));
        assert!(store.delete_index("missing").is_err());
        store.delete_index("by_title").unwrap();
        assert!(store.index("by_title").is_err());
    }

    #[test]
    fn apply_replays_ops() {
        let mut store = StoreData::new("s");
        let ops = [
            Op::Put {
                key: Key::from(1),
                value: Value::Integer(10),
                overwrite: true,
            },
            Op::Put {
                key: Key::from(2),
                value: Value::Integer(20),
                overwrite: false,
            },
            Op::Delete(KeyRange::only(1)),
        ];
        for op in &ops {
            store.apply(op).unwrap();
        }
        assert_eq!(store.records.len(), 1);
        store.apply(&Op::Clear).unwrap();
        assert!(store.records.is_empty());
    }
}
