//! Object store requests.

use crate::cursor::{Cursor, CursorDirection, Source};
use crate::error::EngineResult;
use crate::index::Index;
use crate::key_range::{validate_key, KeyRange};
use crate::request::Request;
use crate::state::Op;
use crate::transaction::Transaction;
use shelf_codec::{Key, Value};

/// An object store as seen through one transaction.
///
/// Every method issues one request against the transaction. Requests run as
/// soon as they are issued, in issue order.
#[derive(Debug, Clone)]
pub struct ObjectStore {
    txn: Transaction,
}

impl ObjectStore {
    pub(crate) fn new(txn: Transaction) -> Self {
        Self { txn }
    }

    /// Store name.
    pub fn name(&self) -> &str {
        self.txn.store_name()
    }

    /// The transaction this handle belongs to.
    pub fn transaction(&self) -> &Transaction {
        &self.txn
    }

    /// Names of the store's indexes.
    pub fn index_names(&self) -> EngineResult<Vec<String>> {
        self.txn
            .read(|store| Ok(store.indexes.keys().cloned().collect()))
    }

    /// Opens an index of this store.
    ///
    /// # Errors
    ///
    /// [`crate::EngineError::NotFound`] if the store has no such index.
    pub fn index(&self, name: &str) -> EngineResult<Index> {
        self.txn.read(|store| store.index(name).map(|_| ()))?;
        Ok(Index::new(self.txn.clone(), name))
    }

    /// Reads the record stored under `key`.
    pub fn get(&self, key: impl Into<Key>) -> Request<Option<Value>> {
        let key = key.into();
        Request::ready(validate_key(&key).and_then(|()| {
            self.txn
                .read(|store| Ok(store.records.get(&key).cloned()))
        }))
    }

    /// Reads every record in `range`, in ascending key order.
    pub fn get_all(&self, range: Option<KeyRange>) -> Request<Vec<Value>> {
        Request::ready(self.scan(range, |_, value| value.clone()))
    }

    /// Reads every key in `range`, in ascending order.
    pub fn get_all_keys(&self, range: Option<KeyRange>) -> Request<Vec<Key>> {
        Request::ready(self.scan(range, |key, _| key.clone()))
    }

    /// Inserts or replaces the record under `key`; yields the key.
    pub fn put(&self, key: impl Into<Key>, value: Value) -> Request<Key> {
        Request::ready(self.store(key.into(), value, true))
    }

    /// Inserts a record; fails with [`crate::EngineError::Constraint`] if
    /// `key` exists. Yields the key.
    pub fn add(&self, key: impl Into<Key>, value: Value) -> Request<Key> {
        Request::ready(self.store(key.into(), value, false))
    }

    /// Counts the records in `range`.
    pub fn count(&self, range: Option<KeyRange>) -> Request<u64> {
        let range = range.unwrap_or_default();
        Request::ready(
            range
                .validate()
                .and_then(|()| self.txn.read(|store| Ok(store.count(&range)))),
        )
    }

    /// Removes the records in `range` (a single key converts into a range).
    pub fn delete(&self, range: impl Into<KeyRange>) -> Request<()> {
        let range = range.into();
        Request::ready(
            range
                .validate()
                .and_then(|()| self.txn.write(Op::Delete(range))),
        )
    }

    /// Removes every record.
    pub fn clear(&self) -> Request<()> {
        Request::ready(self.txn.write(Op::Clear))
    }

    /// Opens a cursor over the records in `range`.
    ///
    /// Yields `None` if no record matches.
    pub fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: CursorDirection,
    ) -> Request<Option<Cursor>> {
        Request::ready(Cursor::open(
            self.txn.clone(),
            Source::Store,
            range.unwrap_or_default(),
            direction,
        ))
    }

    fn scan<T>(&self, range: Option<KeyRange>, f: impl Fn(&Key, &Value) -> T) -> EngineResult<Vec<T>> {
        let range = range.unwrap_or_default();
        range.validate()?;
        self.txn
            .read(|store| Ok(store.records.range(range).map(|(k, v)| f(k, v)).collect()))
    }

    fn store(&self, key: Key, value: Value, overwrite: bool) -> EngineResult<Key> {
        validate_key(&key)?;
        self.txn.write(Op::Put {
            key: key.clone(),
            value,
            overwrite,
        })?;
        Ok(key)
    }
}

