//! Index requests.

use crate::cursor::{Cursor, CursorDirection, Source};
use crate::error::{EngineError, EngineResult};
use crate::key_range::KeyRange;
use crate::meta::IndexMeta;
use crate::request::Request;
use crate::state::StoreData;
use crate::transaction::Transaction;
use shelf_codec::{Key, Value};

/// A secondary index as seen through one transaction.
///
/// Results come in index key order; records sharing an index key come in
/// primary key order.
#[derive(Debug, Clone)]
pub struct Index {
    txn: Transaction,
    name: String,
}

impl Index {
    pub(crate) fn new(txn: Transaction, name: &str) -> Self {
        Self {
            txn,
            name: name.to_string(),
        }
    }

    /// Index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The index definition.
    pub fn meta(&self) -> EngineResult<IndexMeta> {
        self.txn
            .read(|store| store.index(&self.name).map(|index| index.meta.clone()))
    }

    /// First record whose index key falls in `range`.
    pub fn get(&self, range: impl Into<KeyRange>) -> Request<Option<Value>> {
        let range = range.into();
        Request::ready(self.scan(Some(range), Some(1), record).map(|mut found| found.pop()))
    }

    /// Primary key of the first record whose index key falls in `range`.
    pub fn get_key(&self, range: impl Into<KeyRange>) -> Request<Option<Key>> {
        let range = range.into();
        Request::ready(
            self.scan(Some(range), Some(1), |_, primary_key| Ok(primary_key.clone()))
                .map(|mut found| found.pop()),
        )
    }

    /// Every record whose index key falls in `range`.
    pub fn get_all(&self, range: Option<KeyRange>) -> Request<Vec<Value>> {
        Request::ready(self.scan(range, None, record))
    }

    /// Primary keys of every record whose index key falls in `range`.
    pub fn get_all_keys(&self, range: Option<KeyRange>) -> Request<Vec<Key>> {
        Request::ready(self.scan(range, None, |_, primary_key| Ok(primary_key.clone())))
    }

    /// Number of index entries in `range`.
    pub fn count(&self, range: Option<KeyRange>) -> Request<u64> {
        Request::ready(
            self.scan(range, None, |_, _| Ok(()))
                .map(|found| found.len() as u64),
        )
    }

    /// Opens a cursor walking the index.
    ///
    /// Yields `None` if no entry matches.
    pub fn open_cursor(
        &self,
        range: Option<KeyRange>,
        direction: CursorDirection,
    ) -> Request<Option<Cursor>> {
        Request::ready(Cursor::open(
            self.txn.clone(),
            Source::Index(self.name.clone()),
            range.unwrap_or_default(),
            direction,
        ))
    }

    fn scan<T>(
        &self,
        range: Option<KeyRange>,
        limit: Option<usize>,
        f: impl Fn(&StoreData, &Key) -> EngineResult<T>,
    ) -> EngineResult<Vec<T>> {
        let range = range.unwrap_or_default();
        range.validate()?;
        self.txn.read(|store| {
            let index = store.index(&self.name)?;
            index
                .entries
                .range(range)
                .flat_map(|(_, primary_keys)| primary_keys.iter())
                .take(limit.unwrap_or(usize::MAX))
                .map(|primary_key| f(store, primary_key))
                .collect()
        })
    }
}

fn record(store: &StoreData, primary_key: &Key) -> EngineResult<Value> {
    store
        .records
        .get(primary_key)
        .cloned()
        .ok_or_else(|| EngineError::corrupted(format!("index entry for missing record {primary_key}")))
}
