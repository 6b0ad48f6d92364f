//! Cursors over stores and indexes.

use crate::error::{EngineError, EngineResult};
use crate::key_range::KeyRange;
use crate::request::Request;
use crate::state::{Op, StoreData};
use crate::transaction::{Transaction, TransactionMode};
use shelf_codec::{Key, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Bound, RangeBounds};
use tracing::debug;

/// Order in which a cursor visits entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CursorDirection {
    /// Ascending.
    #[default]
    Next,
    /// Ascending, one entry per distinct index key.
    NextUnique,
    /// Descending.
    Prev,
    /// Descending, one entry per distinct index key (the one with the lowest
    /// primary key).
    PrevUnique,
}

impl CursorDirection {
    fn is_forward(self) -> bool {
        matches!(self, Self::Next | Self::NextUnique)
    }
}

/// What a cursor walks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Source {
    Store,
    Index(String),
}

/// A position in a store or index, owning its transaction.
///
/// Every step re-reads the transaction's view of the store, so writes made
/// through the cursor (or its transaction) are visible to later steps.
#[derive(Debug)]
pub struct Cursor {
    txn: Transaction,
    source: Source,
    range: KeyRange,
    direction: CursorDirection,
    key: Key,
    primary_key: Key,
    value: Value,
}

impl Cursor {
    pub(crate) fn open(
        txn: Transaction,
        source: Source,
        range: KeyRange,
        direction: CursorDirection,
    ) -> EngineResult<Option<Self>> {
        range.validate()?;
        let found = txn.read(|store| seek(store, &source, &range, direction, None))?;
        Ok(found.map(|(key, primary_key, value)| Self {
            txn,
            source,
            range,
            direction,
            key,
            primary_key,
            value,
        }))
    }

    /// Current key: the index key for index cursors, the primary key
    /// otherwise.
    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Primary key of the current record.
    pub fn primary_key(&self) -> &Key {
        &self.primary_key
    }

    /// The current record.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Takes the current record out of the cursor.
    pub fn into_value(self) -> Value {
        self.value
    }

    /// The cursor's direction.
    pub fn direction(&self) -> CursorDirection {
        self.direction
    }

    /// Name of the index being walked, if any.
    pub fn index_name(&self) -> Option<&str> {
        match &self.source {
            Source::Index(name) => Some(name),
            Source::Store => None,
        }
    }

    /// The transaction the cursor runs in.
    pub fn transaction(&self) -> &Transaction {
        &self.txn
    }

    /// Moves one entry on; yields `None` past the last match.
    ///
    /// Past the last match a read-write cursor that solely owns its
    /// transaction commits it, and the request fails if that commit fails.
    pub fn step(self) -> Request<Option<Cursor>> {
        self.advance(1)
    }

    /// Moves `count` entries on; yields `None` past the last match.
    pub fn advance(mut self, count: u32) -> Request<Option<Cursor>> {
        if count == 0 {
            return Request::ready(Err(EngineError::data("advance count must be positive")));
        }
        let outcome = self.txn.clone().read(|store| {
            for _ in 0..count {
                let after = (&self.key, &self.primary_key);
                match seek(store, &self.source, &self.range, self.direction, Some(after))? {
                    Some((key, primary_key, value)) => {
                        self.key = key;
                        self.primary_key = primary_key;
                        self.value = value;
                    }
                    None => return Ok(false),
                }
            }
            Ok(true)
        });
        match outcome {
            Ok(true) => Request::ready(Ok(Some(self))),
            Ok(false) => Request::ready(self.finish_walk().map(|()| None)),
            Err(err) => Request::ready(Err(err)),
        }
    }

    /// A read-write walk that runs off the end commits its writes, unless
    /// another handle to the transaction is still alive to commit them.
    fn finish_walk(self) -> EngineResult<()> {
        if self.txn.mode() != TransactionMode::ReadWrite
            || !self.txn.is_sole_handle()
            || !self.txn.is_active()
        {
            return Ok(());
        }
        debug!(store = %self.txn.store_name(), "cursor exhausted, committing");
        self.txn.finish()
    }

    /// Replaces the current record; yields its primary key.
    pub fn update(&mut self, value: Value) -> Request<Key> {
        let op = Op::Put {
            key: self.primary_key.clone(),
            value: value.clone(),
            overwrite: true,
        };
        Request::ready(self.txn.write(op).map(|()| {
            self.value = value;
            self.primary_key.clone()
        }))
    }

    /// Removes the current record.
    pub fn delete(&self) -> Request<()> {
        Request::ready(
            self.txn
                .write(Op::Delete(KeyRange::only(self.primary_key.clone()))),
        )
    }

    /// Commits the cursor's transaction.
    pub fn commit(self) -> Request<()> {
        self.txn.commit()
    }
}

type Position = (Key, Key, Value);

fn seek(
    store: &StoreData,
    source: &Source,
    range: &KeyRange,
    direction: CursorDirection,
    after: Option<(&Key, &Key)>,
) -> EngineResult<Option<Position>> {
    match source {
        Source::Store => Ok(seek_records(
            &store.records,
            range,
            direction,
            after.map(|(_, primary_key)| primary_key),
        )
        .map(|(key, value)| (key.clone(), key.clone(), value.clone()))),
        Source::Index(name) => {
            let index = store.index(name)?;
            let Some((key, primary_key)) = seek_index(&index.entries, range, direction, after)
            else {
                return Ok(None);
            };
            let value = store.records.get(primary_key).cloned().ok_or_else(|| {
                EngineError::corrupted(format!(
                    "index {name} points at missing record {primary_key}"
                ))
            })?;
            Ok(Some((key.clone(), primary_key.clone(), value)))
        }
    }
}

/// Next record after `after` (or the first one) in `direction`.
///
/// Ranges passed to `BTreeMap::range` are always half-unbounded, so they can
/// never be inverted.
fn seek_records<'s>(
    records: &'s BTreeMap<Key, Value>,
    range: &KeyRange,
    direction: CursorDirection,
    after: Option<&Key>,
) -> Option<(&'s Key, &'s Value)> {
    if direction.is_forward() {
        let start = after.map_or(range.start_bound(), Bound::Excluded);
        records
            .range::<Key, _>((start, Bound::Unbounded))
            .next()
            .filter(|(key, _)| !range.is_past_end(key))
    } else {
        let end = after.map_or(range.end_bound(), Bound::Excluded);
        records
            .range::<Key, _>((Bound::Unbounded, end))
            .next_back()
            .filter(|(key, _)| !range.is_before_start(key))
    }
}

/// Next `(index key, primary key)` entry after `after` in `direction`.
fn seek_index<'s>(
    entries: &'s BTreeMap<Key, BTreeSet<Key>>,
    range: &KeyRange,
    direction: CursorDirection,
    after: Option<(&Key, &Key)>,
) -> Option<(&'s Key, &'s Key)> {
    // Plain directions first visit the remaining records of the same key
    if let Some((key, primary_key)) = after {
        let same_key = entries.get_key_value(key).and_then(|(key, primary_keys)| {
            let next = match direction {
                CursorDirection::Next => primary_keys
                    .range::<Key, _>((Bound::Excluded(primary_key), Bound::Unbounded))
                    .next(),
                CursorDirection::Prev => primary_keys
                    .range::<Key, _>((Bound::Unbounded, Bound::Excluded(primary_key)))
                    .next_back(),
                CursorDirection::NextUnique | CursorDirection::PrevUnique => None,
            };
            next.map(|primary_key| (key, primary_key))
        });
        if same_key.is_some() {
            return same_key;
        }
    }

    if direction.is_forward() {
        let start = after.map_or(range.start_bound(), |(key, _)| Bound::Excluded(key));
        entries
            .range::<Key, _>((start, Bound::Unbounded))
            .take_while(|(key, _)| !range.is_past_end(key))
            .find_map(|(key, primary_keys)| primary_keys.first().map(|pk| (key, pk)))
    } else {
        let end = after.map_or(range.end_bound(), |(key, _)| Bound::Excluded(key));
        entries
            .range::<Key, _>((Bound::Unbounded, end))
            .rev()
            .take_while(|(key, _)| !range.is_before_start(key))
            .find_map(|(key, primary_keys)| {
                let pick = if direction == CursorDirection::Prev {
                    primary_keys.last()
                } else {
                    primary_keys.first()
                };
                pick.map(|pk| (key, pk))
            })
    }
}
