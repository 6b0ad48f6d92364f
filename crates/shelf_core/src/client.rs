//! Typed access to one object store.

use crate::connection::ConnectionManager;
use crate::error::{CoreError, CoreResult};
use crate::request::settle;
use crate::schema::SchemaDescriptor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shelf_codec::{from_value, to_value, StoreKey};
use shelf_engine::{
    Connection, Cursor, CursorDirection, Index, Key, KeyRange, ObjectStore, Request, Transaction,
    TransactionMode, Value,
};
use std::fmt;
use std::marker::PhantomData;

/// Where and how [`StoreClient::cursor`] walks.
#[derive(Debug, Clone, Default)]
pub struct CursorOptions {
    /// Walk this index instead of the store.
    pub index: Option<String>,
    /// Only visit keys in this range (index keys when walking an index).
    pub range: Option<KeyRange>,
    /// Walking order.
    pub direction: CursorDirection,
    /// Open a read-write transaction so the cursor can update and delete.
    pub write: bool,
}

impl CursorOptions {
    /// Ascending, read-only walk over the whole store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Walks the index `name`.
    #[must_use]
    pub fn index(mut self, name: impl Into<String>) -> Self {
        self.index = Some(name.into());
        self
    }

    /// Restricts the walk to `range`.
    #[must_use]
    pub fn range(mut self, range: impl Into<KeyRange>) -> Self {
        self.range = Some(range.into());
        self
    }

    /// Sets the direction.
    #[must_use]
    pub fn direction(mut self, direction: CursorDirection) -> Self {
        self.direction = direction;
        self
    }

    /// Sets whether the cursor may write.
    #[must_use]
    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }
}

/// A typed client for one object store.
///
/// Records are any serde type `V`; primary keys are any [`StoreKey`] `K`.
/// Every operation runs in its own transaction: reads in a read-only one,
/// writes in a read-write one that commits before the call returns. Use
/// [`StoreClient::txn`] to group several requests atomically.
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use shelf_core::{ConnectionManager, SchemaDescriptor, StoreClient};
/// use shelf_engine::Factory;
/// use std::sync::Arc;
///
/// #[derive(Debug, PartialEq, Serialize, Deserialize)]
/// struct Note {
///     title: String,
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), shelf_core::CoreError> {
/// let manager = ConnectionManager::new(Arc::new(Factory::in_memory()));
/// let notes: StoreClient<Note, String> =
///     StoreClient::open(&manager, &SchemaDescriptor::new("notes")).await?;
///
/// let note = Note { title: "hello".into() };
/// notes.put("n1", &note).await?;
/// assert_eq!(notes.get("n1").await?, note);
/// # Ok(())
/// # }
/// ```
pub struct StoreClient<V, K = Key> {
    connection: Connection,
    store: String,
    marker: PhantomData<fn() -> (V, K)>,
}

impl<V, K> StoreClient<V, K>
where
    V: Serialize + DeserializeOwned,
    K: StoreKey,
{
    /// Opens the database for `descriptor` (creating and upgrading it as
    /// needed) and returns a client for its store.
    pub async fn open(manager: &ConnectionManager, descriptor: &SchemaDescriptor) -> CoreResult<Self> {
        let connection = manager.open(descriptor).await?;
        Ok(Self::from_connection(connection, descriptor.store()))
    }

    /// A client for `store` over an already open connection.
    pub fn from_connection(connection: Connection, store: impl Into<String>) -> Self {
        Self {
            connection,
            store: store.into(),
            marker: PhantomData,
        }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The store name.
    pub fn store_name(&self) -> &str {
        &self.store
    }

    /// Starts a raw transaction over the store.
    pub fn txn(&self, mode: TransactionMode) -> CoreResult<Transaction> {
        Ok(self.connection.transaction(&self.store, mode)?)
    }

    /// All keys, in key order.
    pub async fn list(&self) -> CoreResult<Vec<K>> {
        let keys = self
            .run(TransactionMode::ReadOnly, |store| store.get_all_keys(None))
            .await?;
        keys.into_iter()
            .map(|key| K::from_key(key).map_err(CoreError::from))
            .collect()
    }

    /// The record under `key`.
    ///
    /// # Errors
    ///
    /// [`CoreError::NotFound`] if there is none.
    pub async fn get(&self, key: impl Into<K>) -> CoreResult<V> {
        let key = K::into_key(key.into());
        let shown = key.to_string();
        self.find_key(key).await?.ok_or_else(|| CoreError::NotFound {
            store: self.store.clone(),
            key: shown,
        })
    }

    /// The record under `key`, or `None`.
    pub async fn find(&self, key: impl Into<K>) -> CoreResult<Option<V>> {
        self.find_key(K::into_key(key.into())).await
    }

    async fn find_key(&self, key: Key) -> CoreResult<Option<V>> {
        let value = self
            .run(TransactionMode::ReadOnly, |store| store.get(key))
            .await?;
        value.as_ref().map(decode).transpose()
    }

    /// Records in `range` (all records if `None`), in key order.
    pub async fn get_many(&self, range: Option<KeyRange>) -> CoreResult<Vec<V>> {
        let values = self
            .run(TransactionMode::ReadOnly, |store| store.get_all(range))
            .await?;
        values.iter().map(decode).collect()
    }

    /// Stores `value` under `key`, replacing any existing record.
    pub async fn put(&self, key: impl Into<K>, value: &V) -> CoreResult<K> {
        let key = K::into_key(key.into());
        let value = to_value(value)?;
        let key = self
            .run(TransactionMode::ReadWrite, |store| store.put(key, value))
            .await?;
        Ok(K::from_key(key)?)
    }

    /// Stores `value` under `key`, failing if the key is taken.
    pub async fn add(&self, key: impl Into<K>, value: &V) -> CoreResult<K> {
        let key = K::into_key(key.into());
        let value = to_value(value)?;
        let key = self
            .run(TransactionMode::ReadWrite, |store| store.add(key, value))
            .await?;
        Ok(K::from_key(key)?)
    }

    /// Number of records in `range` (all records if `None`).
    pub async fn count(&self, range: Option<KeyRange>) -> CoreResult<u64> {
        self.run(TransactionMode::ReadOnly, |store| store.count(range))
            .await
    }

    /// Returns `true` if a record is stored under `key`.
    pub async fn contains(&self, key: impl Into<K>) -> CoreResult<bool> {
        let range = KeyRange::only(K::into_key(key.into()));
        Ok(self.count(Some(range)).await? > 0)
    }

    /// Removes the record under `key`, if any.
    pub async fn remove(&self, key: impl Into<K>) -> CoreResult<()> {
        self.remove_range(KeyRange::only(K::into_key(key.into())))
            .await
    }

    /// Removes every record in `range`.
    pub async fn remove_range(&self, range: KeyRange) -> CoreResult<()> {
        self.run(TransactionMode::ReadWrite, |store| store.delete(range))
            .await
    }

    /// Removes every record.
    pub async fn clear(&self) -> CoreResult<()> {
        self.run(TransactionMode::ReadWrite, ObjectStore::clear)
            .await
    }

    /// Opens a cursor; `None` if nothing matches.
    ///
    /// A cursor opened with `write` owns a read-write transaction. Its
    /// changes are published when a step runs past the last match or by
    /// [`StoreCursor::commit`], and discarded if the cursor is dropped
    /// mid-walk.
    pub async fn cursor(&self, options: CursorOptions) -> CoreResult<Option<StoreCursor<V, K>>> {
        let mode = if options.write {
            TransactionMode::ReadWrite
        } else {
            TransactionMode::ReadOnly
        };
        let store = self.txn(mode)?.object_store();
        let request = match &options.index {
            Some(name) => store.index(name)?.open_cursor(options.range, options.direction),
            None => store.open_cursor(options.range, options.direction),
        };
        let cursor = settle(request).await?;
        Ok(cursor.map(StoreCursor::new))
    }

    /// First record whose `index` key falls in `range`.
    pub async fn index_get(&self, index: &str, range: impl Into<KeyRange>) -> CoreResult<Option<V>> {
        let range = range.into();
        let value = self
            .run(TransactionMode::ReadOnly, |store| {
                on_index(store, index, |ix| ix.get(range))
            })
            .await?;
        value.as_ref().map(decode).transpose()
    }

    /// Records whose `index` key falls in `range`, in index key order.
    pub async fn index_get_many(&self, index: &str, range: Option<KeyRange>) -> CoreResult<Vec<V>> {
        let values = self
            .run(TransactionMode::ReadOnly, |store| {
                on_index(store, index, |ix| ix.get_all(range))
            })
            .await?;
        values.iter().map(decode).collect()
    }

    /// Primary keys of records whose `index` key falls in `range`.
    pub async fn index_keys(&self, index: &str, range: Option<KeyRange>) -> CoreResult<Vec<K>> {
        let keys = self
            .run(TransactionMode::ReadOnly, |store| {
                on_index(store, index, |ix| ix.get_all_keys(range))
            })
            .await?;
        keys.into_iter()
            .map(|key| K::from_key(key).map_err(CoreError::from))
            .collect()
    }

    /// Number of `index` entries in `range`.
    pub async fn index_count(&self, index: &str, range: Option<KeyRange>) -> CoreResult<u64> {
        self.run(TransactionMode::ReadOnly, |store| {
            on_index(store, index, |ix| ix.count(range))
        })
        .await
    }

    /// Issues one request in a fresh transaction and commits it.
    async fn run<T, F>(&self, mode: TransactionMode, issue: F) -> CoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ObjectStore) -> Request<T>,
    {
        let txn = self.txn(mode)?;
        let result = settle(issue(&txn.object_store())).await?;
        settle(txn.commit()).await?;
        Ok(result)
    }
}

fn on_index<T>(store: &ObjectStore, name: &str, issue: impl FnOnce(&Index) -> Request<T>) -> Request<T> {
    match store.index(name) {
        Ok(index) => issue(&index),
        Err(err) => Request::ready(Err(err)),
    }
}

fn decode<V: DeserializeOwned>(value: &Value) -> CoreResult<V> {
    Ok(from_value(value)?)
}

impl<V, K> Clone for StoreClient<V, K> {
    fn clone(&self) -> Self {
        Self {
            connection: self.connection.clone(),
            store: self.store.clone(),
            marker: PhantomData,
        }
    }
}

impl<V, K> fmt::Debug for StoreClient<V, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreClient")
            .field("database", &self.connection.name())
            .field("store", &self.store)
            .finish()
    }
}

/// A typed cursor handed out by [`StoreClient::cursor`].
pub struct StoreCursor<V, K = Key> {
    cursor: Cursor,
    marker: PhantomData<fn() -> (V, K)>,
}

impl<V, K> StoreCursor<V, K>
where
    V: Serialize + DeserializeOwned,
    K: StoreKey,
{
    fn new(cursor: Cursor) -> Self {
        Self {
            cursor,
            marker: PhantomData,
        }
    }

    /// Current key: the index key when walking an index.
    pub fn key(&self) -> &Key {
        self.cursor.key()
    }

    /// Primary key of the current record.
    pub fn primary_key(&self) -> CoreResult<K> {
        Ok(K::from_key(self.cursor.primary_key().clone())?)
    }

    /// The current record.
    pub fn value(&self) -> CoreResult<V> {
        decode(self.cursor.value())
    }

    /// The untyped cursor.
    pub fn raw(&self) -> &Cursor {
        &self.cursor
    }

    /// Moves to the next match; `None` at the end, after committing a write
    /// cursor's changes.
    pub async fn step(self) -> CoreResult<Option<Self>> {
        self.advance(1).await
    }

    /// Skips `count` matches; `None` past the end.
    pub async fn advance(self, count: u32) -> CoreResult<Option<Self>> {
        let next = settle(self.cursor.advance(count)).await?;
        Ok(next.map(Self::new))
    }

    /// Replaces the current record.
    pub async fn update(&mut self, value: &V) -> CoreResult<K> {
        let value = to_value(value)?;
        let key = settle(self.cursor.update(value)).await?;
        Ok(K::from_key(key)?)
    }

    /// Removes the current record.
    pub async fn delete(&self) -> CoreResult<()> {
        settle(self.cursor.delete()).await
    }

    /// Commits the cursor's transaction.
    pub async fn commit(self) -> CoreResult<()> {
        settle(self.cursor.commit()).await
    }
}

impl<V, K> fmt::Debug for StoreCursor<V, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreCursor")
            .field("key", self.cursor.key())
            .field("primary_key", self.cursor.primary_key())
            .finish()
    }
}
