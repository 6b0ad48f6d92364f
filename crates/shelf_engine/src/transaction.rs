//! Data transactions.

use crate::database::Database;
use crate::error::{EngineError, EngineResult};
use crate::object_store::ObjectStore;
use crate::request::Request;
use crate::state::{Op, StoreData};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Whether a transaction may write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransactionMode {
    /// Reads only; sees a snapshot taken at start.
    #[default]
    ReadOnly,
    /// Reads and writes; changes become visible on commit.
    ReadWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Status {
    Active,
    Committed,
    Aborted,
}

struct TxnState {
    status: Status,
    /// Store as committed when the transaction started.
    base: Arc<StoreData>,
    /// Store as this transaction sees it, including its own writes.
    working: Arc<StoreData>,
    ops: Vec<Op>,
}

struct TxnInner {
    db: Arc<Database>,
    store: String,
    mode: TransactionMode,
    state: Mutex<TxnState>,
}

/// A transaction over one object store.
///
/// Handles are cheap to clone; clones share the same transaction. A
/// read-write transaction must be committed explicitly: if the last handle
/// is dropped while it is still active, its changes are discarded. A request
/// that fails inside a read-write transaction aborts it.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TxnInner>,
}

impl Transaction {
    pub(crate) fn begin(db: Arc<Database>, store: &str, mode: TransactionMode) -> EngineResult<Self> {
        let base = db
            .store(store)
            .ok_or_else(|| EngineError::not_found(format!("store {store} in {}", db.name())))?;
        Ok(Self {
            inner: Arc::new(TxnInner {
                db,
                store: store.to_string(),
                mode,
                state: Mutex::new(TxnState {
                    status: Status::Active,
                    working: Arc::clone(&base),
                    base,
                    ops: Vec::new(),
                }),
            }),
        })
    }

    /// The transaction's mode.
    pub fn mode(&self) -> TransactionMode {
        self.inner.mode
    }

    /// Name of the store the transaction covers.
    pub fn store_name(&self) -> &str {
        &self.inner.store
    }

    /// Returns `true` until the transaction commits or aborts.
    pub fn is_active(&self) -> bool {
        self.inner.state.lock().status == Status::Active
    }

    /// The transaction's object store.
    pub fn object_store(&self) -> ObjectStore {
        ObjectStore::new(self.clone())
    }

    /// Commits every write made in this transaction.
    ///
    /// Fails with [`EngineError::Aborted`] if the transaction was aborted and
    /// with [`EngineError::TransactionInactive`] if it already committed.
    pub fn commit(&self) -> Request<()> {
        Request::ready(self.finish())
    }

    /// Discards every write made in this transaction.
    pub fn abort(&self) {
        let mut state = self.inner.state.lock();
        if state.status == Status::Active {
            state.status = Status::Aborted;
            debug!(
                store = %self.inner.store,
                ops = state.ops.len(),
                "transaction aborted"
            );
        }
    }

    /// Returns `true` if no other clone of this transaction is alive.
    pub(crate) fn is_sole_handle(&self) -> bool {
        Arc::strong_count(&self.inner) == 1
    }

    pub(crate) fn finish(&self) -> EngineResult<()> {
        let mut state = self.inner.state.lock();
        match state.status {
            Status::Active => {}
            Status::Aborted => return Err(EngineError::Aborted),
            Status::Committed => return Err(EngineError::TransactionInactive),
        }
        if self.inner.mode == TransactionMode::ReadOnly || state.ops.is_empty() {
            state.status = Status::Committed;
            return Ok(());
        }

        let ops = std::mem::take(&mut state.ops);
        let working = Arc::clone(&state.working);
        let result = self
            .inner
            .db
            .commit(&self.inner.store, &state.base, working, &ops);
        state.status = if result.is_ok() {
            Status::Committed
        } else {
            Status::Aborted
        };
        result
    }

    /// Runs `f` against the store as this transaction sees it.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&StoreData) -> EngineResult<R>) -> EngineResult<R> {
        let store = {
            let state = self.inner.state.lock();
            check_active(state.status)?;
            Arc::clone(&state.working)
        };
        f(&store)
    }

    /// Applies one write. A failing write aborts the transaction.
    pub(crate) fn write(&self, op: Op) -> EngineResult<()> {
        let mut state = self.inner.state.lock();
        check_active(state.status)?;
        if self.inner.mode == TransactionMode::ReadOnly {
            return Err(EngineError::ReadOnly);
        }
        if let Err(err) = Arc::make_mut(&mut state.working).apply(&op) {
            state.status = Status::Aborted;
            debug!(store = %self.inner.store, error = %err, "write failed, transaction aborted");
            return Err(err);
        }
        state.ops.push(op);
        Ok(())
    }
}

fn check_active(status: Status) -> EngineResult<()> {
    match status {
        Status::Active => Ok(()),
        Status::Committed | Status::Aborted => Err(EngineError::TransactionInactive),
    }
}

impl Drop for TxnInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if state.status == Status::Active && !state.ops.is_empty() {
            debug!(
                store = %self.store,
                ops = state.ops.len(),
                "uncommitted transaction dropped, changes discarded"
            );
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("database", &self.inner.db.name())
            .field("store", &self.inner.store)
            .field("mode", &self.inner.mode)
            .field("active", &self.is_active())
            .finish()
    }
}
