//! Database connections.

use crate::database::Database;
use crate::error::{EngineError, EngineResult};
use crate::transaction::{Transaction, TransactionMode};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

struct ConnectionInner {
    db: Arc<Database>,
    version: u64,
    closed: AtomicBool,
}

/// An open database.
///
/// Clones share the connection; closing any clone closes all of them.
/// Transactions started before [`Connection::close`] keep working.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<ConnectionInner>,
}

impl Connection {
    pub(crate) fn new(db: Arc<Database>) -> Self {
        let version = db.version();
        Self {
            inner: Arc::new(ConnectionInner {
                db,
                version,
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Database name.
    pub fn name(&self) -> &str {
        self.inner.db.name()
    }

    /// Version the database had when this connection opened.
    pub fn version(&self) -> u64 {
        self.inner.version
    }

    /// Names of the database's stores, in ascending order.
    pub fn object_store_names(&self) -> Vec<String> {
        self.inner.db.store_names()
    }

    /// Returns `true` if the database has a store called `name`.
    pub fn contains_object_store(&self, name: &str) -> bool {
        self.inner.db.store(name).is_some()
    }

    /// Starts a transaction over `store`.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidState`] if the connection is closed or the
    /// database was deleted; [`EngineError::NotFound`] if there is no such
    /// store.
    pub fn transaction(&self, store: &str, mode: TransactionMode) -> EngineResult<Transaction> {
        if self.is_closed() {
            return Err(EngineError::invalid_state(format!(
                "connection to {} is closed",
                self.name()
            )));
        }
        if self.inner.db.is_deleted() {
            return Err(EngineError::invalid_state(format!(
                "database {} was deleted",
                self.name()
            )));
        }
        Transaction::begin(Arc::clone(&self.inner.db), store, mode)
    }

    /// Closes the connection. Closing twice is a no-op.
    pub fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            debug!(database = %self.name(), "connection closed");
        }
    }

    /// Returns `true` once [`Connection::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name())
            .field("version", &self.version())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use shelf_storage::InMemoryBackend;

    fn connection() -> Connection {
        let db = Database::create("db", Arc::new(InMemoryBackend::new()), Config::default());
        db.upgrade(2, |_, txn| txn.create_object_store("items").map(|_| ()))
            .unwrap();
        Connection::new(Arc::new(db))
    }

    #[test]
    fn reports_database() {
        let conn = connection();
        assert_eq!(conn.name(), "db");
        assert_eq!(conn.version(), 2);
        assert_eq!(conn.object_store_names(), vec!["items".to_string()]);
        assert!(conn.contains_object_store("items"));
    }

    #[test]
    fn closed_connection_refuses_transactions() {
        let conn = connection();
        let txn = conn.transaction("items", TransactionMode::ReadOnly).unwrap();
        conn.clone().close();
        assert!(conn.is_closed());
        assert!(matches!(
            conn.transaction("items", TransactionMode::ReadOnly),
            Err(EngineError::InvalidState { .. })
        ));
        assert!(txn.is_active());
    }

    #[test]
    fn missing_store() {
        let conn = connection();
        assert!(matches!(
            conn.transaction("nope", TransactionMode::ReadWrite),
            Err(EngineError::NotFound { .. })
        ));
    }
}
