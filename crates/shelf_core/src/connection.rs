//! Opening databases for a schema descriptor.

use crate::error::ConnectionError;
use crate::reconcile;
use crate::request::outcome;
use crate::schema::SchemaDescriptor;
use parking_lot::Mutex;
use shelf_engine::{Connection, Factory};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Opens databases and brings their schema in line with a descriptor.
///
/// Opening at a version above the persisted one runs a single upgrade
/// transaction that creates the store if needed, reconciles its indices
/// and then runs the descriptor's own upgrade callback. If any step fails
/// the whole upgrade rolls back.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    factory: Arc<Factory>,
}

impl ConnectionManager {
    /// Creates a manager over `factory`.
    pub fn new(factory: Arc<Factory>) -> Self {
        Self { factory }
    }

    /// The factory databases are opened through.
    pub fn factory(&self) -> &Arc<Factory> {
        &self.factory
    }

    /// Opens the database `descriptor` names at the descriptor's version.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::InvalidDescriptor`] before anything is opened
    /// - [`ConnectionError::VersionRegression`] if the database is newer
    /// - [`ConnectionError::Platform`] if the platform refuses or the
    ///   upgrade fails
    /// - [`ConnectionError::Unavailable`] if the open request is dropped
    pub async fn open(&self, descriptor: &SchemaDescriptor) -> Result<Connection, ConnectionError> {
        let declared = descriptor.validate()?;
        let database = descriptor.database_name();
        let version = descriptor.version();
        let store_name = descriptor.store().to_string();
        let callback = descriptor.upgrade_callback().cloned();

        let request = self.factory.open(&database, Some(version), |event, txn| {
            let mut store = if txn.contains_object_store(&store_name) {
                txn.object_store(&store_name)?
            } else {
                debug!(database = %txn.database_name(), store = %store_name, "creating store");
                txn.create_object_store(&store_name)?
            };

            let actions = reconcile::plan(&store.indexes(), &declared);
            info!(
                store = %store_name,
                old_version = event.old_version,
                new_version = event.new_version,
                actions = actions.len(),
                "upgrading store schema"
            );
            reconcile::apply(&mut store, &actions)?;

            if let Some(callback) = &callback {
                callback(event, &mut store)?;
            }
            Ok(())
        });

        match outcome(request).await {
            Some(Ok(connection)) => {
                debug!(database = %database, version = connection.version(), "connection open");
                Ok(connection)
            }
            Some(Err(err)) => {
                let err = ConnectionError::from(err);
                info!(database = %database, version, error = %err, "open failed");
                Err(err)
            }
            None => Err(ConnectionError::Unavailable),
        }
    }
}

/// An explicit, caller-owned map from database name to open connection.
///
/// A cached connection is reused only for the version it was opened at; a
/// descriptor with any other version goes through the manager again (which
/// upgrades, or rejects a regression). Replaced and invalidated connections
/// are closed. Callers racing to open the same database at the same
/// version all receive the connection that reached the cache first.
#[derive(Debug, Default)]
pub struct ConnectionCache {
    connections: Mutex<HashMap<String, Connection>>,
}

impl ConnectionCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached connection for `descriptor`, opening one through
    /// `manager` if there is none.
    pub async fn open(
        &self,
        manager: &ConnectionManager,
        descriptor: &SchemaDescriptor,
    ) -> Result<Connection, ConnectionError> {
        let database = descriptor.database_name();
        if let Some(connection) = self.lookup(&database, descriptor.version()) {
            debug!(database = %database, "reusing cached connection");
            return Ok(connection);
        }

        let connection = manager.open(descriptor).await?;

        // Another caller may have filled the slot while this one was opening
        let mut connections = self.connections.lock();
        if let Some(cached) = connections.get(&database) {
            if !cached.is_closed() && cached.version() == connection.version() {
                debug!(database = %database, "lost open race, keeping cached connection");
                let cached = cached.clone();
                drop(connections);
                connection.close();
                return Ok(cached);
            }
        }
        let replaced = connections.insert(database.clone(), connection.clone());
        drop(connections);
        if let Some(old) = replaced {
            debug!(database = %database, old_version = old.version(), "replacing cached connection");
            old.close();
        }
        Ok(connection)
    }

    fn lookup(&self, database: &str, version: u64) -> Option<Connection> {
        let connections = self.connections.lock();
        connections
            .get(database)
            .filter(|connection| !connection.is_closed() && connection.version() == version)
            .cloned()
    }

    /// The cached connection for `database`, if any.
    pub fn get(&self, database: &str) -> Option<Connection> {
        self.connections.lock().get(database).cloned()
    }

    /// Closes and forgets the connection for `database`.
    ///
    /// Returns `false` if nothing was cached.
    pub fn invalidate(&self, database: &str) -> bool {
        let removed = self.connections.lock().remove(database);
        match removed {
            Some(connection) => {
                connection.close();
                info!(database, "cached connection invalidated");
                true
            }
            None => false,
        }
    }

    /// Closes and forgets every cached connection.
    pub fn close_all(&self) {
        let drained: Vec<Connection> = self.connections.lock().drain().map(|(_, c)| c).collect();
        for connection in &drained {
            connection.close();
        }
        if !drained.is_empty() {
            info!(closed = drained.len(), "connection cache cleared");
        }
    }

    /// Number of cached connections.
    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    /// Returns `true` if nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.connections.lock().is_empty()
    }
}
