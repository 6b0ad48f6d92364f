//! The database factory.

use crate::config::Config;
use crate::connection::Connection;
use crate::database::Database;
use crate::error::{EngineError, EngineResult};
use crate::meta::DatabaseInfo;
use crate::request::Request;
use crate::upgrade::{UpgradeTransaction, VersionChangeEvent};
use parking_lot::Mutex;
use shelf_storage::{FileBackend, InMemoryBackend, StorageBackend};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Entry point for opening, enumerating and deleting databases.
///
/// A factory owns one storage backend, which acts as the database
/// directory: every database name maps to one journal in it. Opening the
/// same name twice yields connections to the same shared database.
///
/// # Example
///
/// ```rust
/// use shelf_engine::{Factory, TransactionMode, Value};
///
/// let factory = Factory::in_memory();
/// let conn = factory
///     .open("notes", Some(1), |_, txn| {
///         txn.create_object_store("notes")?;
///         Ok(())
///     })
///     .into_result()
///     .unwrap()
///     .unwrap();
///
/// let txn = conn.transaction("notes", TransactionMode::ReadWrite).unwrap();
/// txn.object_store().put("a", Value::from("hello"));
/// txn.commit().into_result().unwrap().unwrap();
/// ```
pub struct Factory {
    backend: Arc<dyn StorageBackend>,
    config: Config,
    databases: Mutex<HashMap<String, Arc<Database>>>,
}

impl Factory {
    /// Creates a factory over `backend`.
    pub fn new(backend: Arc<dyn StorageBackend>, config: Config) -> Self {
        Self {
            backend,
            config,
            databases: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a factory whose databases live in memory.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()), Config::default())
    }

    /// Creates a factory whose databases live in the directory `path`.
    ///
    /// The directory is created if missing and locked for the factory's
    /// lifetime.
    pub fn open_dir(path: &Path, config: Config) -> EngineResult<Self> {
        let backend = FileBackend::open(path)?;
        info!(path = %path.display(), "database directory opened");
        Ok(Self::new(Arc::new(backend), config))
    }

    /// The factory's configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether [`Factory::databases`] is available.
    pub fn supports_enumeration(&self) -> bool {
        self.config.enumeration
    }

    /// Opens `name`, creating it if missing.
    ///
    /// With `version` set above the persisted version (or for a new
    /// database) `on_upgrade` runs inside an exclusive upgrade transaction;
    /// if it fails nothing changes and the request fails with
    /// [`EngineError::UpgradeAborted`]. `None` opens at the current version
    /// (1 for a new database). A version below the persisted one fails with
    /// [`EngineError::Version`].
    pub fn open<F>(&self, name: &str, version: Option<u64>, on_upgrade: F) -> Request<Connection>
    where
        F: FnOnce(&VersionChangeEvent, &mut UpgradeTransaction) -> EngineResult<()>,
    {
        Request::ready(self.open_inner(name, version, on_upgrade))
    }

    fn open_inner<F>(&self, name: &str, version: Option<u64>, on_upgrade: F) -> EngineResult<Connection>
    where
        F: FnOnce(&VersionChangeEvent, &mut UpgradeTransaction) -> EngineResult<()>,
    {
        if version == Some(0) {
            return Err(EngineError::data("database version must be positive"));
        }
        let db = self
            .database(name, true)?
            .ok_or_else(|| EngineError::not_found(format!("database {name}")))?;
        let requested = version.unwrap_or_else(|| db.version().max(1));
        db.upgrade(requested, on_upgrade)?;
        debug!(database = name, version = db.version(), "database opened");
        Ok(Connection::new(db))
    }

    /// Opens `name` at its current version without creating it.
    ///
    /// Fails with [`EngineError::NotFound`] if the database does not exist.
    pub fn open_existing(&self, name: &str) -> Request<Connection> {
        let outcome = self.database(name, false).and_then(|db| match db {
            Some(db) if db.exists() => Ok(Connection::new(db)),
            _ => Err(EngineError::not_found(format!("database {name}"))),
        });
        Request::ready(outcome)
    }

    /// Lists every existing database with its version, ordered by name.
    ///
    /// Returns `None` when the factory was configured without enumeration.
    pub fn databases(&self) -> Option<Request<Vec<DatabaseInfo>>> {
        if !self.config.enumeration {
            return None;
        }
        Some(Request::ready(self.list()))
    }

    fn list(&self) -> EngineResult<Vec<DatabaseInfo>> {
        let mut names: BTreeSet<String> = self.backend.names()?.into_iter().collect();
        names.extend(self.databases.lock().keys().cloned());

        let mut infos = Vec::with_capacity(names.len());
        for name in names {
            if let Some(db) = self.database(&name, false)? {
                if db.exists() {
                    infos.push(DatabaseInfo {
                        name,
                        version: db.version(),
                    });
                }
            }
        }
        Ok(infos)
    }

    /// Deletes `name` and all its data. Deleting a missing database succeeds.
    ///
    /// Open connections to the database stay usable as handles but can no
    /// longer start transactions.
    pub fn delete_database(&self, name: &str) -> Request<()> {
        Request::ready(self.delete_inner(name))
    }

    fn delete_inner(&self, name: &str) -> EngineResult<()> {
        let mut databases = self.databases.lock();
        if let Some(db) = databases.remove(name) {
            db.mark_deleted();
        }
        let removed = self.backend.remove(name)?;
        info!(database = name, removed, "database deleted");
        Ok(())
    }

    /// Looks `name` up in the registry, loading its journal if needed.
    ///
    /// With `create` set a missing database is registered empty (version
    /// 0); it is persisted by its first upgrade.
    fn database(&self, name: &str, create: bool) -> EngineResult<Option<Arc<Database>>> {
        shelf_storage::validate_name(name)?;
        let mut databases = self.databases.lock();
        if let Some(db) = databases.get(name) {
            return Ok(Some(Arc::clone(db)));
        }

        let db = match Database::load(name, Arc::clone(&self.backend), self.config.clone())? {
            Some(db) => db,
            None if create => Database::create(name, Arc::clone(&self.backend), self.config.clone()),
            None => return Ok(None),
        };
        let db = Arc::new(db);
        databases.insert(name.to_string(), Arc::clone(&db));
        Ok(Some(db))
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("backend", &self.backend)
            .field("config", &self.config)
            .field("open_databases", &self.databases.lock().len())
            .finish()
    }
}
