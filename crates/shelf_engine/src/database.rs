//! Shared state of one open database.

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::journal;
use crate::state::{DatabaseState, Op, StoreData};
use crate::upgrade::{UpgradeTransaction, VersionChangeEvent};
use parking_lot::{Mutex, RwLock};
use shelf_storage::StorageBackend;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Journal bookkeeping, guarded by the write lock.
#[derive(Debug, Default)]
struct Writer {
    seq: u64,
    commits_since_snapshot: u64,
}

/// One database, shared by every connection and transaction on it.
///
/// Readers take `Arc` snapshots of stores out of `state`. Every mutation
/// (commit, upgrade, compaction) holds the `writer` lock for its whole run,
/// so journal order always matches the order in which state changed.
pub(crate) struct Database {
    name: String,
    backend: Arc<dyn StorageBackend>,
    config: Config,
    state: RwLock<DatabaseState>,
    writer: Mutex<Writer>,
    deleted: AtomicBool,
}

impl Database {
    /// A database that has no journal yet; it is persisted by its first
    /// upgrade.
    pub fn create(name: &str, backend: Arc<dyn StorageBackend>, config: Config) -> Self {
        Self {
            name: name.to_string(),
            backend,
            config,
            state: RwLock::new(DatabaseState::default()),
            writer: Mutex::new(Writer::default()),
            deleted: AtomicBool::new(false),
        }
    }

    /// Replays the journal of `name`, if there is one.
    ///
    /// A damaged tail is cut off and the valid prefix written back.
    pub fn load(
        name: &str,
        backend: Arc<dyn StorageBackend>,
        config: Config,
    ) -> EngineResult<Option<Self>> {
        let Some(bytes) = backend.read(name)? else {
            return Ok(None);
        };
        let replay = journal::replay(&bytes)?;
        if let Some(reason) = &replay.stopped {
            warn!(
                database = name,
                reason = %reason,
                valid_bytes = replay.valid_len,
                total_bytes = bytes.len(),
                "journal has a damaged tail, truncating"
            );
            backend.replace(name, &bytes[..replay.valid_len])?;
        }
        debug!(
            database = name,
            version = replay.state.version,
            stores = replay.state.stores.len(),
            commits = replay.commits_since_snapshot,
            "database loaded"
        );

        Ok(Some(Self {
            name: name.to_string(),
            backend,
            config,
            state: RwLock::new(replay.state),
            writer: Mutex::new(Writer {
                seq: replay.seq,
                commits_since_snapshot: replay.commits_since_snapshot,
            }),
            deleted: AtomicBool::new(false),
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> u64 {
        self.state.read().version
    }

    /// Whether the database has been created and not deleted since.
    pub fn exists(&self) -> bool {
        !self.is_deleted() && self.version() > 0
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    pub fn store(&self, name: &str) -> Option<Arc<StoreData>> {
        self.state.read().stores.get(name).cloned()
    }

    pub fn store_names(&self) -> Vec<String> {
        self.state.read().stores.keys().cloned().collect()
    }

    /// Runs an upgrade to `requested` if it is above the current version.
    ///
    /// Returns whether an upgrade ran. The handler works on a private copy of
    /// the state; nothing is persisted or published unless it succeeds.
    pub fn upgrade<F>(&self, requested: u64, handler: F) -> EngineResult<bool>
    where
        F: FnOnce(&VersionChangeEvent, &mut UpgradeTransaction) -> EngineResult<()>,
    {
        let mut writer = self.writer.lock();
        let current = self.state.read().clone();
        if requested < current.version {
            return Err(EngineError::Version {
                requested,
                current: current.version,
            });
        }
        if requested == current.version {
            return Ok(false);
        }

        let event = VersionChangeEvent {
            old_version: current.version,
            new_version: requested,
        };
        debug!(
            database = %self.name,
            old_version = event.old_version,
            new_version = event.new_version,
            "running upgrade"
        );

        let mut txn = UpgradeTransaction::new(&self.name, current, requested);
        if let Err(err) = handler(&event, &mut txn) {
            warn!(database = %self.name, error = %err, "upgrade aborted");
            return Err(EngineError::upgrade_aborted(err));
        }
        let next = txn.into_state();

        let frame = journal::snapshot_frame(&next, writer.seq)?;
        self.backend.replace(&self.name, &frame)?;
        writer.commits_since_snapshot = 0;
        *self.state.write() = next;

        info!(
            database = %self.name,
            old_version = event.old_version,
            new_version = event.new_version,
            "database upgraded"
        );
        Ok(true)
    }

    /// Commits a transaction's changes to `store_name`.
    ///
    /// If the store is still the one the transaction started from, the
    /// transaction's working copy is installed as is; otherwise `ops` are
    /// replayed against the latest committed store, which re-checks every
    /// constraint.
    pub fn commit(
        &self,
        store_name: &str,
        base: &Arc<StoreData>,
        working: Arc<StoreData>,
        ops: &[Op],
    ) -> EngineResult<()> {
        if self.is_deleted() {
            return Err(EngineError::invalid_state(format!(
                "database {} was deleted",
                self.name
            )));
        }

        let mut writer = self.writer.lock();
        let current = self
            .store(store_name)
            .ok_or_else(|| EngineError::not_found(format!("store {store_name}")))?;
        let next = if Arc::ptr_eq(&current, base) {
            working
        } else {
            debug!(
                database = %self.name,
                store = store_name,
                ops = ops.len(),
                "store changed since transaction start, replaying"
            );
            let mut replayed = StoreData::clone(&current);
            for op in ops {
                replayed.apply(op)?;
            }
            Arc::new(replayed)
        };

        let seq = writer.seq + 1;
        let frame = journal::commit_frame(seq, store_name, ops)?;
        self.backend.append(&self.name, &frame)?;
        if self.config.sync_on_commit {
            self.backend.sync(&self.name)?;
        }
        writer.seq = seq;
        writer.commits_since_snapshot += 1;
        self.state
            .write()
            .stores
            .insert(store_name.to_string(), next);

        debug!(database = %self.name, store = store_name, seq, ops = ops.len(), "committed");

        let threshold = self.config.compaction_threshold;
        if threshold > 0 && writer.commits_since_snapshot >= threshold {
            // The commit is already durable; a failed compaction only leaves
            // a longer journal behind.
            if let Err(err) = self.compact(&mut writer) {
                warn!(database = %self.name, error = %err, "compaction failed");
            }
        }
        Ok(())
    }

    /// Rewrites the journal as a single snapshot.
    fn compact(&self, writer: &mut Writer) -> EngineResult<()> {
        let frame = journal::snapshot_frame(&self.state.read(), writer.seq)?;
        self.backend.replace(&self.name, &frame)?;
        info!(
            database = %self.name,
            commits = writer.commits_since_snapshot,
            bytes = frame.len(),
            "journal compacted"
        );
        writer.commits_since_snapshot = 0;
        Ok(())
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("version", &self.version())
            .field("deleted", &self.is_deleted())
            .finish_non_exhaustive()
    }
}
