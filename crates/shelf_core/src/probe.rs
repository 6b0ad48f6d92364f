//! Existence probing.

use crate::request::outcome;
use crate::schema::SchemaDescriptor;
use shelf_engine::{Connection, CursorDirection, Factory, TransactionMode};
use tracing::debug;

/// Returns `true` if the store `descriptor` names exists and holds at least
/// one record.
///
/// Probing never creates a database or store and never runs an upgrade. If
/// the factory can enumerate databases, a missing database is answered
/// without opening anything. Every failure along the way counts as "does
/// not exist".
pub async fn exists(factory: &Factory, descriptor: &SchemaDescriptor) -> bool {
    inspect(factory, descriptor).await.0
}

/// Runs the existence check and also returns the connection it opened,
/// which is closed by the time this returns.
async fn inspect(factory: &Factory, descriptor: &SchemaDescriptor) -> (bool, Option<Connection>) {
    let database = descriptor.database_name();

    if let Some(request) = factory.databases() {
        match outcome(request).await {
            Some(Ok(infos)) if !infos.iter().any(|info| info.name == database) => {
                debug!(database = %database, "probe: database not listed");
                return (false, None);
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                debug!(database = %database, error = %err, "probe: enumeration failed, opening instead");
            }
            None => debug!(database = %database, "probe: enumeration unavailable, opening instead"),
        }
    }

    let connection = match outcome(factory.open_existing(&database)).await {
        Some(Ok(connection)) => connection,
        Some(Err(err)) => {
            debug!(database = %database, error = %err, "probe: open failed");
            return (false, None);
        }
        None => {
            debug!(database = %database, "probe: open abandoned");
            return (false, None);
        }
    };

    let found = has_records(&connection, descriptor.store()).await;
    connection.close();
    (found, Some(connection))
}

async fn has_records(connection: &Connection, store: &str) -> bool {
    let txn = match connection.transaction(store, TransactionMode::ReadOnly) {
        Ok(txn) => txn,
        Err(err) => {
            debug!(database = %connection.name(), store, error = %err, "probe: no transaction");
            return false;
        }
    };
    let request = txn.object_store().open_cursor(None, CursorDirection::Next);
    match outcome(request).await {
        Some(Ok(cursor)) => cursor.is_some(),
        Some(Err(err)) => {
            debug!(database = %connection.name(), store, error = %err, "probe: cursor failed");
            false
        }
        None => false,
    }
}
