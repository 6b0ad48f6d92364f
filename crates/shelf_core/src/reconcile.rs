//! Index reconciliation.
//!
//! [`plan`] diffs the indices a store has against the ones a descriptor
//! declares; [`apply`] carries the resulting actions out inside an upgrade
//! transaction. Each action touches exactly one index, so the outcome does
//! not depend on the order actions are applied in.

use crate::schema::IndexDeclaration;
use shelf_engine::{EngineResult, IndexMeta, UpgradeStore};
use std::collections::BTreeMap;
use tracing::debug;

/// One step towards the declared index set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexAction {
    /// The index is declared but missing.
    Create(IndexDeclaration),
    /// The index exists with a different key path or flags.
    Recreate(IndexDeclaration),
    /// The index exists but is no longer declared.
    Drop(String),
}

impl IndexAction {
    /// Name of the index the action touches.
    pub fn index_name(&self) -> &str {
        match self {
            Self::Create(index) | Self::Recreate(index) => &index.name,
            Self::Drop(name) => name,
        }
    }
}

/// Actions that turn `existing` into `declared`, ordered by index name.
///
/// Indices that already match their declaration produce no action.
pub fn plan(existing: &[IndexMeta], declared: &[IndexDeclaration]) -> Vec<IndexAction> {
    let existing: BTreeMap<&str, &IndexMeta> =
        existing.iter().map(|meta| (meta.name.as_str(), meta)).collect();
    let declared: BTreeMap<&str, &IndexDeclaration> = declared
        .iter()
        .map(|index| (index.name.as_str(), index))
        .collect();

    let mut actions: BTreeMap<&str, IndexAction> = BTreeMap::new();
    for (name, index) in &declared {
        match existing.get(name) {
            None => {
                actions.insert(*name, IndexAction::Create((*index).clone()));
            }
            Some(meta) if !index.matches(meta) => {
                actions.insert(*name, IndexAction::Recreate((*index).clone()));
            }
            Some(_) => {}
        }
    }
    for name in existing.keys() {
        if !declared.contains_key(name) {
            actions.insert(*name, IndexAction::Drop((*name).to_string()));
        }
    }
    actions.into_values().collect()
}

/// Applies `actions` to `store`.
///
/// A recreated index is dropped and then built again from the store's
/// records.
pub fn apply(store: &mut UpgradeStore<'_>, actions: &[IndexAction]) -> EngineResult<()> {
    for action in actions {
        debug!(store = %store.name(), index = action.index_name(), ?action, "reconciling index");
        match action {
            IndexAction::Create(index) => {
                store.create_index(&index.name, index.key_path.clone(), index.options)?;
            }
            IndexAction::Recreate(index) => {
                store.delete_index(&index.name)?;
                store.create_index(&index.name, index.key_path.clone(), index.options)?;
            }
            IndexAction::Drop(name) => store.delete_index(name)?,
        }
    }
    Ok(())
}
