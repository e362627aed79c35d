use std::collections::BTreeMap;

use tracing::debug;

use crate::dao::IndexDao;
use crate::error::Result;
use crate::index::{IndexWriteGuard, PropertySetIndex};
use crate::models::ChangeLogEntry;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct AppliedChanges {
    pub deleted: usize,
    pub updated: usize,
    pub fetched_from_store: usize,
}

/// Applies one batch of change-log entries to the index under its write
/// lock and commits. Returns `None` when the lock is held elsewhere.
///
/// Deletes go first; every other URI is reduced to its final operation,
/// removed, and re-added from the store, so reapplying a batch converges on
/// the same index state.
pub(crate) fn apply_changes(
    index: &dyn PropertySetIndex,
    index_dao: &dyn IndexDao,
    entries: &[ChangeLogEntry],
) -> Result<Option<AppliedChanges>> {
    let Some(_guard) = IndexWriteGuard::try_acquire(index) else {
        return Ok(None);
    };

    let outcome = stage_changes(index, index_dao, entries)
        .and_then(|applied| index.commit().map(|()| applied));
    if outcome.is_err() {
        index.rollback();
    }
    outcome.map(Some)
}

fn stage_changes(
    index: &dyn PropertySetIndex,
    index_dao: &dyn IndexDao,
    entries: &[ChangeLogEntry],
) -> Result<AppliedChanges> {
    let mut applied = AppliedChanges::default();

    for entry in entries.iter().filter(|entry| entry.is_delete()) {
        let removed = if entry.is_collection {
            index.delete_property_set_tree(&entry.uri)?
        } else {
            index.delete_property_set(&entry.uri)?
        };
        debug!(uri = %entry.uri, removed, collection = entry.is_collection, "applied delete");
        applied.deleted += 1;
    }

    let updated_uris = last_operation_per_uri(entries)
        .into_iter()
        .filter(|(_, entry)| !entry.is_delete())
        .map(|(uri, _)| uri.to_string())
        .collect::<Vec<_>>();
    if updated_uris.is_empty() {
        return Ok(applied);
    }

    for uri in &updated_uris {
        index.delete_property_set(uri)?;
    }
    for record in index_dao.ordered_property_set_iteration_for_uris(&updated_uris)? {
        let (set, acl) = record?;
        index.add_property_set(&set, &acl)?;
        applied.fetched_from_store += 1;
    }
    applied.updated = updated_uris.len();

    if applied.fetched_from_store < updated_uris.len() {
        // Deleted after the change was logged; its DELETED entry follows.
        debug!(
            requested = updated_uris.len(),
            fetched = applied.fetched_from_store,
            "store returned fewer resources than requested"
        );
    }
    Ok(applied)
}

/// Entries arrive in sequence order, so the last one seen per URI wins.
pub(crate) fn last_operation_per_uri(entries: &[ChangeLogEntry]) -> BTreeMap<&str, &ChangeLogEntry> {
    let mut last = BTreeMap::new();
    for entry in entries {
        last.insert(entry.uri.as_str(), entry);
    }
    last
}
