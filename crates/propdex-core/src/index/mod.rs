//! Secondary property-set index: the collaborator contract plus an
//! in-memory implementation with optional snapshot persistence.

use crate::error::Result;
use crate::models::{Acl, PropertySet};

mod document;
mod memory;
mod query;
mod snapshot;

pub use document::{IndexDocument, IndexedResourceData};
pub use memory::InMemoryPropertySetIndex;
pub use query::PropertyQuery;

/// Inverted-index engine as seen by the updater and the consistency check.
///
/// Writes are staged until [`PropertySetIndex::commit`]; readers observe the
/// last committed state. Writers are expected to hold the index lock.
pub trait PropertySetIndex: Send + Sync {
    fn add_property_set(&self, set: &PropertySet, acl: &Acl) -> Result<()>;

    /// Removes every entry stored under `uri`, returning how many were removed.
    fn delete_property_set(&self, uri: &str) -> Result<usize>;

    /// Removes `uri` and every descendant.
    fn delete_property_set_tree(&self, uri: &str) -> Result<usize>;

    /// Non-blocking attempt at the exclusive write lock.
    fn lock(&self) -> bool;

    fn unlock(&self);

    fn commit(&self) -> Result<()>;

    /// Discards staged writes.
    fn rollback(&self);

    fn is_cluster_shared_read_only(&self) -> bool;

    fn random_accessor(&self) -> Result<Box<dyn RandomAccessor + '_>>;

    /// URIs of all committed entries in URI order. Duplicated entries repeat.
    fn ordered_uri_iterator(&self) -> Result<Box<dyn Iterator<Item = String> + Send + '_>>;

    /// Storage-level self test; fails with `StorageCorrupted`.
    fn validate_storage_facility(&self) -> Result<()>;
}

/// Point lookups against one committed view of the index.
pub trait RandomAccessor {
    fn count_instances(&self, uri: &str) -> Result<usize>;

    /// Decodes the first entry for `uri`; fails with `Unmappable` on bad data.
    fn property_set_by_uri(&self, uri: &str) -> Result<Option<PropertySet>>;

    fn internal_data(&self, uri: &str) -> Result<Option<IndexedResourceData>>;
}

/// Holds the index write lock; releases it on drop.
pub struct IndexWriteGuard<'a> {
    index: &'a dyn PropertySetIndex,
}

impl<'a> IndexWriteGuard<'a> {
    pub fn try_acquire(index: &'a dyn PropertySetIndex) -> Option<Self> {
        index.lock().then_some(Self { index })
    }
}

impl Drop for IndexWriteGuard<'_> {
    fn drop(&mut self) {
        self.index.unlock();
    }
}

impl std::fmt::Debug for IndexWriteGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexWriteGuard").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
