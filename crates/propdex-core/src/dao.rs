//! Seams to the authoritative resource store.
//!
//! The updater and the consistency check only talk to the store through
//! these traits, so tests can substitute recording or failing doubles.

use crate::error::Result;
use crate::models::{Acl, ChangeLogEntry, LoggerId, PropertySet};

/// A property set together with the ACL in effect for it.
pub type PropertySetRecord = (PropertySet, Acl);

/// Lazy, finite, URI-ordered sequence of property sets. Each call to an
/// iteration method starts a fresh sequence.
pub type PropertySetIter<'a> = Box<dyn Iterator<Item = Result<PropertySetRecord>> + Send + 'a>;

pub trait IndexDao: Send + Sync {
    fn ordered_property_set_iteration(&self) -> Result<PropertySetIter<'_>>;

    /// Resources that no longer exist are silently absent from the result.
    fn ordered_property_set_iteration_for_uris(&self, uris: &[String])
    -> Result<PropertySetIter<'_>>;
}

pub trait ChangeLogDao: Send + Sync {
    /// Oldest first, at most `max` entries.
    fn change_log_entries(&self, logger: LoggerId, max: usize) -> Result<Vec<ChangeLogEntry>>;

    fn remove_change_log_entries(&self, entries: &[ChangeLogEntry]) -> Result<usize>;
}

pub trait TransactionManager: Send + Sync {
    /// Runs `work` inside one read-write transaction. An `Err` from `work`
    /// rolls the transaction back and is returned unchanged.
    fn in_transaction(&self, work: &mut dyn FnMut() -> Result<()>) -> Result<()>;
}
