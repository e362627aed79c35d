mod acl;
mod change_log;
mod consistency;
mod property;
mod update;

pub use acl::{Acl, AclPrincipal, Privilege, PseudoPrincipal};
pub use change_log::{ChangeLogEntry, ChangeOperation, LoggerId};
pub use consistency::{
    AbortReason, CheckStatus, ConsistencyReport, InconsistencyKind, RepairReport,
};
pub use property::{Property, PropertyKey, PropertySet, Value};
pub use update::{BatchReport, SkipReason, UpdaterState};
