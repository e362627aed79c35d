// Public fallible APIs in this crate share one concrete error contract (`PropdexError`).
// Repeating per-function `# Errors` boilerplate obscures behavior more than it clarifies.
#![allow(
    clippy::missing_errors_doc,
    reason = "crate-wide fallible API uses one explicit error type; per-item boilerplate would duplicate contract"
)]

pub mod authz;
pub mod clock;
pub mod config;
pub mod consistency;
pub mod dao;
pub mod error;
pub mod index;
pub mod models;
pub mod store;
pub mod updater;
pub mod uri;

pub use authz::{
    AclQueryAuthorizationFilterFactory, CachingQueryAuthorizationFilterFactory,
    QueryAuthorizationFilterFactory, QueryFilter, StaticSecurityContext,
};
pub use config::AppConfig;
pub use consistency::{CancellationFlag, ConsistencyCheck, Inconsistency};
pub use dao::{ChangeLogDao, IndexDao, TransactionManager};
pub use error::{PropdexError, Result};
pub use index::{InMemoryPropertySetIndex, PropertySetIndex};
pub use store::SqliteResourceStore;
pub use updater::IncrementalUpdater;
pub use uri::ResourceUri;
