//! Security trimming of search results.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::IndexDocument;

mod cache;
mod context;
mod factory;

pub use cache::{CachingQueryAuthorizationFilterFactory, FilterCacheStats};
pub use context::StaticSecurityContext;
pub use factory::AclQueryAuthorizationFilterFactory;

pub const AUTHENTICATED_PRINCIPAL: &str = "pseudo:authenticated";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    User,
    Group,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    pub kind: PrincipalKind,
    pub name: String,
}

impl Principal {
    pub fn user(name: impl Into<String>) -> Self {
        Self {
            kind: PrincipalKind::User,
            name: name.into(),
        }
    }

    pub fn group(name: impl Into<String>) -> Self {
        Self {
            kind: PrincipalKind::Group,
            name: name.into(),
        }
    }

    /// Matches the qualified names stored in index read-principal fields.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match self.kind {
            PrincipalKind::User => format!("user:{}", self.name),
            PrincipalKind::Group => format!("group:{}", self.name),
        }
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Root,
    ReadEverything,
}

pub trait TokenManager: Send + Sync {
    fn principal_for(&self, token: &str) -> Option<Principal>;
}

pub trait PrincipalManager: Send + Sync {
    fn member_groups(&self, principal: &Principal) -> Result<Vec<Principal>>;
}

pub trait RoleManager: Send + Sync {
    fn has_role(&self, principal: &Principal, role: Role) -> bool;
}

/// Restriction applied to indexed documents during a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryFilter {
    /// Only documents readable by everyone.
    ReadForAll,
    /// World-readable documents plus those granting read to any of these
    /// qualified principal names.
    ReadableBy { principals: BTreeSet<String> },
}

impl QueryFilter {
    pub fn readable_by(principals: impl IntoIterator<Item = String>) -> Self {
        Self::ReadableBy {
            principals: principals.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn matches(&self, document: &IndexDocument) -> bool {
        if document.is_read_for_all() {
            return true;
        }
        match self {
            Self::ReadForAll => false,
            Self::ReadableBy { principals } => document
                .read_principals()
                .any(|principal| principals.contains(principal)),
        }
    }
}

pub trait QueryAuthorizationFilterFactory: Send + Sync {
    /// `None` means the token's principal may read everything.
    fn authorization_query_filter(&self, token: Option<&str>) -> Result<Option<Arc<QueryFilter>>>;

    fn read_for_all_filter_query(&self) -> Arc<QueryFilter>;
}

#[cfg(test)]
mod tests;
