use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyKind {
    Missing,
    Multiples,
    Dangling,
    InvalidUuid,
    InvalidAcl,
    InvalidAclInheritedFrom,
    InvalidResourceType,
    PropertyValue,
    DanglingProperty,
    Unmappable,
}

impl InconsistencyKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Multiples => "multiples",
            Self::Dangling => "dangling",
            Self::InvalidUuid => "invalid_uuid",
            Self::InvalidAcl => "invalid_acl",
            Self::InvalidAclInheritedFrom => "invalid_acl_inherited_from",
            Self::InvalidResourceType => "invalid_resource_type",
            Self::PropertyValue => "property_value",
            Self::DanglingProperty => "dangling_property",
            Self::Unmappable => "unmappable",
        }
    }
}

impl fmt::Display for InconsistencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    StorageCorrupted,
    TooManyErrors,
    Interrupted,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum CheckStatus {
    NotRun,
    Completed,
    Aborted(AbortReason),
}

impl CheckStatus {
    #[must_use]
    pub const fn is_completed(self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsistencyReport {
    pub status: CheckStatus,
    pub property_sets_checked: usize,
    pub index_uris_checked: usize,
    pub error_count: usize,
    pub counts_by_kind: BTreeMap<InconsistencyKind, usize>,
    pub errors_sample: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    pub attempted: usize,
    pub repaired: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<String>,
}
