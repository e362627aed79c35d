use std::fmt;

use crate::dao::PropertySetRecord;
use crate::error::{PropdexError, Result};
use crate::index::{IndexedResourceData, PropertySetIndex};
use crate::models::{InconsistencyKind, PropertyKey, PropertySet};

/// One divergence between the index and the store. Variants that can be
/// fixed carry the authoritative record they are repaired from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    Missing {
        record: PropertySetRecord,
    },
    Multiples {
        count: usize,
        record: PropertySetRecord,
    },
    Dangling {
        uri: String,
    },
    InvalidUuid {
        indexed: i64,
        record: PropertySetRecord,
    },
    InvalidAcl {
        record: PropertySetRecord,
    },
    InvalidAclInheritedFrom {
        indexed: Option<i64>,
        record: PropertySetRecord,
    },
    InvalidResourceType {
        indexed: String,
        record: PropertySetRecord,
    },
    PropertyValue {
        property: PropertyKey,
        record: PropertySetRecord,
    },
    DanglingProperty {
        property: PropertyKey,
        record: PropertySetRecord,
    },
    Unmappable {
        uri: String,
        reason: String,
    },
}

impl Inconsistency {
    #[must_use]
    pub const fn kind(&self) -> InconsistencyKind {
        match self {
            Self::Missing { .. } => InconsistencyKind::Missing,
            Self::Multiples { .. } => InconsistencyKind::Multiples,
            Self::Dangling { .. } => InconsistencyKind::Dangling,
            Self::InvalidUuid { .. } => InconsistencyKind::InvalidUuid,
            Self::InvalidAcl { .. } => InconsistencyKind::InvalidAcl,
            Self::InvalidAclInheritedFrom { .. } => InconsistencyKind::InvalidAclInheritedFrom,
            Self::InvalidResourceType { .. } => InconsistencyKind::InvalidResourceType,
            Self::PropertyValue { .. } => InconsistencyKind::PropertyValue,
            Self::DanglingProperty { .. } => InconsistencyKind::DanglingProperty,
            Self::Unmappable { .. } => InconsistencyKind::Unmappable,
        }
    }

    #[must_use]
    pub fn uri(&self) -> String {
        match self {
            Self::Dangling { uri } | Self::Unmappable { uri, .. } => uri.clone(),
            _ => self
                .record()
                .map(|(set, _)| set.uri.to_string())
                .unwrap_or_default(),
        }
    }

    /// Authoritative data the repair writes back, if any.
    #[must_use]
    pub const fn record(&self) -> Option<&PropertySetRecord> {
        match self {
            Self::Missing { record }
            | Self::Multiples { record, .. }
            | Self::InvalidUuid { record, .. }
            | Self::InvalidAcl { record }
            | Self::InvalidAclInheritedFrom { record, .. }
            | Self::InvalidResourceType { record, .. }
            | Self::PropertyValue { record, .. }
            | Self::DanglingProperty { record, .. } => Some(record),
            Self::Dangling { .. } | Self::Unmappable { .. } => None,
        }
    }

    #[must_use]
    pub const fn can_repair(&self) -> bool {
        !matches!(self, Self::Unmappable { .. })
    }

    #[must_use]
    pub fn description(&self) -> String {
        self.to_string()
    }

    /// Stages the fix in `index`. The caller holds the index lock and commits.
    pub fn repair(&self, index: &dyn PropertySetIndex) -> Result<()> {
        match self {
            Self::Dangling { uri } => index.delete_property_set(uri).map(|_| ()),
            Self::Unmappable { uri, .. } => Err(PropdexError::RepairFailed {
                uri: uri.clone(),
                reason: "index entry cannot be decoded; re-index the resource".to_string(),
            }),
            _ => {
                let Some((set, acl)) = self.record() else {
                    return Err(PropdexError::Internal(format!(
                        "{} inconsistency without authoritative data",
                        self.kind()
                    )));
                };
                // A repeated repair must still leave exactly one entry.
                index.delete_property_set(&set.uri.as_path())?;
                index.add_property_set(set, acl)
            }
        }
    }
}

impl fmt::Display for Inconsistency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let uri = self.uri();
        match self {
            Self::Missing { .. } => write!(f, "{uri}: missing from index"),
            Self::Multiples { count, .. } => write!(f, "{uri}: indexed {count} times"),
            Self::Dangling { .. } => write!(f, "{uri}: indexed but absent from store"),
            Self::InvalidUuid {
                indexed,
                record: (set, _),
            } => write!(f, "{uri}: resource id is {indexed} in index, {} in store", set.id),
            Self::InvalidAcl { .. } => write!(f, "{uri}: ACL differs from store"),
            Self::InvalidAclInheritedFrom {
                indexed,
                record: (set, _),
            } => write!(
                f,
                "{uri}: ACL inherited from {} in index, {} in store",
                describe_ancestor(*indexed),
                describe_ancestor(set.acl_inherited_from)
            ),
            Self::InvalidResourceType {
                indexed,
                record: (set, _),
            } => write!(
                f,
                "{uri}: resource type is {indexed} in index, {} in store",
                set.resource_type
            ),
            Self::PropertyValue { property, .. } => {
                write!(f, "{uri}: value of {property} differs from store")
            }
            Self::DanglingProperty { property, .. } => {
                write!(f, "{uri}: property {property} is indexed but absent from store")
            }
            Self::Unmappable { reason, .. } => write!(f, "{uri}: unmappable index entry ({reason})"),
        }
    }
}

fn describe_ancestor(id: Option<i64>) -> String {
    id.map_or_else(|| "nothing".to_string(), |id| id.to_string())
}

/// Deep comparison of one index entry with its store record. The first
/// mismatch found is the only one reported.
pub(crate) fn compare(
    indexed: &PropertySet,
    internals: &IndexedResourceData,
    record: &PropertySetRecord,
) -> Option<Inconsistency> {
    let (set, acl) = record;
    if internals.resource_id != set.id || indexed.id != set.id {
        return Some(Inconsistency::InvalidUuid {
            indexed: internals.resource_id,
            record: record.clone(),
        });
    }
    if &internals.acl != acl {
        return Some(Inconsistency::InvalidAcl {
            record: record.clone(),
        });
    }
    if internals.acl_inherited_from != set.acl_inherited_from {
        return Some(Inconsistency::InvalidAclInheritedFrom {
            indexed: internals.acl_inherited_from,
            record: record.clone(),
        });
    }
    if internals.resource_type != set.resource_type {
        return Some(Inconsistency::InvalidResourceType {
            indexed: internals.resource_type.clone(),
            record: record.clone(),
        });
    }

    for expected in set.indexable_properties() {
        let matches = indexed
            .property(&expected.key)
            .is_some_and(|actual| actual.values_equal(expected));
        if !matches {
            return Some(Inconsistency::PropertyValue {
                property: expected.key.clone(),
                record: record.clone(),
            });
        }
    }
    for actual in &indexed.properties {
        let backed = set
            .property(&actual.key)
            .is_some_and(|expected| expected.is_indexable());
        if !backed {
            return Some(Inconsistency::DanglingProperty {
                property: actual.key.clone(),
                record: record.clone(),
            });
        }
    }
    None
}
