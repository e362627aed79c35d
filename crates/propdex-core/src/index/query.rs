use crate::models::{PropertyKey, PropertySet, Value};
use crate::uri::path_within;

use super::IndexDocument;

/// Structured search over indexed property sets.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyQuery {
    pub uri_prefix: Option<String>,
    pub resource_type: Option<String>,
    pub property: Option<(PropertyKey, Value)>,
}

impl PropertyQuery {
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn under(mut self, prefix: impl Into<String>) -> Self {
        self.uri_prefix = Some(prefix.into());
        self
    }

    #[must_use]
    pub fn of_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    #[must_use]
    pub fn with_property(mut self, key: PropertyKey, value: Value) -> Self {
        self.property = Some((key, value));
        self
    }

    /// Cheap pre-decode match on raw document fields.
    pub(super) fn matches_fields(&self, key: &str, document: &IndexDocument) -> bool {
        if let Some(prefix) = &self.uri_prefix
            && !path_within(key, prefix)
        {
            return false;
        }
        if let Some(resource_type) = &self.resource_type
            && document.resource_type() != Some(resource_type.as_str())
        {
            return false;
        }
        true
    }

    pub(super) fn matches_decoded(&self, set: &PropertySet) -> bool {
        let Some((key, wanted)) = &self.property else {
            return true;
        };
        set.property(key)
            .is_some_and(|property| property.values.contains(wanted))
    }
}
