use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::error::{PropdexError, Result};
use crate::models::{Acl, Property, PropertySet};
use crate::uri::ResourceUri;

pub(crate) const FIELD_URI: &str = "uri";
pub(crate) const FIELD_RESOURCE_TYPE: &str = "resource_type";
pub(crate) const FIELD_READ_FOR_ALL: &str = "read_for_all";
pub(crate) const FIELD_READ_PRINCIPALS: &str = "read_principals";

/// Encoded index entry. Field contents are only trusted after decoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IndexDocument {
    fields: Map<String, JsonValue>,
}

/// Resource id, ACL and type as stored in the index, without properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedResourceData {
    pub resource_id: i64,
    pub resource_type: String,
    pub acl: Acl,
    pub acl_inherited_from: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument {
    uri: ResourceUri,
    id: i64,
    resource_type: String,
    acl: Acl,
    #[serde(default)]
    acl_inherited_from: Option<i64>,
    read_for_all: bool,
    read_principals: Vec<String>,
    properties: Vec<Property>,
}

#[derive(Debug, Deserialize)]
struct StoredInternals {
    id: i64,
    resource_type: String,
    acl: Acl,
    #[serde(default)]
    acl_inherited_from: Option<i64>,
}

impl IndexDocument {
    pub fn encode(set: &PropertySet, acl: &Acl) -> Result<Self> {
        let stored = StoredDocument {
            uri: set.uri.clone(),
            id: set.id,
            resource_type: set.resource_type.clone(),
            acl: acl.clone(),
            acl_inherited_from: set.acl_inherited_from,
            read_for_all: acl.is_read_for_all(),
            read_principals: acl
                .read_principals()
                .iter()
                .map(|principal| principal.qualified_name())
                .collect(),
            properties: set.indexable_properties().cloned().collect(),
        };
        match serde_json::to_value(stored)? {
            JsonValue::Object(fields) => Ok(Self { fields }),
            other => Err(PropdexError::Internal(format!(
                "index document encoded to non-object: {other}"
            ))),
        }
    }

    /// Builds a document from raw fields. Nothing is validated.
    #[must_use]
    pub fn from_fields(fields: Map<String, JsonValue>) -> Self {
        Self { fields }
    }

    pub(crate) fn fields(&self) -> impl Iterator<Item = (&String, &JsonValue)> {
        self.fields.iter()
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<&JsonValue> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: JsonValue) {
        self.fields.insert(name.into(), value);
    }

    #[must_use]
    pub fn uri(&self) -> Option<&str> {
        self.fields.get(FIELD_URI).and_then(JsonValue::as_str)
    }

    #[must_use]
    pub fn resource_type(&self) -> Option<&str> {
        self.fields
            .get(FIELD_RESOURCE_TYPE)
            .and_then(JsonValue::as_str)
    }

    #[must_use]
    pub fn is_read_for_all(&self) -> bool {
        self.fields
            .get(FIELD_READ_FOR_ALL)
            .and_then(JsonValue::as_bool)
            .unwrap_or(false)
    }

    pub fn read_principals(&self) -> impl Iterator<Item = &str> {
        self.fields
            .get(FIELD_READ_PRINCIPALS)
            .and_then(JsonValue::as_array)
            .into_iter()
            .flatten()
            .filter_map(JsonValue::as_str)
    }

    pub fn decode(&self, key: &str) -> Result<PropertySet> {
        let stored: StoredDocument = self.decode_as(key)?;
        Ok(PropertySet {
            uri: stored.uri,
            id: stored.id,
            resource_type: stored.resource_type,
            acl_inherited_from: stored.acl_inherited_from,
            properties: stored.properties,
        })
    }

    pub fn decode_internals(&self, key: &str) -> Result<IndexedResourceData> {
        let stored: StoredInternals = self.decode_as(key)?;
        Ok(IndexedResourceData {
            resource_id: stored.id,
            resource_type: stored.resource_type,
            acl: stored.acl,
            acl_inherited_from: stored.acl_inherited_from,
        })
    }

    fn decode_as<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<T> {
        serde_json::from_value(JsonValue::Object(self.fields.clone())).map_err(|err| {
            PropdexError::Unmappable {
                uri: key.to_string(),
                reason: err.to_string(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AclPrincipal, Privilege, PseudoPrincipal, Value};

    fn sample() -> (PropertySet, Acl) {
        let set = PropertySet::new(ResourceUri::parse("/a/b").expect("uri"), 7, "article")
            .with_acl_inherited_from(1)
            .with_property(Property::single("", "title", Value::String("Hello".into())))
            .with_property(Property::single("custom", "scratch", Value::Int(3)).into_dead());
        let acl = Acl::new()
            .with(Privilege::Read, AclPrincipal::Pseudo(PseudoPrincipal::All))
            .with(Privilege::All, AclPrincipal::User("owner".into()));
        (set, acl)
    }

    #[test]
    fn encode_decode_drops_dead_properties() {
        let (set, acl) = sample();
        let doc = IndexDocument::encode(&set, &acl).expect("encode");
        let decoded = doc.decode("/a/b").expect("decode");
        assert_eq!(decoded.id, 7);
        assert_eq!(decoded.acl_inherited_from, Some(1));
        assert_eq!(decoded.properties.len(), 1);
        assert_eq!(decoded.properties[0].key.name, "title");
    }

    #[test]
    fn encode_records_read_access_fields() {
        let (set, acl) = sample();
        let doc = IndexDocument::encode(&set, &acl).expect("encode");
        assert!(doc.is_read_for_all());
        let readers = doc.read_principals().collect::<Vec<_>>();
        assert!(readers.contains(&"pseudo:all"));
        assert!(readers.contains(&"user:owner"));
        assert_eq!(doc.uri(), Some("/a/b"));
        assert_eq!(doc.resource_type(), Some("article"));
    }

    #[test]
    fn garbled_document_is_unmappable() {
        let (set, acl) = sample();
        let mut doc = IndexDocument::encode(&set, &acl).expect("encode");
        doc.set_field("id", JsonValue::String("not-a-number".into()));
        let err = doc.decode("/a/b").expect_err("must fail");
        assert_eq!(err.code(), "UNMAPPABLE");
        assert!(doc.decode_internals("/a/b").is_err());
    }
}
