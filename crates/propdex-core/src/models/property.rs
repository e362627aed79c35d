use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::uri::ResourceUri;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    String(String),
    Int(i32),
    Long(i64),
    Date(DateTime<Utc>),
    Boolean(bool),
    Principal(String),
    Binary(Vec<u8>),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(value) | Self::Principal(value) => f.write_str(value),
            Self::Int(value) => write!(f, "{value}"),
            Self::Long(value) => write!(f, "{value}"),
            Self::Date(value) => f.write_str(&value.to_rfc3339()),
            Self::Boolean(value) => write!(f, "{value}"),
            Self::Binary(value) => write!(f, "<{} bytes>", value.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PropertyKey {
    pub namespace: String,
    pub name: String,
}

impl PropertyKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.name)
        } else {
            write!(f, "{}:{}", self.namespace, self.name)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    pub key: PropertyKey,
    pub values: Vec<Value>,
    pub multiple: bool,
    /// Properties without a type definition. Never indexed.
    #[serde(default)]
    pub dead: bool,
}

impl Property {
    pub fn single(namespace: impl Into<String>, name: impl Into<String>, value: Value) -> Self {
        Self {
            key: PropertyKey::new(namespace, name),
            values: vec![value],
            multiple: false,
            dead: false,
        }
    }

    pub fn multi(
        namespace: impl Into<String>,
        name: impl Into<String>,
        values: impl IntoIterator<Item = Value>,
    ) -> Self {
        Self {
            key: PropertyKey::new(namespace, name),
            values: values.into_iter().collect(),
            multiple: true,
            dead: false,
        }
    }

    #[must_use]
    pub fn into_dead(mut self) -> Self {
        self.dead = true;
        self
    }

    #[must_use]
    pub fn is_indexable(&self) -> bool {
        !self.dead
            && !self
                .values
                .iter()
                .any(|value| matches!(value, Value::Binary(_)))
    }

    /// Multi-valued properties compare as unordered collections.
    #[must_use]
    pub fn values_equal(&self, other: &Self) -> bool {
        if self.multiple != other.multiple {
            return false;
        }
        if !self.multiple {
            return self.values == other.values;
        }
        if self.values.len() != other.values.len() {
            return false;
        }
        let mut left = self.values.iter().collect::<Vec<_>>();
        let mut right = other.values.iter().collect::<Vec<_>>();
        left.sort();
        right.sort();
        left == right
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertySet {
    pub uri: ResourceUri,
    pub id: i64,
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acl_inherited_from: Option<i64>,
    #[serde(default)]
    pub properties: Vec<Property>,
}

impl PropertySet {
    pub fn new(uri: ResourceUri, id: i64, resource_type: impl Into<String>) -> Self {
        Self {
            uri,
            id,
            resource_type: resource_type.into(),
            acl_inherited_from: None,
            properties: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_property(mut self, property: Property) -> Self {
        self.set_property(property);
        self
    }

    #[must_use]
    pub fn with_acl_inherited_from(mut self, ancestor_id: i64) -> Self {
        self.acl_inherited_from = Some(ancestor_id);
        self
    }

    pub fn set_property(&mut self, property: Property) {
        if let Some(existing) = self
            .properties
            .iter_mut()
            .find(|existing| existing.key == property.key)
        {
            *existing = property;
        } else {
            self.properties.push(property);
        }
    }

    #[must_use]
    pub fn property(&self, key: &PropertyKey) -> Option<&Property> {
        self.properties.iter().find(|property| &property.key == key)
    }

    pub fn indexable_properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.iter().filter(|property| property.is_indexable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_valued_properties_ignore_order() {
        let a = Property::multi(
            "",
            "tags",
            [Value::String("x".into()), Value::String("y".into())],
        );
        let b = Property::multi(
            "",
            "tags",
            [Value::String("y".into()), Value::String("x".into())],
        );
        assert!(a.values_equal(&b));
    }

    #[test]
    fn multi_valued_properties_respect_duplicates() {
        let a = Property::multi(
            "",
            "tags",
            [Value::String("x".into()), Value::String("x".into())],
        );
        let b = Property::multi(
            "",
            "tags",
            [Value::String("x".into()), Value::String("y".into())],
        );
        assert!(!a.values_equal(&b));
    }

    #[test]
    fn single_valued_properties_use_plain_equality() {
        let a = Property::single("", "title", Value::String("one".into()));
        let b = Property::single("", "title", Value::String("two".into()));
        assert!(!a.values_equal(&b));
        assert!(a.values_equal(&a.clone()));
    }

    #[test]
    fn dead_and_binary_properties_are_not_indexable() {
        let dead = Property::single("custom", "note", Value::Int(1)).into_dead();
        let binary = Property::single("", "thumbnail", Value::Binary(vec![1, 2]));
        assert!(!dead.is_indexable());
        assert!(!binary.is_indexable());
    }

    #[test]
    fn set_property_replaces_existing_key() {
        let uri = ResourceUri::parse("/a").expect("uri");
        let mut set = PropertySet::new(uri, 1, "file")
            .with_property(Property::single("", "title", Value::String("old".into())));
        set.set_property(Property::single("", "title", Value::String("new".into())));
        assert_eq!(set.properties.len(), 1);
        let key = PropertyKey::new("", "title");
        assert_eq!(
            set.property(&key).expect("title").values,
            vec![Value::String("new".into())]
        );
    }
}
