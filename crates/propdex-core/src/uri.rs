use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PropdexError, Result};

/// Absolute hierarchical resource path such as `/` or `/a/b`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceUri {
    segments: Vec<String>,
}

impl ResourceUri {
    #[must_use]
    pub const fn root() -> Self {
        Self {
            segments: Vec::new(),
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        let Some(tail) = value.strip_prefix('/') else {
            return Err(PropdexError::InvalidUri(value.to_string()));
        };
        if tail.is_empty() {
            return Ok(Self::root());
        }
        let segments = normalize_segments(value, tail)?;
        Ok(Self { segments })
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    #[must_use]
    pub const fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    #[must_use]
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn child(&self, name: &str) -> Result<Self> {
        let child_segments = normalize_segments(name, name)?;
        let mut segments = self.segments.clone();
        segments.extend(child_segments);
        Ok(Self { segments })
    }

    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.segments.is_empty() {
            None
        } else {
            Some(Self {
                segments: self.segments[..self.segments.len() - 1].to_vec(),
            })
        }
    }

    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// Segment-aware prefix test: `/a` covers `/a` and `/a/b` but not `/ab`.
    #[must_use]
    pub fn starts_with(&self, other: &Self) -> bool {
        self.segments.len() >= other.segments.len()
            && self
                .segments
                .iter()
                .zip(other.segments.iter())
                .all(|(a, b)| a == b)
    }

    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        other.segments.len() > self.segments.len() && other.starts_with(self)
    }

    #[must_use]
    pub fn as_path(&self) -> String {
        if self.segments.is_empty() {
            "/".to_string()
        } else {
            format!("/{}", self.segments.join("/"))
        }
    }
}

impl Display for ResourceUri {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_path())
    }
}

impl FromStr for ResourceUri {
    type Err = PropdexError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ResourceUri {
    type Error = PropdexError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ResourceUri> for String {
    fn from(value: ResourceUri) -> Self {
        value.as_path()
    }
}

/// Raw-string variant of [`ResourceUri::starts_with`] used on stored keys.
#[must_use]
pub fn path_within(candidate: &str, prefix: &str) -> bool {
    if prefix == "/" {
        return candidate.starts_with('/');
    }
    candidate == prefix
        || candidate
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

fn normalize_segments(original: &str, raw_path: &str) -> Result<Vec<String>> {
    let mut out = Vec::new();
    for segment in raw_path.split('/') {
        if segment.is_empty() || segment == "." || segment == ".." || segment.contains('\\') {
            return Err(PropdexError::InvalidUri(original.to_string()));
        }
        out.push(segment.to_string());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_root_uri() {
        let uri = ResourceUri::parse("/").expect("parse failed");
        assert!(uri.is_root());
        assert_eq!(uri.to_string(), "/");
        assert_eq!(uri.parent(), None);
    }

    #[test]
    fn parse_nested_uri_and_parent() {
        let uri = ResourceUri::parse("/a/b/c.html").expect("parse failed");
        assert_eq!(uri.depth(), 3);
        assert_eq!(uri.name(), Some("c.html"));
        assert_eq!(uri.parent().expect("parent").to_string(), "/a/b");
    }

    #[test]
    fn rejects_relative_and_traversal_paths() {
        for raw in ["", "a/b", "/a/../b", "/a//b", "/a/./b", "/a\\b", "/a/"] {
            assert!(ResourceUri::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn prefix_checks_respect_segment_boundaries() {
        let a = ResourceUri::parse("/a").expect("a");
        let ab = ResourceUri::parse("/ab").expect("ab");
        let a_b = ResourceUri::parse("/a/b").expect("a/b");
        assert!(a_b.starts_with(&a));
        assert!(!ab.starts_with(&a));
        assert!(a.is_ancestor_of(&a_b));
        assert!(!a.is_ancestor_of(&a));
        assert!(path_within("/a/b", "/a"));
        assert!(path_within("/a", "/a"));
        assert!(!path_within("/ab", "/a"));
        assert!(path_within("/anything", "/"));
    }

    #[test]
    fn serde_uses_path_form() {
        let uri = ResourceUri::parse("/docs/x").expect("parse");
        let json = serde_json::to_string(&uri).expect("serialize");
        assert_eq!(json, "\"/docs/x\"");
        let back: ResourceUri = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, uri);
        assert!(serde_json::from_str::<ResourceUri>("\"relative\"").is_err());
    }
}
