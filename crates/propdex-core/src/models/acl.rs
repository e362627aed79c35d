use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Privilege {
    Read,
    ReadProcessed,
    ReadWrite,
    All,
    AddComment,
}

impl Privilege {
    #[must_use]
    pub const fn grants_read(self) -> bool {
        matches!(
            self,
            Self::Read | Self::ReadProcessed | Self::ReadWrite | Self::All
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PseudoPrincipal {
    All,
    Authenticated,
    Owner,
}

impl PseudoPrincipal {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Authenticated => "authenticated",
            Self::Owner => "owner",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum AclPrincipal {
    User(String),
    Group(String),
    Pseudo(PseudoPrincipal),
}

impl AclPrincipal {
    /// Stable name used in index read-principal fields and cache keys.
    #[must_use]
    pub fn qualified_name(&self) -> String {
        match self {
            Self::User(name) => format!("user:{name}"),
            Self::Group(name) => format!("group:{name}"),
            Self::Pseudo(pseudo) => format!("pseudo:{}", pseudo.as_str()),
        }
    }
}

impl fmt::Display for AclPrincipal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

/// Access control list: privilege to the principals holding it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    entries: BTreeMap<Privilege, BTreeSet<AclPrincipal>>,
}

impl Acl {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, privilege: Privilege, principal: AclPrincipal) -> Self {
        self.grant(privilege, principal);
        self
    }

    pub fn grant(&mut self, privilege: Privilege, principal: AclPrincipal) {
        self.entries.entry(privilege).or_default().insert(principal);
    }

    pub fn revoke(&mut self, privilege: Privilege, principal: &AclPrincipal) {
        let mut remove_privilege = false;
        if let Some(principals) = self.entries.get_mut(&privilege) {
            principals.remove(principal);
            remove_privilege = principals.is_empty();
        }
        if remove_privilege {
            self.entries.remove(&privilege);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn principals(&self, privilege: Privilege) -> Option<&BTreeSet<AclPrincipal>> {
        self.entries.get(&privilege)
    }

    #[must_use]
    pub fn read_principals(&self) -> BTreeSet<AclPrincipal> {
        self.entries
            .iter()
            .filter(|(privilege, _)| privilege.grants_read())
            .flat_map(|(_, principals)| principals.iter().cloned())
            .collect()
    }

    #[must_use]
    pub fn is_read_for_all(&self) -> bool {
        self.entries
            .iter()
            .filter(|(privilege, _)| privilege.grants_read())
            .any(|(_, principals)| principals.contains(&AclPrincipal::Pseudo(PseudoPrincipal::All)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_principals_union_read_granting_privileges() {
        let acl = Acl::new()
            .with(Privilege::Read, AclPrincipal::User("alice".into()))
            .with(Privilege::All, AclPrincipal::Group("admins".into()))
            .with(Privilege::AddComment, AclPrincipal::User("bob".into()));
        let readers = acl.read_principals();
        assert!(readers.contains(&AclPrincipal::User("alice".into())));
        assert!(readers.contains(&AclPrincipal::Group("admins".into())));
        assert!(!readers.contains(&AclPrincipal::User("bob".into())));
        assert!(!acl.is_read_for_all());
    }

    #[test]
    fn pseudo_all_with_read_is_read_for_all() {
        let acl = Acl::new().with(Privilege::ReadProcessed, AclPrincipal::Pseudo(PseudoPrincipal::All));
        assert!(acl.is_read_for_all());
    }

    #[test]
    fn revoke_drops_empty_privileges() {
        let alice = AclPrincipal::User("alice".into());
        let mut acl = Acl::new().with(Privilege::Read, alice.clone());
        acl.revoke(Privilege::Read, &alice);
        assert!(acl.is_empty());
        assert_eq!(acl, Acl::new());
    }

    #[test]
    fn acl_serializes_through_json() {
        let acl = Acl::new()
            .with(Privilege::Read, AclPrincipal::Pseudo(PseudoPrincipal::All))
            .with(Privilege::All, AclPrincipal::User("root".into()));
        let json = serde_json::to_string(&acl).expect("serialize");
        let back: Acl = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, acl);
    }
}
