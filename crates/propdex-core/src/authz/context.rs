use std::collections::{HashMap, HashSet};

use crate::error::Result;

use super::{Principal, PrincipalManager, Role, RoleManager, TokenManager};

/// Fixed tokens, group memberships and roles.
#[derive(Debug, Clone, Default)]
pub struct StaticSecurityContext {
    tokens: HashMap<String, Principal>,
    groups: HashMap<String, Vec<Principal>>,
    roles: HashMap<String, HashSet<Role>>,
}

impl StaticSecurityContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>, principal: Principal) -> Self {
        self.tokens.insert(token.into(), principal);
        self
    }

    #[must_use]
    pub fn with_group_member(mut self, principal: &Principal, group: Principal) -> Self {
        self.groups
            .entry(principal.qualified_name())
            .or_default()
            .push(group);
        self
    }

    #[must_use]
    pub fn with_role(mut self, principal: &Principal, role: Role) -> Self {
        self.roles
            .entry(principal.qualified_name())
            .or_default()
            .insert(role);
        self
    }
}

impl TokenManager for StaticSecurityContext {
    fn principal_for(&self, token: &str) -> Option<Principal> {
        self.tokens.get(token).cloned()
    }
}

impl PrincipalManager for StaticSecurityContext {
    fn member_groups(&self, principal: &Principal) -> Result<Vec<Principal>> {
        Ok(self
            .groups
            .get(&principal.qualified_name())
            .cloned()
            .unwrap_or_default())
    }
}

impl RoleManager for StaticSecurityContext {
    fn has_role(&self, principal: &Principal, role: Role) -> bool {
        self.roles
            .get(&principal.qualified_name())
            .is_some_and(|roles| roles.contains(&role))
    }
}
