use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;

use crate::error::Result;

use super::{
    AUTHENTICATED_PRINCIPAL, Principal, PrincipalManager, QueryAuthorizationFilterFactory,
    QueryFilter, Role, RoleManager, TokenManager,
};

/// Builds filters from the principal, its groups and its roles.
#[derive(Clone)]
pub struct AclQueryAuthorizationFilterFactory {
    token_manager: Arc<dyn TokenManager>,
    principal_manager: Arc<dyn PrincipalManager>,
    role_manager: Arc<dyn RoleManager>,
    read_for_all: Arc<QueryFilter>,
}

impl std::fmt::Debug for AclQueryAuthorizationFilterFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AclQueryAuthorizationFilterFactory")
            .finish_non_exhaustive()
    }
}

impl AclQueryAuthorizationFilterFactory {
    pub fn new(
        token_manager: Arc<dyn TokenManager>,
        principal_manager: Arc<dyn PrincipalManager>,
        role_manager: Arc<dyn RoleManager>,
    ) -> Self {
        Self {
            token_manager,
            principal_manager,
            role_manager,
            read_for_all: Arc::new(QueryFilter::ReadForAll),
        }
    }

    pub fn principal_for_token(&self, token: Option<&str>) -> Option<Principal> {
        token.and_then(|token| self.token_manager.principal_for(token))
    }

    pub fn filter_for_principal(&self, principal: &Principal) -> Result<Option<Arc<QueryFilter>>> {
        if self.role_manager.has_role(principal, Role::Root)
            || self.role_manager.has_role(principal, Role::ReadEverything)
        {
            debug!(principal = %principal, "principal reads everything; no filter");
            return Ok(None);
        }
        let mut principals = BTreeSet::new();
        principals.insert(principal.qualified_name());
        principals.insert(AUTHENTICATED_PRINCIPAL.to_string());
        for group in self.principal_manager.member_groups(principal)? {
            principals.insert(group.qualified_name());
        }
        Ok(Some(Arc::new(QueryFilter::ReadableBy { principals })))
    }
}

impl QueryAuthorizationFilterFactory for AclQueryAuthorizationFilterFactory {
    fn authorization_query_filter(&self, token: Option<&str>) -> Result<Option<Arc<QueryFilter>>> {
        match self.principal_for_token(token) {
            Some(principal) => self.filter_for_principal(&principal),
            None => Ok(Some(self.read_for_all_filter_query())),
        }
    }

    fn read_for_all_filter_query(&self) -> Arc<QueryFilter> {
        Arc::clone(&self.read_for_all)
    }
}
