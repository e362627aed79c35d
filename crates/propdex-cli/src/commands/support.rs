use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use propdex_core::authz::{
    AclQueryAuthorizationFilterFactory, Principal, PrincipalManager, Role, RoleManager,
    StaticSecurityContext, TokenManager,
};
use propdex_core::index::PropertyQuery;
use propdex_core::models::{Acl, Privilege, Property, PropertyKey, PropertySet, Value};
use propdex_core::ResourceUri;
use serde::Deserialize;

use crate::cli::{PropertyAssignment, PutArgs, SearchArgs};

pub(super) const SECURITY_FILE: &str = "security.json";

pub(super) fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}

pub(super) fn build_property_set(args: &PutArgs) -> Result<(PropertySet, Acl)> {
    let uri = ResourceUri::parse(&args.uri)
        .with_context(|| format!("invalid resource uri: {}", args.uri))?;
    let mut set = PropertySet::new(uri, args.id, args.resource_type.clone());
    if let Some(ancestor) = args.inherit_acl_from {
        set = set.with_acl_inherited_from(ancestor);
    }
    for property in group_properties(&args.properties) {
        set.set_property(property);
    }

    let mut acl = Acl::new();
    for reader in &args.readers {
        acl.grant(Privilege::Read, reader.clone());
    }
    Ok((set, acl))
}

/// Repeated keys become one multi-valued property, in first-seen order.
pub(super) fn group_properties(assignments: &[PropertyAssignment]) -> Vec<Property> {
    let mut order: Vec<PropertyKey> = Vec::new();
    let mut values: HashMap<PropertyKey, Vec<Value>> = HashMap::new();
    for assignment in assignments {
        let entry = values.entry(assignment.key.clone()).or_insert_with(|| {
            order.push(assignment.key.clone());
            Vec::new()
        });
        entry.push(assignment.value.clone());
    }

    order
        .into_iter()
        .filter_map(|key| {
            let mut values = values.remove(&key)?;
            let property = if values.len() == 1 {
                Property::single(key.namespace, key.name, values.remove(0))
            } else {
                Property::multi(key.namespace, key.name, values)
            };
            Some(property)
        })
        .collect()
}

pub(super) fn build_query(args: &SearchArgs) -> PropertyQuery {
    let mut query = PropertyQuery::all();
    if let Some(prefix) = &args.prefix {
        query = query.under(prefix.clone());
    }
    if let Some(resource_type) = &args.resource_type {
        query = query.of_type(resource_type.clone());
    }
    if let Some(assignment) = &args.property {
        query = query.with_property(assignment.key.clone(), assignment.value.clone());
    }
    query
}

/// Token, group and role assignments read from `security.json`.
///
/// ```json
/// {
///   "tokens": { "t-alice": "user:alice" },
///   "groups": { "user:alice": ["group:eng"] },
///   "roles": { "user:root": ["root"] }
/// }
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(super) struct SecurityFile {
    tokens: BTreeMap<String, String>,
    groups: BTreeMap<String, Vec<String>>,
    roles: BTreeMap<String, Vec<Role>>,
}

impl SecurityFile {
    pub(super) fn load(root: &Path) -> Result<Self> {
        let path = root.join(SECURITY_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid {}", path.display()))
    }

    pub(super) fn into_context(self) -> Result<StaticSecurityContext> {
        let mut context = StaticSecurityContext::new();
        for (token, principal) in self.tokens {
            context = context.with_token(token, parse_principal(&principal)?);
        }
        for (member, groups) in self.groups {
            let member = parse_principal(&member)?;
            for group in groups {
                context = context.with_group_member(&member, parse_principal(&group)?);
            }
        }
        for (principal, roles) in self.roles {
            let principal = parse_principal(&principal)?;
            for role in roles {
                context = context.with_role(&principal, role);
            }
        }
        Ok(context)
    }
}

pub(super) fn filter_factory(context: StaticSecurityContext) -> AclQueryAuthorizationFilterFactory {
    let context = Arc::new(context);
    let tokens: Arc<dyn TokenManager> = context.clone();
    let principals: Arc<dyn PrincipalManager> = context.clone();
    let roles: Arc<dyn RoleManager> = context;
    AclQueryAuthorizationFilterFactory::new(tokens, principals, roles)
}

fn parse_principal(raw: &str) -> Result<Principal> {
    match raw.split_once(':') {
        Some(("user", name)) if !name.is_empty() => Ok(Principal::user(name)),
        Some(("group", name)) if !name.is_empty() => Ok(Principal::group(name)),
        _ => bail!("principal must be user:<name> or group:<name>, got '{raw}'"),
    }
}
