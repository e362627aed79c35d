use propdex_core::models::{AclPrincipal, PropertyKey, PseudoPrincipal, Value};

/// One `--prop` occurrence. Repeating a key builds a multi-valued property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyAssignment {
    pub key: PropertyKey,
    pub value: Value,
}

/// Accepts `name=value` or `namespace:name=value`. Values prefixed with
/// `int:`, `long:` or `bool:` are typed; everything else is a string.
pub(super) fn parse_property_assignment(
    raw: &str,
) -> std::result::Result<PropertyAssignment, String> {
    let (qualified, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))?;
    let (namespace, name) = match qualified.rsplit_once(':') {
        Some((namespace, name)) => (namespace.trim(), name.trim()),
        None => ("", qualified.trim()),
    };
    if name.is_empty() {
        return Err(format!("property name must not be empty in '{raw}'"));
    }
    Ok(PropertyAssignment {
        key: PropertyKey::new(namespace, name),
        value: parse_typed_value(value)?,
    })
}

fn parse_typed_value(raw: &str) -> std::result::Result<Value, String> {
    if let Some(rest) = raw.strip_prefix("int:") {
        return rest
            .parse::<i32>()
            .map(Value::Int)
            .map_err(|_| format!("invalid int value '{rest}'"));
    }
    if let Some(rest) = raw.strip_prefix("long:") {
        return rest
            .parse::<i64>()
            .map(Value::Long)
            .map_err(|_| format!("invalid long value '{rest}'"));
    }
    if let Some(rest) = raw.strip_prefix("bool:") {
        return rest
            .parse::<bool>()
            .map(Value::Boolean)
            .map_err(|_| format!("invalid bool value '{rest}'"));
    }
    Ok(Value::String(raw.to_string()))
}

/// Accepts `user:<name>`, `group:<name>` or one of the pseudo principals
/// `all`, `authenticated`, `owner`.
pub(super) fn parse_acl_principal(raw: &str) -> std::result::Result<AclPrincipal, String> {
    let raw = raw.trim();
    match raw.split_once(':') {
        Some(("user", name)) if !name.is_empty() => Ok(AclPrincipal::User(name.to_string())),
        Some(("group", name)) if !name.is_empty() => Ok(AclPrincipal::Group(name.to_string())),
        Some(("pseudo", pseudo)) => parse_pseudo_principal(pseudo),
        Some(_) => Err(format!("unknown principal '{raw}'")),
        None => parse_pseudo_principal(raw),
    }
}

fn parse_pseudo_principal(raw: &str) -> std::result::Result<AclPrincipal, String> {
    let pseudo = match raw {
        "all" => PseudoPrincipal::All,
        "authenticated" => PseudoPrincipal::Authenticated,
        "owner" => PseudoPrincipal::Owner,
        other => return Err(format!("unknown pseudo principal '{other}'")),
    };
    Ok(AclPrincipal::Pseudo(pseudo))
}

pub(super) fn parse_min_one_usize(raw: &str) -> std::result::Result<usize, String> {
    let value = raw
        .parse::<usize>()
        .map_err(|_| format!("invalid integer value '{raw}'"))?;
    if value == 0 {
        return Err("value must be >= 1".to_string());
    }
    Ok(value)
}

pub(super) fn parse_min_one_u64(raw: &str) -> std::result::Result<u64, String> {
    let value = raw
        .parse::<u64>()
        .map_err(|_| format!("invalid integer value '{raw}'"))?;
    if value == 0 {
        return Err("value must be >= 1".to_string());
    }
    Ok(value)
}
