use clap::Args;
use propdex_core::models::AclPrincipal;

use super::parsers::{
    PropertyAssignment, parse_acl_principal, parse_min_one_u64, parse_min_one_usize,
    parse_property_assignment,
};

#[derive(Debug, Args)]
pub struct UriArg {
    pub uri: String,
}

#[derive(Debug, Args)]
pub struct PutArgs {
    /// Absolute resource path, e.g. `/projects/alpha`.
    #[arg(long)]
    pub uri: String,
    #[arg(long)]
    pub id: i64,
    #[arg(long = "type", default_value = "resource")]
    pub resource_type: String,
    #[arg(long, default_value_t = false)]
    pub collection: bool,
    /// Id of the ancestor whose ACL this resource inherits.
    #[arg(long)]
    pub inherit_acl_from: Option<i64>,
    /// `name=value` or `namespace:name=value`; repeat a key for multiple values.
    #[arg(long = "prop", value_name = "ASSIGNMENT", value_parser = parse_property_assignment)]
    pub properties: Vec<PropertyAssignment>,
    /// Principal granted read access (`user:<name>`, `group:<name>`, `all`).
    #[arg(long = "read", value_name = "PRINCIPAL", value_parser = parse_acl_principal)]
    pub readers: Vec<AclPrincipal>,
}

#[derive(Debug, Args)]
pub struct UpdateArgs {
    #[arg(long, value_parser = parse_min_one_usize)]
    pub max_changes: Option<usize>,
}

#[derive(Debug, Args)]
pub struct DaemonArgs {
    /// Scheduled batches to wait for before stopping; 0 runs until killed.
    #[arg(long, default_value_t = 0)]
    pub cycles: u32,
    #[arg(long, value_parser = parse_min_one_u64)]
    pub interval_ms: Option<u64>,
    #[arg(long, value_parser = parse_min_one_usize)]
    pub max_changes: Option<usize>,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Repair every inconsistency found once the check completes.
    #[arg(long, default_value_t = false)]
    pub repair: bool,
    /// Stop repairing at the first failure.
    #[arg(long, default_value_t = false, requires = "repair")]
    pub abort_on_failure: bool,
    #[arg(long, value_parser = parse_min_one_usize)]
    pub error_limit: Option<usize>,
}

#[derive(Debug, Args)]
pub struct SearchArgs {
    #[arg(long)]
    pub prefix: Option<String>,
    #[arg(long = "type")]
    pub resource_type: Option<String>,
    /// Only resources holding this property value.
    #[arg(long = "prop", value_name = "ASSIGNMENT", value_parser = parse_property_assignment)]
    pub property: Option<PropertyAssignment>,
    /// Security token resolved through `security.json`; anonymous when absent.
    #[arg(long)]
    pub token: Option<String>,
    #[arg(long, default_value_t = 50, value_parser = parse_min_one_usize)]
    pub limit: usize,
}
