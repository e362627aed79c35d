use std::sync::Arc;

use super::*;
use crate::models::{Acl, AclPrincipal, Privilege, PropertySet, PseudoPrincipal};
use crate::uri::ResourceUri;

fn document(acl: &Acl) -> IndexDocument {
    let set = PropertySet::new(ResourceUri::parse("/doc").expect("uri"), 1, "file");
    IndexDocument::encode(&set, acl).expect("encode")
}

fn factory() -> AclQueryAuthorizationFilterFactory {
    let alice = Principal::user("alice");
    let auditor = Principal::user("auditor");
    let context = Arc::new(
        StaticSecurityContext::new()
            .with_token("t-alice", alice.clone())
            .with_token("t-auditor", auditor.clone())
            .with_group_member(&alice, Principal::group("editors"))
            .with_role(&auditor, Role::ReadEverything),
    );
    AclQueryAuthorizationFilterFactory::new(context.clone(), context.clone(), context)
}

#[test]
fn read_for_all_filter_only_matches_world_readable_documents() {
    let public = document(&Acl::new().with(Privilege::Read, AclPrincipal::Pseudo(PseudoPrincipal::All)));
    let private = document(&Acl::new().with(Privilege::Read, AclPrincipal::User("alice".into())));
    let filter = factory().read_for_all_filter_query();
    assert!(filter.matches(&public));
    assert!(!filter.matches(&private));
}

#[test]
fn principal_filter_includes_groups_and_authenticated() {
    let filter = factory()
        .authorization_query_filter(Some("t-alice"))
        .expect("filter")
        .expect("restricted");

    let by_group = document(&Acl::new().with(Privilege::Read, AclPrincipal::Group("editors".into())));
    let by_user = document(&Acl::new().with(Privilege::All, AclPrincipal::User("alice".into())));
    let by_authenticated = document(
        &Acl::new().with(Privilege::Read, AclPrincipal::Pseudo(PseudoPrincipal::Authenticated)),
    );
    let other = document(&Acl::new().with(Privilege::Read, AclPrincipal::User("mallory".into())));
    let write_only = document(&Acl::new().with(Privilege::AddComment, AclPrincipal::User("alice".into())));

    assert!(filter.matches(&by_group));
    assert!(filter.matches(&by_user));
    assert!(filter.matches(&by_authenticated));
    assert!(!filter.matches(&other));
    assert!(!filter.matches(&write_only));
}

#[test]
fn read_everything_role_yields_no_filter() {
    let filter = factory()
        .authorization_query_filter(Some("t-auditor"))
        .expect("filter");
    assert!(filter.is_none());
}

#[test]
fn unknown_token_is_treated_as_anonymous() {
    let factory = factory();
    let filter = factory
        .authorization_query_filter(Some("bogus"))
        .expect("filter")
        .expect("restricted");
    assert!(Arc::ptr_eq(&filter, &factory.read_for_all_filter_query()));
}
