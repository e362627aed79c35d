use tempfile::tempdir;

use super::*;
use crate::authz::QueryFilter;
use crate::models::{AclPrincipal, Privilege, Property, PropertyKey, PseudoPrincipal, Value};
use crate::uri::ResourceUri;

fn set(uri: &str, id: i64) -> PropertySet {
    PropertySet::new(ResourceUri::parse(uri).expect("uri"), id, "file")
        .with_property(Property::single("", "title", Value::String(format!("doc {id}"))))
}

fn public_acl() -> Acl {
    Acl::new().with(Privilege::Read, AclPrincipal::Pseudo(PseudoPrincipal::All))
}

fn private_acl(user: &str) -> Acl {
    Acl::new().with(Privilege::All, AclPrincipal::User(user.to_string()))
}

#[test]
fn writes_are_invisible_until_commit() {
    let index = InMemoryPropertySetIndex::new();
    index.add_property_set(&set("/a", 1), &public_acl()).expect("add");
    assert_eq!(
        index.random_accessor().expect("accessor").count_instances("/a").expect("count"),
        0
    );
    index.commit().expect("commit");
    assert_eq!(
        index.random_accessor().expect("accessor").count_instances("/a").expect("count"),
        1
    );
}

#[test]
fn rollback_discards_staged_writes() {
    let index = InMemoryPropertySetIndex::new();
    index.add_property_set(&set("/a", 1), &public_acl()).expect("add");
    index.commit().expect("commit");

    index.delete_property_set("/a").expect("delete");
    index.add_property_set(&set("/b", 2), &public_acl()).expect("add");
    index.rollback();
    index.commit().expect("empty commit");

    let uris = index.ordered_uri_iterator().expect("iter").collect::<Vec<_>>();
    assert_eq!(uris, vec!["/a".to_string()]);
}

#[test]
fn tree_delete_respects_segment_boundaries() {
    let index = InMemoryPropertySetIndex::new();
    for (uri, id) in [("/a", 1), ("/a/b", 2), ("/a/c/d", 3), ("/a-b", 4), ("/ab", 5)] {
        index.add_property_set(&set(uri, id), &public_acl()).expect("add");
    }
    index.commit().expect("commit");

    let removed = index.delete_property_set_tree("/a").expect("tree delete");
    index.commit().expect("commit");
    assert_eq!(removed, 3);
    let uris = index.ordered_uri_iterator().expect("iter").collect::<Vec<_>>();
    assert_eq!(uris, vec!["/a-b".to_string(), "/ab".to_string()]);
}

#[test]
fn duplicate_entries_are_counted_and_iterated() {
    let index = InMemoryPropertySetIndex::new();
    index.add_property_set(&set("/dup", 1), &public_acl()).expect("add 1");
    index.add_property_set(&set("/dup", 1), &public_acl()).expect("add 2");
    index.commit().expect("commit");

    let accessor = index.random_accessor().expect("accessor");
    assert_eq!(accessor.count_instances("/dup").expect("count"), 2);
    let uris = index.ordered_uri_iterator().expect("iter").collect::<Vec<_>>();
    assert_eq!(uris, vec!["/dup".to_string(), "/dup".to_string()]);

    assert_eq!(index.delete_property_set("/dup").expect("delete"), 2);
}

#[test]
fn lock_is_exclusive_and_guard_releases() {
    let index = InMemoryPropertySetIndex::new();
    {
        let guard = IndexWriteGuard::try_acquire(&index);
        assert!(guard.is_some());
        assert!(!index.lock(), "second lock attempt must fail while held");
    }
    assert!(index.lock(), "guard drop must release the lock");
    index.unlock();
}

#[test]
fn internal_data_exposes_id_acl_and_inheritance() {
    let index = InMemoryPropertySetIndex::new();
    let inherited = set("/x", 9).with_acl_inherited_from(3);
    index.add_property_set(&inherited, &private_acl("ann")).expect("add");
    index.commit().expect("commit");

    let data = index
        .random_accessor()
        .expect("accessor")
        .internal_data("/x")
        .expect("internal")
        .expect("present");
    assert_eq!(data.resource_id, 9);
    assert_eq!(data.acl_inherited_from, Some(3));
    assert_eq!(data.acl, private_acl("ann"));
    assert_eq!(data.resource_type, "file");
}

#[test]
fn snapshot_persists_across_reopen_and_detects_tampering() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("index.json");
    {
        let index = InMemoryPropertySetIndex::open(&path).expect("open");
        index.add_property_set(&set("/a", 1), &public_acl()).expect("add");
        index.commit().expect("commit");
    }

    let reopened = InMemoryPropertySetIndex::open(&path).expect("reopen");
    assert_eq!(reopened.document_count().expect("count"), 1);
    reopened.validate_storage_facility().expect("clean snapshot validates");

    let raw = std::fs::read_to_string(&path).expect("read snapshot");
    let tampered = raw.replace("doc 1", "doc 666");
    assert_ne!(raw, tampered);
    std::fs::write(&path, tampered).expect("write tampered");

    let corrupted = InMemoryPropertySetIndex::open(&path).expect("open tampered");
    let err = corrupted
        .validate_storage_facility()
        .expect_err("tampering must be detected");
    assert_eq!(err.code(), "STORAGE_CORRUPTED");
}

#[test]
fn misplaced_document_fails_storage_validation() {
    let index = InMemoryPropertySetIndex::new();
    let document = IndexDocument::encode(&set("/real", 1), &public_acl()).expect("encode");
    index.add_document("/elsewhere", document).expect("add raw");
    index.commit().expect("commit");
    assert!(index.validate_storage_facility().is_err());
}

#[test]
fn search_trims_results_with_authorization_filter() {
    let index = InMemoryPropertySetIndex::new();
    index.add_property_set(&set("/pub", 1), &public_acl()).expect("add pub");
    index.add_property_set(&set("/ann", 2), &private_acl("ann")).expect("add ann");
    index.add_property_set(&set("/bob", 3), &private_acl("bob")).expect("add bob");
    index.commit().expect("commit");

    let everything = index.search(&PropertyQuery::all(), None, 10).expect("search");
    assert_eq!(everything.len(), 3);

    let anonymous = index
        .search(&PropertyQuery::all(), Some(&QueryFilter::ReadForAll), 10)
        .expect("search anon");
    assert_eq!(anonymous.len(), 1);
    assert_eq!(anonymous[0].uri.as_path(), "/pub");

    let ann_filter = QueryFilter::readable_by(["user:ann".to_string()]);
    let mut visible = index
        .search(&PropertyQuery::all(), Some(&ann_filter), 10)
        .expect("search ann")
        .into_iter()
        .map(|set| set.uri.as_path())
        .collect::<Vec<_>>();
    visible.sort();
    assert_eq!(visible, vec!["/ann".to_string(), "/pub".to_string()]);
}

#[test]
fn search_matches_prefix_type_and_property() {
    let index = InMemoryPropertySetIndex::new();
    index.add_property_set(&set("/docs/a", 1), &public_acl()).expect("add");
    index.add_property_set(&set("/docs/b", 2), &public_acl()).expect("add");
    index.add_property_set(&set("/other", 3), &public_acl()).expect("add");
    index.commit().expect("commit");

    let under_docs = index
        .search(&PropertyQuery::all().under("/docs").of_type("file"), None, 10)
        .expect("search");
    assert_eq!(under_docs.len(), 2);

    let titled = index
        .search(
            &PropertyQuery::all().with_property(
                PropertyKey::new("", "title"),
                Value::String("doc 2".into()),
            ),
            None,
            10,
        )
        .expect("search");
    assert_eq!(titled.len(), 1);
    assert_eq!(titled[0].id, 2);

    let limited = index.search(&PropertyQuery::all(), None, 1).expect("search");
    assert_eq!(limited.len(), 1);
}
