use tempfile::tempdir;

use crate::models::{AclPrincipal, Privilege, PseudoPrincipal, Value};

use super::*;

const LOGGER: LoggerId = LoggerId::new(1, 1);

fn uri(raw: &str) -> ResourceUri {
    ResourceUri::parse(raw).expect("uri")
}

fn public_acl() -> Acl {
    Acl::new().with(Privilege::Read, AclPrincipal::Pseudo(PseudoPrincipal::All))
}

fn document(path: &str, id: i64) -> PropertySet {
    PropertySet::new(uri(path), id, "file")
        .with_property(Property::single("", "title", Value::String(format!("doc {id}"))))
}

fn seeded_store() -> SqliteResourceStore {
    let store = SqliteResourceStore::open_in_memory().expect("open");
    store.register_change_logger(LOGGER).expect("register");
    store
}

#[test]
fn open_creates_database_and_reopens_with_data() {
    let temp = tempdir().expect("tempdir");
    let db_path = temp.path().join("nested").join("store.sqlite3");
    {
        let store = SqliteResourceStore::open(&db_path).expect("open");
        store
            .put_property_set(&document("/a", 1), &public_acl(), false)
            .expect("put");
    }
    let reopened = SqliteResourceStore::open(&db_path).expect("reopen");
    let (set, acl) = reopened
        .property_set(&uri("/a"))
        .expect("load")
        .expect("present");
    assert_eq!(set.id, 1);
    assert_eq!(acl, public_acl());
}

#[cfg(unix)]
#[test]
fn open_hardens_store_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempdir().expect("tempdir");
    let db_path = temp.path().join("store.sqlite3");
    let _store = SqliteResourceStore::open(&db_path).expect("open");
    let mode = std::fs::metadata(&db_path).expect("metadata").permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

#[test]
fn register_change_logger_is_idempotent() {
    let store = seeded_store();
    assert!(!store.register_change_logger(LOGGER).expect("again"));
    assert_eq!(store.change_loggers().expect("list"), vec![LOGGER]);
}

#[test]
fn put_appends_update_for_each_logger() {
    let store = seeded_store();
    let other = LoggerId::new(2, 7);
    store.register_change_logger(other).expect("register");

    store
        .put_property_set(&document("/a", 1), &public_acl(), true)
        .expect("put");

    for logger in [LOGGER, other] {
        let entries = store.change_log_entries(logger, 10).expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].operation, ChangeOperation::Updated);
        assert_eq!(entries[0].uri, "/a");
        assert_eq!(entries[0].resource_id, 1);
        assert!(entries[0].is_collection);
        assert_eq!(entries[0].logger, logger);
    }
}

#[test]
fn put_without_registered_logger_logs_nothing() {
    let store = SqliteResourceStore::open_in_memory().expect("open");
    store
        .put_property_set(&document("/a", 1), &public_acl(), false)
        .expect("put");
    assert_eq!(store.pending_change_count(LOGGER).expect("count"), 0);
}

#[test]
fn put_rejects_resource_id_owned_by_other_uri() {
    let store = seeded_store();
    store
        .put_property_set(&document("/a", 1), &public_acl(), false)
        .expect("put");
    let err = store
        .put_property_set(&document("/b", 1), &public_acl(), false)
        .expect_err("duplicate id");
    assert_eq!(err.code(), "VALIDATION_FAILED");
    assert_eq!(store.pending_change_count(LOGGER).expect("count"), 1);
}

#[test]
fn put_replaces_existing_resource_in_place() {
    let store = seeded_store();
    store
        .put_property_set(&document("/a", 1), &public_acl(), false)
        .expect("put");
    let updated = document("/a", 1)
        .with_property(Property::single("", "title", Value::String("renamed".into())));
    store
        .put_property_set(&updated, &Acl::new(), false)
        .expect("update");

    let (set, acl) = store.property_set(&uri("/a")).expect("load").expect("present");
    assert_eq!(set, updated);
    assert!(acl.is_empty());
    assert_eq!(store.resource_count().expect("count"), 1);
    assert_eq!(store.pending_change_count(LOGGER).expect("pending"), 2);
}

#[test]
fn delete_removes_subtree_but_not_siblings_sharing_prefix() {
    let store = seeded_store();
    for (path, id, collection) in [
        ("/a", 1, true),
        ("/a/b", 2, false),
        ("/a/c", 3, true),
        ("/a/c/d", 4, false),
        ("/ab", 5, false),
    ] {
        store
            .put_property_set(&document(path, id), &public_acl(), collection)
            .expect("put");
    }

    let removed = store.delete_resource(&uri("/a")).expect("delete");
    assert_eq!(removed, 4);
    assert!(store.property_set(&uri("/ab")).expect("load").is_some());

    let entries = store.change_log_entries(LOGGER, 100).expect("entries");
    let last = entries.last().expect("delete entry");
    assert!(last.is_delete());
    assert!(last.is_collection);
    assert_eq!(last.uri, "/a");
    assert_eq!(last.resource_id, 1);
}

#[test]
fn delete_treats_like_wildcards_literally() {
    let store = seeded_store();
    store
        .put_property_set(&document("/a_", 1), &public_acl(), true)
        .expect("put");
    store
        .put_property_set(&document("/a_/x", 2), &public_acl(), false)
        .expect("put");
    store
        .put_property_set(&document("/ab/x", 3), &public_acl(), false)
        .expect("put");

    assert_eq!(store.delete_resource(&uri("/a_")).expect("delete"), 2);
    assert!(store.property_set(&uri("/ab/x")).expect("load").is_some());
}

#[test]
fn delete_missing_resource_is_not_found() {
    let store = seeded_store();
    let err = store.delete_resource(&uri("/nope")).expect_err("missing");
    assert_eq!(err.code(), "NOT_FOUND");
    assert_eq!(store.pending_change_count(LOGGER).expect("count"), 0);
}

#[test]
fn change_log_is_ordered_limited_and_removable() {
    let store = seeded_store();
    for id in 1..=5 {
        store
            .put_property_set(&document(&format!("/r{id}"), id), &public_acl(), false)
            .expect("put");
    }

    let first = store.change_log_entries(LOGGER, 3).expect("entries");
    assert_eq!(
        first.iter().map(|entry| entry.uri.as_str()).collect::<Vec<_>>(),
        vec!["/r1", "/r2", "/r3"]
    );
    assert!(first.windows(2).all(|pair| pair[0].id < pair[1].id));

    assert_eq!(store.remove_change_log_entries(&first).expect("remove"), 3);
    let rest = store.change_log_entries(LOGGER, 10).expect("entries");
    assert_eq!(rest.len(), 2);
    assert_eq!(rest[0].uri, "/r4");
    assert!(store.change_log_entries(LOGGER, 0).expect("zero").is_empty());
}

#[test]
fn ordered_iteration_pages_through_all_rows_in_uri_order() {
    let store = seeded_store().with_page_size(2);
    for (path, id) in [("/c", 3), ("/a", 1), ("/b/x", 4), ("/b", 2), ("/d", 5)] {
        store
            .put_property_set(&document(path, id), &public_acl(), false)
            .expect("put");
    }

    let uris = store
        .ordered_property_set_iteration()
        .expect("iter")
        .map(|record| record.map(|(set, _)| set.uri.to_string()))
        .collect::<Result<Vec<_>>>()
        .expect("rows");
    assert_eq!(uris, vec!["/a", "/b", "/b/x", "/c", "/d"]);
}

#[test]
fn iteration_for_uris_skips_vanished_resources() {
    let store = seeded_store().with_page_size(1);
    store
        .put_property_set(&document("/a", 1), &public_acl(), false)
        .expect("put");
    store
        .put_property_set(&document("/c", 3), &public_acl(), false)
        .expect("put");

    let wanted = vec![
        "/c".to_string(),
        "/gone".to_string(),
        "/a".to_string(),
        "/a".to_string(),
    ];
    let found = store
        .ordered_property_set_iteration_for_uris(&wanted)
        .expect("iter")
        .map(|record| record.map(|(set, _)| set.id))
        .collect::<Result<Vec<_>>>()
        .expect("rows");
    assert_eq!(found, vec![1, 3]);
}

#[test]
fn transaction_rolls_back_change_log_removal_on_error() {
    let store = seeded_store();
    store
        .put_property_set(&document("/a", 1), &public_acl(), false)
        .expect("put");
    let entries = store.change_log_entries(LOGGER, 10).expect("entries");

    let result = store.in_transaction(&mut || {
        store.remove_change_log_entries(&entries)?;
        Err(PropdexError::Internal("boom".to_string()))
    });
    assert!(result.is_err());
    assert_eq!(store.pending_change_count(LOGGER).expect("count"), 1);

    store
        .in_transaction(&mut || {
            store.remove_change_log_entries(&entries)?;
            Ok(())
        })
        .expect("commit");
    assert_eq!(store.pending_change_count(LOGGER).expect("count"), 0);
}
