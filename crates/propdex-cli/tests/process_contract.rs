use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn propdex(root: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_propdex"))
        .arg("--root")
        .arg(root)
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .expect("run propdex")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("json stdout")
}

#[test]
fn put_update_search_process_contract_emits_json() {
    // Given a fresh root with one world-readable resource
    // When running `propdex update` and then `propdex search`
    // Then the resource is indexed and visible to anonymous searches.
    let root = tempdir().expect("tempdir");
    let put = propdex(
        root.path(),
        &["put", "--uri", "/docs/readme", "--id", "1", "--prop", "title=Readme", "--read", "all"],
    );
    assert_eq!(stdout_json(&put)["pending_changes"], 1);

    let update = stdout_json(&propdex(root.path(), &["update"]));
    assert_eq!(update["updated"], 1);
    assert_eq!(update["removed_from_change_log"], 1);

    let search = stdout_json(&propdex(root.path(), &["search", "--prefix", "/docs"]));
    let hits = search["hits"].as_array().expect("hits array");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0]["uri"], "/docs/readme");
}

#[test]
fn check_process_contract_returns_non_zero_when_aborted() {
    // Given two resources the index has never seen
    // When running `propdex check --error-limit 1`
    // Then the process fails and still prints the partial report.
    let root = tempdir().expect("tempdir");
    for (uri, id) in [("/a", "1"), ("/b", "2")] {
        let output = propdex(root.path(), &["put", "--uri", uri, "--id", id]);
        assert!(output.status.success());
    }

    let output = propdex(root.path(), &["check", "--error-limit", "1"]);
    assert!(
        !output.status.success(),
        "stdout: {}",
        String::from_utf8_lossy(&output.stdout)
    );
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json stdout");
    assert_eq!(report["report"]["error_count"], 1);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("consistency check did not complete"));
}

#[test]
fn rm_process_contract_fails_for_unknown_resource() {
    let root = tempdir().expect("tempdir");
    let output = propdex(root.path(), &["rm", "/missing"]);
    assert!(!output.status.success());
}
