use std::ffi::OsStr;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}"));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_lv<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_lv"))
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute lv binary: {err}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_lv(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "lv command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn db_arg(dir: &PathBuf) -> String {
    dir.join("vault.sqlite3").to_string_lossy().into_owned()
}

#[test]
fn schema_version_reports_pending_then_up_to_date() {
    let dir = unique_temp_dir("lv-schema");
    let db = db_arg(&dir);

    let before = run_json(["--db", &db, "db", "schema-version"]);
    assert_eq!(before["contract_version"], "cli.v1");
    assert_eq!(before["current_version"], 0);
    assert_eq!(before["up_to_date"], false);

    let applied = run_json(["--db", &db, "db", "migrate"]);
    assert_eq!(applied["before_version"], 0);
    assert_eq!(applied["after_version"], applied["target_version"]);
    assert_eq!(applied["up_to_date"], true);

    let after = run_json(["--db", &db, "db", "schema-version"]);
    assert_eq!(after["current_version"], after["target_version"]);
    assert_eq!(after["pending_versions"].as_array().map(Vec::len), Some(0));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn migrate_dry_run_applies_nothing() {
    let dir = unique_temp_dir("lv-dry-run");
    let db = db_arg(&dir);

    let dry = run_json(["--db", &db, "db", "migrate", "--dry-run"]);
    assert_eq!(dry["dry_run"], true);
    assert!(!dry["would_apply_versions"].as_array().map_or(true, Vec::is_empty));

    let status = run_json(["--db", &db, "db", "schema-version"]);
    assert_eq!(status["current_version"], 0);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn link_add_get_delete_round_trip() {
    let dir = unique_temp_dir("lv-link");
    let db = db_arg(&dir);

    let added = run_json([
        "--db",
        &db,
        "link",
        "add",
        "--url",
        "https://example.com/article",
        "--title",
        "An article",
        "--label",
        "read-later",
    ]);
    let id = added["id"].as_str().unwrap_or_else(|| panic!("link add should emit an id"));
    assert_eq!(added["url"], "https://example.com/article");

    let fetched = run_json(["--db", &db, "link", "get", "--id", id]);
    assert_eq!(fetched["found"], true);
    assert_eq!(fetched["link"]["title"], "An article");

    let listed = run_json(["--db", &db, "link", "list"]);
    assert_eq!(listed["count"], 1);

    let deleted = run_json(["--db", &db, "link", "delete", "--id", id]);
    assert_eq!(deleted["deleted"], id);

    let missing = run_json(["--db", &db, "link", "get", "--id", id]);
    assert_eq!(missing["found"], false);

    // Deleting again fails: the cascading delete requires an existing row.
    let output = run_lv(["--db", &db, "link", "delete", "--id", id]);
    assert!(!output.status.success());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn link_add_rejects_empty_url() {
    let dir = unique_temp_dir("lv-bad-link");
    let db = db_arg(&dir);

    let output = run_lv(["--db", &db, "link", "add", "--url", "  "]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("validation"), "unexpected stderr: {stderr}");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn conversation_start_is_idempotent_per_link_set() {
    let dir = unique_temp_dir("lv-conversation");
    let db = db_arg(&dir);

    let link_a = run_json(["--db", &db, "link", "add", "--url", "https://a.example"]);
    let link_b = run_json(["--db", &db, "link", "add", "--url", "https://b.example"]);
    let id_a = link_a["id"].as_str().unwrap_or_else(|| panic!("link add should emit an id"));
    let id_b = link_b["id"].as_str().unwrap_or_else(|| panic!("link add should emit an id"));

    let none = run_json(["--db", &db, "conversation", "find-active", "--link", id_a]);
    assert_eq!(none["found"], false);

    let started = run_json([
        "--db", &db, "conversation", "start", "--link", id_a, "--link", id_b, "--title", "chat",
    ]);
    let conversation_id = started["id"]
        .as_str()
        .unwrap_or_else(|| panic!("conversation start should emit an id"))
        .to_string();

    // Same set in the other order resolves to the same conversation.
    let again = run_json(["--db", &db, "conversation", "start", "--link", id_b, "--link", id_a]);
    assert_eq!(again["id"], conversation_id.as_str());

    let found =
        run_json(["--db", &db, "conversation", "find-active", "--link", id_b, "--link", id_a]);
    assert_eq!(found["found"], true);
    assert_eq!(found["conversation"]["id"], conversation_id.as_str());

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn validate_and_cleanup_repair_duplicates() {
    let dir = unique_temp_dir("lv-validate");
    let db = db_arg(&dir);

    run_json(["--db", &db, "link", "add", "--url", "https://example.com/a"]);
    run_json(["--db", &db, "link", "add", "--url", "https://Example.com/a/"]);

    let report = run_json(["--db", &db, "db", "validate"]);
    assert_eq!(report["health"], "warning");
    assert_eq!(report["is_valid"], true);
    assert_eq!(
        report["report"]["duplicate_link_groups"].as_array().map(Vec::len),
        Some(1)
    );

    let cleanup = run_json(["--db", &db, "db", "cleanup"]);
    assert_eq!(cleanup["total_removed"], 1);

    let healthy = run_json(["--db", &db, "db", "validate"]);
    assert_eq!(healthy["health"], "healthy");
    assert_eq!(run_json(["--db", &db, "link", "list"])["count"], 1);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn clear_resets_the_store_to_latest_schema() {
    let dir = unique_temp_dir("lv-clear");
    let db = db_arg(&dir);

    run_json(["--db", &db, "link", "add", "--url", "https://example.com"]);
    run_json(["--db", &db, "board", "add", "--name", "research"]);

    let cleared = run_json(["--db", &db, "db", "clear"]);
    assert_eq!(cleared["status"], "cleared");

    assert_eq!(run_json(["--db", &db, "link", "list"])["count"], 0);
    assert_eq!(run_json(["--db", &db, "board", "list"])["count"], 0);
    let status = run_json(["--db", &db, "db", "schema-version"]);
    assert_eq!(status["up_to_date"], true);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn deleted_links_land_in_the_archive_log() {
    let dir = unique_temp_dir("lv-archive");
    let db = db_arg(&dir);

    let added = run_json(["--db", &db, "link", "add", "--url", "https://example.com/gone"]);
    let id = added["id"].as_str().unwrap_or_else(|| panic!("link add should emit an id"));
    run_json(["--db", &db, "link", "delete", "--id", id]);

    let log_path = dir.join("vault.deleted.ndjson");
    let body = fs::read_to_string(&log_path)
        .unwrap_or_else(|err| panic!("archive log should exist at {}: {err}", log_path.display()));
    let entry: Value = serde_json::from_str(body.trim())
        .unwrap_or_else(|err| panic!("archive entry should be JSON: {err}"));
    assert_eq!(entry["url"], "https://example.com/gone");
    assert_eq!(entry["id"], id);

    let _ = fs::remove_dir_all(&dir);
}
