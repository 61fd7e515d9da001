//! End-to-end tests driving the `ntkpr` binary with piped input

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

fn ntkpr(dir: &Path, args: &[&str], input: &str, env: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_ntkpr"));
    cmd.args(args)
        .env("NTKPR_DATA_DIR", dir.join("data"))
        .env("NTKPR_CONFIG", dir.join("config.toml"))
        .env_remove("NTKPR_LOG")
        .env_remove("NTKPR_RECENT_LIMIT")
        .env_remove("NTKPR_SYNC_ON_EXIT")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in env {
        cmd.env(key, value);
    }

    let mut child = cmd.spawn().expect("failed to start ntkpr");
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn status(dir: &Path) -> serde_json::Value {
    let out = ntkpr(dir, &["status", "--json"], "", &[]);
    assert!(out.status.success());
    serde_json::from_slice(&out.stdout).unwrap()
}

const SCRIPT: &str = "\
thread add Reading
thread select 0
branch add Books
note add Dune
note topics scifi
quit
";

#[test]
fn test_shell_syncs_on_exit() {
    let dir = TempDir::new().unwrap();

    let out = ntkpr(dir.path(), &["--quiet"], SCRIPT, &[]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("1*"), "provisional ids printed: {}", stdout);

    let status = status(dir.path());
    assert_eq!(status["threads"], 1);
    assert_eq!(status["branches"], 1);
    assert_eq!(status["notes"], 1);
    assert_eq!(status["pending_edits"], 0);
}

#[test]
fn test_edits_are_dropped_without_sync() {
    let dir = TempDir::new().unwrap();

    let out = ntkpr(
        dir.path(),
        &["--quiet"],
        SCRIPT,
        &[("NTKPR_SYNC_ON_EXIT", "false")],
    );
    assert!(out.status.success());

    let status = status(dir.path());
    assert_eq!(status["threads"], 0);
    assert_eq!(status["notes"], 0);
}

#[test]
fn test_session_restores_active_note() {
    let dir = TempDir::new().unwrap();
    ntkpr(dir.path(), &["--quiet"], SCRIPT, &[]);
    assert!(dir.path().join("data").join("state.json").exists());

    let out = ntkpr(dir.path(), &["--json"], "note show\n", &[]);
    assert!(out.status.success());
    let note: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(note["content"], "Dune");
    assert_eq!(note["topics"], serde_json::json!(["scifi"]));
}

#[test]
fn test_bad_command_reports_error_and_continues() {
    let dir = TempDir::new().unwrap();

    let out = ntkpr(
        dir.path(),
        &["--quiet"],
        "frobnicate\nthread add Kept\n",
        &[],
    );
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("Unknown command"));
    assert_eq!(status(dir.path())["threads"], 1);
}

#[test]
fn test_config_set_and_show() {
    let dir = TempDir::new().unwrap();

    let out = ntkpr(dir.path(), &["config", "set", "recent_limit", "5"], "", &[]);
    assert!(out.status.success());

    let out = ntkpr(dir.path(), &["config", "show", "--json"], "", &[]);
    let config: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert_eq!(config["recent_limit"], 5);

    let out = ntkpr(dir.path(), &["config", "set", "colour", "blue"], "", &[]);
    assert!(!out.status.success());
}

#[test]
fn test_export_writes_synced_notes() {
    let dir = TempDir::new().unwrap();
    ntkpr(dir.path(), &["--quiet"], SCRIPT, &[]);

    let target = dir.path().join("export.json");
    let out = ntkpr(
        dir.path(),
        &["export", "--output", target.to_str().unwrap()],
        "",
        &[],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let notes: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&target).unwrap()).unwrap();
    assert_eq!(notes.as_array().unwrap().len(), 1);
    assert_eq!(notes[0]["content"], "Dune");
    assert_eq!(notes[0]["topics"], serde_json::json!(["scifi"]));
}

#[test]
fn test_backup_copies_database() {
    let dir = TempDir::new().unwrap();
    ntkpr(dir.path(), &["--quiet"], SCRIPT, &[]);

    let dest = dir.path().join("saved");
    let out = ntkpr(dir.path(), &["backup", dest.to_str().unwrap()], "", &[]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(dest.join("ntkpr.db").exists());
    assert!(dest.join("state.json").exists());

    // An existing destination is never overwritten
    let out = ntkpr(dir.path(), &["backup", dest.to_str().unwrap()], "", &[]);
    assert!(!out.status.success());
}

#[test]
fn test_undo_before_exit_keeps_thread() {
    let dir = TempDir::new().unwrap();
    let script = "thread add Reading\nthread select 0\nthread delete\nundo\nquit\n";

    let out = ntkpr(dir.path(), &["--quiet"], script, &[]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert_eq!(status(dir.path())["threads"], 1);
}
