//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against a throwaway HOME.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(home: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new("cargo")
        .args(["run", "-q", "-p", "tradertime-cli", "--"])
        .args(args)
        .env("HOME", home)
        .env_remove("TRADERTIME_ENV")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

#[test]
fn test_alarm_schedule_list_cancel() {
    let home = tempfile::tempdir().unwrap();

    let (stdout, stderr, code) = run_cli(
        home.path(),
        &["alarm", "schedule", "--id", "a1", "--label", "London open", "--in", "3600"],
    );
    assert_eq!(code, 0, "schedule failed: {stderr}");
    let scheduled: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(scheduled["id"], "a1");
    assert_eq!(scheduled["result"]["success"], true);

    let (stdout, _, code) = run_cli(home.path(), &["alarm", "list", "--json"]);
    assert_eq!(code, 0);
    let alarms: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(alarms[0]["id"], "a1");
    assert_eq!(alarms[0]["label"], "London open");
    assert_eq!(alarms[0]["soundId"], "original");

    let (_, _, code) = run_cli(home.path(), &["alarm", "cancel", "a1"]);
    assert_eq!(code, 0);
    let (_, _, code) = run_cli(home.path(), &["alarm", "cancel", "a1"]);
    assert_eq!(code, 0, "second cancel must also succeed");

    let (stdout, _, _) = run_cli(home.path(), &["alarm", "list", "--json"]);
    let alarms: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(alarms.as_array().unwrap().is_empty());
}

#[test]
fn test_alarm_schedule_rejects_past_instant() {
    let home = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(
        home.path(),
        &["alarm", "schedule", "--id", "late", "--at", "2020-01-01T00:00:00Z"],
    );
    assert_ne!(code, 0);
    assert!(stderr.contains("is not after current time"), "stderr: {stderr}");

    let (stdout, _, _) = run_cli(home.path(), &["alarm", "list"]);
    assert!(stdout.contains("No pending alarms."));
}

#[test]
fn test_session_next_wraps_week() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(
        home.path(),
        &["session", "next", "SYDNEY_START", "--from", "2026-10-17T23:00:00Z"],
    );
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "2026-10-18T21:00:00Z");

    let (stdout, _, _) = run_cli(
        home.path(),
        &["session", "next", "sydney_start", "--from", "2026-10-18T22:00:00Z"],
    );
    assert_eq!(stdout.trim(), "2026-10-25T21:00:00Z");
}

#[test]
fn test_session_list_json() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["session", "list", "--json"]);
    assert_eq!(code, 0);
    let sessions: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(sessions.as_array().unwrap().len(), 9);
    assert_eq!(sessions[0]["session_id"], "SYDNEY_START");
}

#[test]
fn test_config_get_set_reset() {
    let home = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(home.path(), &["config", "get", "ringing.timeout_secs"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "120");

    let (_, _, code) = run_cli(home.path(), &["config", "set", "alarms.snooze_minutes", "5"]);
    assert_eq!(code, 0);
    let (stdout, _, _) = run_cli(home.path(), &["config", "get", "alarms.snooze_minutes"]);
    assert_eq!(stdout.trim(), "5");

    let (_, _, code) = run_cli(home.path(), &["config", "set", "alarms.volume", "5"]);
    assert_ne!(code, 0);

    run_cli(home.path(), &["config", "reset"]);
    let (stdout, _, _) = run_cli(home.path(), &["config", "get", "alarms.snooze_minutes"]);
    assert_eq!(stdout.trim(), "60");
}
