//! CLI integration tests for cyclesync
//!
//! Tests the cyclesync CLI commands end-to-end using assert_cmd. Every test
//! gets its own config directory and no identity provider configuration, so
//! nothing reaches the network.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const IDENTITY_VARS: &[&str] = &[
    "CYCLESYNC_API_KEY",
    "CYCLESYNC_AUTH_DOMAIN",
    "CYCLESYNC_PROJECT_ID",
    "CYCLESYNC_STORAGE_BUCKET",
    "CYCLESYNC_MESSAGING_SENDER_ID",
    "CYCLESYNC_APP_ID",
    "CYCLESYNC_IDENTITY_ENDPOINT",
    "CYCLESYNC_TOKEN_ENDPOINT",
    "CYCLESYNC_IDENTITY_TIMEOUT_SECS",
];

/// Helper to create a command isolated in `config_dir`
#[allow(deprecated)]
fn cyclesync_cmd(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("cyclesync").unwrap();
    cmd.current_dir(config_dir.path());
    cmd.env("CYCLESYNC_CONFIG_DIR", config_dir.path());
    for var in IDENTITY_VARS {
        cmd.env_remove(var);
    }
    cmd
}

#[test]
fn test_help_lists_session_commands() {
    let dir = TempDir::new().unwrap();

    cyclesync_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("sign-in"))
        .stdout(predicate::str::contains("demo"))
        .stdout(predicate::str::contains("sign-out"));
}

#[test]
fn test_status_without_provider_offers_demo() {
    let dir = TempDir::new().unwrap();

    cyclesync_cmd(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Session: configured_absent"))
        .stdout(predicate::str::contains("View: sign_in"))
        .stdout(predicate::str::contains("cyclesync demo"));
}

#[test]
fn test_status_json() {
    let dir = TempDir::new().unwrap();

    let output = cyclesync_cmd(&dir)
        .args(["--format", "json", "status"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["session"]["mode"], "configured_absent");
    assert_eq!(value["view"]["view"], "sign_in");
    assert_eq!(value["view"]["offer_demo"], true);
}

#[test]
fn test_demo_persists_until_sign_out() {
    let dir = TempDir::new().unwrap();

    cyclesync_cmd(&dir)
        .arg("demo")
        .assert()
        .success()
        .stdout(predicate::str::contains("Session: demo"))
        .stdout(predicate::str::contains("Demo User"));

    assert!(dir.path().join("flags.toml").exists());

    cyclesync_cmd(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Session: demo"))
        .stdout(predicate::str::contains("View: main"));

    cyclesync_cmd(&dir)
        .arg("sign-out")
        .assert()
        .success()
        .stdout(predicate::str::contains("Session: configured_absent"));

    cyclesync_cmd(&dir)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Session: configured_absent"));
}

#[test]
fn test_sign_in_without_provider_is_unavailable() {
    let dir = TempDir::new().unwrap();

    cyclesync_cmd(&dir)
        .args(["sign-in", "--email", "a@b.com", "--password", "pw"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E100"))
        .stderr(predicate::str::contains("cyclesync demo"));
}

#[test]
fn test_sign_in_with_invalid_email() {
    let dir = TempDir::new().unwrap();

    cyclesync_cmd(&dir)
        .args(["sign-in", "--email", "not-an-email", "--password", "pw"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("E800"));
}

#[test]
fn test_config_path_uses_config_dir() {
    let dir = TempDir::new().unwrap();

    cyclesync_cmd(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_config_set_get_reset() {
    let dir = TempDir::new().unwrap();

    cyclesync_cmd(&dir)
        .args(["config", "set", "identity.project_id", "cyclesync-test"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Set identity.project_id = cyclesync-test"));

    cyclesync_cmd(&dir)
        .args(["config", "get", "identity.project_id"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cyclesync-test"));

    cyclesync_cmd(&dir)
        .args(["config", "reset"])
        .assert()
        .success();

    cyclesync_cmd(&dir)
        .args(["config", "get", "identity.project_id"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(not set)"));
}

#[test]
fn test_config_refuses_api_key() {
    let dir = TempDir::new().unwrap();

    cyclesync_cmd(&dir)
        .args(["config", "set", "identity.api_key", "secret"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("CYCLESYNC_API_KEY"));

    assert!(!dir.path().join("config.toml").exists());
}

#[test]
fn test_config_list() {
    let dir = TempDir::new().unwrap();

    cyclesync_cmd(&dir)
        .args(["config", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("identity.endpoint = https://identitytoolkit.googleapis.com/v1"))
        .stdout(predicate::str::contains("session.settle_timeout_secs = 10"));
}

#[test]
fn test_doctor_reports_missing_provider_config() {
    let dir = TempDir::new().unwrap();

    cyclesync_cmd(&dir)
        .arg("doctor")
        .assert()
        .success()
        .stdout(predicate::str::contains("Identity provider: not configured"))
        .stdout(predicate::str::contains("Demo mode: off"));
}
