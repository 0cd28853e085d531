//! Smoke tests for the tenaz CLI
//!
//! Nothing here launches a browser: `run` cases fail before acquisition.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin until assert_cmd is updated
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get a command for the tenaz binary
fn tenaz() -> Command {
    let mut cmd = Command::cargo_bin("tenaz").expect("tenaz binary should exist");
    cmd.env_remove("RUST_LOG").env_remove("TENAZ_BASE_URL");
    cmd
}

const DRAWER: &str = r#"
name: drawer layout
steps:
  - navigate: { url: /, wait_until: networkidle }
  - act: { action: click, target: [{ role: button, name: "Start Analysis" }, { text: "Start" }] }
  - wait: { element: { target: [{ text: "Key Metrics" }], class: data } }
  - assert:
      visible: { target: [{ css: ".fixed.bottom-0" }] }
"#;

fn write(dir: &TempDir, name: &str, content: &str) -> String {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("write fixture");
    path.to_str().unwrap().to_string()
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    tenaz()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_help_flag() {
    tenaz()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("--log-format"));
}

#[test]
fn test_no_args_fails() {
    tenaz().assert().failure();
}

#[test]
fn test_run_subcommand_help() {
    tenaz()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--junit"))
        .stdout(predicate::str::contains("--headed"));
}

// ============================================================================
// Validate Tests
// ============================================================================

#[test]
fn test_validate_valid_scenario() {
    let temp = TempDir::new().expect("create temp dir");
    let path = write(&temp, "drawer.yaml", DRAWER);

    tenaz()
        .args(["--color", "never", "validate", &path])
        .assert()
        .success()
        .stderr(predicate::str::contains("drawer layout"));
}

#[test]
fn test_validate_multi_document_file() {
    let temp = TempDir::new().expect("create temp dir");
    let both = format!("{DRAWER}---\nname: second\nsteps:\n  - navigate: /about\n");
    let path = write(&temp, "both.yaml", &both);

    tenaz()
        .args(["--color", "never", "validate", &path])
        .assert()
        .success()
        .stderr(predicate::str::contains("drawer layout, second"));
}

#[test]
fn test_validate_rejects_empty_steps() {
    let temp = TempDir::new().expect("create temp dir");
    let path = write(&temp, "empty.yaml", "name: empty\nsteps: []\n");

    tenaz()
        .args(["--color", "never", "validate", &path])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no steps"));
}

#[test]
fn test_validate_rejects_malformed_yaml() {
    let temp = TempDir::new().expect("create temp dir");
    let path = write(&temp, "invalid.yaml", "not: valid: yaml: content");

    tenaz().args(["validate", &path]).assert().failure();
}

#[test]
fn test_validate_one_bad_file_fails_all() {
    let temp = TempDir::new().expect("create temp dir");
    let good = write(&temp, "good.yaml", DRAWER);
    let bad = write(&temp, "bad.yaml", "name: x\nsteps:\n  - act: { action: click }\n");

    tenaz()
        .args(["--color", "never", "validate", &good, &bad])
        .assert()
        .failure()
        .stderr(predicate::str::contains("drawer layout"))
        .stderr(predicate::str::contains("bad.yaml"));
}

#[test]
fn test_validate_missing_file() {
    tenaz()
        .args(["validate", "/nonexistent/path.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/path.yaml"));
}

// ============================================================================
// Run Tests (fail before a browser is needed)
// ============================================================================

#[test]
fn test_run_missing_file() {
    tenaz()
        .args(["run", "/nonexistent/drawer.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
}

#[test]
fn test_run_zero_jobs_rejected() {
    let temp = TempDir::new().expect("create temp dir");
    let path = write(&temp, "drawer.yaml", DRAWER);

    tenaz()
        .args(["run", &path, "--jobs", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--jobs"));
}

#[test]
fn test_run_invalid_config_rejected() {
    let temp = TempDir::new().expect("create temp dir");
    let path = write(&temp, "drawer.yaml", DRAWER);
    let config = write(&temp, "tenaz.yaml", "poll_interval_ms: 0\n");

    tenaz()
        .args(["run", &path, "--config", &config])
        .assert()
        .failure()
        .stderr(predicate::str::contains("poll_interval_ms"));
}

#[test]
fn test_run_unknown_config_key_rejected() {
    let temp = TempDir::new().expect("create temp dir");
    let path = write(&temp, "drawer.yaml", DRAWER);
    let config = write(&temp, "tenaz.yaml", "polling: fast\n");

    tenaz()
        .args(["run", &path, "--config", &config])
        .assert()
        .failure();
}

// ============================================================================
// Global Flag Tests
// ============================================================================

#[test]
fn test_verbose_flag() {
    tenaz().args(["-vv", "--help"]).assert().success();
}

#[test]
fn test_quiet_validate_prints_nothing_on_success() {
    let temp = TempDir::new().expect("create temp dir");
    let path = write(&temp, "drawer.yaml", DRAWER);

    tenaz()
        .args(["-q", "validate", &path])
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

#[test]
fn test_json_log_format_accepted() {
    let temp = TempDir::new().expect("create temp dir");
    let path = write(&temp, "drawer.yaml", DRAWER);

    tenaz()
        .args(["--log-format", "json", "validate", &path])
        .assert()
        .success();
}
