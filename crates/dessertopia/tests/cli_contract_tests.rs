//! CLI command contract tests.
//!
//! Runs the `archive` binary against a temp state file and checks:
//! - deterministic exit codes
//! - stable JSON shape for `--json` output
//! - unlock progress persists only when asked to
//! - actionable error messages for bad input

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// =============================================================================
// Test fixture helpers
// =============================================================================

/// Temp dir plus the state file path inside it.
fn setup_state(unlocked: Option<&str>) -> (TempDir, String) {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("archive_state.json");
    if let Some(count) = unlocked {
        let body = serde_json::json!({ "unlocked_phase_count": count });
        std::fs::write(&path, body.to_string()).expect("write state file");
    }
    let path = path.to_string_lossy().to_string();
    (dir, path)
}

#[allow(deprecated)]
fn archive_cmd(state: &str) -> Command {
    let mut cmd = Command::cargo_bin("archive").expect("archive binary should be built");
    cmd.env_remove("DESSERTOPIA_CONFIG");
    cmd.env_remove("RUST_LOG");
    cmd.args(["--state", state, "--log-level", "warn"]);
    cmd
}

fn parse_json(stdout: &[u8]) -> serde_json::Value {
    serde_json::from_slice(stdout).expect("stdout should be valid JSON")
}

// =============================================================================
// status
// =============================================================================

#[test]
fn contract_status_fresh_state_json() {
    let (_dir, state) = setup_state(None);
    let output = archive_cmd(&state)
        .args(["status", "--json"])
        .output()
        .expect("archive status should execute");
    assert!(output.status.success());

    let value = parse_json(&output.stdout);
    assert_eq!(value["unlocked_count"], 1);
    assert_eq!(value["phase_count"], 3);
    let phases = value["phases"].as_array().expect("phases array");
    assert_eq!(phases.len(), 3);
    assert_eq!(phases[0]["unlocked"], true);
    assert_eq!(phases[1]["unlocked"], false);
    assert_eq!(phases[2]["corruption_level"], "severe");
}

#[test]
fn contract_status_clamps_stored_value() {
    let (_dir, state) = setup_state(Some("99"));
    let output = archive_cmd(&state)
        .args(["status", "--json"])
        .output()
        .expect("archive status should execute");
    assert!(output.status.success());
    assert_eq!(parse_json(&output.stdout)["unlocked_count"], 3);
}

#[test]
fn contract_status_garbage_falls_back_to_one() {
    let (_dir, state) = setup_state(Some("lots"));
    archive_cmd(&state)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Unlocked: 1/3"))
        .stdout(predicate::str::contains("sealed"));
}

// =============================================================================
// catalog
// =============================================================================

#[test]
fn contract_catalog_json_lists_records() {
    let (_dir, state) = setup_state(None);
    let output = archive_cmd(&state)
        .args(["catalog", "--json"])
        .output()
        .expect("archive catalog should execute");
    assert!(output.status.success());

    let value = parse_json(&output.stdout);
    let phases = value.as_array().expect("catalog is an array of phases");
    assert_eq!(phases.len(), 3);
    assert_eq!(phases[0]["id"], "p1");
    assert_eq!(phases[0]["labs"].as_array().map(Vec::len), Some(3));
}

#[test]
fn contract_catalog_plain_respects_lang() {
    let (_dir, state) = setup_state(None);
    archive_cmd(&state)
        .args(["--lang", "en", "catalog"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sample Archive"));
}

// =============================================================================
// simulate
// =============================================================================

#[test]
fn contract_simulate_reaches_reboot_without_persisting() {
    let (_dir, state) = setup_state(None);
    archive_cmd(&state)
        .args(["simulate", "--seed", "42"])
        .assert()
        .success()
        .stdout(predicate::str::contains("reboot"))
        .stdout(predicate::str::contains("session=reset"));

    // Dry run leaves the state file untouched.
    assert!(!std::path::Path::new(&state).exists());
}

#[test]
fn contract_simulate_json_steps_and_persist() {
    let (_dir, state) = setup_state(None);
    let output = archive_cmd(&state)
        .args(["simulate", "--json", "--persist"])
        .output()
        .expect("archive simulate should execute");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let steps: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line is JSON"))
        .collect();
    assert_eq!(steps.first().map(|s| s["step"].clone()), Some("start".into()));
    let last = steps.last().expect("at least one step");
    assert_eq!(last["step"], "reboot");
    assert_eq!(last["status"]["authorized"], false);
    assert_eq!(last["status"]["sequence"]["state"], "idle");
    assert!(
        steps
            .iter()
            .any(|s| s["step"] == "trigger" && s["status"]["sequence"]["state"] == "shock")
    );

    let persisted = std::fs::read_to_string(&state).expect("state file written");
    assert!(persisted.contains("\"3\""), "unexpected state file: {persisted}");
}

// =============================================================================
// run
// =============================================================================

#[test]
fn contract_run_reports_locked_phase() {
    let (_dir, state) = setup_state(None);
    archive_cmd(&state)
        .args(["run", "--seed", "1"])
        .write_stdin("phase 1\nphase 0\nopen 0\nquit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("refused"))
        .stdout(predicate::str::contains("view=detail"))
        .stdout(predicate::str::contains("Archive closed"));
}

// =============================================================================
// errors
// =============================================================================

#[test]
fn contract_invalid_config_is_actionable() {
    let (dir, state) = setup_state(None);
    let config = dir.path().join("archive.toml");
    std::fs::write(&config, "[unlock]\ndwell_required = 0\n").expect("write config");
    archive_cmd(&state)
        .args(["--config", &config.to_string_lossy(), "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("dwell_required"))
        .stderr(predicate::str::contains("To fix:"));
}

#[test]
fn contract_unknown_subcommand_fails() {
    let (_dir, state) = setup_state(None);
    archive_cmd(&state).arg("dance").assert().failure();
}
