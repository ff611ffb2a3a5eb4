use std::fs;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

#[test]
fn diagnostics_reports_selected_time_source() {
    let dir = tempdir().expect("tempdir");
    let state = dir.path().join("state.json");

    let mut cmd = cargo_bin_cmd!("rotaclock");
    cmd.arg("--diagnostics")
        .arg("--state")
        .arg(&state)
        .assert()
        .success()
        .stdout(predicate::str::contains("Selected time source: SYSTEM_LOCAL"))
        .stdout(predicate::str::contains("Notifications: disarmed"));
}

#[test]
fn simulated_diagnostics_shows_running_rotation() {
    let dir = tempdir().expect("tempdir");
    let state = dir.path().join("state.json");

    let mut cmd = cargo_bin_cmd!("rotaclock");
    cmd.arg("--diagnostics")
        .arg("--state")
        .arg(&state)
        .arg("--simulate-from")
        .arg("2026-10-30T20:45:00")
        .assert()
        .success()
        .stdout(predicate::str::contains("SIMULATED_LOCAL"))
        .stdout(predicate::str::contains("Phase: running"))
        .stdout(predicate::str::contains("On now: A & C ON SET"));
}

#[test]
fn malformed_simulation_start_fails_with_clear_error() {
    let mut cmd = cargo_bin_cmd!("rotaclock");
    cmd.arg("--diagnostics")
        .arg("--simulate-from")
        .arg("tonight")
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid simulation start"));
}

#[test]
fn zero_tick_interval_is_rejected() {
    let mut cmd = cargo_bin_cmd!("rotaclock");
    cmd.arg("--no-api")
        .arg("--tick-ms")
        .arg("0")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--tick-ms"));
}

#[test]
fn arming_persists_state_file() {
    let dir = tempdir().expect("tempdir");
    let state = dir.path().join("state.json");

    let mut cmd = cargo_bin_cmd!("rotaclock");
    cmd.arg("--arm")
        .arg("--no-api")
        .arg("--ticks")
        .arg("1")
        .arg("--state")
        .arg(&state)
        .arg("--simulate-from")
        .arg("2026-10-30T16:00:00")
        .assert()
        .success();

    let saved = fs::read_to_string(&state).expect("state file written");
    assert!(saved.contains("\"notifications_armed\": true"));
    assert!(saved.contains("notifications_reset_at"));

    let mut cmd = cargo_bin_cmd!("rotaclock");
    cmd.arg("--diagnostics")
        .arg("--state")
        .arg(&state)
        .arg("--simulate-from")
        .arg("2026-10-30T17:00:00")
        .assert()
        .success()
        .stdout(predicate::str::contains("Notifications: armed until 2026-10-31 03:00"));
}

#[test]
fn declined_permission_still_arms() {
    let dir = tempdir().expect("tempdir");
    let state = dir.path().join("state.json");

    let mut cmd = cargo_bin_cmd!("rotaclock");
    cmd.arg("--arm")
        .arg("--deny-notifications")
        .arg("--no-api")
        .arg("--ticks")
        .arg("1")
        .arg("--state")
        .arg(&state)
        .arg("--simulate-from")
        .arg("2026-10-30T16:00:00")
        .assert()
        .success()
        .stderr(predicate::str::contains("permission denied"));

    let saved = fs::read_to_string(&state).expect("state file written");
    assert!(saved.contains("\"notifications_armed\": true"));
}

#[test]
fn excessive_speed_is_rejected() {
    let mut cmd = cargo_bin_cmd!("rotaclock");
    cmd.arg("--diagnostics")
        .arg("--simulate-from")
        .arg("2026-10-30T16:00:00")
        .arg("--speed")
        .arg("1e300")
        .assert()
        .failure()
        .stderr(predicate::str::contains("exceeds the maximum"));
}
