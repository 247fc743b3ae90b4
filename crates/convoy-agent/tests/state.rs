// crates/convoy-agent/tests/state.rs
// ============================================================================
// Module: Agent State File Tests
// Description: Persistence tests for the atomic agent state file.
// Purpose: Validate roundtrips, corruption quarantine, and permissions.
// Dependencies: convoy-agent, convoy-core, tempfile
// ============================================================================

//! ## Overview
//! Exercises the state file in a temp directory: empty start, save/load
//! roundtrip, corruption quarantine to `<path>.corrupted`, temp-file
//! cleanup, and the 0600 mode on unix.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use convoy_agent::AgentState;
use convoy_agent::StateFile;
use convoy_core::ConfigId;
use convoy_core::DeploymentId;
use convoy_core::HashDigest;
use convoy_core::InstanceId;
use tempfile::TempDir;

/// Verifies a missing file loads as empty state.
#[test]
fn missing_file_loads_empty() {
    let dir = TempDir::new().unwrap();
    let file = StateFile::new(dir.path().join("state.json"));
    let state = file.load().unwrap();
    assert_eq!(state, AgentState::default());
}

/// Verifies state roundtrips through save and load.
#[test]
fn save_and_load_roundtrip() {
    let dir = TempDir::new().unwrap();
    let file = StateFile::new(dir.path().join("state.json"));
    let mut state = AgentState {
        instance_id: Some(InstanceId::new("i-1")),
        active_deployment_id: Some(DeploymentId::new("d-1")),
        ..AgentState::default()
    };
    state.record_applied(ConfigId::new("cfg-1"), 3, HashDigest::from_hex("ab".repeat(32)));
    file.save(&state).unwrap();

    let loaded = file.load().unwrap();
    assert_eq!(loaded.instance_id, Some(InstanceId::new("i-1")));
    assert_eq!(loaded.config_version, Some(3));
    assert_eq!(loaded.config_id, Some(ConfigId::new("cfg-1")));
    assert_eq!(loaded.active_deployment_id, Some(DeploymentId::new("d-1")));
    assert!(loaded.created_at.is_some());
    assert!(loaded.last_updated.is_some());
}

/// Verifies a corrupted file is quarantined and state restarts empty.
#[test]
fn corrupted_file_is_quarantined() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(&path, b"{ not json").unwrap();

    let file = StateFile::new(&path);
    let state = file.load().unwrap();
    assert_eq!(state, AgentState::default());
    assert!(!path.exists());
    let quarantined = dir.path().join("state.json.corrupted");
    assert!(quarantined.exists());
}

/// Verifies saves leave no temp file behind.
#[test]
fn save_cleans_up_temp_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let file = StateFile::new(&path);
    file.save(&AgentState::default()).unwrap();
    assert!(path.exists());
    assert!(!dir.path().join("state.json.tmp").exists());
}

/// Verifies the state file is owner read/write only on unix.
#[cfg(unix)]
#[test]
fn state_file_mode_is_0600() {
    use std::os::unix::fs::PermissionsExt;
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("state.json");
    let file = StateFile::new(&path);
    file.save(&AgentState::default()).unwrap();
    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}

/// Verifies a nested state directory is created on demand.
#[test]
fn nested_state_dir_is_created() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("agent").join("state.json");
    let file = StateFile::new(&path);
    file.save(&AgentState::default()).unwrap();
    assert!(path.exists());
}
