// crates/convoy-store-sqlite/tests/store.rs
// ============================================================================
// Module: SQLite Fleet Store Tests
// Description: Durable-store tests against a temporary database file.
// Purpose: Validate relational uniqueness, atomic bumps, and terminal guards.
// Dependencies: convoy-core, convoy-store-sqlite, tempfile
// ============================================================================

//! ## Overview
//! Exercises the SQLite store against a temp-dir database: instance and
//! config uniqueness, gap-free version numbering with hash integrity, label
//! queries over JSON columns, terminal-status immutability, session
//! replacement, and reopen persistence.

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

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use convoy_core::Config;
use convoy_core::ConfigId;
use convoy_core::Deployment;
use convoy_core::DeploymentId;
use convoy_core::DeploymentProgress;
use convoy_core::DeploymentStatus;
use convoy_core::DeploymentStrategy;
use convoy_core::FleetStore;
use convoy_core::HashDigest;
use convoy_core::Instance;
use convoy_core::InstanceId;
use convoy_core::InstanceStatus;
use convoy_core::LabelSelector;
use convoy_core::SessionRecord;
use convoy_core::StoreError;
use convoy_core::TargetSelector;
use convoy_core::Timestamp;
use convoy_core::UpdateOutcome;
use convoy_core::content_digest;
use convoy_store_sqlite::SqliteFleetStore;
use convoy_store_sqlite::SqliteStoreConfig;
use tempfile::TempDir;

fn open_store(dir: &TempDir) -> SqliteFleetStore {
    let config = SqliteStoreConfig {
        path: dir.path().join("fleet.db"),
        busy_timeout_ms: 5_000,
        journal_mode: convoy_store_sqlite::SqliteStoreMode::Wal,
        sync_mode: convoy_store_sqlite::SqliteSyncMode::Full,
    };
    SqliteFleetStore::new(&config).unwrap()
}

fn sample_instance(id: &str, name: &str, labels: &[(&str, &str)]) -> Instance {
    Instance {
        id: InstanceId::new(id),
        name: name.to_string(),
        hostname: format!("{name}.fleet.internal"),
        agent_version: "0.1.0".to_string(),
        worker_version: "1.27.0".to_string(),
        labels: labels.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect(),
        capabilities: BTreeSet::from(["reload".to_string()]),
        status: InstanceStatus::Online,
        last_seen: Timestamp::from_unix_millis(1_000),
        applied_config_id: None,
        applied_config_version: None,
        created_at: Timestamp::from_unix_millis(1_000),
        updated_at: Timestamp::from_unix_millis(1_000),
    }
}

fn sample_config(id: &str, name: &str) -> Config {
    Config {
        id: ConfigId::new(id),
        name: name.to_string(),
        description: Some("edge proxy".to_string()),
        current_version: 0,
        created_at: Timestamp::from_unix_millis(1_000),
        updated_at: Timestamp::from_unix_millis(1_000),
    }
}

fn sample_deployment(id: &str, targets: &[&str]) -> Deployment {
    let resolved: Vec<InstanceId> = targets.iter().map(|t| InstanceId::new(*t)).collect();
    Deployment {
        id: DeploymentId::new(id),
        config_id: ConfigId::new("cfg-1"),
        config_version: 1,
        target: TargetSelector::instances(resolved.clone()),
        resolved_targets: resolved.clone(),
        strategy: DeploymentStrategy::Rolling,
        batch_size: 1,
        status: DeploymentStatus::Pending,
        progress: DeploymentProgress {
            total_instances: resolved.len(),
            ..DeploymentProgress::default()
        },
        started_at: None,
        completed_at: None,
        created_at: Timestamp::from_unix_millis(1_000),
        updated_at: Timestamp::from_unix_millis(1_000),
    }
}

/// Verifies an instance roundtrips through all JSON columns.
#[test]
fn instance_roundtrip_preserves_fields() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let instance = sample_instance("i-1", "edge-a", &[("env", "prod"), ("zone", "a")]);
    store.upsert_instance(&instance).unwrap();
    let loaded = store.get_instance(&InstanceId::new("i-1")).unwrap().unwrap();
    assert_eq!(loaded, instance);
}

/// Verifies the instance name uniqueness constraint maps to already-exists.
#[test]
fn instance_name_uniqueness_is_enforced() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store.upsert_instance(&sample_instance("i-1", "edge-a", &[])).unwrap();
    let err = store.upsert_instance(&sample_instance("i-2", "edge-a", &[])).unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));
}

/// Verifies version numbers are gap-free and hashes match content.
#[test]
fn config_version_bump_is_atomic_and_gap_free() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store.create_config(&sample_config("cfg-1", "edge-proxy")).unwrap();
    for expected in 1 ..= 3_u64 {
        let row = store
            .create_config_version(
                &ConfigId::new("cfg-1"),
                &format!("listen {expected};"),
                Some("tweak listener"),
                Timestamp::from_unix_millis(2_000),
            )
            .unwrap();
        assert_eq!(row.version, expected);
        assert_eq!(row.content_hash, content_digest(row.content.as_bytes()));
    }
    let config = store.get_config(&ConfigId::new("cfg-1")).unwrap().unwrap();
    assert_eq!(config.current_version, 3);
    let latest = store.latest_config_version(&ConfigId::new("cfg-1")).unwrap().unwrap();
    assert_eq!(latest.version, 3);
    let second = store.get_config_version(&ConfigId::new("cfg-1"), 2).unwrap().unwrap();
    assert_eq!(second.content, "listen 2;");
}

/// Verifies creating a version for a missing config is not-found.
#[test]
fn version_for_missing_config_is_not_found() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let err = store
        .create_config_version(
            &ConfigId::new("cfg-missing"),
            "listen 80;",
            None,
            Timestamp::from_unix_millis(2_000),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound(_)));
}

/// Verifies label queries match only instances carrying every pair.
#[test]
fn label_query_over_json_columns() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store
        .upsert_instance(&sample_instance("i-1", "edge-a", &[("env", "prod"), ("zone", "a")]))
        .unwrap();
    store.upsert_instance(&sample_instance("i-2", "edge-b", &[("env", "prod")])).unwrap();
    store.upsert_instance(&sample_instance("i-3", "edge-c", &[("env", "dev")])).unwrap();
    let selector = LabelSelector::new(
        [("env".to_string(), "prod".to_string())].into_iter().collect::<BTreeMap<_, _>>(),
    );
    let matched = store.instances_matching_labels(&selector).unwrap();
    assert_eq!(matched, vec![InstanceId::new("i-1"), InstanceId::new("i-2")]);
}

/// Verifies terminal deployment statuses are never overwritten.
#[test]
fn terminal_status_update_is_a_sentinel_noop() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store.create_deployment(&sample_deployment("d-1", &["i-1"])).unwrap();
    let at = Timestamp::from_unix_millis(2_000);
    assert_eq!(
        store
            .update_deployment_status(&DeploymentId::new("d-1"), DeploymentStatus::Cancelled, at)
            .unwrap(),
        UpdateOutcome::Applied
    );
    assert_eq!(
        store
            .update_deployment_status(&DeploymentId::new("d-1"), DeploymentStatus::Completed, at)
            .unwrap(),
        UpdateOutcome::AlreadyTerminal
    );
    let progress = DeploymentProgress::default();
    assert_eq!(
        store.update_deployment_progress(&DeploymentId::new("d-1"), &progress, at).unwrap(),
        UpdateOutcome::AlreadyTerminal
    );
    let loaded = store.get_deployment(&DeploymentId::new("d-1")).unwrap().unwrap();
    assert_eq!(loaded.status, DeploymentStatus::Cancelled);
    assert_eq!(loaded.completed_at, Some(at));
    assert_eq!(loaded.progress.total_instances, 1);
}

/// Verifies status filtering and started-at stamping.
#[test]
fn status_transitions_record_timestamps() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store.create_deployment(&sample_deployment("d-1", &["i-1", "i-2"])).unwrap();
    let start = Timestamp::from_unix_millis(2_000);
    let _ = store
        .update_deployment_status(&DeploymentId::new("d-1"), DeploymentStatus::InProgress, start)
        .unwrap();
    let active = store
        .list_deployments_with_status(&[DeploymentStatus::InProgress])
        .unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].started_at, Some(start));
}

/// Verifies sessions replace per instance and never hold raw tokens.
#[test]
fn sessions_replace_per_instance() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    let first = SessionRecord {
        instance_id: InstanceId::new("i-1"),
        token_salt: "aa".repeat(16),
        token_digest: HashDigest::from_hex("bb".repeat(32)),
        created_at: Timestamp::from_unix_millis(1_000),
        expires_at: Timestamp::from_unix_millis(90_000),
    };
    store.put_session(&first).unwrap();
    let replacement = SessionRecord {
        token_salt: "cc".repeat(16),
        token_digest: HashDigest::from_hex("dd".repeat(32)),
        ..first.clone()
    };
    store.put_session(&replacement).unwrap();
    let loaded = store.get_session(&InstanceId::new("i-1")).unwrap().unwrap();
    assert_eq!(loaded, replacement);
    store.delete_session(&InstanceId::new("i-1")).unwrap();
    store.delete_session(&InstanceId::new("i-1")).unwrap();
    assert!(store.get_session(&InstanceId::new("i-1")).unwrap().is_none());
}

/// Verifies data survives a close-and-reopen cycle.
#[test]
fn reopen_preserves_rows() {
    let dir = TempDir::new().unwrap();
    {
        let store = open_store(&dir);
        store.create_config(&sample_config("cfg-1", "edge-proxy")).unwrap();
        store
            .create_config_version(
                &ConfigId::new("cfg-1"),
                "listen 80;",
                None,
                Timestamp::from_unix_millis(2_000),
            )
            .unwrap();
    }
    let store = open_store(&dir);
    store.readiness().unwrap();
    let config = store.get_config_by_name("edge-proxy").unwrap().unwrap();
    assert_eq!(config.current_version, 1);
}
