// crates/convoy-core/tests/memory_store.rs
// ============================================================================
// Module: In-Memory Store Tests
// Description: Interface-semantics tests against the reference store.
// Purpose: Validate uniqueness, atomic version bumps, and terminal guards.
// Dependencies: convoy-core
// ============================================================================

//! ## Overview
//! Exercises the in-memory store as the reference for `FleetStore`
//! semantics: name uniqueness, gap-free version numbering, label queries,
//! terminal-status immutability, and session replacement.

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
use convoy_core::InMemoryFleetStore;
use convoy_core::Instance;
use convoy_core::InstanceId;
use convoy_core::InstanceStatus;
use convoy_core::LabelSelector;
use convoy_core::StoreError;
use convoy_core::TargetSelector;
use convoy_core::Timestamp;
use convoy_core::UpdateOutcome;
use convoy_core::content_digest;

fn sample_instance(id: &str, name: &str, labels: &[(&str, &str)]) -> Instance {
    Instance {
        id: InstanceId::new(id),
        name: name.to_string(),
        hostname: format!("{name}.fleet.internal"),
        agent_version: "0.1.0".to_string(),
        worker_version: "1.27.0".to_string(),
        labels: labels.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect(),
        capabilities: BTreeSet::new(),
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
        description: None,
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

/// Verifies a duplicate instance name under a different id is rejected.
#[test]
fn instance_name_uniqueness_is_enforced() {
    let store = InMemoryFleetStore::new();
    store.upsert_instance(&sample_instance("i-1", "edge-a", &[])).unwrap();
    let err = store.upsert_instance(&sample_instance("i-2", "edge-a", &[])).unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));
}

/// Verifies re-registering the same id with the same name updates in place.
#[test]
fn instance_upsert_same_id_updates_in_place() {
    let store = InMemoryFleetStore::new();
    store.upsert_instance(&sample_instance("i-1", "edge-a", &[])).unwrap();
    let mut updated = sample_instance("i-1", "edge-a", &[("env", "prod")]);
    updated.hostname = "edge-a2.fleet.internal".to_string();
    store.upsert_instance(&updated).unwrap();
    let loaded = store.get_instance(&InstanceId::new("i-1")).unwrap().unwrap();
    assert_eq!(loaded.hostname, "edge-a2.fleet.internal");
    assert_eq!(store.list_instances().unwrap().len(), 1);
}

/// Verifies config version numbers are gap-free and bump the parent.
#[test]
fn config_versions_are_gap_free() {
    let store = InMemoryFleetStore::new();
    store.create_config(&sample_config("cfg-1", "edge-proxy")).unwrap();
    for expected in 1 ..= 4_u64 {
        let version = store
            .create_config_version(
                &ConfigId::new("cfg-1"),
                &format!("listen {expected};"),
                None,
                Timestamp::from_unix_millis(2_000),
            )
            .unwrap();
        assert_eq!(version.version, expected);
    }
    let config = store.get_config(&ConfigId::new("cfg-1")).unwrap().unwrap();
    assert_eq!(config.current_version, 4);
    let latest = store.latest_config_version(&ConfigId::new("cfg-1")).unwrap().unwrap();
    assert_eq!(latest.version, 4);
    assert_eq!(latest.content_hash, content_digest(latest.content.as_bytes()));
}

/// Verifies duplicate config names are rejected.
#[test]
fn config_name_uniqueness_is_enforced() {
    let store = InMemoryFleetStore::new();
    store.create_config(&sample_config("cfg-1", "edge-proxy")).unwrap();
    let err = store.create_config(&sample_config("cfg-2", "edge-proxy")).unwrap_err();
    assert!(matches!(err, StoreError::AlreadyExists(_)));
}

/// Verifies label queries require every selector pair.
#[test]
fn label_query_requires_all_pairs() {
    let store = InMemoryFleetStore::new();
    store
        .upsert_instance(&sample_instance("i-1", "edge-a", &[("env", "prod"), ("zone", "a")]))
        .unwrap();
    store.upsert_instance(&sample_instance("i-2", "edge-b", &[("env", "prod")])).unwrap();
    store.upsert_instance(&sample_instance("i-3", "edge-c", &[("env", "dev")])).unwrap();

    let selector = LabelSelector::new(
        [("env".to_string(), "prod".to_string())].into_iter().collect::<BTreeMap<_, _>>(),
    );
    let mut matched = store.instances_matching_labels(&selector).unwrap();
    matched.sort();
    assert_eq!(matched, vec![InstanceId::new("i-1"), InstanceId::new("i-2")]);

    let narrow = LabelSelector::new(
        [("env".to_string(), "prod".to_string()), ("zone".to_string(), "a".to_string())]
            .into_iter()
            .collect::<BTreeMap<_, _>>(),
    );
    assert_eq!(store.instances_matching_labels(&narrow).unwrap(), vec![InstanceId::new("i-1")]);
}

/// Verifies terminal deployment statuses are immutable.
#[test]
fn terminal_deployment_status_is_final() {
    let store = InMemoryFleetStore::new();
    store.create_deployment(&sample_deployment("d-1", &["i-1"])).unwrap();
    let at = Timestamp::from_unix_millis(2_000);
    assert_eq!(
        store
            .update_deployment_status(&DeploymentId::new("d-1"), DeploymentStatus::Completed, at)
            .unwrap(),
        UpdateOutcome::Applied
    );
    assert_eq!(
        store
            .update_deployment_status(&DeploymentId::new("d-1"), DeploymentStatus::Failed, at)
            .unwrap(),
        UpdateOutcome::AlreadyTerminal
    );
    let progress = DeploymentProgress::default();
    assert_eq!(
        store.update_deployment_progress(&DeploymentId::new("d-1"), &progress, at).unwrap(),
        UpdateOutcome::AlreadyTerminal
    );
    let loaded = store.get_deployment(&DeploymentId::new("d-1")).unwrap().unwrap();
    assert_eq!(loaded.status, DeploymentStatus::Completed);
    assert_eq!(loaded.progress.total_instances, 1);
}

/// Verifies entering in-progress records a start time exactly once.
#[test]
fn deployment_start_time_is_recorded_once() {
    let store = InMemoryFleetStore::new();
    store.create_deployment(&sample_deployment("d-1", &["i-1"])).unwrap();
    let first = Timestamp::from_unix_millis(2_000);
    let second = Timestamp::from_unix_millis(3_000);
    let _ = store
        .update_deployment_status(&DeploymentId::new("d-1"), DeploymentStatus::InProgress, first)
        .unwrap();
    let _ = store
        .update_deployment_status(&DeploymentId::new("d-1"), DeploymentStatus::InProgress, second)
        .unwrap();
    let loaded = store.get_deployment(&DeploymentId::new("d-1")).unwrap().unwrap();
    assert_eq!(loaded.started_at, Some(first));
}

/// Verifies status filtering lists only matching deployments.
#[test]
fn list_deployments_filters_by_status() {
    let store = InMemoryFleetStore::new();
    store.create_deployment(&sample_deployment("d-1", &["i-1"])).unwrap();
    store.create_deployment(&sample_deployment("d-2", &["i-2"])).unwrap();
    let at = Timestamp::from_unix_millis(2_000);
    let _ = store
        .update_deployment_status(&DeploymentId::new("d-2"), DeploymentStatus::Completed, at)
        .unwrap();
    let pending = store
        .list_deployments_with_status(&[DeploymentStatus::Pending, DeploymentStatus::InProgress])
        .unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, DeploymentId::new("d-1"));
}
