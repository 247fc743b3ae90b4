// crates/convoy-agent/tests/end_to_end.rs
// ============================================================================
// Module: Agent End-to-End Tests
// Description: Full-stack test over a real TCP control channel.
// Purpose: Validate register, subscribe, deployment execution, and shutdown.
// Dependencies: convoy-agent, convoy-core, convoy-server, tempfile, tokio
// ============================================================================

//! ## Overview
//! Boots the real coordinator on an ephemeral port, runs the real agent
//! against it, and drives one deployment end to end: the agent registers,
//! subscribes, receives the DEPLOYMENT event, fetches and applies the
//! config, reports completion, and the store converges. Shutdown then
//! deregisters the instance.

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
use std::sync::Arc;
use std::time::Duration;

use convoy_agent::Agent;
use convoy_agent::AgentConfig;
use convoy_agent::FileConfigApplier;
use convoy_core::Config;
use convoy_core::ConfigId;
use convoy_core::DeploymentRequest;
use convoy_core::DeploymentStatus;
use convoy_core::DeploymentStrategy;
use convoy_core::FleetStore;
use convoy_core::InMemoryFleetStore;
use convoy_core::InstanceId;
use convoy_core::InstanceStatus;
use convoy_core::TargetSelector;
use convoy_core::Timestamp;
use convoy_server::FleetService;
use convoy_server::NoopDeployAuditSink;
use convoy_server::NoopMetrics;
use convoy_server::Orchestrator;
use convoy_server::RunnerTiming;
use tempfile::TempDir;
use tokio::sync::watch;

/// Boots a coordinator on an ephemeral port and returns its wiring.
async fn boot_server() -> (
    Arc<InMemoryFleetStore>,
    Arc<FleetService>,
    Arc<Orchestrator>,
    String,
    watch::Sender<bool>,
) {
    let store: Arc<InMemoryFleetStore> = Arc::new(InMemoryFleetStore::new());
    let audit: Arc<dyn convoy_server::DeployAuditSink> = Arc::new(NoopDeployAuditSink);
    let service = Arc::new(FleetService::new(
        Arc::clone(&store) as Arc<dyn FleetStore>,
        Duration::from_secs(1),
        Duration::from_secs(3_600),
        Arc::clone(&audit),
    ));
    let orchestrator = Orchestrator::new(
        Arc::clone(&store) as Arc<dyn FleetStore>,
        Arc::clone(&service),
        audit,
        RunnerTiming {
            instance_timeout: Duration::from_secs(10),
            batch_delay: Duration::from_millis(20),
        },
    )
    .unwrap();
    service.set_status_callback(orchestrator.clone()).unwrap();

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let serve_service = Arc::clone(&service);
    tokio::spawn(async move {
        let _ = convoy_server::serve_with_listener(
            serve_service,
            Arc::new(NoopMetrics),
            listener,
            16,
            shutdown_rx,
        )
        .await;
    });
    (store, service, orchestrator, addr, shutdown_tx)
}

/// Seeds one config with one version.
fn seed_config(store: &InMemoryFleetStore, content: &str) -> ConfigId {
    let config = Config {
        id: ConfigId::new("cfg-1"),
        name: "edge-proxy".to_string(),
        description: None,
        current_version: 0,
        created_at: Timestamp::now(),
        updated_at: Timestamp::now(),
    };
    store.create_config(&config).unwrap();
    store.create_config_version(&config.id, content, None, Timestamp::now()).unwrap();
    config.id
}

/// Polls until the predicate holds or the deadline passes.
async fn wait_for<F: FnMut() -> bool>(mut predicate: F, what: &str) {
    for _ in 0 .. 500 {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Runs one deployment against a live agent over real TCP.
#[tokio::test(flavor = "multi_thread")]
async fn deployment_roundtrip_over_tcp() {
    let (store, service, orchestrator, addr, server_shutdown) = boot_server().await;
    let config_id = seed_config(&store, "upstream { server 10.0.0.1:8080; }");

    let dir = TempDir::new().unwrap();
    let worker_config = dir.path().join("worker.conf");
    let agent_config = AgentConfig {
        server_addr: addr,
        instance_id: Some("i-1".to_string()),
        instance_name: "edge-a".to_string(),
        hostname: None,
        worker_version: "1.27.0".to_string(),
        labels: BTreeMap::new(),
        capabilities: vec!["reload".to_string()],
        state_path: dir.path().join("state.json"),
        worker_config_path: Some(worker_config.clone()),
    };
    let agent = Arc::new(
        Agent::new(agent_config, Arc::new(FileConfigApplier::new(&worker_config))).unwrap(),
    );
    let (agent_shutdown_tx, agent_shutdown_rx) = watch::channel(false);
    let run_agent = Arc::clone(&agent);
    let agent_task = tokio::spawn(async move { run_agent.run(agent_shutdown_rx).await });

    // The agent registers and subscribes on its own.
    wait_for(
        || {
            store.get_instance(&InstanceId::new("i-1")).unwrap().is_some()
                && service.is_subscribed(&InstanceId::new("i-1"))
        },
        "agent registration and subscription",
    )
    .await;

    let deployment = orchestrator
        .create(&DeploymentRequest {
            config_id: config_id.clone(),
            config_version: None,
            target: TargetSelector::instances(vec![InstanceId::new("i-1")]),
            strategy: DeploymentStrategy::AllAtOnce,
            batch_size: None,
        })
        .unwrap();

    wait_for(
        || {
            store
                .get_deployment(&deployment.id)
                .unwrap()
                .is_some_and(|row| row.status.is_terminal())
        },
        "deployment to finish",
    )
    .await;
    let finished = store.get_deployment(&deployment.id).unwrap().unwrap();
    assert_eq!(finished.status, DeploymentStatus::Completed);
    assert_eq!(finished.progress.completed_instances, 1);

    // The applier landed the bytes and the store converged.
    let written = std::fs::read_to_string(&worker_config).unwrap();
    assert_eq!(written, "upstream { server 10.0.0.1:8080; }");
    let instance = store.get_instance(&InstanceId::new("i-1")).unwrap().unwrap();
    assert_eq!(instance.applied_config_id, Some(config_id));
    assert_eq!(instance.applied_config_version, Some(1));

    // Shutdown deregisters the instance.
    agent_shutdown_tx.send(true).unwrap();
    let run_result = tokio::time::timeout(Duration::from_secs(10), agent_task)
        .await
        .unwrap()
        .unwrap();
    run_result.unwrap();
    let instance = store.get_instance(&InstanceId::new("i-1")).unwrap().unwrap();
    assert_eq!(instance.status, InstanceStatus::Offline);
    let _ = server_shutdown.send(true);
}
