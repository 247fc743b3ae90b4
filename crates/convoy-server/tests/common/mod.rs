// crates/convoy-server/tests/common/mod.rs
// ============================================================================
// Module: Server Test Helpers
// Description: Shared wiring builders for service and orchestrator tests.
// Purpose: Stand up an in-memory control plane with short test timings.
// Dependencies: convoy-core, convoy-server
// ============================================================================

//! ## Overview
//! Builders for an in-memory control plane: store, service, orchestrator,
//! and registered fake agents. Timings are shortened so timeout paths run in
//! milliseconds.

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
    dead_code,
    reason = "Test-only helpers; not every test exercises every helper."
)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use convoy_core::ConfigId;
use convoy_core::DeploymentId;
use convoy_core::DeploymentStatus;
use convoy_core::FleetStore;
use convoy_core::InMemoryFleetStore;
use convoy_core::InstanceId;
use convoy_core::Timestamp;
use convoy_proto::RegisterRequest;
use convoy_proto::SubscribeRequest;
use convoy_server::FleetService;
use convoy_server::NoopDeployAuditSink;
use convoy_server::Orchestrator;
use convoy_server::RunnerTiming;
use convoy_server::Subscription;

/// Assembled in-memory control plane for tests.
pub struct TestPlane {
    /// Shared store.
    pub store: Arc<InMemoryFleetStore>,
    /// Fleet service.
    pub service: Arc<FleetService>,
    /// Orchestrator wired into the service callback.
    pub orchestrator: Arc<Orchestrator>,
}

/// Builds a control plane with the provided runner timing.
pub fn plane_with_timing(timing: RunnerTiming) -> TestPlane {
    let store: Arc<InMemoryFleetStore> = Arc::new(InMemoryFleetStore::new());
    let audit: Arc<dyn convoy_server::DeployAuditSink> = Arc::new(NoopDeployAuditSink);
    let service = Arc::new(FleetService::new(
        Arc::clone(&store) as Arc<dyn FleetStore>,
        Duration::from_secs(30),
        Duration::from_secs(3_600),
        Arc::clone(&audit),
    ));
    let orchestrator = Orchestrator::new(
        Arc::clone(&store) as Arc<dyn FleetStore>,
        Arc::clone(&service),
        audit,
        timing,
    )
    .unwrap();
    service.set_status_callback(orchestrator.clone()).unwrap();
    TestPlane {
        store,
        service,
        orchestrator,
    }
}

/// Builds a control plane with fast default test timing.
pub fn plane() -> TestPlane {
    plane_with_timing(RunnerTiming {
        instance_timeout: Duration::from_secs(5),
        batch_delay: Duration::from_millis(20),
    })
}

/// Registers an instance and returns its session token.
pub fn register(plane: &TestPlane, id: &str, name: &str, labels: &[(&str, &str)]) -> String {
    let request = RegisterRequest {
        instance_id: InstanceId::new(id),
        instance_name: name.to_string(),
        hostname: format!("{name}.fleet.internal"),
        agent_version: "0.1.0".to_string(),
        worker_version: "1.27.0".to_string(),
        labels: labels
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect::<BTreeMap<_, _>>(),
        capabilities: vec!["reload".to_string()],
    };
    plane.service.register(&request).unwrap().token
}

/// Registers and subscribes an instance, returning token and stream.
pub fn register_and_subscribe(
    plane: &TestPlane,
    id: &str,
    name: &str,
    labels: &[(&str, &str)],
) -> (String, Subscription) {
    let token = register(plane, id, name, labels);
    let subscription = plane
        .service
        .subscribe(&SubscribeRequest {
            instance_id: InstanceId::new(id),
            token: token.clone(),
        })
        .unwrap();
    (token, subscription)
}

/// Creates a config with one version and returns its id.
pub fn seed_config(plane: &TestPlane, id: &str, name: &str, content: &str) -> ConfigId {
    let config = convoy_core::Config {
        id: ConfigId::new(id),
        name: name.to_string(),
        description: None,
        current_version: 0,
        created_at: Timestamp::now(),
        updated_at: Timestamp::now(),
    };
    plane.store.create_config(&config).unwrap();
    plane
        .store
        .create_config_version(&config.id, content, None, Timestamp::now())
        .unwrap();
    config.id
}

/// Polls until the deployment reaches a terminal status.
pub async fn wait_terminal(plane: &TestPlane, id: &DeploymentId) -> DeploymentStatus {
    for _ in 0 .. 500 {
        let deployment = plane.store.get_deployment(id).unwrap().unwrap();
        if deployment.status.is_terminal() {
            return deployment.status;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("deployment {id} did not reach a terminal status");
}
