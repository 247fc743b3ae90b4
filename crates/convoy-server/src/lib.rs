// crates/convoy-server/src/lib.rs
// ============================================================================
// Module: Convoy Server
// Description: Coordinator: sessions, subscriber hub, fleet service, orchestrator.
// Purpose: Drive the agent control channel and deployment execution.
// Dependencies: convoy-core, convoy-proto, rand, sha2, subtle, tokio
// ============================================================================

//! ## Overview
//! Convoy Server hosts the control plane: the session registry and
//! subscriber hub behind the fleet service, the deployment orchestrator with
//! one runner task per active rollout, and the TCP frame server for the
//! agent channel. Initialization order is store, then hub and service, then
//! orchestrator (installing the status callback), then listeners.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod audit;
pub mod config;
pub mod hub;
pub mod ids;
pub mod orchestrator;
pub mod server;
pub mod service;
pub mod session;
pub mod telemetry;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use audit::DeployAuditEvent;
pub use audit::DeployAuditSink;
pub use audit::FileDeployAuditSink;
pub use audit::NoopDeployAuditSink;
pub use audit::StderrDeployAuditSink;
pub use config::AuditConfig;
pub use config::AuditSinkKind;
pub use config::ConfigError;
pub use config::ServerConfig;
pub use config::StoreBackend;
pub use config::StoreConfig;
pub use hub::BroadcastOutcome;
pub use hub::SUBSCRIBER_CHANNEL_CAPACITY;
pub use hub::SendOutcome;
pub use hub::SubscriberHub;
pub use orchestrator::Orchestrator;
pub use orchestrator::OrchestratorError;
pub use orchestrator::RunnerTiming;
pub use server::ServerError;
pub use server::serve;
pub use server::serve_with_listener;
pub use service::DeploymentStatusCallback;
pub use service::FleetService;
pub use service::ServiceError;
pub use service::StatusReport;
pub use service::Subscription;
pub use session::SessionError;
pub use session::SessionRegistry;
pub use telemetry::FLEET_LATENCY_BUCKETS_MS;
pub use telemetry::FleetMethod;
pub use telemetry::FleetMetricEvent;
pub use telemetry::FleetMetrics;
pub use telemetry::FleetOutcome;
pub use telemetry::NoopMetrics;
