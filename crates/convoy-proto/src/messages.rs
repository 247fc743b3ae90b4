// crates/convoy-proto/src/messages.rs
// ============================================================================
// Module: Wire Messages
// Description: Request, response, and event shapes for the agent channel.
// Purpose: Provide stable serde-backed message contracts for both peers.
// Dependencies: convoy-core, serde
// ============================================================================

//! ## Overview
//! Every frame on the agent channel decodes to one of the envelopes here:
//! agents send [`RequestFrame`]; the service answers with
//! [`ServerFrame::Response`] and, on subscribed connections, pushes
//! [`ServerFrame::Event`]. Tokens are opaque hex strings and never appear in
//! responses or events.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use convoy_core::AgentHealth;
use convoy_core::ConfigId;
use convoy_core::DeploymentId;
use convoy_core::DeploymentStrategy;
use convoy_core::EventId;
use convoy_core::HashDigest;
use convoy_core::InstanceId;
use convoy_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;

use crate::codes::ErrorCode;

// ============================================================================
// SECTION: Request Envelope
// ============================================================================

/// Client frame: a correlation id plus the request body.
///
/// # Invariants
/// - `id` is strictly increasing per connection; the service echoes it on the
///   matching response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestFrame {
    /// Correlation identifier.
    pub id: u64,
    /// Request body.
    pub request: Request,
}

/// Agent-originated requests.
///
/// # Invariants
/// - Variants are stable for serialization and wire matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Join or rejoin the fleet.
    Register(RegisterRequest),
    /// Periodic liveness and state report.
    Heartbeat(HeartbeatRequest),
    /// Fetch the instance's assigned configuration.
    GetConfig(GetConfigRequest),
    /// Fetch one version of a named configuration.
    GetConfigVersion(GetConfigVersionRequest),
    /// Open the server-push event stream.
    Subscribe(SubscribeRequest),
    /// Accept or reject a deployment event.
    AckDeployment(AckDeploymentRequest),
    /// Report deployment execution state.
    ReportDeploymentStatus(ReportDeploymentStatusRequest),
    /// Leave the fleet.
    Deregister(DeregisterRequest),
}

// ============================================================================
// SECTION: Server Envelope
// ============================================================================

/// Server frame: a correlated response or a pushed event.
///
/// # Invariants
/// - `Response.id` matches the originating request frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Response to a request frame.
    Response {
        /// Correlation identifier echoed from the request.
        id: u64,
        /// Response body.
        reply: Reply,
    },
    /// Event pushed on a subscribed connection.
    Event {
        /// Event envelope.
        event: EventEnvelope,
    },
}

/// Response bodies.
///
/// # Invariants
/// - Variants are stable for serialization and wire matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Reply {
    /// Register succeeded.
    Register(RegisterResponse),
    /// Heartbeat accepted.
    Heartbeat(HeartbeatResponse),
    /// Config payload.
    GetConfig(GetConfigResponse),
    /// Config version payload.
    GetConfigVersion(GetConfigVersionResponse),
    /// Event stream established; events follow on this connection.
    Subscribed,
    /// Deployment acknowledgement accepted.
    AckDeployment(AckDeploymentResponse),
    /// Deployment status report accepted.
    ReportDeploymentStatus(ReportDeploymentStatusResponse),
    /// Deregister accepted.
    Deregister(DeregisterResponse),
    /// Request failed.
    Error(ErrorReply),
}

/// Error response body.
///
/// # Invariants
/// - `message` is human-facing text; peers branch on `code` only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable detail.
    pub message: String,
}

// ============================================================================
// SECTION: Register
// ============================================================================

/// Register request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Instance identifier, stable across restarts.
    pub instance_id: InstanceId,
    /// Human-readable instance name, unique within the fleet.
    pub instance_name: String,
    /// Hostname of the machine running the agent.
    pub hostname: String,
    /// Agent build version.
    pub agent_version: String,
    /// Worker build version.
    pub worker_version: String,
    /// Labels used for deployment targeting.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Capability strings advertised by the agent.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Register response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterResponse {
    /// Opaque session token (64 hex chars); issued exactly once.
    pub token: String,
    /// Currently-assigned config version, if any.
    pub config_version: Option<u64>,
    /// Hash of the currently-assigned config version, if any.
    pub config_hash: Option<HashDigest>,
    /// Recommended heartbeat cadence in seconds.
    pub heartbeat_interval_seconds: u64,
}

// ============================================================================
// SECTION: Heartbeat
// ============================================================================

/// Health block carried by a heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentStatus {
    /// Reported health state.
    pub state: AgentHealth,
    /// Optional human-readable detail.
    pub message: Option<String>,
}

/// Heartbeat request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    /// Instance identifier.
    pub instance_id: InstanceId,
    /// Session token.
    pub token: String,
    /// Reported health.
    pub status: AgentStatus,
    /// Config version the worker currently runs, if any.
    pub current_config_version: Option<u64>,
    /// Hash of the config the worker currently runs, if any.
    pub current_config_hash: Option<HashDigest>,
    /// Free-form numeric metrics.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

/// Heartbeat response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatResponse {
    /// True when the assigned config is newer than the reported one.
    pub config_update_available: bool,
    /// Latest assigned config version, when an assignment exists.
    pub latest_config_version: Option<u64>,
    /// Queued pending actions, oldest first.
    #[serde(default)]
    pub actions: Vec<PendingAction>,
}

/// Pending action kinds delivered via heartbeat.
///
/// # Invariants
/// - Variants are stable for serialization and wire matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PendingActionType {
    /// Fetch and apply the assigned configuration.
    FetchConfig,
}

/// Pending action queued for an instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAction {
    /// Action kind.
    #[serde(rename = "type")]
    pub action_type: PendingActionType,
    /// Action identifier for tracing.
    pub action_id: String,
    /// Action parameters.
    #[serde(default)]
    pub params: BTreeMap<String, String>,
}

// ============================================================================
// SECTION: Config Fetch
// ============================================================================

/// Get-config request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetConfigRequest {
    /// Instance identifier.
    pub instance_id: InstanceId,
    /// Session token.
    pub token: String,
    /// Specific version, or `None` for the latest.
    pub version: Option<u64>,
}

/// Get-config response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetConfigResponse {
    /// Config version number.
    pub version: u64,
    /// Content digest.
    pub hash: HashDigest,
    /// Opaque configuration text.
    pub content: String,
    /// Version creation time.
    pub created_at: Timestamp,
}

/// Get-config-version request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetConfigVersionRequest {
    /// Instance identifier.
    pub instance_id: InstanceId,
    /// Session token.
    pub token: String,
    /// Config to read.
    pub config_id: ConfigId,
    /// Version number to read.
    pub version_number: u64,
}

/// Get-config-version response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetConfigVersionResponse {
    /// Config identifier.
    pub config_id: ConfigId,
    /// Version number.
    pub version_number: u64,
    /// Content digest.
    pub hash: HashDigest,
    /// Opaque configuration text.
    pub content: String,
    /// Optional change summary.
    pub change_summary: Option<String>,
    /// Version creation time.
    pub created_at: Timestamp,
}

// ============================================================================
// SECTION: Subscribe and Events
// ============================================================================

/// Subscribe request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    /// Instance identifier.
    pub instance_id: InstanceId,
    /// Session token.
    pub token: String,
}

/// Event envelope pushed to a subscribed agent.
///
/// # Invariants
/// - Events on one subscription are delivered in enqueue order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event identifier for tracing.
    pub event_id: EventId,
    /// Event creation time.
    pub timestamp: Timestamp,
    /// Event payload.
    pub payload: EventPayload,
}

/// Event payloads.
///
/// # Invariants
/// - Variants are stable for serialization and wire matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventPayload {
    /// Keep-alive; both peers use it to detect dead connections.
    Ping,
    /// The assigned configuration changed outside a deployment.
    ConfigUpdate {
        /// New config version.
        config_version: u64,
        /// New content digest.
        config_hash: HashDigest,
        /// Optional change summary.
        change_summary: Option<String>,
    },
    /// A deployment batch reached this instance.
    Deployment(DeploymentEvent),
    /// Advisory drain request; no completion reporting is defined.
    Drain {
        /// Seconds the instance should spend draining.
        drain_timeout_seconds: u64,
        /// Human-readable reason.
        reason: String,
    },
}

/// Deployment dispatch event body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentEvent {
    /// Deployment identifier.
    pub deployment_id: DeploymentId,
    /// Target config identifier.
    pub config_id: ConfigId,
    /// Config version to apply.
    pub config_version: u64,
    /// Rollout strategy of the deployment.
    pub strategy: DeploymentStrategy,
    /// Zero-based index of the batch containing this instance.
    pub batch_position: usize,
    /// Total number of planned batches.
    pub batch_total: usize,
    /// Deadline by which the instance must report.
    pub deadline: Timestamp,
    /// True when this deployment rolls back a previous version.
    pub is_rollback: bool,
}

// ============================================================================
// SECTION: Deployment Acknowledgement and Status
// ============================================================================

/// Ack-deployment request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckDeploymentRequest {
    /// Instance identifier.
    pub instance_id: InstanceId,
    /// Session token.
    pub token: String,
    /// Deployment being acknowledged.
    pub deployment_id: DeploymentId,
    /// True when the agent accepts the deployment.
    pub accepted: bool,
    /// Reason when rejecting.
    pub rejection_reason: Option<String>,
}

/// Ack-deployment response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckDeploymentResponse {
    /// True when the acknowledgement was recorded.
    pub acknowledged: bool,
    /// Optional follow-up instruction for the agent.
    pub instruction: Option<String>,
}

/// Deployment execution state reported by an agent.
///
/// # Invariants
/// - Variants are stable for serialization and wire matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReportedDeploymentState {
    /// Received but not yet started.
    Pending,
    /// Apply in progress.
    InProgress,
    /// Applied successfully.
    Completed,
    /// Apply failed.
    Failed,
    /// Reverted to the prior configuration.
    RolledBack,
}

impl ReportedDeploymentState {
    /// Returns true for states that resolve the instance's outcome.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::RolledBack)
    }
}

/// Report-deployment-status request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDeploymentStatusRequest {
    /// Instance identifier.
    pub instance_id: InstanceId,
    /// Session token.
    pub token: String,
    /// Deployment being reported.
    pub deployment_id: DeploymentId,
    /// Reported execution state.
    pub state: ReportedDeploymentState,
    /// Optional human-readable message.
    pub message: Option<String>,
    /// Error detail when the state is FAILED.
    pub error_details: Option<String>,
}

/// Report-deployment-status response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportDeploymentStatusResponse {
    /// True when the report was recorded.
    pub acknowledged: bool,
}

// ============================================================================
// SECTION: Deregister
// ============================================================================

/// Deregister request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeregisterRequest {
    /// Instance identifier.
    pub instance_id: InstanceId,
    /// Session token.
    pub token: String,
    /// Optional human-readable reason.
    pub reason: Option<String>,
}

/// Deregister response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeregisterResponse {
    /// True when the instance was marked offline.
    pub acknowledged: bool,
}
