// crates/convoy-server/src/service.rs
// ============================================================================
// Module: Fleet Service
// Description: Request-response and streaming endpoints consumed by agents.
// Purpose: Authenticate agents, reconcile reported state, and fan events out.
// Dependencies: convoy-core, convoy-proto, tokio
// ============================================================================

//! ## Overview
//! The fleet service owns the session registry and the subscriber hub. Every
//! endpoint except register is authenticated by session token, and the token
//! must belong to the instance named in the request. Status reports are
//! persisted first, then forwarded to the single registered orchestrator
//! callback. All inputs are untrusted and validated fail-closed.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::OnceLock;
use std::time::Duration;

use convoy_core::FleetStore;
use convoy_core::Instance;
use convoy_core::InstanceId;
use convoy_core::InstanceStatus;
use convoy_core::StoreError;
use convoy_core::Timestamp;
use convoy_proto::AckDeploymentRequest;
use convoy_proto::AckDeploymentResponse;
use convoy_proto::DeploymentEvent;
use convoy_proto::DeregisterRequest;
use convoy_proto::DeregisterResponse;
use convoy_proto::ErrorCode;
use convoy_proto::ErrorReply;
use convoy_proto::EventEnvelope;
use convoy_proto::EventPayload;
use convoy_proto::GetConfigRequest;
use convoy_proto::GetConfigResponse;
use convoy_proto::GetConfigVersionRequest;
use convoy_proto::GetConfigVersionResponse;
use convoy_proto::HeartbeatRequest;
use convoy_proto::HeartbeatResponse;
use convoy_proto::PendingAction;
use convoy_proto::PendingActionType;
use convoy_proto::RegisterRequest;
use convoy_proto::RegisterResponse;
use convoy_proto::ReportDeploymentStatusRequest;
use convoy_proto::ReportDeploymentStatusResponse;
use convoy_proto::ReportedDeploymentState;
use convoy_proto::SubscribeRequest;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::audit::DeployAuditEvent;
use crate::audit::DeployAuditSink;
use crate::hub::SendOutcome;
use crate::hub::SubscriberHub;
use crate::ids::random_id;
use crate::session::SessionError;
use crate::session::SessionRegistry;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Fleet service errors mapped onto the wire code family.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages never contain token material.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed or incomplete request.
    #[error("invalid argument: {0}")]
    Validation(String),
    /// Missing, expired, or unknown session token.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// Token is valid but not for the requested instance.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Server-side failure.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Returns the wire error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::InvalidArgument,
            Self::Unauthenticated(_) => ErrorCode::Unauthenticated,
            Self::PermissionDenied(_) => ErrorCode::PermissionDenied,
            Self::NotFound(_) => ErrorCode::NotFound,
            Self::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Converts the error into a wire error reply.
    #[must_use]
    pub fn to_reply(&self) -> ErrorReply {
        ErrorReply {
            code: self.code(),
            message: self.to_string(),
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(detail) => Self::NotFound(detail),
            StoreError::AlreadyExists(detail) | StoreError::Conflict(detail) => {
                Self::Validation(detail)
            }
            StoreError::Internal(detail) => Self::Internal(detail),
        }
    }
}

impl From<SessionError> for ServiceError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Unauthenticated(detail) => Self::Unauthenticated(detail),
            SessionError::Internal(detail) => Self::Internal(detail),
        }
    }
}

// ============================================================================
// SECTION: Status Callback
// ============================================================================

/// Status report forwarded to the orchestrator.
#[derive(Debug, Clone)]
pub struct StatusReport {
    /// Reporting instance.
    pub instance_id: InstanceId,
    /// Deployment being reported.
    pub deployment_id: convoy_core::DeploymentId,
    /// Reported execution state.
    pub state: ReportedDeploymentState,
    /// Optional human-readable message.
    pub message: Option<String>,
    /// Error detail when the state is FAILED.
    pub error_details: Option<String>,
}

/// Callback invoked for every accepted deployment status report.
pub trait DeploymentStatusCallback: Send + Sync {
    /// Handles one status report after the store has been updated.
    fn on_status_report(&self, report: StatusReport);
}

// ============================================================================
// SECTION: Subscription
// ============================================================================

/// Live event subscription owned by one stream task.
///
/// # Invariants
/// - `epoch` identifies this stream's hub entry; removal is owner-checked so
///   a superseded stream never unregisters its successor.
pub struct Subscription {
    /// Subscribed instance.
    pub instance_id: InstanceId,
    /// Bounded event receiver.
    receiver: mpsc::Receiver<EventEnvelope>,
    /// Hub entry epoch owned by this stream.
    epoch: u64,
}

impl Subscription {
    /// Receives the next event, or `None` when the channel is closed.
    pub async fn recv(&mut self) -> Option<EventEnvelope> {
        self.receiver.recv().await
    }
}

// ============================================================================
// SECTION: Fleet Service
// ============================================================================

/// Request-response and streaming endpoints consumed by agents.
///
/// # Invariants
/// - Only one status callback may be registered; it is installed before any
///   agent traffic is accepted.
pub struct FleetService {
    /// Durable fleet store.
    store: Arc<dyn FleetStore>,
    /// Session registry.
    sessions: SessionRegistry,
    /// Subscriber hub.
    hub: SubscriberHub,
    /// Per-instance pending-action queues, drained by heartbeat.
    pending: Mutex<HashMap<InstanceId, Vec<PendingAction>>>,
    /// Orchestrator status callback, installed once at wiring time.
    status_callback: OnceLock<Arc<dyn DeploymentStatusCallback>>,
    /// Recommended heartbeat cadence echoed to agents.
    heartbeat_interval: Duration,
    /// Audit sink.
    audit: Arc<dyn DeployAuditSink>,
}

impl FleetService {
    /// Creates the fleet service.
    #[must_use]
    pub fn new(
        store: Arc<dyn FleetStore>,
        heartbeat_interval: Duration,
        session_ttl: Duration,
        audit: Arc<dyn DeployAuditSink>,
    ) -> Self {
        Self {
            sessions: SessionRegistry::new(Arc::clone(&store), session_ttl),
            store,
            hub: SubscriberHub::new(),
            pending: Mutex::new(HashMap::new()),
            status_callback: OnceLock::new(),
            heartbeat_interval,
            audit,
        }
    }

    /// Installs the orchestrator status callback.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Internal`] when a callback is already
    /// installed.
    pub fn set_status_callback(
        &self,
        callback: Arc<dyn DeploymentStatusCallback>,
    ) -> Result<(), ServiceError> {
        self.status_callback
            .set(callback)
            .map_err(|_| ServiceError::Internal("status callback already registered".to_string()))
    }

    /// Validates a token and requires it to belong to the named instance.
    fn authenticate(
        &self,
        instance_id: &InstanceId,
        token: &str,
        action: &'static str,
    ) -> Result<(), ServiceError> {
        let now = Timestamp::now();
        let token_instance = self.sessions.validate(token, now).map_err(|err| {
            self.audit.record(&DeployAuditEvent::auth_denied(action, err.to_string()));
            err
        })?;
        if token_instance != *instance_id {
            self.audit.record(&DeployAuditEvent::auth_denied(
                action,
                "token does not match instance".to_string(),
            ));
            return Err(ServiceError::PermissionDenied(
                "token does not match instance".to_string(),
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Register
    // ------------------------------------------------------------------

    /// Registers an agent, issuing a replacement session token.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Validation`] on missing id/name and
    /// [`ServiceError::Internal`] on store failure.
    pub fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, ServiceError> {
        if request.instance_id.is_empty() {
            return Err(ServiceError::Validation("instance_id must not be empty".to_string()));
        }
        if request.instance_name.is_empty() {
            return Err(ServiceError::Validation("instance_name must not be empty".to_string()));
        }
        let now = Timestamp::now();
        let existing = self.store.get_instance(&request.instance_id)?;
        let (created_at, applied_config_id, applied_config_version) = existing.map_or_else(
            || (now, None, None),
            |prior| (prior.created_at, prior.applied_config_id, prior.applied_config_version),
        );
        let instance = Instance {
            id: request.instance_id.clone(),
            name: request.instance_name.clone(),
            hostname: request.hostname.clone(),
            agent_version: request.agent_version.clone(),
            worker_version: request.worker_version.clone(),
            labels: request.labels.clone(),
            capabilities: request.capabilities.iter().cloned().collect(),
            status: InstanceStatus::Online,
            last_seen: now,
            applied_config_id: applied_config_id.clone(),
            applied_config_version,
            created_at,
            updated_at: now,
        };
        self.store.upsert_instance(&instance)?;
        let token = self.sessions.issue(&request.instance_id, now)?;

        let assigned = applied_config_id
            .map(|config_id| self.store.latest_config_version(&config_id))
            .transpose()?
            .flatten();
        Ok(RegisterResponse {
            token,
            config_version: assigned.as_ref().map(|version| version.version),
            config_hash: assigned.map(|version| version.content_hash),
            heartbeat_interval_seconds: self.heartbeat_interval.as_secs(),
        })
    }

    // ------------------------------------------------------------------
    // Heartbeat
    // ------------------------------------------------------------------

    /// Processes a heartbeat: liveness, health mapping, and config drift.
    ///
    /// # Errors
    ///
    /// Returns auth errors for bad tokens, [`ServiceError::NotFound`] for an
    /// unknown instance, and [`ServiceError::Internal`] on store failure.
    pub fn heartbeat(&self, request: &HeartbeatRequest) -> Result<HeartbeatResponse, ServiceError> {
        self.authenticate(&request.instance_id, &request.token, "heartbeat")?;
        let now = Timestamp::now();
        let instance = self
            .store
            .get_instance(&request.instance_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("instance: {}", request.instance_id)))?;

        // Deployment-driven statuses are owned by the deployment path.
        let next_status = match instance.status {
            InstanceStatus::Deploying | InstanceStatus::Draining => instance.status,
            _ => request.status.state.as_instance_status(),
        };
        self.store.update_instance_status(&request.instance_id, next_status, now)?;

        let mut actions = Vec::new();
        let mut config_update_available = false;
        let mut latest_config_version = None;
        if let Some(config_id) = &instance.applied_config_id
            && let Some(latest) = self.store.latest_config_version(config_id)?
        {
            latest_config_version = Some(latest.version);
            let version_matches = request.current_config_version == Some(latest.version);
            let hash_matches =
                request.current_config_hash.as_ref() == Some(&latest.content_hash);
            if !version_matches || !hash_matches {
                config_update_available = true;
                actions.push(PendingAction {
                    action_type: PendingActionType::FetchConfig,
                    action_id: random_id("act"),
                    params: [
                        ("config_id".to_string(), config_id.to_string()),
                        ("version".to_string(), latest.version.to_string()),
                    ]
                    .into_iter()
                    .collect(),
                });
            }
        }
        if let Ok(mut pending) = self.pending.lock()
            && let Some(queued) = pending.remove(&request.instance_id)
        {
            actions.extend(queued);
        }
        Ok(HeartbeatResponse {
            config_update_available,
            latest_config_version,
            actions,
        })
    }

    /// Queues a pending action for delivery on the next heartbeat.
    pub fn queue_action(&self, instance_id: &InstanceId, action: PendingAction) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.entry(instance_id.clone()).or_default().push(action);
        }
    }

    // ------------------------------------------------------------------
    // Config Fetch
    // ------------------------------------------------------------------

    /// Returns the instance's assigned configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the instance has no assigned
    /// config or the requested version is absent.
    pub fn get_config(
        &self,
        request: &GetConfigRequest,
    ) -> Result<GetConfigResponse, ServiceError> {
        self.authenticate(&request.instance_id, &request.token, "get_config")?;
        let instance = self
            .store
            .get_instance(&request.instance_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("instance: {}", request.instance_id)))?;
        let config_id = instance.applied_config_id.ok_or_else(|| {
            ServiceError::NotFound(format!("no config assigned to {}", request.instance_id))
        })?;
        let version = match request.version {
            Some(version) => self.store.get_config_version(&config_id, version)?,
            None => self.store.latest_config_version(&config_id)?,
        }
        .ok_or_else(|| ServiceError::NotFound(format!("config version for {config_id}")))?;
        Ok(GetConfigResponse {
            version: version.version,
            hash: version.content_hash,
            content: version.content,
            created_at: version.created_at,
        })
    }

    /// Returns one version of a named configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the version is absent.
    pub fn get_config_version(
        &self,
        request: &GetConfigVersionRequest,
    ) -> Result<GetConfigVersionResponse, ServiceError> {
        self.authenticate(&request.instance_id, &request.token, "get_config_version")?;
        let version = self
            .store
            .get_config_version(&request.config_id, request.version_number)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "config version: {} v{}",
                    request.config_id, request.version_number
                ))
            })?;
        Ok(GetConfigVersionResponse {
            config_id: version.config_id,
            version_number: version.version,
            hash: version.content_hash,
            content: version.content,
            change_summary: version.change_summary,
            created_at: version.created_at,
        })
    }

    // ------------------------------------------------------------------
    // Subscribe
    // ------------------------------------------------------------------

    /// Opens the event stream for an instance, superseding any prior stream.
    ///
    /// # Errors
    ///
    /// Returns auth errors for bad or mismatched tokens.
    pub fn subscribe(&self, request: &SubscribeRequest) -> Result<Subscription, ServiceError> {
        self.authenticate(&request.instance_id, &request.token, "subscribe")?;
        let (receiver, epoch) = self.hub.register(&request.instance_id);
        Ok(Subscription {
            instance_id: request.instance_id.clone(),
            receiver,
            epoch,
        })
    }

    /// Releases a subscription's hub entry if this stream still owns it.
    pub fn end_subscription(&self, subscription: &Subscription) {
        self.hub.remove_if_owner(&subscription.instance_id, subscription.epoch);
    }

    // ------------------------------------------------------------------
    // Deployment Acknowledgement and Status
    // ------------------------------------------------------------------

    /// Records a deployment acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns auth errors for bad tokens.
    pub fn ack_deployment(
        &self,
        request: &AckDeploymentRequest,
    ) -> Result<AckDeploymentResponse, ServiceError> {
        self.authenticate(&request.instance_id, &request.token, "ack_deployment")?;
        let detail = if request.accepted {
            "accepted".to_string()
        } else {
            format!(
                "rejected: {}",
                request.rejection_reason.as_deref().unwrap_or("no reason given")
            )
        };
        self.audit.record(&DeployAuditEvent::deployment_ack(
            request.deployment_id.as_str(),
            request.instance_id.as_str(),
            detail,
        ));
        Ok(AckDeploymentResponse {
            acknowledged: true,
            instruction: None,
        })
    }

    /// Processes a deployment status report and forwards it to the
    /// orchestrator callback.
    ///
    /// # Errors
    ///
    /// Returns auth errors for bad tokens and [`ServiceError::Internal`] on
    /// store failure.
    pub fn report_deployment_status(
        &self,
        request: &ReportDeploymentStatusRequest,
    ) -> Result<ReportDeploymentStatusResponse, ServiceError> {
        self.authenticate(&request.instance_id, &request.token, "report_deployment_status")?;
        let now = Timestamp::now();
        let side_effect = match request.state {
            ReportedDeploymentState::InProgress => Some(InstanceStatus::Deploying),
            ReportedDeploymentState::Completed | ReportedDeploymentState::RolledBack => {
                Some(InstanceStatus::Online)
            }
            ReportedDeploymentState::Failed => Some(InstanceStatus::Degraded),
            ReportedDeploymentState::Pending => None,
        };
        if let Some(status) = side_effect {
            self.store.update_instance_status(&request.instance_id, status, now)?;
        }
        if let Some(callback) = self.status_callback.get() {
            callback.on_status_report(StatusReport {
                instance_id: request.instance_id.clone(),
                deployment_id: request.deployment_id.clone(),
                state: request.state,
                message: request.message.clone(),
                error_details: request.error_details.clone(),
            });
        }
        Ok(ReportDeploymentStatusResponse {
            acknowledged: true,
        })
    }

    // ------------------------------------------------------------------
    // Deregister
    // ------------------------------------------------------------------

    /// Deregisters an agent: offline status, token revocation, hub removal.
    ///
    /// # Errors
    ///
    /// Returns auth errors for bad tokens and [`ServiceError::Internal`] on
    /// store failure. Idempotent with respect to a missing subscriber.
    pub fn deregister(
        &self,
        request: &DeregisterRequest,
    ) -> Result<DeregisterResponse, ServiceError> {
        self.authenticate(&request.instance_id, &request.token, "deregister")?;
        let now = Timestamp::now();
        self.store.update_instance_status(&request.instance_id, InstanceStatus::Offline, now)?;
        self.sessions.revoke_instance(&request.instance_id)?;
        self.hub.remove(&request.instance_id);
        Ok(DeregisterResponse {
            acknowledged: true,
        })
    }

    // ------------------------------------------------------------------
    // Event Push (orchestrator-facing)
    // ------------------------------------------------------------------

    /// Pushes a deployment event to one instance without blocking.
    pub fn push_deployment_event(
        &self,
        instance_id: &InstanceId,
        event: DeploymentEvent,
    ) -> SendOutcome {
        let outcome = self.hub.send(instance_id, self.make_event(EventPayload::Deployment(event)));
        if outcome == SendOutcome::Overflow {
            self.audit.record(&DeployAuditEvent::channel_overflow(instance_id.as_str()));
        }
        outcome
    }

    /// Pushes an arbitrary event to one instance without blocking.
    pub fn push_event(&self, instance_id: &InstanceId, payload: EventPayload) -> SendOutcome {
        let outcome = self.hub.send(instance_id, self.make_event(payload));
        if outcome == SendOutcome::Overflow {
            self.audit.record(&DeployAuditEvent::channel_overflow(instance_id.as_str()));
        }
        outcome
    }

    /// Broadcasts an event to every subscriber without blocking.
    pub fn broadcast_event(&self, payload: EventPayload) -> crate::hub::BroadcastOutcome {
        self.hub.broadcast(&self.make_event(payload))
    }

    /// Returns true when the instance currently holds a subscription.
    #[must_use]
    pub fn is_subscribed(&self, instance_id: &InstanceId) -> bool {
        self.hub.is_subscribed(instance_id)
    }

    /// Wraps a payload in a fresh envelope.
    #[must_use]
    pub fn make_event(&self, payload: EventPayload) -> EventEnvelope {
        EventEnvelope {
            event_id: convoy_core::EventId::new(random_id("ev")),
            timestamp: Timestamp::now(),
            payload,
        }
    }
}
