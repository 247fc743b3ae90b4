// crates/convoy-agent/src/agent.rs
// ============================================================================
// Module: Agent Runtime
// Description: Register/heartbeat/subscribe loops and deployment execution.
// Purpose: Keep one instance enrolled and execute deployments it receives.
// Dependencies: convoy-core, convoy-proto, tokio, crate::{applier, client, config, state}
// ============================================================================

//! ## Overview
//! The agent runs two connections per session: a request-response connection
//! for register, heartbeat, fetch, and reports, and a subscribed connection
//! for pushed events. Connection establishment retries with exponential
//! backoff (1 second doubling to 5 minutes) and re-registers on every
//! successful reconnect. At startup any deployment recorded as in flight is
//! reported failed with reason "agent restart" before new work is accepted.
//! Shutdown deregisters best-effort within a 5-second bound.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use convoy_core::AgentHealth;
use convoy_core::DeploymentId;
use convoy_core::InstanceId;
use convoy_core::Timestamp;
use convoy_core::content_digest;
use convoy_proto::AckDeploymentRequest;
use convoy_proto::AgentStatus;
use convoy_proto::DeploymentEvent;
use convoy_proto::DeregisterRequest;
use convoy_proto::EventPayload;
use convoy_proto::GetConfigVersionRequest;
use convoy_proto::GetConfigVersionResponse;
use convoy_proto::HeartbeatRequest;
use convoy_proto::PendingActionType;
use convoy_proto::RegisterRequest;
use convoy_proto::RegisterResponse;
use convoy_proto::Reply;
use convoy_proto::ReportDeploymentStatusRequest;
use convoy_proto::ReportedDeploymentState;
use convoy_proto::Request;
use convoy_proto::SubscribeRequest;
use thiserror::Error;
use tokio::sync::watch;

use crate::applier::ConfigApplier;
use crate::client::Backoff;
use crate::client::ClientError;
use crate::client::Connection;
use crate::config::AgentConfig;
use crate::state::AgentState;
use crate::state::StateError;
use crate::state::StateFile;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Bound on the shutdown deregister attempt.
const DEREGISTER_TIMEOUT: Duration = Duration::from_secs(5);

/// Fallback apply budget when a deployment deadline has already passed.
const MIN_APPLY_BUDGET: Duration = Duration::from_secs(1);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Agent runtime errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Configuration rejected.
    #[error("agent config error: {0}")]
    Config(String),
    /// State file failure.
    #[error(transparent)]
    State(#[from] StateError),
    /// Transport or protocol failure; the session will be retried.
    #[error("agent client error: {0}")]
    Client(String),
}

impl From<ClientError> for AgentError {
    fn from(err: ClientError) -> Self {
        Self::Client(err.to_string())
    }
}

// ============================================================================
// SECTION: Session End
// ============================================================================

/// Why a session loop returned.
enum SessionEnd {
    /// Shutdown was requested; the run loop exits.
    Shutdown,
    /// The server closed the stream; the run loop reconnects.
    Disconnected,
}

// ============================================================================
// SECTION: Agent
// ============================================================================

/// Long-lived agent runtime for one instance.
///
/// # Invariants
/// - State file writes happen before and after every deployment transition
///   so a crash at any point is recoverable.
pub struct Agent {
    /// Agent configuration.
    config: AgentConfig,
    /// Persisted state file.
    state_file: StateFile,
    /// Worker-facing applier.
    applier: Arc<dyn ConfigApplier>,
}

impl Agent {
    /// Creates an agent from validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Config`] when the configuration is invalid.
    pub fn new(config: AgentConfig, applier: Arc<dyn ConfigApplier>) -> Result<Self, AgentError> {
        config.validate().map_err(|err| AgentError::Config(err.to_string()))?;
        let state_file = StateFile::new(config.state_path.clone());
        Ok(Self {
            config,
            state_file,
            applier,
        })
    }

    /// Runs the agent until shutdown is signalled.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::State`] when the state file cannot be read or
    /// written. Transport failures are retried, not returned.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), AgentError> {
        let mut state = self.state_file.load()?;
        let instance_id = self.resolve_instance_id(&mut state)?;
        let mut backoff = Backoff::default();
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            match self.session(&instance_id, &mut state, &mut shutdown, &mut backoff).await {
                Ok(SessionEnd::Shutdown) => return Ok(()),
                Ok(SessionEnd::Disconnected) => {
                    emit("agent_disconnected", instance_id.as_str().to_string());
                }
                Err(AgentError::State(err)) => return Err(AgentError::State(err)),
                Err(err) => {
                    emit("agent_session_error", err.to_string());
                }
            }
            let delay = backoff.next_delay();
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs one connected session: register, recover, heartbeat, and events.
    async fn session(
        &self,
        instance_id: &InstanceId,
        state: &mut AgentState,
        shutdown: &mut watch::Receiver<bool>,
        backoff: &mut Backoff,
    ) -> Result<SessionEnd, AgentError> {
        let mut rpc = Connection::connect(&self.config.server_addr).await?;
        let registered = self.register(&mut rpc, instance_id).await?;
        backoff.reset();
        let token = registered.token.clone();
        emit("agent_registered", instance_id.as_str().to_string());

        // Crash recovery: flush the orchestrator's wait table before new work.
        if let Some(deployment_id) = state.active_deployment_id.take() {
            self.report(
                &mut rpc,
                instance_id,
                &token,
                &deployment_id,
                ReportedDeploymentState::Failed,
                None,
                Some("agent restart".to_string()),
            )
            .await;
            self.state_file.save(state)?;
        }

        let events = Connection::connect(&self.config.server_addr).await?;
        let mut events = events
            .subscribe(SubscribeRequest {
                instance_id: instance_id.clone(),
                token: token.clone(),
            })
            .await?;

        let cadence = Duration::from_secs(registered.heartbeat_interval_seconds.max(1));
        let mut heartbeat = tokio::time::interval(cadence);
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    self.send_heartbeat(&mut rpc, instance_id, &token, state).await?;
                }
                event = events.next_event() => {
                    match event {
                        Ok(Some(envelope)) => {
                            self.handle_event(&mut rpc, instance_id, &token, state, envelope.payload)
                                .await?;
                        }
                        Ok(None) => return Ok(SessionEnd::Disconnected),
                        Err(err) => return Err(err.into()),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.deregister(&mut rpc, instance_id, &token).await;
                        return Ok(SessionEnd::Shutdown);
                    }
                }
            }
        }
    }

    /// Registers this instance and returns the register response.
    async fn register(
        &self,
        rpc: &mut Connection,
        instance_id: &InstanceId,
    ) -> Result<RegisterResponse, AgentError> {
        let reply = rpc
            .call(Request::Register(RegisterRequest {
                instance_id: instance_id.clone(),
                instance_name: self.config.instance_name.clone(),
                hostname: self.config.hostname(),
                agent_version: env!("CARGO_PKG_VERSION").to_string(),
                worker_version: self.config.worker_version.clone(),
                labels: self.config.labels.clone(),
                capabilities: self.config.capabilities.clone(),
            }))
            .await?;
        match reply {
            Reply::Register(response) => Ok(response),
            _ => Err(AgentError::Client("unexpected reply to register".to_string())),
        }
    }

    /// Sends one heartbeat and executes any returned pending actions.
    async fn send_heartbeat(
        &self,
        rpc: &mut Connection,
        instance_id: &InstanceId,
        token: &str,
        state: &mut AgentState,
    ) -> Result<(), AgentError> {
        let reply = rpc
            .call(Request::Heartbeat(HeartbeatRequest {
                instance_id: instance_id.clone(),
                token: token.to_string(),
                status: AgentStatus {
                    state: AgentHealth::Healthy,
                    message: None,
                },
                current_config_version: state.config_version,
                current_config_hash: state.config_hash.clone(),
                metrics: std::collections::BTreeMap::new(),
            }))
            .await?;
        let Reply::Heartbeat(response) = reply else {
            return Err(AgentError::Client("unexpected reply to heartbeat".to_string()));
        };
        for action in response.actions {
            match action.action_type {
                PendingActionType::FetchConfig => {
                    let config_id = action.params.get("config_id").cloned();
                    let version =
                        action.params.get("version").and_then(|value| value.parse::<u64>().ok());
                    if let (Some(config_id), Some(version)) = (config_id, version) {
                        self.fetch_and_apply(
                            rpc,
                            instance_id,
                            token,
                            state,
                            &convoy_core::ConfigId::new(config_id),
                            version,
                        )
                        .await;
                    }
                }
            }
        }
        Ok(())
    }

    /// Handles one pushed event.
    async fn handle_event(
        &self,
        rpc: &mut Connection,
        instance_id: &InstanceId,
        token: &str,
        state: &mut AgentState,
        payload: EventPayload,
    ) -> Result<(), AgentError> {
        match payload {
            EventPayload::Ping => Ok(()),
            EventPayload::Deployment(event) => {
                self.handle_deployment(rpc, instance_id, token, state, event).await
            }
            EventPayload::ConfigUpdate {
                config_version,
                ..
            } => {
                if let Some(config_id) = state.config_id.clone() {
                    self.fetch_and_apply(rpc, instance_id, token, state, &config_id, config_version)
                        .await;
                }
                Ok(())
            }
            EventPayload::Drain {
                drain_timeout_seconds,
                reason,
            } => {
                // Advisory only; no drain completion reporting is defined.
                emit("agent_drain", format!("{reason} ({drain_timeout_seconds}s)"));
                Ok(())
            }
        }
    }

    /// Executes one deployment event end to end.
    async fn handle_deployment(
        &self,
        rpc: &mut Connection,
        instance_id: &InstanceId,
        token: &str,
        state: &mut AgentState,
        event: DeploymentEvent,
    ) -> Result<(), AgentError> {
        state.active_deployment_id = Some(event.deployment_id.clone());
        self.state_file.save(state)?;

        let _ = rpc
            .call(Request::AckDeployment(AckDeploymentRequest {
                instance_id: instance_id.clone(),
                token: token.to_string(),
                deployment_id: event.deployment_id.clone(),
                accepted: true,
                rejection_reason: None,
            }))
            .await;
        self.report(
            rpc,
            instance_id,
            token,
            &event.deployment_id,
            ReportedDeploymentState::InProgress,
            None,
            None,
        )
        .await;

        let fetched =
            self.fetch_version(rpc, instance_id, token, &event.config_id, event.config_version).await;
        let outcome = match fetched {
            Ok(version) => self.apply_version(state, &event, &version).await,
            Err(err) => Err(format!("config fetch failed: {err}")),
        };
        match outcome {
            Ok(()) => {
                self.report(
                    rpc,
                    instance_id,
                    token,
                    &event.deployment_id,
                    ReportedDeploymentState::Completed,
                    None,
                    None,
                )
                .await;
            }
            Err(detail) => {
                emit("agent_deploy_failed", detail.clone());
                self.report(
                    rpc,
                    instance_id,
                    token,
                    &event.deployment_id,
                    ReportedDeploymentState::Failed,
                    None,
                    Some(detail),
                )
                .await;
            }
        }
        state.active_deployment_id = None;
        self.state_file.save(state)?;
        Ok(())
    }

    /// Verifies and applies one fetched config version.
    async fn apply_version(
        &self,
        state: &mut AgentState,
        event: &DeploymentEvent,
        version: &GetConfigVersionResponse,
    ) -> Result<(), String> {
        if content_digest(version.content.as_bytes()) != version.hash {
            return Err("config hash mismatch".to_string());
        }
        let budget = apply_budget(event.deadline);
        let applied = tokio::time::timeout(
            budget,
            self.applier.apply(&event.config_id, event.config_version, &version.content),
        )
        .await;
        match applied {
            Ok(Ok(())) => {
                state.record_applied(
                    event.config_id.clone(),
                    event.config_version,
                    version.hash.clone(),
                );
                Ok(())
            }
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err("apply timed out".to_string()),
        }
    }

    /// Fetches a specific config version.
    async fn fetch_version(
        &self,
        rpc: &mut Connection,
        instance_id: &InstanceId,
        token: &str,
        config_id: &convoy_core::ConfigId,
        version: u64,
    ) -> Result<GetConfigVersionResponse, ClientError> {
        let reply = rpc
            .call(Request::GetConfigVersion(GetConfigVersionRequest {
                instance_id: instance_id.clone(),
                token: token.to_string(),
                config_id: config_id.clone(),
                version_number: version,
            }))
            .await?;
        match reply {
            Reply::GetConfigVersion(response) => Ok(response),
            _ => Err(ClientError::Protocol("unexpected reply to get_config_version".to_string())),
        }
    }

    /// Fetches and applies a version outside a deployment (drift catch-up).
    async fn fetch_and_apply(
        &self,
        rpc: &mut Connection,
        instance_id: &InstanceId,
        token: &str,
        state: &mut AgentState,
        config_id: &convoy_core::ConfigId,
        version: u64,
    ) {
        let fetched = self.fetch_version(rpc, instance_id, token, config_id, version).await;
        match fetched {
            Ok(response) => {
                if content_digest(response.content.as_bytes()) != response.hash {
                    emit("agent_fetch_failed", "config hash mismatch".to_string());
                    return;
                }
                let applied =
                    self.applier.apply(config_id, version, &response.content).await;
                match applied {
                    Ok(()) => {
                        state.record_applied(config_id.clone(), version, response.hash);
                        if let Err(err) = self.state_file.save(state) {
                            emit("agent_state_error", err.to_string());
                        }
                    }
                    Err(err) => emit("agent_fetch_failed", err.to_string()),
                }
            }
            Err(err) => emit("agent_fetch_failed", err.to_string()),
        }
    }

    /// Sends one status report, best-effort.
    #[allow(clippy::too_many_arguments, reason = "Report fields mirror the wire message.")]
    async fn report(
        &self,
        rpc: &mut Connection,
        instance_id: &InstanceId,
        token: &str,
        deployment_id: &DeploymentId,
        state: ReportedDeploymentState,
        message: Option<String>,
        error_details: Option<String>,
    ) {
        let result = rpc
            .call(Request::ReportDeploymentStatus(ReportDeploymentStatusRequest {
                instance_id: instance_id.clone(),
                token: token.to_string(),
                deployment_id: deployment_id.clone(),
                state,
                message,
                error_details,
            }))
            .await;
        if let Err(err) = result {
            emit("agent_report_failed", err.to_string());
        }
    }

    /// Deregisters best-effort within the shutdown bound.
    async fn deregister(&self, rpc: &mut Connection, instance_id: &InstanceId, token: &str) {
        let attempt = rpc.call(Request::Deregister(DeregisterRequest {
            instance_id: instance_id.clone(),
            token: token.to_string(),
            reason: Some("shutdown".to_string()),
        }));
        if tokio::time::timeout(DEREGISTER_TIMEOUT, attempt).await.is_err() {
            emit("agent_deregister_timeout", instance_id.as_str().to_string());
        }
    }

    /// Resolves the stable instance id, persisting a generated one.
    fn resolve_instance_id(&self, state: &mut AgentState) -> Result<InstanceId, AgentError> {
        if let Some(id) = &state.instance_id {
            return Ok(id.clone());
        }
        let id = self.config.instance_id.clone().map_or_else(generate_instance_id, InstanceId::new);
        state.instance_id = Some(id.clone());
        self.state_file.save(state)?;
        Ok(id)
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the apply budget remaining until the deployment deadline.
fn apply_budget(deadline: Timestamp) -> Duration {
    let remaining = deadline.unix_millis().saturating_sub(Timestamp::now().unix_millis());
    u64::try_from(remaining).map_or(MIN_APPLY_BUDGET, |millis| {
        Duration::from_millis(millis).max(MIN_APPLY_BUDGET)
    })
}

/// Generates a fresh instance id.
fn generate_instance_id() -> InstanceId {
    use rand::RngCore;
    let mut bytes = [0_u8; 8];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    InstanceId::new(format!("inst-{}", convoy_core::core::hashing::hex_encode(&bytes)))
}

/// Emits one JSON log line to stderr.
fn emit(event: &str, detail: String) {
    let payload = serde_json::json!({
        "event": event,
        "timestamp_ms": Timestamp::now().unix_millis(),
        "detail": detail,
    });
    let _ = writeln!(std::io::stderr(), "{payload}");
}
