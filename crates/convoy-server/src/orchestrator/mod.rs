// crates/convoy-server/src/orchestrator/mod.rs
// ============================================================================
// Module: Deployment Orchestrator
// Description: Plans deployments and drives one runner task per rollout.
// Purpose: Execute deployments end-to-end with per-instance outcome tracking.
// Dependencies: convoy-core, convoy-proto, tokio, crate::service
// ============================================================================

//! ## Overview
//! The orchestrator validates and plans deployments, persists the record,
//! and starts a runner task per deployment. Runners are registered in an
//! active map keyed by deployment id; the status callback routes agent
//! reports into the owning runner's wait table. In-memory structures are
//! authoritative only while the process lives — on startup any deployment
//! still marked pending or in-progress is promoted to failed.
//!
//! A fleet-wide guard enforces that an instance is in flight for at most one
//! deployment at any instant.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod runner;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;

use convoy_core::BatchPlan;
use convoy_core::Deployment;
use convoy_core::DeploymentId;
use convoy_core::DeploymentProgress;
use convoy_core::DeploymentRequest;
use convoy_core::DeploymentStatus;
use convoy_core::FleetStore;
use convoy_core::InstanceId;
use convoy_core::StoreError;
use convoy_core::Timestamp;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::watch;

use crate::audit::DeployAuditEvent;
use crate::audit::DeployAuditSink;
use crate::ids::random_id;
use crate::service::DeploymentStatusCallback;
use crate::service::FleetService;
use crate::service::StatusReport;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Capacity of each runner's report channel.
const REPORT_CHANNEL_CAPACITY: usize = 256;

/// Failure reason recorded when recovering interrupted deployments.
const RESTART_REASON: &str = "orchestrator restart";

// ============================================================================
// SECTION: Timing
// ============================================================================

/// Runner timing knobs.
///
/// # Invariants
/// - Both durations are strictly positive.
#[derive(Debug, Clone, Copy)]
pub struct RunnerTiming {
    /// Per-instance timeout measured from dispatch.
    pub instance_timeout: Duration,
    /// Delay between batches for rolling and canary strategies.
    pub batch_delay: Duration,
}

impl Default for RunnerTiming {
    fn default() -> Self {
        Self {
            instance_timeout: Duration::from_secs(300),
            batch_delay: Duration::from_secs(30),
        }
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Orchestrator errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Unknown config or version.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// A named target instance does not exist.
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    /// The resolved target set was empty.
    #[error("deployment target set is empty")]
    EmptyTargets,
    /// Referenced deployment does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The deployment is already in a terminal status.
    #[error("deployment already terminal: {0}")]
    AlreadyTerminal(String),
    /// Store or invariant failure.
    #[error("orchestrator internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for OrchestratorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(detail) => Self::NotFound(detail),
            StoreError::AlreadyExists(detail)
            | StoreError::Conflict(detail)
            | StoreError::Internal(detail) => Self::Internal(detail),
        }
    }
}

// ============================================================================
// SECTION: Runner Handle
// ============================================================================

/// Shared handle to one live runner.
pub(crate) struct RunnerHandle {
    /// Report channel into the runner's wait loop.
    pub(crate) reports: mpsc::Sender<StatusReport>,
    /// Cooperative cancellation signal.
    pub(crate) cancel: watch::Sender<bool>,
    /// Instances the runner is currently awaiting.
    pub(crate) wait_set: Arc<Mutex<HashSet<InstanceId>>>,
}

/// Active runner map shared with runner tasks for self-removal.
pub(crate) type RunnerMap = Arc<Mutex<HashMap<DeploymentId, RunnerHandle>>>;

/// Fleet-wide in-flight guard: instance id to the deployment holding it.
pub(crate) type InFlightMap = Arc<Mutex<HashMap<InstanceId, DeploymentId>>>;

// ============================================================================
// SECTION: Orchestrator
// ============================================================================

/// Drives deployments end-to-end.
///
/// # Invariants
/// - One runner per active deployment; runners remove themselves from the
///   active map at cleanup.
/// - The in-flight guard holds an instance for at most one deployment.
pub struct Orchestrator {
    /// Durable fleet store.
    store: Arc<dyn FleetStore>,
    /// Fleet service used for event dispatch.
    service: Arc<FleetService>,
    /// Audit sink.
    audit: Arc<dyn DeployAuditSink>,
    /// Runner timing knobs.
    timing: RunnerTiming,
    /// Active runners keyed by deployment id.
    runners: RunnerMap,
    /// Fleet-wide in-flight instance guard.
    in_flight: InFlightMap,
}

impl Orchestrator {
    /// Creates the orchestrator and recovers interrupted deployments.
    ///
    /// Any deployment still marked pending or in-progress is promoted to
    /// failed with reason "orchestrator restart" before new work is accepted.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Internal`] when recovery cannot read or
    /// update the store.
    pub fn new(
        store: Arc<dyn FleetStore>,
        service: Arc<FleetService>,
        audit: Arc<dyn DeployAuditSink>,
        timing: RunnerTiming,
    ) -> Result<Arc<Self>, OrchestratorError> {
        let orchestrator = Arc::new(Self {
            store,
            service,
            audit,
            timing,
            runners: Arc::new(Mutex::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        });
        orchestrator.recover()?;
        Ok(orchestrator)
    }

    /// Promotes interrupted deployments to failed after a restart.
    fn recover(&self) -> Result<(), OrchestratorError> {
        let interrupted = self
            .store
            .list_deployments_with_status(&[
                DeploymentStatus::Pending,
                DeploymentStatus::InProgress,
            ])?;
        let now = Timestamp::now();
        for deployment in interrupted {
            let mut progress = deployment.progress.clone();
            progress.failure_reason = Some(RESTART_REASON.to_string());
            let _ = self.store.update_deployment_progress(&deployment.id, &progress, now)?;
            let _ =
                self.store.update_deployment_status(&deployment.id, DeploymentStatus::Failed, now)?;
            self.audit
                .record(&DeployAuditEvent::deployment_finished(deployment.id.as_str(), "failed"));
        }
        Ok(())
    }

    /// Plans, persists, and starts a deployment.
    ///
    /// Target validation does not require targets to be subscribed at this
    /// moment; subscription is checked per instance at dispatch time.
    ///
    /// Must be called from within a tokio runtime: the runner task is spawned
    /// onto the current runtime.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::InvalidConfig`] for unknown configs or
    /// versions, [`OrchestratorError::InvalidTarget`] for unknown instances,
    /// [`OrchestratorError::EmptyTargets`] for an empty resolved set, and
    /// [`OrchestratorError::Internal`] on store failure.
    pub fn create(&self, request: &DeploymentRequest) -> Result<Deployment, OrchestratorError> {
        let config = self
            .store
            .get_config(&request.config_id)?
            .ok_or_else(|| OrchestratorError::InvalidConfig(request.config_id.to_string()))?;
        let version = request.config_version.unwrap_or(config.current_version);
        let version_row = self
            .store
            .get_config_version(&request.config_id, version)?
            .ok_or_else(|| {
                OrchestratorError::InvalidConfig(format!("{} v{version}", request.config_id))
            })?;

        let resolved = if request.target.instance_ids.is_empty() {
            if request.target.labels.is_empty() {
                return Err(OrchestratorError::EmptyTargets);
            }
            self.store.instances_matching_labels(&request.target.labels)?
        } else {
            request.target.instance_ids.clone()
        };
        if resolved.is_empty() {
            return Err(OrchestratorError::EmptyTargets);
        }
        for target in &resolved {
            if self.store.get_instance(target)?.is_none() {
                return Err(OrchestratorError::InvalidTarget(target.to_string()));
            }
        }

        let strategy = request.strategy;
        let batch_size = strategy.normalized_batch_size(request.batch_size, resolved.len());
        let plan = BatchPlan::build(strategy, batch_size, &resolved)
            .map_err(|err| OrchestratorError::Internal(err.to_string()))?;

        let now = Timestamp::now();
        let deployment = Deployment {
            id: DeploymentId::new(random_id("dep")),
            config_id: request.config_id.clone(),
            config_version: version_row.version,
            target: request.target.clone(),
            resolved_targets: resolved,
            strategy,
            batch_size,
            status: DeploymentStatus::Pending,
            progress: DeploymentProgress {
                total_instances: plan.target_count(),
                total_batches: plan.batch_count(),
                ..DeploymentProgress::default()
            },
            started_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        };
        self.store.create_deployment(&deployment)?;
        self.audit.record(&DeployAuditEvent::deployment_created(
            deployment.id.as_str(),
            format!(
                "{} v{} to {} instances ({})",
                deployment.config_id,
                deployment.config_version,
                deployment.progress.total_instances,
                deployment.strategy.as_str()
            ),
        ));

        self.start_runner(&deployment, plan);
        Ok(deployment)
    }

    /// Starts the runner task for a persisted deployment.
    fn start_runner(&self, deployment: &Deployment, plan: BatchPlan) {
        let (reports_tx, reports_rx) = mpsc::channel(REPORT_CHANNEL_CAPACITY);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let wait_set = Arc::new(Mutex::new(HashSet::new()));
        if let Ok(mut runners) = self.runners.lock() {
            runners.insert(
                deployment.id.clone(),
                RunnerHandle {
                    reports: reports_tx,
                    cancel: cancel_tx,
                    wait_set: Arc::clone(&wait_set),
                },
            );
        }
        let runner = runner::Runner::new(
            deployment.clone(),
            plan,
            Arc::clone(&self.store),
            Arc::clone(&self.service),
            Arc::clone(&self.audit),
            self.timing,
            Arc::clone(&self.in_flight),
            wait_set,
            reports_rx,
            cancel_rx,
            Arc::clone(&self.runners),
        );
        tokio::spawn(runner.run());
    }

    /// Cancels a deployment.
    ///
    /// In-flight instances are not recalled; their late reports are
    /// discarded once the runner is gone.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::NotFound`] for unknown deployments and
    /// [`OrchestratorError::AlreadyTerminal`] when the deployment already
    /// reached a terminal status.
    pub fn cancel(&self, id: &DeploymentId) -> Result<(), OrchestratorError> {
        let signalled = self
            .runners
            .lock()
            .ok()
            .and_then(|runners| runners.get(id).map(|handle| handle.cancel.send(true).is_ok()));
        if signalled.is_some() {
            self.audit.record(&DeployAuditEvent::deployment_cancelled(id.as_str()));
            return Ok(());
        }
        let deployment = self
            .store
            .get_deployment(id)?
            .ok_or_else(|| OrchestratorError::NotFound(format!("deployment: {id}")))?;
        if deployment.status.is_terminal() {
            return Err(OrchestratorError::AlreadyTerminal(id.to_string()));
        }
        // No live runner for a non-terminal record: finalize directly.
        let now = Timestamp::now();
        let _ = self.store.update_deployment_status(id, DeploymentStatus::Cancelled, now)?;
        self.audit.record(&DeployAuditEvent::deployment_cancelled(id.as_str()));
        Ok(())
    }

    /// Returns the persisted deployment record.
    ///
    /// # Errors
    ///
    /// Returns [`OrchestratorError::Internal`] on store failure.
    pub fn deployment_status(
        &self,
        id: &DeploymentId,
    ) -> Result<Option<Deployment>, OrchestratorError> {
        Ok(self.store.get_deployment(id)?)
    }

    /// Returns the number of live runners.
    #[must_use]
    pub fn active_runner_count(&self) -> usize {
        self.runners.lock().map_or(0, |runners| runners.len())
    }
}

// ============================================================================
// SECTION: Status Reconciliation
// ============================================================================

impl DeploymentStatusCallback for Orchestrator {
    fn on_status_report(&self, report: StatusReport) {
        let Ok(runners) = self.runners.lock() else {
            return;
        };
        let Some(handle) = runners.get(&report.deployment_id) else {
            // The deployment is already terminal; the runner is gone.
            self.audit.record(&DeployAuditEvent::straggler_report(
                report.deployment_id.as_str(),
                report.instance_id.as_str(),
            ));
            return;
        };
        let awaited = handle
            .wait_set
            .lock()
            .is_ok_and(|wait_set| wait_set.contains(&report.instance_id));
        if !awaited {
            self.audit.record(&DeployAuditEvent::straggler_report(
                report.deployment_id.as_str(),
                report.instance_id.as_str(),
            ));
            return;
        }
        if handle.reports.try_send(report.clone()).is_err() {
            self.audit.record(&DeployAuditEvent::straggler_report(
                report.deployment_id.as_str(),
                report.instance_id.as_str(),
            ));
        }
    }
}
