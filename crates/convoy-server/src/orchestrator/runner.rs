// crates/convoy-server/src/orchestrator/runner.rs
// ============================================================================
// Module: Deployment Runner
// Description: Long-running task executing one deployment to a terminal state.
// Purpose: Dispatch batches, collect per-instance outcomes, and persist progress.
// Dependencies: convoy-core, convoy-proto, tokio, crate::service
// ============================================================================

//! ## Overview
//! A runner owns an immutable plan snapshot and drives it batch by batch:
//! mark instances in flight, push DEPLOYMENT events through the service,
//! await reports via the wait table, enforce the per-instance timeout, and
//! write a fresh progress snapshot after every state transition. Per-instance
//! outcomes live only as long as the runner; after cleanup only the store's
//! aggregate progress remains.
//!
//! The protocol never retries a failed instance within the same deployment;
//! operators re-issue as a new deployment.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::Mutex;

use convoy_core::BatchPlan;
use convoy_core::Deployment;
use convoy_core::DeploymentProgress;
use convoy_core::DeploymentStatus;
use convoy_core::FleetStore;
use convoy_core::InstanceId;
use convoy_core::Timestamp;
use convoy_core::UpdateOutcome;
use convoy_proto::DeploymentEvent;
use convoy_proto::ReportedDeploymentState;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::audit::DeployAuditEvent;
use crate::audit::DeployAuditSink;
use crate::hub::SendOutcome;
use crate::orchestrator::InFlightMap;
use crate::orchestrator::RunnerMap;
use crate::orchestrator::RunnerTiming;
use crate::service::FleetService;
use crate::service::StatusReport;

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Long-running task executing one deployment.
///
/// # Invariants
/// - The plan snapshot is immutable for the runner's lifetime.
/// - Every instance the runner awaits is present in the shared wait set.
/// - Progress counters only increase.
pub(crate) struct Runner {
    /// Immutable deployment snapshot.
    deployment: Deployment,
    /// Batch partition to execute.
    plan: BatchPlan,
    /// Durable fleet store.
    store: Arc<dyn FleetStore>,
    /// Fleet service used for event dispatch.
    service: Arc<FleetService>,
    /// Audit sink.
    audit: Arc<dyn DeployAuditSink>,
    /// Timing knobs.
    timing: RunnerTiming,
    /// Fleet-wide in-flight instance guard.
    in_flight: InFlightMap,
    /// Instances currently awaited, shared with the status callback.
    wait_set: Arc<Mutex<HashSet<InstanceId>>>,
    /// Report channel fed by the status callback.
    reports_rx: mpsc::Receiver<StatusReport>,
    /// Cooperative cancellation signal.
    cancel_rx: watch::Receiver<bool>,
    /// Active runner map, for self-removal at cleanup.
    runners: RunnerMap,
    /// Live progress snapshot.
    progress: DeploymentProgress,
    /// Instances that reported success.
    succeeded: Vec<InstanceId>,
    /// True once cancellation was observed.
    cancelled: bool,
}

impl Runner {
    /// Builds a runner from its wiring.
    #[allow(clippy::too_many_arguments, reason = "One-time wiring at spawn site.")]
    pub(crate) fn new(
        deployment: Deployment,
        plan: BatchPlan,
        store: Arc<dyn FleetStore>,
        service: Arc<FleetService>,
        audit: Arc<dyn DeployAuditSink>,
        timing: RunnerTiming,
        in_flight: InFlightMap,
        wait_set: Arc<Mutex<HashSet<InstanceId>>>,
        reports_rx: mpsc::Receiver<StatusReport>,
        cancel_rx: watch::Receiver<bool>,
        runners: RunnerMap,
    ) -> Self {
        let progress = deployment.progress.clone();
        Self {
            deployment,
            plan,
            store,
            service,
            audit,
            timing,
            in_flight,
            wait_set,
            reports_rx,
            cancel_rx,
            runners,
            progress,
            succeeded: Vec::new(),
            cancelled: false,
        }
    }

    /// Executes the deployment to a terminal status, then cleans up.
    pub(crate) async fn run(mut self) {
        let started = self.store.update_deployment_status(
            &self.deployment.id,
            DeploymentStatus::InProgress,
            Timestamp::now(),
        );
        match started {
            Ok(UpdateOutcome::Applied) => {
                self.run_batches().await;
                self.finalize();
            }
            Ok(UpdateOutcome::AlreadyTerminal) => {}
            Err(err) => {
                self.audit.record(&DeployAuditEvent::runner_error(
                    self.deployment.id.as_str(),
                    format!("start transition: {err}"),
                ));
            }
        }
        self.cleanup();
    }

    /// Dispatches and awaits every batch, honoring strategy tolerance.
    async fn run_batches(&mut self) {
        let batches = self.plan.batches().to_vec();
        let batch_total = batches.len();
        for (index, batch) in batches.iter().enumerate() {
            if self.check_cancelled() {
                return;
            }
            self.progress.current_batch = index;
            self.write_progress();

            let mut pending = self.dispatch_batch(batch, index, batch_total);
            self.await_batch(&mut pending).await;
            if self.cancelled {
                return;
            }
            if self.progress.failed_instances > 0
                && self.deployment.strategy.aborts_on_batch_failure()
            {
                return;
            }
            let last_batch = index + 1 == batch_total;
            if !last_batch {
                self.inter_batch_delay().await;
                if self.cancelled {
                    return;
                }
            }
        }
    }

    /// Dispatches one batch, returning per-instance deadlines.
    fn dispatch_batch(
        &mut self,
        batch: &[InstanceId],
        batch_position: usize,
        batch_total: usize,
    ) -> HashMap<InstanceId, Instant> {
        let mut pending = HashMap::new();
        for instance_id in batch {
            if let Some(holder) = self.try_hold_in_flight(instance_id) {
                self.fail_instance(format!("instance busy in deployment {holder}"));
                continue;
            }
            self.add_to_wait_set(instance_id);
            let event = DeploymentEvent {
                deployment_id: self.deployment.id.clone(),
                config_id: self.deployment.config_id.clone(),
                config_version: self.deployment.config_version,
                strategy: self.deployment.strategy,
                batch_position,
                batch_total,
                deadline: Timestamp::now().saturating_add(self.timing.instance_timeout),
                is_rollback: false,
            };
            match self.service.push_deployment_event(instance_id, event) {
                SendOutcome::Delivered => {
                    pending.insert(
                        instance_id.clone(),
                        Instant::now() + self.timing.instance_timeout,
                    );
                }
                SendOutcome::NotSubscribed => {
                    self.release_instance(instance_id);
                    self.fail_instance("instance not connected".to_string());
                }
                SendOutcome::Overflow => {
                    self.release_instance(instance_id);
                    self.fail_instance("dispatch overflow".to_string());
                }
            }
        }
        pending
    }

    /// Awaits completion of one batch: reports, timeouts, or cancellation.
    async fn await_batch(&mut self, pending: &mut HashMap<InstanceId, Instant>) {
        while !pending.is_empty() {
            let earliest = pending.values().min().copied().unwrap_or_else(Instant::now);
            tokio::select! {
                report = self.reports_rx.recv() => {
                    match report {
                        Some(report) => self.handle_report(report, pending),
                        None => {
                            // Report channel closed under a live runner; treat
                            // as cancellation to avoid waiting forever.
                            self.cancelled = true;
                            return;
                        }
                    }
                }
                () = tokio::time::sleep_until(earliest) => {
                    self.expire_timeouts(pending);
                }
                changed = self.cancel_rx.changed() => {
                    if changed.is_err() || *self.cancel_rx.borrow() {
                        self.cancelled = true;
                        return;
                    }
                }
            }
        }
    }

    /// Applies one status report to the pending batch.
    fn handle_report(&mut self, report: StatusReport, pending: &mut HashMap<InstanceId, Instant>) {
        if !pending.contains_key(&report.instance_id) {
            // Duplicate terminal report for an already-resolved instance.
            self.audit.record(&DeployAuditEvent::straggler_report(
                self.deployment.id.as_str(),
                report.instance_id.as_str(),
            ));
            return;
        }
        match report.state {
            ReportedDeploymentState::Completed | ReportedDeploymentState::RolledBack => {
                pending.remove(&report.instance_id);
                self.release_instance(&report.instance_id);
                self.succeeded.push(report.instance_id.clone());
                self.progress.completed_instances += 1;
                self.write_progress();
            }
            ReportedDeploymentState::Failed => {
                pending.remove(&report.instance_id);
                self.release_instance(&report.instance_id);
                let reason = report
                    .error_details
                    .or(report.message)
                    .unwrap_or_else(|| "agent reported failure".to_string());
                self.fail_instance(reason);
            }
            ReportedDeploymentState::Pending | ReportedDeploymentState::InProgress => {
                // Refresh the per-instance clock; the wait is not resolved.
                pending.insert(
                    report.instance_id.clone(),
                    Instant::now() + self.timing.instance_timeout,
                );
            }
        }
    }

    /// Fails every pending instance whose deadline has passed.
    fn expire_timeouts(&mut self, pending: &mut HashMap<InstanceId, Instant>) {
        let now = Instant::now();
        let expired: Vec<InstanceId> = pending
            .iter()
            .filter(|(_, deadline)| **deadline <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for instance_id in expired {
            pending.remove(&instance_id);
            self.release_instance(&instance_id);
            self.fail_instance("deployment timeout".to_string());
        }
    }

    /// Sleeps the inter-batch delay, honoring cancellation.
    async fn inter_batch_delay(&mut self) {
        tokio::select! {
            () = tokio::time::sleep(self.timing.batch_delay) => {}
            changed = self.cancel_rx.changed() => {
                if changed.is_err() || *self.cancel_rx.borrow() {
                    self.cancelled = true;
                }
            }
        }
    }

    /// Marks the terminal status and converges applied-config state.
    fn finalize(&mut self) {
        let now = Timestamp::now();
        let status = if self.cancelled {
            DeploymentStatus::Cancelled
        } else if self.progress.failed_instances > 0 {
            DeploymentStatus::Failed
        } else {
            DeploymentStatus::Completed
        };
        if status == DeploymentStatus::Completed {
            for instance_id in &self.succeeded {
                if let Err(err) = self.store.update_instance_applied_config(
                    instance_id,
                    &self.deployment.config_id,
                    self.deployment.config_version,
                    now,
                ) {
                    self.audit.record(&DeployAuditEvent::runner_error(
                        self.deployment.id.as_str(),
                        format!("applied-config update for {instance_id}: {err}"),
                    ));
                }
            }
        }
        self.write_progress();
        match self.store.update_deployment_status(&self.deployment.id, status, now) {
            Ok(_) => {
                self.audit.record(&DeployAuditEvent::deployment_finished(
                    self.deployment.id.as_str(),
                    status.as_str(),
                ));
            }
            Err(err) => {
                self.audit.record(&DeployAuditEvent::runner_error(
                    self.deployment.id.as_str(),
                    format!("status update: {err}"),
                ));
            }
        }
    }

    /// Releases guards and removes this runner from the active map.
    fn cleanup(&mut self) {
        if let Ok(mut wait_set) = self.wait_set.lock() {
            wait_set.clear();
        }
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.retain(|_, holder| *holder != self.deployment.id);
        }
        if let Ok(mut runners) = self.runners.lock() {
            runners.remove(&self.deployment.id);
        }
    }

    // ------------------------------------------------------------------
    // Guard helpers
    // ------------------------------------------------------------------

    /// Tries to mark an instance in flight for this deployment.
    ///
    /// Returns the holding deployment id when another runner already holds
    /// the instance.
    fn try_hold_in_flight(&self, instance_id: &InstanceId) -> Option<convoy_core::DeploymentId> {
        let Ok(mut in_flight) = self.in_flight.lock() else {
            return None;
        };
        match in_flight.get(instance_id) {
            Some(holder) if *holder != self.deployment.id => Some(holder.clone()),
            _ => {
                in_flight.insert(instance_id.clone(), self.deployment.id.clone());
                None
            }
        }
    }

    /// Adds an instance to the shared wait set.
    fn add_to_wait_set(&self, instance_id: &InstanceId) {
        if let Ok(mut wait_set) = self.wait_set.lock() {
            wait_set.insert(instance_id.clone());
        }
    }

    /// Removes an instance from the wait set and in-flight guard.
    fn release_instance(&self, instance_id: &InstanceId) {
        if let Ok(mut wait_set) = self.wait_set.lock() {
            wait_set.remove(instance_id);
        }
        if let Ok(mut in_flight) = self.in_flight.lock()
            && in_flight.get(instance_id) == Some(&self.deployment.id)
        {
            in_flight.remove(instance_id);
        }
    }

    // ------------------------------------------------------------------
    // Outcome helpers
    // ------------------------------------------------------------------

    /// Records a failed outcome and updates the progress snapshot.
    fn fail_instance(&mut self, reason: String) {
        self.progress.failed_instances += 1;
        if self.progress.failure_reason.is_none() {
            self.progress.failure_reason = Some(reason);
        }
        self.write_progress();
    }

    /// Returns true when cancellation has been signalled.
    fn check_cancelled(&mut self) -> bool {
        if *self.cancel_rx.borrow() {
            self.cancelled = true;
        }
        self.cancelled
    }

    /// Writes a fresh progress snapshot to the store.
    fn write_progress(&self) {
        if let Err(err) = self.store.update_deployment_progress(
            &self.deployment.id,
            &self.progress,
            Timestamp::now(),
        ) {
            self.audit.record(&DeployAuditEvent::runner_error(
                self.deployment.id.as_str(),
                format!("progress update: {err}"),
            ));
        }
    }
}
