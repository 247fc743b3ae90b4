// crates/convoy-core/src/core/deployment.rs
// ============================================================================
// Module: Convoy Deployments
// Description: Deployment records, rollout strategies, and batch planning.
// Purpose: Define the deployment entity and the pure planning logic runners execute.
// Dependencies: serde, thiserror, crate::core::{identifiers, instance, time}
// ============================================================================

//! ## Overview
//! A deployment is a planned rollout of one config version to a resolved
//! target set. The target set is resolved to concrete instance ids at
//! creation time and stored with the record; strategy normalization and batch
//! partitioning are pure functions so runners execute a fixed plan.
//!
//! Terminal statuses (`completed`, `failed`, `cancelled`) are final; stores
//! refuse transitions out of them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::ConfigId;
use crate::core::identifiers::DeploymentId;
use crate::core::identifiers::InstanceId;
use crate::core::instance::LabelSelector;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Strategy
// ============================================================================

/// Rollout strategy dividing the target set into dispatch batches.
///
/// # Invariants
/// - Variants are stable for serialization and wire matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStrategy {
    /// Dispatch every target in a single batch.
    AllAtOnce,
    /// Dispatch fixed-size batches with an inter-batch delay.
    #[default]
    Rolling,
    /// Dispatch one instance first, then the remainder in fixed-size batches.
    Canary,
}

impl DeploymentStrategy {
    /// Returns a stable label for the strategy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AllAtOnce => "all_at_once",
            Self::Rolling => "rolling",
            Self::Canary => "canary",
        }
    }

    /// Parses a stable strategy label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "all_at_once" => Some(Self::AllAtOnce),
            "rolling" => Some(Self::Rolling),
            "canary" => Some(Self::Canary),
            _ => None,
        }
    }

    /// Returns true when any batch failure aborts subsequent batches.
    ///
    /// All-at-once records failures but still waits for the remaining
    /// instances in its single batch to report.
    #[must_use]
    pub const fn aborts_on_batch_failure(self) -> bool {
        match self {
            Self::AllAtOnce => false,
            Self::Rolling | Self::Canary => true,
        }
    }

    /// Normalizes a requested batch size for this strategy.
    ///
    /// Defaults: 1 for rolling and canary, the target count for all-at-once.
    /// The result is always at least 1.
    #[must_use]
    pub fn normalized_batch_size(self, requested: Option<usize>, target_count: usize) -> usize {
        match self {
            Self::AllAtOnce => target_count.max(1),
            Self::Rolling | Self::Canary => requested.unwrap_or(1).max(1),
        }
    }
}

// ============================================================================
// SECTION: Status
// ============================================================================

/// Deployment lifecycle status.
///
/// # Invariants
/// - Variants are stable for serialization and wire matching.
/// - Terminal statuses are final; no transitions out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Persisted but not yet dispatching.
    Pending,
    /// Runner is dispatching batches.
    InProgress,
    /// Every batch succeeded.
    Completed,
    /// Aborted by strategy tolerance or a fatal error.
    Failed,
    /// Cancelled by an operator.
    Cancelled,
}

impl DeploymentStatus {
    /// Returns a stable label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses a stable status label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Returns true for final statuses.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

// ============================================================================
// SECTION: Progress
// ============================================================================

/// Aggregate progress snapshot embedded in the deployment record.
///
/// # Invariants
/// - `completed_instances + failed_instances <= total_instances`.
/// - Counters are monotonically non-decreasing across snapshots written by a
///   single runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DeploymentProgress {
    /// Total resolved target instances.
    pub total_instances: usize,
    /// Instances that reported success.
    pub completed_instances: usize,
    /// Instances that failed, timed out, or were unreachable.
    pub failed_instances: usize,
    /// Zero-based index of the batch currently dispatching.
    pub current_batch: usize,
    /// Total number of planned batches.
    pub total_batches: usize,
    /// Failure reason when the deployment failed.
    pub failure_reason: Option<String>,
}

// ============================================================================
// SECTION: Target Selection
// ============================================================================

/// Target selection carried by a deployment request.
///
/// # Invariants
/// - At least one of `instance_ids` and `labels` is non-empty.
/// - When both are supplied, the explicit instance list wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TargetSelector {
    /// Explicit target instance ids.
    #[serde(default)]
    pub instance_ids: Vec<InstanceId>,
    /// Label selector resolved through the store.
    #[serde(default)]
    pub labels: LabelSelector,
}

impl TargetSelector {
    /// Builds a selector from explicit instance ids.
    #[must_use]
    pub fn instances(ids: Vec<InstanceId>) -> Self {
        Self {
            instance_ids: ids,
            labels: LabelSelector::default(),
        }
    }

    /// Builds a selector from a label mapping.
    #[must_use]
    pub fn labels(labels: LabelSelector) -> Self {
        Self {
            instance_ids: Vec::new(),
            labels,
        }
    }

    /// Returns true when neither explicit ids nor labels are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instance_ids.is_empty() && self.labels.is_empty()
    }
}

// ============================================================================
// SECTION: Deployment Request
// ============================================================================

/// Caller-supplied request to create a deployment.
///
/// # Invariants
/// - `config_version` of `None` binds to the config's current version at
///   creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentRequest {
    /// Target configuration identifier.
    pub config_id: ConfigId,
    /// Explicit version to roll out, or `None` for the current version.
    pub config_version: Option<u64>,
    /// Target selection.
    pub target: TargetSelector,
    /// Rollout strategy, defaulting to rolling.
    #[serde(default)]
    pub strategy: DeploymentStrategy,
    /// Requested batch size; normalized per strategy.
    pub batch_size: Option<usize>,
}

// ============================================================================
// SECTION: Deployment
// ============================================================================

/// Rollout record persisted in the store.
///
/// # Invariants
/// - `resolved_targets` is fixed at creation time and non-empty.
/// - `(config_id, config_version)` references an existing config version.
/// - Once `status` is terminal the record is immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// Deployment identifier.
    pub id: DeploymentId,
    /// Target configuration identifier.
    pub config_id: ConfigId,
    /// Concrete configuration version bound at creation.
    pub config_version: u64,
    /// Original target selection from the request.
    pub target: TargetSelector,
    /// Target set resolved to concrete instance ids at creation.
    pub resolved_targets: Vec<InstanceId>,
    /// Rollout strategy.
    pub strategy: DeploymentStrategy,
    /// Normalized batch size (>= 1).
    pub batch_size: usize,
    /// Lifecycle status.
    pub status: DeploymentStatus,
    /// Aggregate progress snapshot.
    pub progress: DeploymentProgress,
    /// Time dispatching started.
    pub started_at: Option<Timestamp>,
    /// Time a terminal status was reached.
    pub completed_at: Option<Timestamp>,
    /// Record creation time.
    pub created_at: Timestamp,
    /// Last record update time.
    pub updated_at: Timestamp,
}

// ============================================================================
// SECTION: Batch Planning
// ============================================================================

/// Planning errors surfaced before a deployment record exists.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    /// The resolved target set was empty.
    #[error("deployment target set is empty")]
    EmptyTargets,
    /// The requested batch size was zero.
    #[error("batch size must be at least 1")]
    ZeroBatchSize,
}

/// Immutable batch partition executed by a runner.
///
/// # Invariants
/// - Batches are non-empty, disjoint, and cover the target set in order.
/// - Canary plans start with a single-instance batch regardless of the
///   configured batch size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    /// Ordered dispatch batches.
    batches: Vec<Vec<InstanceId>>,
}

impl BatchPlan {
    /// Partitions `targets` into dispatch batches for the strategy.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::EmptyTargets`] when `targets` is empty and
    /// [`PlanError::ZeroBatchSize`] when `batch_size` is zero.
    pub fn build(
        strategy: DeploymentStrategy,
        batch_size: usize,
        targets: &[InstanceId],
    ) -> Result<Self, PlanError> {
        if targets.is_empty() {
            return Err(PlanError::EmptyTargets);
        }
        if batch_size == 0 {
            return Err(PlanError::ZeroBatchSize);
        }
        let batches = match strategy {
            DeploymentStrategy::AllAtOnce => vec![targets.to_vec()],
            DeploymentStrategy::Rolling => {
                targets.chunks(batch_size).map(<[InstanceId]>::to_vec).collect()
            }
            DeploymentStrategy::Canary => {
                let mut batches = vec![targets[.. 1].to_vec()];
                batches.extend(targets[1 ..].chunks(batch_size).map(<[InstanceId]>::to_vec));
                batches
            }
        };
        Ok(Self {
            batches,
        })
    }

    /// Returns the ordered batches.
    #[must_use]
    pub fn batches(&self) -> &[Vec<InstanceId>] {
        &self.batches
    }

    /// Returns the number of planned batches.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }

    /// Returns the total number of targeted instances.
    #[must_use]
    pub fn target_count(&self) -> usize {
        self.batches.iter().map(Vec::len).sum()
    }
}
