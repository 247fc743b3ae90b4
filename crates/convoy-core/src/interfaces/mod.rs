// crates/convoy-core/src/interfaces/mod.rs
// ============================================================================
// Module: Convoy Store Interface
// Description: Backend-agnostic typed persistence interface for fleet state.
// Purpose: Define the contract surface between the control plane and durable storage.
// Dependencies: thiserror, crate::core
// ============================================================================

//! ## Overview
//! The [`FleetStore`] trait exposes typed operations on fleet entities with
//! kind-tagged errors. Implementations carry no business logic: uniqueness,
//! atomic version bumps, and terminal-status guards are the store's only
//! responsibilities. Callers branch on [`StoreError`] kinds.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;

use crate::core::config::Config;
use crate::core::config::ConfigVersion;
use crate::core::deployment::Deployment;
use crate::core::deployment::DeploymentProgress;
use crate::core::deployment::DeploymentStatus;
use crate::core::identifiers::ConfigId;
use crate::core::identifiers::DeploymentId;
use crate::core::identifiers::InstanceId;
use crate::core::instance::Instance;
use crate::core::instance::InstanceStatus;
use crate::core::instance::LabelSelector;
use crate::core::session::SessionRecord;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Kind-tagged store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling; callers branch on kind.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Uniqueness violation (duplicate name or version).
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// Conditional update conflict.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Backend failure or invariant violation.
    #[error("store internal error: {0}")]
    Internal(String),
}

// ============================================================================
// SECTION: Update Outcome
// ============================================================================

/// Outcome of a conditional status or progress update.
///
/// # Invariants
/// - `AlreadyTerminal` means the row was left untouched; terminal statuses
///   are never overwritten silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum UpdateOutcome {
    /// The update was applied.
    Applied,
    /// The deployment was already in a terminal status; no change was made.
    AlreadyTerminal,
}

// ============================================================================
// SECTION: Fleet Store
// ============================================================================

/// Typed persistence interface for fleet state.
///
/// Implementations must be safe for concurrent use; they are the concurrency
/// authority for durable state.
pub trait FleetStore: Send + Sync {
    /// Inserts or replaces an instance row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] when another instance holds the
    /// same name, and [`StoreError::Internal`] on backend failure.
    fn upsert_instance(&self, instance: &Instance) -> Result<(), StoreError>;

    /// Loads an instance by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] on backend failure.
    fn get_instance(&self, id: &InstanceId) -> Result<Option<Instance>, StoreError>;

    /// Lists all instances.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] on backend failure.
    fn list_instances(&self) -> Result<Vec<Instance>, StoreError>;

    /// Updates an instance's status and last-seen time.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the instance does not exist and
    /// [`StoreError::Internal`] on backend failure.
    fn update_instance_status(
        &self,
        id: &InstanceId,
        status: InstanceStatus,
        last_seen: Timestamp,
    ) -> Result<(), StoreError>;

    /// Updates an instance's currently-applied config reference.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the instance does not exist and
    /// [`StoreError::Internal`] on backend failure.
    fn update_instance_applied_config(
        &self,
        id: &InstanceId,
        config_id: &ConfigId,
        version: u64,
        at: Timestamp,
    ) -> Result<(), StoreError>;

    /// Returns ids of instances whose labels contain every selector pair.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] on backend failure.
    fn instances_matching_labels(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<InstanceId>, StoreError>;

    /// Creates a config row.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] on a duplicate name or id and
    /// [`StoreError::Internal`] on backend failure.
    fn create_config(&self, config: &Config) -> Result<(), StoreError>;

    /// Loads a config by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] on backend failure.
    fn get_config(&self, id: &ConfigId) -> Result<Option<Config>, StoreError>;

    /// Loads a config by unique name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] on backend failure.
    fn get_config_by_name(&self, name: &str) -> Result<Option<Config>, StoreError>;

    /// Creates the next config version and bumps the parent atomically.
    ///
    /// The assigned version number is `current_version + 1`; the parent's
    /// `current_version` advances in the same transaction so concurrent
    /// writers can never duplicate a version number.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the config does not exist and
    /// [`StoreError::Internal`] on backend failure.
    fn create_config_version(
        &self,
        config_id: &ConfigId,
        content: &str,
        change_summary: Option<&str>,
        at: Timestamp,
    ) -> Result<ConfigVersion, StoreError>;

    /// Loads one version of a config.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] on backend failure.
    fn get_config_version(
        &self,
        config_id: &ConfigId,
        version: u64,
    ) -> Result<Option<ConfigVersion>, StoreError>;

    /// Loads the latest version of a config, if any exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] on backend failure.
    fn latest_config_version(
        &self,
        config_id: &ConfigId,
    ) -> Result<Option<ConfigVersion>, StoreError>;

    /// Persists a new deployment record.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyExists`] on a duplicate id and
    /// [`StoreError::Internal`] on backend failure.
    fn create_deployment(&self, deployment: &Deployment) -> Result<(), StoreError>;

    /// Loads a deployment by identifier.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] on backend failure.
    fn get_deployment(&self, id: &DeploymentId) -> Result<Option<Deployment>, StoreError>;

    /// Lists deployments currently in one of the provided statuses.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] on backend failure.
    fn list_deployments_with_status(
        &self,
        statuses: &[DeploymentStatus],
    ) -> Result<Vec<Deployment>, StoreError>;

    /// Conditionally transitions a deployment's status.
    ///
    /// Entering `in_progress` records `started_at`; entering a terminal
    /// status records `completed_at`. A row already in a terminal status is
    /// left untouched and the call returns
    /// [`UpdateOutcome::AlreadyTerminal`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the deployment does not exist
    /// and [`StoreError::Internal`] on backend failure.
    fn update_deployment_status(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
        at: Timestamp,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Writes a fresh progress snapshot for a deployment.
    ///
    /// A row already in a terminal status is left untouched and the call
    /// returns [`UpdateOutcome::AlreadyTerminal`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] when the deployment does not exist
    /// and [`StoreError::Internal`] on backend failure.
    fn update_deployment_progress(
        &self,
        id: &DeploymentId,
        progress: &DeploymentProgress,
        at: Timestamp,
    ) -> Result<UpdateOutcome, StoreError>;

    /// Inserts or replaces the session row for an instance.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] on backend failure.
    fn put_session(&self, session: &SessionRecord) -> Result<(), StoreError>;

    /// Loads the session row for an instance.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] on backend failure.
    fn get_session(&self, instance_id: &InstanceId) -> Result<Option<SessionRecord>, StoreError>;

    /// Deletes the session row for an instance. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Internal`] on backend failure.
    fn delete_session(&self, instance_id: &InstanceId) -> Result<(), StoreError>;

    /// Reports store readiness for liveness probes.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the store is unavailable.
    fn readiness(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
