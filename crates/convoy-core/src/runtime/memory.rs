// crates/convoy-core/src/runtime/memory.rs
// ============================================================================
// Module: In-Memory Fleet Store
// Description: Mutex-guarded reference implementation of the fleet store.
// Purpose: Back tests and single-process deployments without durable storage.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! [`InMemoryFleetStore`] implements [`FleetStore`] over mutex-guarded maps.
//! It enforces the same uniqueness, atomic-bump, and terminal-status
//! guarantees as the durable backend so interface semantics can be validated
//! without I/O.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::MutexGuard;

use crate::core::config::Config;
use crate::core::config::ConfigVersion;
use crate::core::deployment::Deployment;
use crate::core::deployment::DeploymentProgress;
use crate::core::deployment::DeploymentStatus;
use crate::core::hashing::content_digest;
use crate::core::identifiers::ConfigId;
use crate::core::identifiers::ConfigVersionId;
use crate::core::identifiers::DeploymentId;
use crate::core::identifiers::InstanceId;
use crate::core::instance::Instance;
use crate::core::instance::InstanceStatus;
use crate::core::instance::LabelSelector;
use crate::core::session::SessionRecord;
use crate::core::time::Timestamp;
use crate::interfaces::FleetStore;
use crate::interfaces::StoreError;
use crate::interfaces::UpdateOutcome;

// ============================================================================
// SECTION: State
// ============================================================================

/// Mutable state behind the store mutex.
#[derive(Debug, Default)]
struct State {
    /// Instance rows keyed by id.
    instances: BTreeMap<InstanceId, Instance>,
    /// Config rows keyed by id.
    configs: BTreeMap<ConfigId, Config>,
    /// Config version rows keyed by (config id, version).
    config_versions: BTreeMap<(ConfigId, u64), ConfigVersion>,
    /// Deployment rows keyed by id.
    deployments: BTreeMap<DeploymentId, Deployment>,
    /// Session rows keyed by instance id.
    sessions: BTreeMap<InstanceId, SessionRecord>,
}

/// In-memory [`FleetStore`] implementation.
///
/// # Invariants
/// - All interface guarantees (uniqueness, atomic version bump, terminal
///   guard) hold under the single state mutex.
#[derive(Debug, Default)]
pub struct InMemoryFleetStore {
    /// Guarded store state.
    state: Mutex<State>,
}

impl InMemoryFleetStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state, mapping poisoning to an internal error.
    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Internal("store mutex poisoned".to_string()))
    }
}

// ============================================================================
// SECTION: FleetStore Implementation
// ============================================================================

impl FleetStore for InMemoryFleetStore {
    fn upsert_instance(&self, instance: &Instance) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let name_taken = state
            .instances
            .values()
            .any(|existing| existing.name == instance.name && existing.id != instance.id);
        if name_taken {
            return Err(StoreError::AlreadyExists(format!(
                "instance name already in use: {}",
                instance.name
            )));
        }
        state.instances.insert(instance.id.clone(), instance.clone());
        Ok(())
    }

    fn get_instance(&self, id: &InstanceId) -> Result<Option<Instance>, StoreError> {
        Ok(self.lock()?.instances.get(id).cloned())
    }

    fn list_instances(&self) -> Result<Vec<Instance>, StoreError> {
        Ok(self.lock()?.instances.values().cloned().collect())
    }

    fn update_instance_status(
        &self,
        id: &InstanceId,
        status: InstanceStatus,
        last_seen: Timestamp,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let instance = state
            .instances
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("instance: {id}")))?;
        instance.status = status;
        instance.last_seen = last_seen;
        instance.updated_at = last_seen;
        Ok(())
    }

    fn update_instance_applied_config(
        &self,
        id: &InstanceId,
        config_id: &ConfigId,
        version: u64,
        at: Timestamp,
    ) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        let instance = state
            .instances
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("instance: {id}")))?;
        instance.applied_config_id = Some(config_id.clone());
        instance.applied_config_version = Some(version);
        instance.updated_at = at;
        Ok(())
    }

    fn instances_matching_labels(
        &self,
        selector: &LabelSelector,
    ) -> Result<Vec<InstanceId>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .instances
            .values()
            .filter(|instance| selector.matches(&instance.labels))
            .map(|instance| instance.id.clone())
            .collect())
    }

    fn create_config(&self, config: &Config) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.configs.contains_key(&config.id) {
            return Err(StoreError::AlreadyExists(format!("config: {}", config.id)));
        }
        if state.configs.values().any(|existing| existing.name == config.name) {
            return Err(StoreError::AlreadyExists(format!(
                "config name already in use: {}",
                config.name
            )));
        }
        state.configs.insert(config.id.clone(), config.clone());
        Ok(())
    }

    fn get_config(&self, id: &ConfigId) -> Result<Option<Config>, StoreError> {
        Ok(self.lock()?.configs.get(id).cloned())
    }

    fn get_config_by_name(&self, name: &str) -> Result<Option<Config>, StoreError> {
        Ok(self.lock()?.configs.values().find(|config| config.name == name).cloned())
    }

    fn create_config_version(
        &self,
        config_id: &ConfigId,
        content: &str,
        change_summary: Option<&str>,
        at: Timestamp,
    ) -> Result<ConfigVersion, StoreError> {
        let mut state = self.lock()?;
        let config = state
            .configs
            .get_mut(config_id)
            .ok_or_else(|| StoreError::NotFound(format!("config: {config_id}")))?;
        let version = config.current_version + 1;
        config.current_version = version;
        config.updated_at = at;
        let row = ConfigVersion {
            id: ConfigVersionId::new(format!("{config_id}:{version}")),
            config_id: config_id.clone(),
            version,
            content: content.to_string(),
            content_hash: content_digest(content.as_bytes()),
            change_summary: change_summary.map(ToString::to_string),
            created_at: at,
        };
        state.config_versions.insert((config_id.clone(), version), row.clone());
        Ok(row)
    }

    fn get_config_version(
        &self,
        config_id: &ConfigId,
        version: u64,
    ) -> Result<Option<ConfigVersion>, StoreError> {
        Ok(self.lock()?.config_versions.get(&(config_id.clone(), version)).cloned())
    }

    fn latest_config_version(
        &self,
        config_id: &ConfigId,
    ) -> Result<Option<ConfigVersion>, StoreError> {
        let state = self.lock()?;
        let Some(config) = state.configs.get(config_id) else {
            return Ok(None);
        };
        Ok(state.config_versions.get(&(config_id.clone(), config.current_version)).cloned())
    }

    fn create_deployment(&self, deployment: &Deployment) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        if state.deployments.contains_key(&deployment.id) {
            return Err(StoreError::AlreadyExists(format!("deployment: {}", deployment.id)));
        }
        state.deployments.insert(deployment.id.clone(), deployment.clone());
        Ok(())
    }

    fn get_deployment(&self, id: &DeploymentId) -> Result<Option<Deployment>, StoreError> {
        Ok(self.lock()?.deployments.get(id).cloned())
    }

    fn list_deployments_with_status(
        &self,
        statuses: &[DeploymentStatus],
    ) -> Result<Vec<Deployment>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .deployments
            .values()
            .filter(|deployment| statuses.contains(&deployment.status))
            .cloned()
            .collect())
    }

    fn update_deployment_status(
        &self,
        id: &DeploymentId,
        status: DeploymentStatus,
        at: Timestamp,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut state = self.lock()?;
        let deployment = state
            .deployments
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("deployment: {id}")))?;
        if deployment.status.is_terminal() {
            return Ok(UpdateOutcome::AlreadyTerminal);
        }
        deployment.status = status;
        deployment.updated_at = at;
        if status == DeploymentStatus::InProgress && deployment.started_at.is_none() {
            deployment.started_at = Some(at);
        }
        if status.is_terminal() {
            deployment.completed_at = Some(at);
        }
        Ok(UpdateOutcome::Applied)
    }

    fn update_deployment_progress(
        &self,
        id: &DeploymentId,
        progress: &DeploymentProgress,
        at: Timestamp,
    ) -> Result<UpdateOutcome, StoreError> {
        let mut state = self.lock()?;
        let deployment = state
            .deployments
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("deployment: {id}")))?;
        if deployment.status.is_terminal() {
            return Ok(UpdateOutcome::AlreadyTerminal);
        }
        deployment.progress = progress.clone();
        deployment.updated_at = at;
        Ok(UpdateOutcome::Applied)
    }

    fn put_session(&self, session: &SessionRecord) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.sessions.insert(session.instance_id.clone(), session.clone());
        Ok(())
    }

    fn get_session(&self, instance_id: &InstanceId) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.lock()?.sessions.get(instance_id).cloned())
    }

    fn delete_session(&self, instance_id: &InstanceId) -> Result<(), StoreError> {
        let mut state = self.lock()?;
        state.sessions.remove(instance_id);
        Ok(())
    }
}
