// crates/convoy-agent/src/state.rs
// ============================================================================
// Module: Agent Persisted State
// Description: Atomic JSON state file surviving agent restarts.
// Purpose: Persist identity, last-applied config, and in-flight deployment id.
// Dependencies: convoy-core, serde, serde_json
// ============================================================================

//! ## Overview
//! The agent persists a small JSON document so its identity and last-applied
//! configuration survive restarts, and so a deployment interrupted by a
//! crash can be reported as failed on the next start. Writes are atomic
//! (temp file + rename, mode 0600); a corrupted file is renamed aside to
//! `<path>.corrupted` and state begins empty.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use convoy_core::ConfigId;
use convoy_core::DeploymentId;
use convoy_core::HashDigest;
use convoy_core::InstanceId;
use convoy_core::Timestamp;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// State persistence errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum StateError {
    /// Filesystem failure while reading or writing state.
    #[error("state io error: {0}")]
    Io(String),
    /// State failed to serialize.
    #[error("state encode error: {0}")]
    Encode(String),
}

// ============================================================================
// SECTION: State Document
// ============================================================================

/// Persisted agent state document.
///
/// # Invariants
/// - `config_version`, `config_hash`, and `config_id` are all set or all
///   absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AgentState {
    /// Instance identity, stable across restarts.
    pub instance_id: Option<InstanceId>,
    /// Last-applied config version.
    pub config_version: Option<u64>,
    /// Last-applied config content hash.
    pub config_hash: Option<HashDigest>,
    /// Last-applied config identifier.
    pub config_id: Option<ConfigId>,
    /// Deployment that was in flight when the process last exited.
    pub active_deployment_id: Option<DeploymentId>,
    /// State file creation time.
    pub created_at: Option<Timestamp>,
    /// Last state write time.
    pub last_updated: Option<Timestamp>,
}

impl AgentState {
    /// Records a successfully applied configuration.
    pub fn record_applied(&mut self, config_id: ConfigId, version: u64, hash: HashDigest) {
        self.config_id = Some(config_id);
        self.config_version = Some(version);
        self.config_hash = Some(hash);
    }
}

// ============================================================================
// SECTION: State File
// ============================================================================

/// Atomic JSON state file.
///
/// # Invariants
/// - Saves go through a temp file in the same directory plus rename.
/// - The file is created with mode 0600 on unix targets.
pub struct StateFile {
    /// State file path.
    path: PathBuf,
}

impl StateFile {
    /// Creates a handle for the provided path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }

    /// Returns the state file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads persisted state.
    ///
    /// A missing file yields empty state. A corrupted file is renamed to
    /// `<path>.corrupted` and empty state is returned.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] when the file exists but cannot be read.
    pub fn load(&self) -> Result<AgentState, StateError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(AgentState::default());
            }
            Err(err) => return Err(StateError::Io(err.to_string())),
        };
        match serde_json::from_slice(&bytes) {
            Ok(state) => Ok(state),
            Err(_) => {
                let quarantine = quarantine_path(&self.path);
                let _ = std::fs::rename(&self.path, quarantine);
                Ok(AgentState::default())
            }
        }
    }

    /// Persists state atomically.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Encode`] when serialization fails and
    /// [`StateError::Io`] when the write or rename fails.
    pub fn save(&self, state: &AgentState) -> Result<(), StateError> {
        let mut state = state.clone();
        let now = Timestamp::now();
        if state.created_at.is_none() {
            state.created_at = Some(now);
        }
        state.last_updated = Some(now);
        let payload =
            serde_json::to_vec_pretty(&state).map_err(|err| StateError::Encode(err.to_string()))?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|err| StateError::Io(err.to_string()))?;
        }
        let temp = temp_path(&self.path);
        std::fs::write(&temp, &payload).map_err(|err| StateError::Io(err.to_string()))?;
        restrict_mode(&temp)?;
        std::fs::rename(&temp, &self.path).map_err(|err| StateError::Io(err.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Returns the quarantine path for a corrupted state file.
fn quarantine_path(path: &Path) -> PathBuf {
    let mut quarantine = path.as_os_str().to_owned();
    quarantine.push(".corrupted");
    PathBuf::from(quarantine)
}

/// Returns the temp path used for atomic writes.
fn temp_path(path: &Path) -> PathBuf {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    PathBuf::from(temp)
}

/// Restricts the state file to owner read/write on unix targets.
#[cfg(unix)]
fn restrict_mode(path: &Path) -> Result<(), StateError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .map_err(|err| StateError::Io(err.to_string()))
}

/// No-op on non-unix targets.
#[cfg(not(unix))]
fn restrict_mode(_path: &Path) -> Result<(), StateError> {
    Ok(())
}
