// crates/convoy-agent/src/config.rs
// ============================================================================
// Module: Agent Configuration
// Description: TOML-backed configuration for the Convoy agent.
// Purpose: Validate operator-supplied agent settings before the run loop starts.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The agent loads one TOML document into [`AgentConfig`] and calls
//! [`AgentConfig::validate`] before connecting. The instance id is optional:
//! a persisted id from the state file wins, then the configured one, then a
//! freshly generated id that is persisted for future restarts.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default agent-local state file path.
const DEFAULT_STATE_PATH: &str = "/var/lib/convoy-agent/state.json";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Agent configuration validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum AgentConfigError {
    /// A field failed validation.
    #[error("invalid agent config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Agent Config
// ============================================================================

/// Agent configuration document.
///
/// # Invariants
/// - `server_addr` and `instance_name` are non-empty after validation.
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Coordinator address (host:port).
    pub server_addr: String,
    /// Optional fixed instance id; omitted ids are persisted once generated.
    #[serde(default)]
    pub instance_id: Option<String>,
    /// Human-readable instance name, unique within the fleet.
    pub instance_name: String,
    /// Hostname override; defaults to the instance name.
    #[serde(default)]
    pub hostname: Option<String>,
    /// Worker build version advertised at register.
    #[serde(default = "default_worker_version")]
    pub worker_version: String,
    /// Labels used for deployment targeting.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Capability strings advertised at register.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// Agent-local state file path.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
    /// Destination path the file applier writes worker configs to.
    #[serde(default)]
    pub worker_config_path: Option<PathBuf>,
}

impl AgentConfig {
    /// Validates field combinations.
    ///
    /// # Errors
    ///
    /// Returns [`AgentConfigError::Invalid`] describing the first failing
    /// field.
    pub fn validate(&self) -> Result<(), AgentConfigError> {
        if self.server_addr.is_empty() {
            return Err(AgentConfigError::Invalid("server_addr must not be empty".to_string()));
        }
        if self.instance_name.is_empty() {
            return Err(AgentConfigError::Invalid("instance_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Returns the hostname to advertise.
    #[must_use]
    pub fn hostname(&self) -> String {
        self.hostname.clone().unwrap_or_else(|| self.instance_name.clone())
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Returns the default state file path.
fn default_state_path() -> PathBuf {
    PathBuf::from(DEFAULT_STATE_PATH)
}

/// Returns the default worker version label.
fn default_worker_version() -> String {
    "unknown".to_string()
}
