// crates/convoy-server/src/config.rs
// ============================================================================
// Module: Server Configuration
// Description: TOML-backed configuration for the Convoy coordinator.
// Purpose: Validate operator-supplied settings before any component starts.
// Dependencies: serde, thiserror
// ============================================================================

//! ## Overview
//! The coordinator loads one TOML document into [`ServerConfig`] and calls
//! [`ServerConfig::validate`] before wiring components. Defaults favor a
//! loopback development setup; production deployments override the listen
//! address and select the sqlite store backend.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default listen address.
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:7601";
/// Default recommended heartbeat cadence in seconds.
const DEFAULT_HEARTBEAT_INTERVAL_SECS: u64 = 30;
/// Default session lifetime in seconds (24 hours).
const DEFAULT_SESSION_TTL_SECS: u64 = 86_400;
/// Default concurrent connection cap.
const DEFAULT_MAX_CONNECTIONS: usize = 1_024;
/// Default per-instance deployment timeout in seconds.
const DEFAULT_INSTANCE_TIMEOUT_SECS: u64 = 300;
/// Default inter-batch delay in seconds.
const DEFAULT_BATCH_DELAY_SECS: u64 = 30;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration validation errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field failed validation.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Store Backend
// ============================================================================

/// Store backend selection.
///
/// # Invariants
/// - Variants are stable for config parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// In-memory store; state dies with the process.
    #[default]
    Memory,
    /// Durable SQLite store.
    Sqlite,
}

/// Store backend configuration.
///
/// # Invariants
/// - `path` is required when `backend` is sqlite.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct StoreConfig {
    /// Selected backend.
    #[serde(default)]
    pub backend: StoreBackend,
    /// Database file path for the sqlite backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ============================================================================
// SECTION: Audit Sink
// ============================================================================

/// Audit sink selection.
///
/// # Invariants
/// - Variants are stable for config parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuditSinkKind {
    /// JSON lines to stderr.
    #[default]
    Stderr,
    /// JSON lines appended to a file.
    File,
    /// Discard audit events.
    None,
}

/// Audit sink configuration.
///
/// # Invariants
/// - `path` is required when `sink` is file.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AuditConfig {
    /// Selected sink.
    #[serde(default)]
    pub sink: AuditSinkKind,
    /// Log file path for the file sink.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// ============================================================================
// SECTION: Server Config
// ============================================================================

/// Coordinator configuration document.
///
/// # Invariants
/// - All durations are strictly positive after validation.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// TCP listen address for the agent channel.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Recommended heartbeat cadence echoed to agents, in seconds.
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Session lifetime in seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
    /// Concurrent agent connection cap.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Per-instance deployment timeout in seconds.
    #[serde(default = "default_instance_timeout_secs")]
    pub instance_timeout_secs: u64,
    /// Inter-batch delay for rolling and canary strategies, in seconds.
    #[serde(default = "default_batch_delay_secs")]
    pub batch_delay_secs: u64,
    /// Store backend settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Audit sink settings.
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            session_ttl_secs: default_session_ttl_secs(),
            max_connections: default_max_connections(),
            instance_timeout_secs: default_instance_timeout_secs(),
            batch_delay_secs: default_batch_delay_secs(),
            store: StoreConfig::default(),
            audit: AuditConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Validates field combinations and ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first failing field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen_addr.is_empty() {
            return Err(ConfigError::Invalid("listen_addr must not be empty".to_string()));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.session_ttl_secs == 0 {
            return Err(ConfigError::Invalid("session_ttl_secs must be at least 1".to_string()));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("max_connections must be at least 1".to_string()));
        }
        if self.instance_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "instance_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.store.backend == StoreBackend::Sqlite && self.store.path.is_none() {
            return Err(ConfigError::Invalid("sqlite store requires store.path".to_string()));
        }
        if self.audit.sink == AuditSinkKind::File && self.audit.path.is_none() {
            return Err(ConfigError::Invalid("file audit sink requires audit.path".to_string()));
        }
        Ok(())
    }

    /// Returns the recommended heartbeat cadence as a duration.
    #[must_use]
    pub const fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Returns the session lifetime as a duration.
    #[must_use]
    pub const fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// Returns the per-instance deployment timeout as a duration.
    #[must_use]
    pub const fn instance_timeout(&self) -> Duration {
        Duration::from_secs(self.instance_timeout_secs)
    }

    /// Returns the inter-batch delay as a duration.
    #[must_use]
    pub const fn batch_delay(&self) -> Duration {
        Duration::from_secs(self.batch_delay_secs)
    }
}

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Returns the default listen address.
fn default_listen_addr() -> String {
    DEFAULT_LISTEN_ADDR.to_string()
}

/// Returns the default heartbeat cadence.
const fn default_heartbeat_interval_secs() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_SECS
}

/// Returns the default session lifetime.
const fn default_session_ttl_secs() -> u64 {
    DEFAULT_SESSION_TTL_SECS
}

/// Returns the default connection cap.
const fn default_max_connections() -> usize {
    DEFAULT_MAX_CONNECTIONS
}

/// Returns the default per-instance timeout.
const fn default_instance_timeout_secs() -> u64 {
    DEFAULT_INSTANCE_TIMEOUT_SECS
}

/// Returns the default inter-batch delay.
const fn default_batch_delay_secs() -> u64 {
    DEFAULT_BATCH_DELAY_SECS
}
