// crates/convoy-agent/src/applier.rs
// ============================================================================
// Module: Config Applier
// Description: Seam between the agent and its co-located worker.
// Purpose: Apply configuration bytes with an opaque success/failure contract.
// Dependencies: async-trait, convoy-core, thiserror
// ============================================================================

//! ## Overview
//! The applier is the boundary to the co-located worker: apply these bytes
//! and report success or failure within the deployment timeout. How a worker
//! actually picks up the new configuration is outside this contract; the
//! file applier only lands the bytes on disk atomically.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;

use async_trait::async_trait;
use convoy_core::ConfigId;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Apply failures reported back through the deployment channel.
///
/// # Invariants
/// - Messages are safe to forward to the coordinator verbatim.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The worker rejected or failed to load the configuration.
    #[error("apply failed: {0}")]
    Failed(String),
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Applies configuration payloads to the co-located worker.
#[async_trait]
pub trait ConfigApplier: Send + Sync {
    /// Applies one configuration version.
    ///
    /// # Errors
    ///
    /// Returns [`ApplyError`] when the worker cannot load the configuration.
    async fn apply(&self, config_id: &ConfigId, version: u64, content: &str)
    -> Result<(), ApplyError>;
}

// ============================================================================
// SECTION: Implementations
// ============================================================================

/// Applier that writes the configuration to a file atomically.
pub struct FileConfigApplier {
    /// Destination path for the worker configuration.
    path: PathBuf,
}

impl FileConfigApplier {
    /// Creates an applier targeting the provided path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
        }
    }
}

#[async_trait]
impl ConfigApplier for FileConfigApplier {
    async fn apply(
        &self,
        _config_id: &ConfigId,
        _version: u64,
        content: &str,
    ) -> Result<(), ApplyError> {
        let mut temp = self.path.as_os_str().to_owned();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);
        tokio::fs::write(&temp, content.as_bytes())
            .await
            .map_err(|err| ApplyError::Failed(err.to_string()))?;
        tokio::fs::rename(&temp, &self.path)
            .await
            .map_err(|err| ApplyError::Failed(err.to_string()))?;
        Ok(())
    }
}

/// Applier that accepts every configuration without side effects.
pub struct NoopConfigApplier;

#[async_trait]
impl ConfigApplier for NoopConfigApplier {
    async fn apply(
        &self,
        _config_id: &ConfigId,
        _version: u64,
        _content: &str,
    ) -> Result<(), ApplyError> {
        Ok(())
    }
}
