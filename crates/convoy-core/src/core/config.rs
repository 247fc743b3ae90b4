// crates/convoy-core/src/core/config.rs
// ============================================================================
// Module: Convoy Configurations
// Description: Named logical configurations and their immutable versions.
// Purpose: Define the config entities referenced by deployments.
// Dependencies: serde, crate::core::{hashing, identifiers, time}
// ============================================================================

//! ## Overview
//! A config is a named logical configuration; each content change produces an
//! immutable [`ConfigVersion`] snapshot. Version numbers are gap-free per
//! config, strictly increasing from 1, and the parent's `current_version`
//! advances atomically with version creation (store-enforced).

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::ConfigId;
use crate::core::identifiers::ConfigVersionId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Config
// ============================================================================

/// Named logical configuration.
///
/// # Invariants
/// - `name` is unique among configs (store-enforced).
/// - `current_version` equals the highest existing version number, or 0 when
///   no version has been created yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Configuration identifier.
    pub id: ConfigId,
    /// Unique configuration name.
    pub name: String,
    /// Optional human description.
    pub description: Option<String>,
    /// Highest version number created so far (0 when none).
    pub current_version: u64,
    /// Record creation time.
    pub created_at: Timestamp,
    /// Last record update time.
    pub updated_at: Timestamp,
}

// ============================================================================
// SECTION: Config Version
// ============================================================================

/// Immutable snapshot of a configuration's contents.
///
/// # Invariants
/// - Never mutated once created.
/// - `version` is unique within `config_id` and gap-free from 1.
/// - `content_hash == content_digest(content.as_bytes())`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigVersion {
    /// Version row identifier.
    pub id: ConfigVersionId,
    /// Parent configuration identifier.
    pub config_id: ConfigId,
    /// Version number, 1-based and gap-free per config.
    pub version: u64,
    /// Opaque configuration text.
    pub content: String,
    /// Deterministic digest of the content bytes.
    pub content_hash: HashDigest,
    /// Optional change summary.
    pub change_summary: Option<String>,
    /// Version creation time.
    pub created_at: Timestamp,
}
