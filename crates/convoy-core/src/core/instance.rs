// crates/convoy-core/src/core/instance.rs
// ============================================================================
// Module: Convoy Instances
// Description: Fleet member records, status model, and label selection.
// Purpose: Define the instance entity and the selector used for deployment targeting.
// Dependencies: serde, crate::core::{identifiers, time}
// ============================================================================

//! ## Overview
//! An instance is the fleet-member record for one (agent, worker) pair.
//! Instances are created on first register, updated in place on re-register,
//! and never hard-deleted; deregister only flips the status to offline.
//! Label selectors match instances whose labels contain every key/value pair
//! of the selector.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::ConfigId;
use crate::core::identifiers::InstanceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Instance Status
// ============================================================================

/// Instance lifecycle status.
///
/// # Invariants
/// - Variants are stable for serialization and wire matching.
/// - `Deploying` and `Draining` are set by the deployment path, never by
///   heartbeat health mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// No health information received yet.
    Unknown,
    /// Agent is connected and healthy.
    Online,
    /// Agent is disconnected or reported unhealthy.
    Offline,
    /// Agent reported a degraded worker.
    Degraded,
    /// A deployment is in flight on this instance.
    Deploying,
    /// Instance is draining connections.
    Draining,
}

impl InstanceStatus {
    /// Returns a stable label for the status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Online => "online",
            Self::Offline => "offline",
            Self::Degraded => "degraded",
            Self::Deploying => "deploying",
            Self::Draining => "draining",
        }
    }

    /// Parses a stable status label.
    #[must_use]
    pub fn parse(label: &str) -> Option<Self> {
        match label {
            "unknown" => Some(Self::Unknown),
            "online" => Some(Self::Online),
            "offline" => Some(Self::Offline),
            "degraded" => Some(Self::Degraded),
            "deploying" => Some(Self::Deploying),
            "draining" => Some(Self::Draining),
            _ => None,
        }
    }
}

// ============================================================================
// SECTION: Agent Health
// ============================================================================

/// Health state reported by an agent heartbeat.
///
/// # Invariants
/// - Variants are stable for serialization and wire matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentHealth {
    /// Health not determined.
    Unknown,
    /// Worker serving normally.
    Healthy,
    /// Worker serving with reduced capacity.
    Degraded,
    /// Worker not serving.
    Unhealthy,
}

impl AgentHealth {
    /// Maps the reported health onto an instance status.
    ///
    /// Deployment-driven statuses (`deploying`, `draining`) are never produced
    /// by this mapping.
    #[must_use]
    pub const fn as_instance_status(self) -> InstanceStatus {
        match self {
            Self::Unknown => InstanceStatus::Unknown,
            Self::Healthy => InstanceStatus::Online,
            Self::Degraded => InstanceStatus::Degraded,
            Self::Unhealthy => InstanceStatus::Offline,
        }
    }
}

// ============================================================================
// SECTION: Label Selector
// ============================================================================

/// Label selector used for deployment targeting.
///
/// # Invariants
/// - Matching requires every selector key/value pair to be present verbatim in
///   the candidate labels; an empty selector matches nothing at resolve time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct LabelSelector(BTreeMap<String, String>);

impl LabelSelector {
    /// Creates a selector from a label mapping.
    #[must_use]
    pub const fn new(labels: BTreeMap<String, String>) -> Self {
        Self(labels)
    }

    /// Returns true when the selector carries no pairs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the underlying label mapping.
    #[must_use]
    pub const fn labels(&self) -> &BTreeMap<String, String> {
        &self.0
    }

    /// Returns true when `labels` contains every selector pair.
    #[must_use]
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.0.iter().all(|(key, value)| labels.get(key) == Some(value))
    }
}

impl From<BTreeMap<String, String>> for LabelSelector {
    fn from(labels: BTreeMap<String, String>) -> Self {
        Self(labels)
    }
}

// ============================================================================
// SECTION: Instance
// ============================================================================

/// Fleet member record.
///
/// # Invariants
/// - `name` is unique within the fleet (store-enforced).
/// - `applied_config_id` and `applied_config_version` are both set or both
///   absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    /// Instance identifier, stable across restarts.
    pub id: InstanceId,
    /// Human-readable name, unique within the fleet.
    pub name: String,
    /// Hostname the agent reported.
    pub hostname: String,
    /// Agent build version.
    pub agent_version: String,
    /// Worker build version.
    pub worker_version: String,
    /// Arbitrary labels used for target selection.
    pub labels: BTreeMap<String, String>,
    /// Capability strings advertised by the agent.
    pub capabilities: BTreeSet<String>,
    /// Current lifecycle status.
    pub status: InstanceStatus,
    /// Last heartbeat or register time.
    pub last_seen: Timestamp,
    /// Currently-applied configuration identifier, if any.
    pub applied_config_id: Option<ConfigId>,
    /// Currently-applied configuration version, if any.
    pub applied_config_version: Option<u64>,
    /// Record creation time.
    pub created_at: Timestamp,
    /// Last record update time.
    pub updated_at: Timestamp,
}
