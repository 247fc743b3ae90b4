// crates/convoy-core/src/lib.rs
// ============================================================================
// Module: Convoy Core
// Description: Fleet data model, store interface, and deployment planning.
// Purpose: Define the backend-agnostic types shared by the Convoy control plane.
// Dependencies: serde, serde_json, sha2, thiserror
// ============================================================================

//! ## Overview
//! Convoy Core defines the entities of the fleet control plane (instances,
//! configs, config versions, deployments, sessions), the typed [`FleetStore`]
//! interface with kind-tagged errors, content hashing, and pure deployment
//! planning logic. The core contains no I/O beyond the in-memory store; wire
//! and durable concerns live in sibling crates.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use crate::core::config::Config;
pub use crate::core::config::ConfigVersion;
pub use crate::core::deployment::BatchPlan;
pub use crate::core::deployment::Deployment;
pub use crate::core::deployment::DeploymentProgress;
pub use crate::core::deployment::DeploymentRequest;
pub use crate::core::deployment::DeploymentStatus;
pub use crate::core::deployment::DeploymentStrategy;
pub use crate::core::deployment::PlanError;
pub use crate::core::deployment::TargetSelector;
pub use crate::core::hashing::HashDigest;
pub use crate::core::hashing::content_digest;
pub use crate::core::identifiers::ConfigId;
pub use crate::core::identifiers::ConfigVersionId;
pub use crate::core::identifiers::DeploymentId;
pub use crate::core::identifiers::EventId;
pub use crate::core::identifiers::InstanceId;
pub use crate::core::instance::AgentHealth;
pub use crate::core::instance::Instance;
pub use crate::core::instance::InstanceStatus;
pub use crate::core::instance::LabelSelector;
pub use crate::core::session::SessionRecord;
pub use crate::core::time::Timestamp;
pub use crate::interfaces::FleetStore;
pub use crate::interfaces::StoreError;
pub use crate::interfaces::UpdateOutcome;
pub use crate::runtime::memory::InMemoryFleetStore;
