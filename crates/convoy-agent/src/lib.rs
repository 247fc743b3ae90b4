// crates/convoy-agent/src/lib.rs
// ============================================================================
// Module: Convoy Agent
// Description: Sidecar runtime maintaining a session with the coordinator.
// Purpose: Enroll one instance, execute deployments, and survive restarts.
// Dependencies: convoy-core, convoy-proto, async-trait, tokio
// ============================================================================

//! ## Overview
//! Convoy Agent is the sidecar co-located with a reverse-proxy worker. It
//! registers with the coordinator, heartbeats on the recommended cadence,
//! subscribes for pushed events, and applies configuration payloads through
//! the [`ConfigApplier`] seam. Identity and last-applied state persist in an
//! atomic JSON file so restarts are recoverable.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod agent;
pub mod applier;
pub mod client;
pub mod config;
pub mod state;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use agent::Agent;
pub use agent::AgentError;
pub use applier::ApplyError;
pub use applier::ConfigApplier;
pub use applier::FileConfigApplier;
pub use applier::NoopConfigApplier;
pub use client::Backoff;
pub use client::ClientError;
pub use client::Connection;
pub use client::EventStream;
pub use config::AgentConfig;
pub use config::AgentConfigError;
pub use state::AgentState;
pub use state::StateError;
pub use state::StateFile;
