// crates/convoy-core/src/runtime/mod.rs
// ============================================================================
// Module: Convoy Core Runtime
// Description: Reference implementations of the core interfaces.
// Purpose: Provide the in-memory fleet store used by tests and small deployments.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! Runtime holds the in-memory [`crate::FleetStore`] implementation. Durable
//! backends live in sibling crates; the in-memory store is the reference for
//! interface semantics and the default backend for tests.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod memory;
