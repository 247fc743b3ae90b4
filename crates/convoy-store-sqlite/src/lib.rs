// crates/convoy-store-sqlite/src/lib.rs
// ============================================================================
// Module: Convoy SQLite Store
// Description: Durable FleetStore backed by SQLite WAL.
// Purpose: Persist fleet state with relational uniqueness and atomic bumps.
// Dependencies: convoy-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This crate provides [`SqliteFleetStore`], the durable implementation of
//! [`convoy_core::FleetStore`]. Labels and target lists are stored as JSON
//! text columns; all timestamps are UTC unix milliseconds. Uniqueness and the
//! atomic config-version bump are enforced in SQL.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::SqliteFleetStore;
pub use store::SqliteStoreConfig;
pub use store::SqliteStoreMode;
pub use store::SqliteSyncMode;
