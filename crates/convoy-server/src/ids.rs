// crates/convoy-server/src/ids.rs
// ============================================================================
// Module: Identifier Generation
// Description: Random identifiers for events, deployments, and actions.
// Purpose: Generate collision-resistant ids without coordination.
// Dependencies: convoy-core, rand
// ============================================================================

//! ## Overview
//! Server-generated identifiers are a short prefix plus 64 random bits in
//! hex. They are tracing handles, not secrets; uniqueness is probabilistic
//! and sufficient for the fleet scale this coordinator targets.

// ============================================================================
// SECTION: Imports
// ============================================================================

use convoy_core::core::hashing::hex_encode;
use rand::RngCore;
use rand::rngs::OsRng;

// ============================================================================
// SECTION: Generation
// ============================================================================

/// Returns a fresh identifier with the provided prefix.
#[must_use]
pub fn random_id(prefix: &str) -> String {
    let mut bytes = [0_u8; 8];
    OsRng.fill_bytes(&mut bytes);
    format!("{prefix}-{}", hex_encode(&bytes))
}
