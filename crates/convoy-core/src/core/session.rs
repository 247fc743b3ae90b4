// crates/convoy-core/src/core/session.rs
// ============================================================================
// Module: Convoy Sessions
// Description: Persisted agent session records.
// Purpose: Tie a connected agent to an instance identity without storing tokens.
// Dependencies: serde, crate::core::{hashing, identifiers, time}
// ============================================================================

//! ## Overview
//! A session associates a connected agent with an instance identity. The
//! store never sees the raw token: the record carries a per-session salt and
//! the salted SHA-256 digest of the token. An instance holds at most one live
//! session; a new register replaces the prior one.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::hashing::HashDigest;
use crate::core::identifiers::InstanceId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Session Record
// ============================================================================

/// Persisted session row for one instance.
///
/// # Invariants
/// - `token_digest == sha256(salt_bytes || token_bytes)`; the raw token never
///   traverses the store.
/// - At most one row per `instance_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Instance the session authenticates.
    pub instance_id: InstanceId,
    /// Per-session random salt, lowercase hex.
    pub token_salt: String,
    /// Salted digest of the opaque token.
    pub token_digest: HashDigest,
    /// Session creation time.
    pub created_at: Timestamp,
    /// Session expiry time.
    pub expires_at: Timestamp,
}

impl SessionRecord {
    /// Returns true when the session is expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now > self.expires_at
    }
}
