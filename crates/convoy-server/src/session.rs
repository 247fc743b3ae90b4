// crates/convoy-server/src/session.rs
// ============================================================================
// Module: Session Registry
// Description: Opaque session tokens tying connected agents to instances.
// Purpose: Issue, validate, and revoke agent session tokens fail-closed.
// Dependencies: convoy-core, rand, sha2, subtle, thiserror
// ============================================================================

//! ## Overview
//! The registry issues cryptographically random tokens (256 bits, hex) and
//! validates them in constant time against an in-memory digest index. The
//! store only ever sees a per-session salted digest; raw tokens exist in the
//! register response and agent memory, nowhere else. An instance holds at
//! most one live session; issuing a replacement invalidates the prior token.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::RwLock;
use std::time::Duration;

use convoy_core::FleetStore;
use convoy_core::HashDigest;
use convoy_core::InstanceId;
use convoy_core::SessionRecord;
use convoy_core::Timestamp;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::Digest;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Raw token entropy in bytes (256 bits).
const TOKEN_BYTES: usize = 32;
/// Per-session salt length in bytes.
const SALT_BYTES: usize = 16;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Session registry errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
/// - Messages never contain token material.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Token is missing, unknown, expired, or revoked.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
    /// Registry or store failure.
    #[error("session registry error: {0}")]
    Internal(String),
}

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Index entry for one live session.
#[derive(Debug, Clone)]
struct IndexEntry {
    /// Instance the token authenticates.
    instance_id: InstanceId,
    /// Per-session salt, mirroring the store row.
    salt: String,
    /// Salted digest, mirroring the store row.
    salted_digest: HashDigest,
    /// Session expiry.
    expires_at: Timestamp,
}

/// Session registry with an in-memory validation index.
///
/// # Invariants
/// - `index` and `by_instance` agree: every instance maps to exactly the
///   digest key the index holds for it.
/// - Store rows carry salted digests only.
pub struct SessionRegistry {
    /// Durable store for session rows.
    store: Arc<dyn FleetStore>,
    /// Validation index keyed by unsalted token digest (hex).
    index: RwLock<HashMap<String, IndexEntry>>,
    /// Reverse index from instance id to the digest key in `index`.
    by_instance: RwLock<HashMap<InstanceId, String>>,
    /// Session lifetime.
    ttl: Duration,
}

impl SessionRegistry {
    /// Creates a registry with the provided session lifetime.
    #[must_use]
    pub fn new(store: Arc<dyn FleetStore>, ttl: Duration) -> Self {
        Self {
            store,
            index: RwLock::new(HashMap::new()),
            by_instance: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Issues a fresh token for an instance, replacing any prior session.
    ///
    /// The raw token is returned exactly once and never stored.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Internal`] when the store write fails.
    pub fn issue(&self, instance_id: &InstanceId, now: Timestamp) -> Result<String, SessionError> {
        let mut token_bytes = [0_u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut token_bytes);
        let token = convoy_core::core::hashing::hex_encode(&token_bytes);

        let mut salt_bytes = [0_u8; SALT_BYTES];
        OsRng.fill_bytes(&mut salt_bytes);
        let salt = convoy_core::core::hashing::hex_encode(&salt_bytes);

        let expires_at = now.saturating_add(self.ttl);
        let digest = salted_digest(&salt, &token);
        let record = SessionRecord {
            instance_id: instance_id.clone(),
            token_salt: salt.clone(),
            token_digest: digest.clone(),
            created_at: now,
            expires_at,
        };
        self.store.put_session(&record).map_err(|err| SessionError::Internal(err.to_string()))?;

        let digest_key = unsalted_digest(&token);
        let mut index = self
            .index
            .write()
            .map_err(|_| SessionError::Internal("session index poisoned".to_string()))?;
        let mut by_instance = self
            .by_instance
            .write()
            .map_err(|_| SessionError::Internal("session index poisoned".to_string()))?;
        if let Some(prior) = by_instance.insert(instance_id.clone(), digest_key.clone()) {
            index.remove(&prior);
        }
        index.insert(
            digest_key,
            IndexEntry {
                instance_id: instance_id.clone(),
                salt,
                salted_digest: digest,
                expires_at,
            },
        );
        Ok(token)
    }

    /// Validates a token and returns the instance it authenticates.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Unauthenticated`] for unknown, expired, or
    /// revoked tokens.
    pub fn validate(&self, token: &str, now: Timestamp) -> Result<InstanceId, SessionError> {
        let digest_key = unsalted_digest(token);
        let index = self
            .index
            .read()
            .map_err(|_| SessionError::Internal("session index poisoned".to_string()))?;
        let Some(entry) = index.get(&digest_key) else {
            return Err(SessionError::Unauthenticated("unknown session token".to_string()));
        };
        // Bind the presented token to the stored salted digest in constant
        // time, mirroring the row the store holds.
        let presented = salted_digest(&entry.salt, token);
        if presented
            .as_str()
            .as_bytes()
            .ct_eq(entry.salted_digest.as_str().as_bytes())
            .unwrap_u8()
            != 1
        {
            return Err(SessionError::Unauthenticated("unknown session token".to_string()));
        }
        if now > entry.expires_at {
            return Err(SessionError::Unauthenticated("session expired".to_string()));
        }
        Ok(entry.instance_id.clone())
    }

    /// Revokes the live session for an instance. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Internal`] when the store delete fails.
    pub fn revoke_instance(&self, instance_id: &InstanceId) -> Result<(), SessionError> {
        {
            let mut index = self
                .index
                .write()
                .map_err(|_| SessionError::Internal("session index poisoned".to_string()))?;
            let mut by_instance = self
                .by_instance
                .write()
                .map_err(|_| SessionError::Internal("session index poisoned".to_string()))?;
            if let Some(digest_key) = by_instance.remove(instance_id) {
                index.remove(&digest_key);
            }
        }
        self.store
            .delete_session(instance_id)
            .map_err(|err| SessionError::Internal(err.to_string()))
    }

    /// Revokes the session holding the provided token. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Internal`] when the store delete fails.
    pub fn revoke_token(&self, token: &str) -> Result<(), SessionError> {
        let digest_key = unsalted_digest(token);
        let instance_id = {
            let index = self
                .index
                .read()
                .map_err(|_| SessionError::Internal("session index poisoned".to_string()))?;
            index.get(&digest_key).map(|entry| entry.instance_id.clone())
        };
        match instance_id {
            Some(instance_id) => self.revoke_instance(&instance_id),
            None => Ok(()),
        }
    }
}

// ============================================================================
// SECTION: Digest Helpers
// ============================================================================

/// Computes the salted digest persisted in the store.
fn salted_digest(salt: &str, token: &str) -> HashDigest {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(token.as_bytes());
    HashDigest::from_bytes(&hasher.finalize())
}

/// Computes the unsalted digest used as the in-memory index key.
fn unsalted_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    convoy_core::core::hashing::hex_encode(&hasher.finalize())
}
