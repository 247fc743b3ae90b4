// crates/convoy-server/tests/session.rs
// ============================================================================
// Module: Session Registry Tests
// Description: Token lifecycle tests for the session registry.
// Purpose: Validate issuance, validation, replacement, expiry, and revocation.
// Dependencies: convoy-core, convoy-server
// ============================================================================

//! ## Overview
//! Exercises the session registry against the in-memory store: token shape,
//! single-session-per-instance replacement, TTL expiry, revocation by
//! instance and by token, and the salted-digest store posture.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::sync::Arc;
use std::time::Duration;

use convoy_core::FleetStore;
use convoy_core::InMemoryFleetStore;
use convoy_core::InstanceId;
use convoy_core::Timestamp;
use convoy_server::SessionError;
use convoy_server::SessionRegistry;

fn registry(ttl: Duration) -> (Arc<InMemoryFleetStore>, SessionRegistry) {
    let store = Arc::new(InMemoryFleetStore::new());
    let registry = SessionRegistry::new(Arc::clone(&store) as Arc<dyn FleetStore>, ttl);
    (store, registry)
}

/// Verifies issued tokens are 64 hex chars and validate to their instance.
#[test]
fn issue_and_validate_roundtrip() {
    let (_store, registry) = registry(Duration::from_secs(60));
    let now = Timestamp::from_unix_millis(1_000);
    let token = registry.issue(&InstanceId::new("i-1"), now).unwrap();
    assert_eq!(token.len(), 64);
    assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    let resolved = registry.validate(&token, now).unwrap();
    assert_eq!(resolved, InstanceId::new("i-1"));
}

/// Verifies a replacement token invalidates the prior one.
#[test]
fn replacement_invalidates_prior_token() {
    let (_store, registry) = registry(Duration::from_secs(60));
    let now = Timestamp::from_unix_millis(1_000);
    let first = registry.issue(&InstanceId::new("i-1"), now).unwrap();
    let second = registry.issue(&InstanceId::new("i-1"), now).unwrap();
    assert_ne!(first, second);
    assert!(matches!(
        registry.validate(&first, now),
        Err(SessionError::Unauthenticated(_))
    ));
    registry.validate(&second, now).unwrap();
}

/// Verifies validation fails after the TTL elapses.
#[test]
fn tokens_expire_after_ttl() {
    let (_store, registry) = registry(Duration::from_secs(60));
    let issued = Timestamp::from_unix_millis(1_000);
    let token = registry.issue(&InstanceId::new("i-1"), issued).unwrap();
    let late = Timestamp::from_unix_millis(1_000 + 61_000);
    assert!(matches!(
        registry.validate(&token, late),
        Err(SessionError::Unauthenticated(_))
    ));
}

/// Verifies revocation by instance and by token.
#[test]
fn revocation_is_idempotent() {
    let (store, registry) = registry(Duration::from_secs(60));
    let now = Timestamp::from_unix_millis(1_000);
    let token = registry.issue(&InstanceId::new("i-1"), now).unwrap();
    registry.revoke_instance(&InstanceId::new("i-1")).unwrap();
    assert!(matches!(
        registry.validate(&token, now),
        Err(SessionError::Unauthenticated(_))
    ));
    assert!(store.get_session(&InstanceId::new("i-1")).unwrap().is_none());
    // Revoking again, by either handle, is a no-op.
    registry.revoke_instance(&InstanceId::new("i-1")).unwrap();
    registry.revoke_token(&token).unwrap();
}

/// Verifies the store row carries a salted digest, never the token.
#[test]
fn store_row_never_holds_the_token() {
    let (store, registry) = registry(Duration::from_secs(60));
    let now = Timestamp::from_unix_millis(1_000);
    let token = registry.issue(&InstanceId::new("i-1"), now).unwrap();
    let row = store.get_session(&InstanceId::new("i-1")).unwrap().unwrap();
    assert_ne!(row.token_digest.as_str(), token);
    assert!(!row.token_salt.is_empty());
    assert_eq!(row.expires_at, now.saturating_add(Duration::from_secs(60)));
}
