// crates/convoy-agent/tests/backoff.rs
// ============================================================================
// Module: Reconnect Backoff Tests
// Description: Schedule tests for the exponential reconnect backoff.
// Purpose: Validate doubling, the 5-minute cap, and reset behavior.
// Dependencies: convoy-agent
// ============================================================================

//! ## Overview
//! Pins the reconnect schedule: 1 second doubling per attempt, capped at 5
//! minutes, resetting after a successful connection.

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

use std::time::Duration;

use convoy_agent::Backoff;

/// Verifies the schedule doubles from one second to the cap.
#[test]
fn schedule_doubles_to_the_cap() {
    let mut backoff = Backoff::default();
    let mut delays = Vec::new();
    for _ in 0 .. 12 {
        delays.push(backoff.next_delay());
    }
    assert_eq!(delays[0], Duration::from_secs(1));
    assert_eq!(delays[1], Duration::from_secs(2));
    assert_eq!(delays[8], Duration::from_secs(256));
    assert_eq!(delays[9], Duration::from_secs(300));
    assert_eq!(delays[11], Duration::from_secs(300));
}

/// Verifies reset returns the schedule to the initial delay.
#[test]
fn reset_restarts_the_schedule() {
    let mut backoff = Backoff::default();
    let _ = backoff.next_delay();
    let _ = backoff.next_delay();
    backoff.reset();
    assert_eq!(backoff.next_delay(), Duration::from_secs(1));
}
