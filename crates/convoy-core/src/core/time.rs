// crates/convoy-core/src/core/time.rs
// ============================================================================
// Module: Convoy Time Model
// Description: Canonical UTC timestamp representation for fleet records.
// Purpose: Provide a single millisecond-precision time value across Convoy records.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! Every persisted Convoy record carries UTC wall-clock timestamps in unix
//! milliseconds. The value type is a transparent wrapper so timestamps
//! serialize as plain integers on the wire and in SQLite columns.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// UTC timestamp in milliseconds since the unix epoch.
///
/// # Invariants
/// - Values are caller-supplied or read from the system clock; monotonicity
///   across records is not guaranteed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Creates a timestamp from unix milliseconds.
    #[must_use]
    pub const fn from_unix_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub const fn unix_millis(self) -> i64 {
        self.0
    }

    /// Reads the current wall-clock time.
    ///
    /// Times before the unix epoch saturate to zero.
    #[must_use]
    pub fn now() -> Self {
        let millis = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self(i64::try_from(millis).unwrap_or(i64::MAX))
    }

    /// Returns this timestamp advanced by the provided duration.
    ///
    /// Saturates on overflow.
    #[must_use]
    pub fn saturating_add(self, duration: Duration) -> Self {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(millis))
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
