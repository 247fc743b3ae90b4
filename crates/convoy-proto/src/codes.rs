// crates/convoy-proto/src/codes.rs
// ============================================================================
// Module: Wire Error Codes
// Description: Stable error-code family for the agent channel.
// Purpose: Map service and store error kinds onto wire codes agents branch on.
// Dependencies: convoy-core, serde
// ============================================================================

//! ## Overview
//! Errors on the wire follow the standard request-response family. Codes are
//! stable labels; agents and operators branch on the code, never the message
//! text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use convoy_core::StoreError;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Error Codes
// ============================================================================

/// Stable wire error codes.
///
/// # Invariants
/// - Variants are stable for serialization and programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Missing, expired, or unknown session token.
    Unauthenticated,
    /// Token is valid but not for the requested instance.
    PermissionDenied,
    /// Referenced entity does not exist.
    NotFound,
    /// Malformed or incomplete request.
    InvalidArgument,
    /// Server-side failure.
    Internal,
}

impl ErrorCode {
    /// Returns a stable label for the code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unauthenticated => "unauthenticated",
            Self::PermissionDenied => "permission_denied",
            Self::NotFound => "not_found",
            Self::InvalidArgument => "invalid_argument",
            Self::Internal => "internal",
        }
    }
}

impl From<&StoreError> for ErrorCode {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self::NotFound,
            StoreError::AlreadyExists(_) | StoreError::Conflict(_) => Self::InvalidArgument,
            StoreError::Internal(_) => Self::Internal,
        }
    }
}
