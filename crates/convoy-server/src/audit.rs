// crates/convoy-server/src/audit.rs
// ============================================================================
// Module: Deployment Audit Logging
// Description: Structured audit events for control-plane actions.
// Purpose: Emit redacted audit logs without hard dependencies.
// Dependencies: serde, serde_json
// ============================================================================

//! ## Overview
//! This module defines audit event payloads and sinks for control-plane
//! logging: deployment lifecycle, auth denials, late status reports, and
//! event-channel overflow. Sinks are fire-and-forget so audit failures never
//! affect the control path. Tokens never appear in events.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Serialize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Control-plane audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct DeployAuditEvent {
    /// Event identifier.
    pub event: &'static str,
    /// Event timestamp (milliseconds since epoch).
    pub timestamp_ms: u128,
    /// Deployment identifier when the event concerns one.
    pub deployment_id: Option<String>,
    /// Instance identifier when the event concerns one.
    pub instance_id: Option<String>,
    /// Human-readable detail.
    pub detail: Option<String>,
}

impl DeployAuditEvent {
    /// Builds an event with a consistent timestamp.
    fn build(
        event: &'static str,
        deployment_id: Option<String>,
        instance_id: Option<String>,
        detail: Option<String>,
    ) -> Self {
        let timestamp_ms =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis();
        Self {
            event,
            timestamp_ms,
            deployment_id,
            instance_id,
            detail,
        }
    }

    /// Builds a deployment-created event.
    #[must_use]
    pub fn deployment_created(deployment_id: &str, detail: String) -> Self {
        Self::build("deployment_created", Some(deployment_id.to_string()), None, Some(detail))
    }

    /// Builds a deployment-finished event carrying the terminal status label.
    #[must_use]
    pub fn deployment_finished(deployment_id: &str, status: &'static str) -> Self {
        Self::build(
            "deployment_finished",
            Some(deployment_id.to_string()),
            None,
            Some(status.to_string()),
        )
    }

    /// Builds a deployment-cancelled event.
    #[must_use]
    pub fn deployment_cancelled(deployment_id: &str) -> Self {
        Self::build("deployment_cancelled", Some(deployment_id.to_string()), None, None)
    }

    /// Builds a late-report event for a straggler status report.
    #[must_use]
    pub fn straggler_report(deployment_id: &str, instance_id: &str) -> Self {
        Self::build(
            "straggler_report",
            Some(deployment_id.to_string()),
            Some(instance_id.to_string()),
            None,
        )
    }

    /// Builds an event-channel overflow event.
    #[must_use]
    pub fn channel_overflow(instance_id: &str) -> Self {
        Self::build("channel_overflow", None, Some(instance_id.to_string()), None)
    }

    /// Builds an auth-denied event. The detail never contains token material.
    #[must_use]
    pub fn auth_denied(action: &'static str, detail: String) -> Self {
        Self::build("auth_denied", None, None, Some(format!("{action}: {detail}")))
    }

    /// Builds a runner-error event for non-fatal store failures.
    #[must_use]
    pub fn runner_error(deployment_id: &str, detail: String) -> Self {
        Self::build("runner_error", Some(deployment_id.to_string()), None, Some(detail))
    }

    /// Builds a deployment-acknowledgement event.
    #[must_use]
    pub fn deployment_ack(deployment_id: &str, instance_id: &str, detail: String) -> Self {
        Self::build(
            "deployment_ack",
            Some(deployment_id.to_string()),
            Some(instance_id.to_string()),
            Some(detail),
        )
    }
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Audit sink for control-plane events.
pub trait DeployAuditSink: Send + Sync {
    /// Record an audit event.
    fn record(&self, event: &DeployAuditEvent);
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink that logs JSON lines to stderr.
pub struct StderrDeployAuditSink;

impl DeployAuditSink for StderrDeployAuditSink {
    fn record(&self, event: &DeployAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{payload}");
        }
    }
}

/// Audit sink that logs JSON lines to a file.
pub struct FileDeployAuditSink {
    /// File handle used for append-only logging.
    file: Mutex<std::fs::File>,
}

impl FileDeployAuditSink {
    /// Opens the audit log file in append mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn new(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl DeployAuditSink for FileDeployAuditSink {
    fn record(&self, event: &DeployAuditEvent) {
        if let Ok(payload) = serde_json::to_string(event)
            && let Ok(mut file) = self.file.lock()
        {
            let _ = writeln!(file, "{payload}");
            let _ = file.flush();
        }
    }
}

/// No-op audit sink.
pub struct NoopDeployAuditSink;

impl DeployAuditSink for NoopDeployAuditSink {
    fn record(&self, _event: &DeployAuditEvent) {}
}
