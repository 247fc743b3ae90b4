// crates/convoy-server/src/telemetry.rs
// ============================================================================
// Module: Fleet Telemetry
// Description: Observability hooks for the fleet service and orchestrator.
// Purpose: Provide metric events and latency buckets without hard deps.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! This module exposes a thin metrics interface for request counters and
//! latency histograms. It is intentionally dependency-light so downstream
//! deployments can plug in Prometheus or OpenTelemetry without redesign.
//! Security posture: telemetry must avoid leaking tokens or config contents
//! and treat labels as untrusted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default latency buckets in milliseconds for request histograms.
pub const FLEET_LATENCY_BUCKETS_MS: &[u64] =
    &[1, 2, 5, 10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 30_000];

// ============================================================================
// SECTION: Metric Labels
// ============================================================================

/// Fleet request method classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FleetMethod {
    /// Register request.
    Register,
    /// Heartbeat request.
    Heartbeat,
    /// Get-config request.
    GetConfig,
    /// Get-config-version request.
    GetConfigVersion,
    /// Subscribe request.
    Subscribe,
    /// Ack-deployment request.
    AckDeployment,
    /// Report-deployment-status request.
    ReportDeploymentStatus,
    /// Deregister request.
    Deregister,
    /// Malformed or unreadable frame.
    Invalid,
}

impl FleetMethod {
    /// Returns a stable label for the method.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::Heartbeat => "heartbeat",
            Self::GetConfig => "get_config",
            Self::GetConfigVersion => "get_config_version",
            Self::Subscribe => "subscribe",
            Self::AckDeployment => "ack_deployment",
            Self::ReportDeploymentStatus => "report_deployment_status",
            Self::Deregister => "deregister",
            Self::Invalid => "invalid",
        }
    }
}

/// Fleet request outcome classification.
///
/// # Invariants
/// - Variants are stable for telemetry labeling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum FleetOutcome {
    /// Successful request.
    Ok,
    /// Failed request.
    Error,
}

impl FleetOutcome {
    /// Returns a stable label for the outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Error => "error",
        }
    }
}

/// Fleet request metric event payload.
///
/// # Invariants
/// - Optional fields are `None` when the metadata is unavailable.
#[derive(Debug, Clone)]
pub struct FleetMetricEvent {
    /// Request method classification.
    pub method: FleetMethod,
    /// Request outcome.
    pub outcome: FleetOutcome,
    /// Stable wire error code label when the request failed.
    pub error_code: Option<&'static str>,
}

// ============================================================================
// SECTION: Trait
// ============================================================================

/// Metrics sink for fleet requests and latencies.
pub trait FleetMetrics: Send + Sync {
    /// Records a request counter event.
    fn record_request(&self, event: FleetMetricEvent);
    /// Records a latency observation for the request.
    fn record_latency(&self, event: FleetMetricEvent, latency: Duration);
}

/// No-op metrics sink.
///
/// # Invariants
/// - Metrics are intentionally discarded.
pub struct NoopMetrics;

impl FleetMetrics for NoopMetrics {
    fn record_request(&self, _event: FleetMetricEvent) {}

    fn record_latency(&self, _event: FleetMetricEvent, _latency: Duration) {}
}
