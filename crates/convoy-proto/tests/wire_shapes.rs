// crates/convoy-proto/tests/wire_shapes.rs
// ============================================================================
// Module: Wire Shape Tests
// Description: Tests for stable message tags and field names.
// Purpose: Pin the JSON wire contract both peers depend on.
// Dependencies: convoy-proto, serde_json
// ============================================================================

//! ## Overview
//! Pins the stable parts of the wire contract: request/event tag spelling,
//! the `type` key on pending actions, and screaming-case event and state
//! labels.

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

use std::collections::BTreeMap;

use convoy_core::DeploymentId;
use convoy_core::EventId;
use convoy_core::InstanceId;
use convoy_core::Timestamp;
use convoy_proto::ErrorCode;
use convoy_proto::EventEnvelope;
use convoy_proto::EventPayload;
use convoy_proto::PendingAction;
use convoy_proto::PendingActionType;
use convoy_proto::ReportedDeploymentState;
use convoy_proto::Request;
use convoy_proto::RequestFrame;
use convoy_proto::SubscribeRequest;
use serde_json::Value;
use serde_json::json;

/// Verifies request bodies are tagged with snake_case type labels.
#[test]
fn request_tag_is_snake_case() {
    let frame = RequestFrame {
        id: 7,
        request: Request::Subscribe(SubscribeRequest {
            instance_id: InstanceId::new("i-1"),
            token: "t".repeat(64),
        }),
    };
    let value = serde_json::to_value(&frame).unwrap();
    assert_eq!(value["request"]["type"], Value::from("subscribe"));
    assert_eq!(value["id"], Value::from(7));
}

/// Verifies event payload tags use screaming-snake labels.
#[test]
fn event_tags_are_screaming_snake() {
    let envelope = EventEnvelope {
        event_id: EventId::new("ev-1"),
        timestamp: Timestamp::from_unix_millis(1_000),
        payload: EventPayload::Ping,
    };
    let value = serde_json::to_value(&envelope).unwrap();
    assert_eq!(value["payload"]["type"], Value::from("PING"));

    let drain = EventEnvelope {
        event_id: EventId::new("ev-2"),
        timestamp: Timestamp::from_unix_millis(1_000),
        payload: EventPayload::Drain {
            drain_timeout_seconds: 30,
            reason: "maintenance".to_string(),
        },
    };
    let value = serde_json::to_value(&drain).unwrap();
    assert_eq!(value["payload"]["type"], Value::from("DRAIN"));
}

/// Verifies pending actions serialize the kind under the `type` key.
#[test]
fn pending_action_uses_type_key() {
    let action = PendingAction {
        action_type: PendingActionType::FetchConfig,
        action_id: "act-1".to_string(),
        params: BTreeMap::new(),
    };
    let value = serde_json::to_value(&action).unwrap();
    assert_eq!(value["type"], Value::from("FETCH_CONFIG"));
}

/// Verifies reported deployment states parse from screaming-snake labels.
#[test]
fn reported_state_labels_are_stable() {
    let state: ReportedDeploymentState = serde_json::from_value(json!("ROLLED_BACK")).unwrap();
    assert_eq!(state, ReportedDeploymentState::RolledBack);
    assert!(state.is_terminal());
    let state: ReportedDeploymentState = serde_json::from_value(json!("IN_PROGRESS")).unwrap();
    assert!(!state.is_terminal());
}

/// Verifies error codes serialize as snake_case labels.
#[test]
fn error_code_labels_are_stable() {
    assert_eq!(serde_json::to_value(ErrorCode::PermissionDenied).unwrap(), "permission_denied");
    assert_eq!(serde_json::to_value(ErrorCode::InvalidArgument).unwrap(), "invalid_argument");
    let report = serde_json::to_value(DeploymentId::new("d-1")).unwrap();
    assert_eq!(report, Value::from("d-1"));
}
