// crates/convoy-proto/src/lib.rs
// ============================================================================
// Module: Convoy Protocol
// Description: Wire messages and framing for the agent control channel.
// Purpose: Define the request/response/event surface between agents and the service.
// Dependencies: convoy-core, bytes, serde, serde_json, tokio
// ============================================================================

//! ## Overview
//! The agent channel speaks a length-prefixed binary framing: a 4-byte
//! big-endian payload length followed by a JSON-serialized message. Requests
//! carry correlation ids; a `Subscribe` request flips the connection into a
//! server-push stream of event frames. Message shapes and error codes are
//! stable wire contracts.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod codes;
pub mod framing;
pub mod messages;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use codes::ErrorCode;
pub use framing::FrameError;
pub use framing::MAX_FRAME_BYTES;
pub use framing::encode_frame;
pub use framing::read_frame;
pub use framing::write_frame;
pub use messages::AckDeploymentRequest;
pub use messages::AckDeploymentResponse;
pub use messages::AgentStatus;
pub use messages::DeploymentEvent;
pub use messages::DeregisterRequest;
pub use messages::DeregisterResponse;
pub use messages::ErrorReply;
pub use messages::EventEnvelope;
pub use messages::EventPayload;
pub use messages::GetConfigRequest;
pub use messages::GetConfigResponse;
pub use messages::GetConfigVersionRequest;
pub use messages::GetConfigVersionResponse;
pub use messages::HeartbeatRequest;
pub use messages::HeartbeatResponse;
pub use messages::PendingAction;
pub use messages::PendingActionType;
pub use messages::RegisterRequest;
pub use messages::RegisterResponse;
pub use messages::Reply;
pub use messages::ReportDeploymentStatusRequest;
pub use messages::ReportDeploymentStatusResponse;
pub use messages::ReportedDeploymentState;
pub use messages::Request;
pub use messages::RequestFrame;
pub use messages::ServerFrame;
pub use messages::SubscribeRequest;
