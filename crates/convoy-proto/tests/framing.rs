// crates/convoy-proto/tests/framing.rs
// ============================================================================
// Module: Framing Codec Tests
// Description: Tests for the length-prefixed frame codec.
// Purpose: Validate roundtrips, size limits, and close semantics.
// Dependencies: convoy-proto, tokio
// ============================================================================

//! ## Overview
//! Exercises the frame codec over in-memory duplex transports: multi-frame
//! roundtrips, split reads, oversize rejection, clean close, and mid-frame
//! truncation.

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

use convoy_core::InstanceId;
use convoy_proto::FrameError;
use convoy_proto::MAX_FRAME_BYTES;
use convoy_proto::Request;
use convoy_proto::RequestFrame;
use convoy_proto::SubscribeRequest;
use convoy_proto::read_frame;
use convoy_proto::write_frame;
use tokio::io::AsyncWriteExt;

fn subscribe_frame(id: u64) -> RequestFrame {
    RequestFrame {
        id,
        request: Request::Subscribe(SubscribeRequest {
            instance_id: InstanceId::new("i-1"),
            token: "a".repeat(64),
        }),
    }
}

/// Verifies several frames roundtrip in order over one connection.
#[tokio::test]
async fn frames_roundtrip_in_order() {
    let (mut client, mut server) = tokio::io::duplex(64 * 1024);
    for id in 0 .. 3_u64 {
        write_frame(&mut client, &subscribe_frame(id)).await.unwrap();
    }
    drop(client);
    for id in 0 .. 3_u64 {
        let frame: RequestFrame = read_frame(&mut server).await.unwrap().unwrap();
        assert_eq!(frame.id, id);
    }
    let end: Option<RequestFrame> = read_frame(&mut server).await.unwrap();
    assert!(end.is_none());
}

/// Verifies a declared length above the cap is rejected without allocation.
#[tokio::test]
async fn oversize_declared_length_is_rejected() {
    let (mut client, mut server) = tokio::io::duplex(1024);
    let oversize = u32::try_from(MAX_FRAME_BYTES + 1).unwrap();
    client.write_all(&oversize.to_be_bytes()).await.unwrap();
    let result: Result<Option<RequestFrame>, FrameError> = read_frame(&mut server).await;
    assert!(matches!(result, Err(FrameError::TooLarge { .. })));
}

/// Verifies a close mid-frame surfaces as truncation, not clean EOF.
#[tokio::test]
async fn close_mid_frame_is_truncation() {
    let (mut client, mut server) = tokio::io::duplex(1024);
    client.write_all(&16_u32.to_be_bytes()).await.unwrap();
    client.write_all(b"{\"par").await.unwrap();
    drop(client);
    let result: Result<Option<RequestFrame>, FrameError> = read_frame(&mut server).await;
    assert!(matches!(result, Err(FrameError::Truncated)));
}

/// Verifies a payload that is not a valid message is a codec error.
#[tokio::test]
async fn invalid_payload_is_codec_error() {
    let (mut client, mut server) = tokio::io::duplex(1024);
    let garbage = b"not json at all";
    client.write_all(&u32::try_from(garbage.len()).unwrap().to_be_bytes()).await.unwrap();
    client.write_all(garbage).await.unwrap();
    let result: Result<Option<RequestFrame>, FrameError> = read_frame(&mut server).await;
    assert!(matches!(result, Err(FrameError::Codec(_))));
}
