// crates/convoy-server/tests/hub.rs
// ============================================================================
// Module: Subscriber Hub Tests
// Description: Channel lifecycle tests for the subscriber hub.
// Purpose: Validate supersession, overflow shedding, and owner-checked removal.
// Dependencies: convoy-core, convoy-server, convoy-proto
// ============================================================================

//! ## Overview
//! Exercises the hub in isolation: one entry per instance, supersession
//! closing the prior channel, non-blocking overflow, broadcast isolation,
//! and owner-checked removal protecting successor streams.

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

use convoy_core::EventId;
use convoy_core::InstanceId;
use convoy_core::Timestamp;
use convoy_proto::EventEnvelope;
use convoy_proto::EventPayload;
use convoy_server::SUBSCRIBER_CHANNEL_CAPACITY;
use convoy_server::SendOutcome;
use convoy_server::SubscriberHub;

fn ping(n: u64) -> EventEnvelope {
    EventEnvelope {
        event_id: EventId::new(format!("ev-{n}")),
        timestamp: Timestamp::from_unix_millis(0),
        payload: EventPayload::Ping,
    }
}

/// Verifies sends reach the registered channel in order.
#[tokio::test]
async fn send_delivers_in_order() {
    let hub = SubscriberHub::new();
    let id = InstanceId::new("i-1");
    let (mut receiver, _epoch) = hub.register(&id);
    for n in 0 .. 3 {
        assert_eq!(hub.send(&id, ping(n)), SendOutcome::Delivered);
    }
    for n in 0 .. 3 {
        let event = receiver.recv().await.unwrap();
        assert_eq!(event.event_id, EventId::new(format!("ev-{n}")));
    }
}

/// Verifies a second register closes the prior channel.
#[tokio::test]
async fn register_supersedes_prior_channel() {
    let hub = SubscriberHub::new();
    let id = InstanceId::new("i-1");
    let (mut first, _epoch_one) = hub.register(&id);
    let (_second, _epoch_two) = hub.register(&id);
    // The closed channel is the supersession signal to the first stream.
    assert!(first.recv().await.is_none());
    assert_eq!(hub.subscriber_count(), 1);
}

/// Verifies sends to unknown instances report not-subscribed.
#[tokio::test]
async fn send_to_unknown_is_not_subscribed() {
    let hub = SubscriberHub::new();
    assert_eq!(hub.send(&InstanceId::new("ghost"), ping(0)), SendOutcome::NotSubscribed);
}

/// Verifies a full channel sheds the event and keeps the subscriber.
#[tokio::test]
async fn overflow_sheds_without_dropping_subscriber() {
    let hub = SubscriberHub::new();
    let id = InstanceId::new("i-1");
    let (_receiver, _epoch) = hub.register(&id);
    for n in 0 .. SUBSCRIBER_CHANNEL_CAPACITY {
        assert_eq!(hub.send(&id, ping(u64::try_from(n).unwrap())), SendOutcome::Delivered);
    }
    assert_eq!(hub.send(&id, ping(999)), SendOutcome::Overflow);
    assert!(hub.is_subscribed(&id));
}

/// Verifies broadcast isolates per-channel overflow.
#[tokio::test]
async fn broadcast_isolates_overflow() {
    let hub = SubscriberHub::new();
    let full = InstanceId::new("i-full");
    let open = InstanceId::new("i-open");
    let (_full_rx, _e1) = hub.register(&full);
    let (mut open_rx, _e2) = hub.register(&open);
    for n in 0 .. SUBSCRIBER_CHANNEL_CAPACITY {
        assert_eq!(hub.send(&full, ping(u64::try_from(n).unwrap())), SendOutcome::Delivered);
    }
    let outcome = hub.broadcast(&ping(1_000));
    assert_eq!(outcome.delivered, 1);
    assert_eq!(outcome.overflowed, 1);
    assert!(open_rx.recv().await.is_some());
}

/// Verifies owner-checked removal never unregisters a successor.
#[tokio::test]
async fn remove_if_owner_protects_successor() {
    let hub = SubscriberHub::new();
    let id = InstanceId::new("i-1");
    let (_first, epoch_one) = hub.register(&id);
    let (_second, epoch_two) = hub.register(&id);
    // The superseded stream exits and must not remove the successor.
    hub.remove_if_owner(&id, epoch_one);
    assert!(hub.is_subscribed(&id));
    hub.remove_if_owner(&id, epoch_two);
    assert!(!hub.is_subscribed(&id));
    // Plain removal is idempotent.
    hub.remove(&id);
}
