// crates/convoy-server/src/hub.rs
// ============================================================================
// Module: Subscriber Hub
// Description: In-memory map from instance id to a bounded event channel.
// Purpose: Fan events out to connected agents without blocking senders.
// Dependencies: convoy-core, convoy-proto, tokio
// ============================================================================

//! ## Overview
//! The hub maps each subscribed instance to one bounded event channel
//! (capacity 100). All enqueues are non-blocking: a full channel reports
//! overflow and never stalls the sender. Registering a second channel for the
//! same instance closes the prior one; the closed channel is the sole signal
//! to the superseded stream. The hub holds non-owning references keyed by the
//! store's instance identity; it is never the source of truth for existence.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use convoy_core::InstanceId;
use convoy_proto::EventEnvelope;
use tokio::sync::mpsc;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Bounded capacity of each subscriber channel.
pub const SUBSCRIBER_CHANNEL_CAPACITY: usize = 100;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Outcome of a single-instance send.
///
/// # Invariants
/// - `Overflow` leaves the subscriber registered; shedding one event never
///   disconnects the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum SendOutcome {
    /// Event enqueued.
    Delivered,
    /// No channel is registered for the instance.
    NotSubscribed,
    /// The channel is full; the event was shed.
    Overflow,
}

/// Outcome counters for a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BroadcastOutcome {
    /// Channels that accepted the event.
    pub delivered: usize,
    /// Channels that were full; the event was shed for them.
    pub overflowed: usize,
}

/// One registered subscriber.
struct SubscriberEntry {
    /// Bounded event sender; dropping it closes the stream's receiver.
    sender: mpsc::Sender<EventEnvelope>,
    /// Epoch identifying the stream that owns this entry.
    epoch: u64,
}

/// Concurrent mapping from instance id to a bounded event channel.
///
/// # Invariants
/// - At most one entry per instance id.
/// - Events on a single channel are delivered in enqueue order.
pub struct SubscriberHub {
    /// Registered subscribers.
    entries: RwLock<HashMap<InstanceId, SubscriberEntry>>,
    /// Epoch source for owner-checked removal.
    next_epoch: AtomicU64,
}

impl Default for SubscriberHub {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriberHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            next_epoch: AtomicU64::new(1),
        }
    }

    /// Registers a fresh channel for an instance, superseding any prior one.
    ///
    /// The returned epoch must be passed to [`Self::remove_if_owner`] when the
    /// owning stream ends. The prior entry's sender is dropped, which closes
    /// the superseded stream's receiver.
    pub fn register(&self, id: &InstanceId) -> (mpsc::Receiver<EventEnvelope>, u64) {
        let (sender, receiver) = mpsc::channel(SUBSCRIBER_CHANNEL_CAPACITY);
        let epoch = self.next_epoch.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(
                id.clone(),
                SubscriberEntry {
                    sender,
                    epoch,
                },
            );
        }
        (receiver, epoch)
    }

    /// Removes the entry for an instance, closing its channel. Idempotent.
    pub fn remove(&self, id: &InstanceId) {
        if let Ok(mut entries) = self.entries.write() {
            entries.remove(id);
        }
    }

    /// Removes the entry only when the provided epoch still owns it.
    ///
    /// A stream ending after being superseded must not unregister its
    /// successor.
    pub fn remove_if_owner(&self, id: &InstanceId, epoch: u64) {
        if let Ok(mut entries) = self.entries.write()
            && entries.get(id).is_some_and(|entry| entry.epoch == epoch)
        {
            entries.remove(id);
        }
    }

    /// Enqueues an event for one instance without blocking.
    pub fn send(&self, id: &InstanceId, event: EventEnvelope) -> SendOutcome {
        let Ok(entries) = self.entries.read() else {
            return SendOutcome::NotSubscribed;
        };
        let Some(entry) = entries.get(id) else {
            return SendOutcome::NotSubscribed;
        };
        match entry.sender.try_send(event) {
            Ok(()) => SendOutcome::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => SendOutcome::Overflow,
            Err(mpsc::error::TrySendError::Closed(_)) => SendOutcome::NotSubscribed,
        }
    }

    /// Enqueues an event on every channel without blocking.
    ///
    /// Per-channel overflow sheds the event for that channel only; other
    /// subscribers are unaffected.
    pub fn broadcast(&self, event: &EventEnvelope) -> BroadcastOutcome {
        let mut outcome = BroadcastOutcome::default();
        let Ok(entries) = self.entries.read() else {
            return outcome;
        };
        for entry in entries.values() {
            match entry.sender.try_send(event.clone()) {
                Ok(()) => outcome.delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => outcome.overflowed += 1,
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        outcome
    }

    /// Returns true when the instance has a registered channel.
    #[must_use]
    pub fn is_subscribed(&self, id: &InstanceId) -> bool {
        self.entries.read().is_ok_and(|entries| entries.contains_key(id))
    }

    /// Returns the number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.entries.read().map_or(0, |entries| entries.len())
    }
}
