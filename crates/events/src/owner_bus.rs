//! Per-owner in-process fan-out for sync notifications.
//!
//! This is the mechanism behind `ServeWS`: a mutex-guarded map from
//! `ownerUserId` to the set of live subscribers for that owner. It is an
//! optimization layered over `Pull`, never a source of truth — a dropped
//! notification is tolerated because the receiving client's next `Pull` is
//! authoritative. Delivery is non-blocking: each subscriber has a bounded
//! queue, and a slow or dead subscriber is dropped rather than allowed to
//! block publishers.

use std::collections::HashMap;
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Mutex;

use eln_core::id::UserId;

/// Bound on each subscriber's queue. A subscriber that falls this far behind
/// is dropped; its owner's next `Pull` still catches it up.
const SUBSCRIBER_QUEUE_CAPACITY: usize = 8;

/// A live registration for one connection. Dropping this removes the
/// connection from the fan-out on its next publish attempt (the sender side
/// observes the receiver is gone and prunes it).
pub struct OwnerSubscription<M> {
    receiver: Receiver<M>,
}

impl<M> OwnerSubscription<M> {
    pub fn try_recv(&self) -> Result<M, std::sync::mpsc::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn recv(&self) -> Result<M, std::sync::mpsc::RecvError> {
        self.receiver.recv()
    }
}

/// Mutex-guarded map of `ownerUserId` to that owner's live subscribers.
///
/// The mutex is held only for map mutations (register/publish/prune), never
/// across message delivery — matching the shared-resource policy that no
/// cross-request in-memory state is allowed to carry business invariants.
pub struct OwnerFanout<M> {
    subscribers: Mutex<HashMap<UserId, Vec<SyncSender<M>>>>,
}

impl<M> Default for OwnerFanout<M> {
    fn default() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }
}

impl<M> OwnerFanout<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber for `owner_user_id`. Returns a handle the
    /// caller polls (or blocks on) for notifications; dropping the returned
    /// subscription lets the next publish prune it from the map.
    pub fn subscribe(&self, owner_user_id: UserId) -> OwnerSubscription<M> {
        let (tx, rx) = sync_channel(SUBSCRIBER_QUEUE_CAPACITY);
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.entry(owner_user_id).or_default().push(tx);
        }
        OwnerSubscription { receiver: rx }
    }

    /// Notify every live subscriber of `owner_user_id`. Subscribers whose
    /// queue is full or whose receiver has been dropped are pruned; this
    /// call never blocks and never fails (best-effort by design).
    pub fn publish(&self, owner_user_id: UserId, message: M)
    where
        M: Clone,
    {
        let Ok(mut subs) = self.subscribers.lock() else {
            return;
        };
        let Some(owner_subs) = subs.get_mut(&owner_user_id) else {
            return;
        };
        owner_subs.retain(|tx| match tx.try_send(message.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        });
        if owner_subs.is_empty() {
            subs.remove(&owner_user_id);
        }
    }

    /// Number of live subscribers for an owner, for tests and diagnostics.
    pub fn subscriber_count(&self, owner_user_id: UserId) -> usize {
        self.subscribers
            .lock()
            .map(|subs| subs.get(&owner_user_id).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn publish_reaches_subscriber_of_same_owner() {
        let fanout: OwnerFanout<u32> = OwnerFanout::new();
        let owner = UserId::new();
        let sub = fanout.subscribe(owner);
        fanout.publish(owner, 1);
        assert_eq!(sub.try_recv().unwrap(), 1);
    }

    #[test]
    fn publish_does_not_reach_other_owners() {
        let fanout: OwnerFanout<u32> = OwnerFanout::new();
        let owner_a = UserId::new();
        let owner_b = UserId::new();
        let sub_b = fanout.subscribe(owner_b);
        fanout.publish(owner_a, 1);
        assert!(sub_b.try_recv().is_err());
    }

    #[test]
    fn dropped_subscriber_is_pruned_on_next_publish() {
        let fanout: OwnerFanout<u32> = OwnerFanout::new();
        let owner = UserId::new();
        let sub = fanout.subscribe(owner);
        drop(sub);
        fanout.publish(owner, 1);
        assert_eq!(fanout.subscriber_count(owner), 0);
    }

    #[test]
    fn full_queue_drops_the_slow_subscriber_without_blocking() {
        let fanout: OwnerFanout<u32> = OwnerFanout::new();
        let owner = UserId::new();
        let sub = fanout.subscribe(owner);
        for i in 0..(SUBSCRIBER_QUEUE_CAPACITY as u32 + 2) {
            fanout.publish(owner, i);
        }
        assert_eq!(fanout.subscriber_count(owner), 0);
        drop(sub);
    }
}
