//! Inbound release queues (§4.5 "Inbound release queues", "Window
//! regulation"), one per `connect_handle`, holding ASD entries ordered by
//! `message_id` until they complete the DACK/RACK handshake and are
//! delivered to the application.

use std::collections::{BTreeMap, HashMap};

use rrr_broker::MessageHolder;

use crate::frame::ConnectHandle;
use crate::params::AsdParams;

struct ReleaseEntry {
    holder: MessageHolder,
    /// Set once the application has taken delivery; starts the grace
    /// countdown that keeps the id known long enough to reject a
    /// retransmission of the same data.
    delivered: bool,
    grace_counter: u32,
}

/// One peer's inbound release queue, keyed by `message_id`.
#[derive(Default)]
pub struct ReleaseQueue {
    entries: BTreeMap<u32, ReleaseEntry>,
}

impl ReleaseQueue {
    fn new() -> Self {
        return Self::default();
    }

    /// Inserts a newly arrived message ordered by `message_id`, via the
    /// caller-supplied allocator. A retransmission of an id already known
    /// (delivered or not) is a no-op: the allocator is not invoked again.
    pub fn receive(&mut self, message_id: u32, allocate: impl FnOnce() -> MessageHolder) -> bool {
        if self.entries.contains_key(&message_id) {
            return false;
        }
        self.entries.insert(
            message_id,
            ReleaseEntry {
                holder: allocate(),
                delivered: false,
                grace_counter: 0,
            },
        );
        return true;
    }

    /// True if `message_id` is still known (either awaiting delivery or
    /// within its post-delivery grace window) — a retransmission of it
    /// should still be acked rather than treated as new.
    pub fn is_known(&self, message_id: u32) -> bool {
        self.entries.contains_key(&message_id)
    }

    /// Marks `message_id` delivered to the application and starts its
    /// grace counter. No-op if already delivered or unknown.
    pub fn deliver(&mut self, message_id: u32, params: &AsdParams) -> Option<&MessageHolder> {
        let entry = self.entries.get_mut(&message_id)?;
        if !entry.delivered {
            entry.delivered = true;
            entry.grace_counter = params.delivery_grace_counter;
        }
        return Some(&entry.holder);
    }

    /// Count of entries that have not yet been delivered (i.e. are still
    /// subject to the DACK resend loop) — the figure window regulation
    /// watches.
    pub fn non_graced_count(&self) -> usize {
        self.entries.values().filter(|e| !e.delivered).count()
    }

    /// Re-emits `DACK` for every entry that hasn't completed its handshake
    /// (not yet delivered), and decrements the grace counter of delivered
    /// entries by `peers_delivered`, destroying entries whose counter
    /// reaches zero (§4.5).
    pub fn tick(&mut self, peers_delivered: u32, mut on_dack: impl FnMut(u32)) {
        for (&message_id, entry) in self.entries.iter_mut() {
            if !entry.delivered {
                on_dack(message_id);
            }
        }
        self.entries.retain(|_, entry| {
            if !entry.delivered {
                return true;
            }
            entry.grace_counter = entry.grace_counter.saturating_sub(peers_delivered);
            return entry.grace_counter > 0;
        });
    }

    pub fn reset(&mut self) {
        self.entries.clear();
    }
}

/// All release queues, keyed by the `connect_handle` of the peer they
/// arrived from (§3 "many release queues keyed by source_connect_handle").
#[derive(Default)]
pub struct ReleaseQueueCollection {
    queues: HashMap<ConnectHandle, ReleaseQueue>,
}

impl ReleaseQueueCollection {
    pub fn new() -> Self {
        return Self::default();
    }

    pub fn queue_mut(&mut self, connect_handle: ConnectHandle) -> &mut ReleaseQueue {
        self.queues.entry(connect_handle).or_insert_with(ReleaseQueue::new)
    }

    pub fn queue(&self, connect_handle: ConnectHandle) -> Option<&ReleaseQueue> {
        self.queues.get(&connect_handle)
    }

    /// `RST` clears a peer's release queue entirely (§4.5 connect
    /// management: a fresh connect discards stale state on the peer, and
    /// symmetrically the local side honours an incoming `RST`).
    pub fn reset(&mut self, connect_handle: ConnectHandle) {
        if let Some(queue) = self.queues.get_mut(&connect_handle) {
            queue.reset();
        }
    }

    /// True if `connect_handle`'s queue has crossed the window-shrink
    /// threshold (§4.5 "Window regulation").
    pub fn needs_window_reduction(&self, connect_handle: ConnectHandle, params: &AsdParams) -> bool {
        self.queue(connect_handle)
            .map(|q| q.non_graced_count() > params.release_queue_window_size_reduction_threshold)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rrr_broker::Protocol;
    use rrr_types::{Array, Message, MessageClass};

    fn holder() -> MessageHolder {
        MessageHolder::new(Message::new(1, MessageClass::Msg, Array::new()), None, Protocol::Udp)
    }

    #[test]
    fn redelivery_still_acks_within_grace_window() {
        let params = AsdParams { delivery_grace_counter: 2, ..AsdParams::default() };
        let mut queue = ReleaseQueue::new();

        assert!(queue.receive(7, holder));
        assert!(!queue.receive(7, holder), "duplicate arrival does not re-allocate");

        queue.deliver(7, &params);
        assert!(queue.is_known(7), "still known: a retransmission must still be acked");

        queue.tick(1, |_| {});
        assert!(queue.is_known(7));
        queue.tick(1, |_| {});
        assert!(queue.is_known(7));
        queue.tick(1, |_| {});
        assert!(!queue.is_known(7), "grace counter exhausted, entry destroyed");
    }

    #[test]
    fn undelivered_entries_keep_receiving_dack_each_tick() {
        let mut queue = ReleaseQueue::new();
        queue.receive(1, holder);

        let mut dacked = Vec::new();
        queue.tick(0, |id| dacked.push(id));
        assert_eq!(dacked, vec![1]);

        dacked.clear();
        queue.tick(0, |id| dacked.push(id));
        assert_eq!(dacked, vec![1], "still pending delivery, DACK repeats");
    }

    #[test]
    fn window_reduction_threshold_trips_on_non_graced_backlog() {
        let mut collection = ReleaseQueueCollection::new();
        let params = AsdParams { release_queue_window_size_reduction_threshold: 1, ..AsdParams::default() };

        collection.queue_mut(9).receive(1, holder);
        assert!(!collection.needs_window_reduction(9, &params));

        collection.queue_mut(9).receive(2, holder);
        assert!(collection.needs_window_reduction(9, &params));
    }
}
