//! Per-stream outbound send queue (§4.5 "Outbound send queue").

use std::collections::BTreeMap;

use rrr_broker::MessageHolder;

use crate::frame::{ControlFrame, CACK, DACK, MSG, RACK};
use crate::params::AsdParams;

/// `message_id` is a per-stream 32-bit monotonic counter that skips zero
/// (§4.5 terminology).
#[derive(Debug, Default)]
pub struct MessageIdGenerator {
    last: u32,
}

impl MessageIdGenerator {
    pub fn next(&mut self) -> u32 {
        let mut candidate = self.last.wrapping_add(1);
        if candidate == 0 {
            candidate = 1;
        }
        self.last = candidate;
        return candidate;
    }
}

/// `{ message_id, message holder, send_time, ack_status_flags, send_count,
/// delivered_grace_counter }` per §3, the outbound shape (the
/// `delivered_grace_counter` field is unused on this side; it only applies
/// to release-queue entries, kept here only as ack bookkeeping).
struct SendQueueEntry {
    holder: MessageHolder,
    send_time: u64,
    ack_status_flags: u32,
    send_count: u32,
}

/// What the caller should emit for one send-queue entry on a tick.
pub enum SendAction<'a> {
    /// (Re)send the encoded data frame; set the `MSG` bit once sent.
    Data { holder: &'a MessageHolder },
    /// Resend a `RACK` control frame; set the `RACK` bit once sent.
    Release,
}

/// Outbound per-stream queue, keyed by `message_id`, ordered as the spec
/// requires for `message_id` bookkeeping (insertion order is preserved by
/// a `BTreeMap` over the monotonic id).
#[derive(Default)]
pub struct SendQueue {
    entries: BTreeMap<u32, SendQueueEntry>,
    ids: MessageIdGenerator,
}

impl SendQueue {
    pub fn new() -> Self {
        return Self::default();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Allocates the next `message_id` and enqueues `holder` with
    /// `ack_status_flags = 0` (§4.5).
    pub fn enqueue(&mut self, holder: MessageHolder, now_ms: u64) -> u32 {
        let message_id = self.ids.next();
        self.entries.insert(
            message_id,
            SendQueueEntry {
                holder,
                send_time: now_ms,
                ack_status_flags: 0,
                send_count: 0,
            },
        );
        return message_id;
    }

    /// Applies an incoming control frame's flag to the matching entry.
    /// Unknown ids are tolerated (stale acks, §4.4-style stale-ack
    /// tolerance extended here): nothing happens.
    pub fn on_ack(&mut self, frame: ControlFrame) {
        if let Some(entry) = self.entries.get_mut(&frame.message_id) {
            entry.ack_status_flags |= frame.flags;
        }
    }

    /// Runs one send-tick: destroys `CACK`-complete entries, and for every
    /// remaining entry whose `send_time` is at least `resend_interval_ms`
    /// old, invokes `on_action` with the retransmission it should perform,
    /// bumps `send_time`/`send_count`, and sets the corresponding flag bit
    /// (§4.5 step-by-step tick algorithm).
    pub fn tick(&mut self, now_ms: u64, params: &AsdParams, mut on_action: impl FnMut(u32, SendAction<'_>)) {
        self.entries.retain(|_, entry| entry.ack_status_flags & CACK == 0);

        for (&message_id, entry) in self.entries.iter_mut() {
            if now_ms.saturating_sub(entry.send_time) < params.resend_interval_ms {
                continue;
            }

            entry.send_time = now_ms;
            entry.send_count += 1;

            if entry.ack_status_flags & MSG == 0 || entry.ack_status_flags & DACK == 0 {
                on_action(message_id, SendAction::Data { holder: &entry.holder });
                entry.ack_status_flags |= MSG;
            } else if entry.ack_status_flags & DACK != 0 && entry.ack_status_flags & CACK == 0 {
                on_action(message_id, SendAction::Release);
                entry.ack_status_flags |= RACK;
            }
        }
    }

    pub fn send_count(&self, message_id: u32) -> Option<u32> {
        self.entries.get(&message_id).map(|e| e.send_count)
    }

    pub fn ack_status(&self, message_id: u32) -> Option<u32> {
        self.entries.get(&message_id).map(|e| e.ack_status_flags)
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
    fn resends_data_frame_every_resend_interval() {
        let mut queue = SendQueue::new();
        let params = AsdParams { resend_interval_ms: 100, ..AsdParams::default() };
        let id = queue.enqueue(holder(), 0);

        let mut resends = 0;
        queue.tick(0, &params, |_, _| resends += 1);
        assert_eq!(resends, 1, "first tick always sends");

        queue.tick(50, &params, |_, _| resends += 1);
        assert_eq!(resends, 1, "too soon for a resend");

        queue.tick(100, &params, |_, _| resends += 1);
        assert_eq!(resends, 2);
        assert_eq!(queue.send_count(id), Some(2));
    }

    #[test]
    fn dack_then_cack_transitions_through_release_to_removal() {
        let mut queue = SendQueue::new();
        let params = AsdParams { resend_interval_ms: 0, ..AsdParams::default() };
        let id = queue.enqueue(holder(), 0);

        queue.tick(0, &params, |_, _| {});
        queue.on_ack(ControlFrame::new(DACK, id));

        let mut saw_release = false;
        queue.tick(0, &params, |_, action| {
            if matches!(action, SendAction::Release) {
                saw_release = true;
            }
        });
        assert!(saw_release);

        queue.on_ack(ControlFrame::new(CACK, id));
        queue.tick(0, &params, |_, _| {});
        assert!(queue.is_empty(), "CACK-complete entries are destroyed on the next tick");
    }
}
