use std::collections::VecDeque;
use std::sync::Mutex;

use crate::holder::MessageHolder;

/// Ordered multi-reader queue (§3 FIFO buffer). Writers append under a
/// brief exclusive lock; a reader drains a prefix with
/// [`FifoBuffer::read_clear_forward`], which removes the entries from the
/// queue before invoking the callback so concurrent writers are never
/// blocked by a slow consumer.
pub struct FifoBuffer {
    entries: Mutex<VecDeque<MessageHolder>>,
}

impl FifoBuffer {
    pub fn new() -> Self {
        return Self {
            entries: Mutex::new(VecDeque::new()),
        };
    }

    pub fn write(&self, holder: MessageHolder) {
        self.entries.lock().expect("fifo mutex poisoned").push_back(holder);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("fifo mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Atomically takes the entire current queue contents, then invokes
    /// `callback` on each entry in FIFO order without the lock held. A
    /// `callback` that returns `false` stops the drain; undrained entries
    /// are pushed back to the front of the queue in their original order.
    pub fn read_clear_forward(&self, mut callback: impl FnMut(&MessageHolder) -> bool) -> usize {
        let drained: VecDeque<MessageHolder> = {
            let mut guard = self.entries.lock().expect("fifo mutex poisoned");
            std::mem::take(&mut *guard)
        };

        let mut consumed = 0;
        let mut remainder = VecDeque::new();
        let mut stopped = false;

        for entry in drained {
            if stopped {
                remainder.push_back(entry);
                continue;
            }
            if callback(&entry) {
                consumed += 1;
            } else {
                stopped = true;
                remainder.push_back(entry);
            }
        }

        if !remainder.is_empty() {
            let mut guard = self.entries.lock().expect("fifo mutex poisoned");
            for entry in guard.drain(..) {
                remainder.push_back(entry);
            }
            *guard = remainder;
        }

        return consumed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rrr_types::{Array, Message, MessageClass};

    fn holder(timestamp: u64) -> MessageHolder {
        let message = Message::new(timestamp, MessageClass::Msg, Array::new());
        MessageHolder::new(message, None, crate::holder::Protocol::Tcp)
    }

    #[test]
    fn preserves_insertion_order() {
        let fifo = FifoBuffer::new();
        fifo.write(holder(1));
        fifo.write(holder(2));
        fifo.write(holder(3));

        let mut seen = Vec::new();
        fifo.read_clear_forward(|h| {
            seen.push(h.lock().message().timestamp);
            true
        });

        assert_eq!(seen, vec![1, 2, 3]);
        assert!(fifo.is_empty());
    }

    #[test]
    fn writers_can_append_during_drain_without_deadlock() {
        let fifo = FifoBuffer::new();
        fifo.write(holder(1));
        fifo.write(holder(2));

        let mut seen = Vec::new();
        fifo.read_clear_forward(|h| {
            seen.push(h.lock().message().timestamp);
            fifo.write(holder(100));
            true
        });

        assert_eq!(seen, vec![1, 2]);
        assert_eq!(fifo.len(), 2, "appends made during the callback land after the drain");
    }

    #[test]
    fn stopping_early_preserves_remaining_order() {
        let fifo = FifoBuffer::new();
        fifo.write(holder(1));
        fifo.write(holder(2));
        fifo.write(holder(3));

        let mut seen = Vec::new();
        let consumed = fifo.read_clear_forward(|h| {
            let ts = h.lock().message().timestamp;
            if ts == 2 {
                return false;
            }
            seen.push(ts);
            true
        });

        assert_eq!(consumed, 1);
        assert_eq!(seen, vec![1]);
        assert_eq!(fifo.len(), 2);

        let mut rest = Vec::new();
        fifo.read_clear_forward(|h| {
            rest.push(h.lock().message().timestamp);
            true
        });
        assert_eq!(rest, vec![2, 3]);
    }
}
