use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::holder::MessageHolder;

/// Single-slot rendezvous between one writer and N named readers (§3 Slot
/// buffer). A slot is cleared only once every registered reader has
/// observed the current entry or the writer explicitly discards it.
pub struct SlotBuffer {
    state: Mutex<SlotState>,
    condvar: Condvar,
}

struct SlotState {
    entry: Option<MessageHolder>,
    /// `reader id -> has this reader observed the current entry`.
    read_flags: HashMap<String, bool>,
    written_count: u64,
    deleted_count: u64,
}

/// Poll granularity for honouring a cancellation check while blocked on the
/// slot's condvar (§5 Suspension points: "polling a cancel-check callback
/// every 500 ms").
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(500);

impl SlotBuffer {
    pub fn new() -> Self {
        return Self {
            state: Mutex::new(SlotState {
                entry: None,
                read_flags: HashMap::new(),
                written_count: 0,
                deleted_count: 0,
            }),
            condvar: Condvar::new(),
        };
    }

    pub fn register_reader(&self, reader_id: &str) {
        let mut state = self.state.lock().expect("slot mutex poisoned");
        state.read_flags.entry(reader_id.to_string()).or_insert(false);
    }

    pub fn reader_count(&self) -> usize {
        let state = self.state.lock().expect("slot mutex poisoned");
        return state.read_flags.len();
    }

    pub fn written_count(&self) -> u64 {
        self.state.lock().expect("slot mutex poisoned").written_count
    }

    pub fn deleted_count(&self) -> u64 {
        self.state.lock().expect("slot mutex poisoned").deleted_count
    }

    /// Blocks until the slot is empty or `cancel_check` returns true, then
    /// stores `holder` and marks every registered reader as unread.
    pub fn write(&self, holder: MessageHolder, wait_ms: u64, cancel_check: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_millis(wait_ms);
        let mut state = self.state.lock().expect("slot mutex poisoned");

        while state.entry.is_some() {
            if cancel_check() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let wait_for = (deadline - now).min(CANCEL_POLL_INTERVAL);
            let (guard, _timeout) = self
                .condvar
                .wait_timeout(state, wait_for)
                .expect("slot condvar poisoned");
            state = guard;
        }

        for flag in state.read_flags.values_mut() {
            *flag = false;
        }
        state.entry = Some(holder);
        state.written_count += 1;
        self.condvar.notify_all();
        return true;
    }

    /// Blocks up to `wait_ms` for a non-empty slot `reader_id` has not yet
    /// observed, then clones the holder and marks `reader_id` as having
    /// read it. Clears the slot and wakes the writer once every registered
    /// reader has read (§4.2 `read`).
    pub fn read(&self, reader_id: &str, wait_ms: u64, cancel_check: impl Fn() -> bool) -> Option<MessageHolder> {
        let deadline = Instant::now() + Duration::from_millis(wait_ms);
        let mut state = self.state.lock().expect("slot mutex poisoned");

        loop {
            if let Some(result) = Self::try_take(&mut state, reader_id) {
                return Some(result);
            }

            if cancel_check() {
                return None;
            }
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let wait_for = (deadline - now).min(CANCEL_POLL_INTERVAL);
            let (guard, _timeout) = self
                .condvar
                .wait_timeout(state, wait_for)
                .expect("slot condvar poisoned");
            state = guard;
        }
    }

    /// Non-blocking variant of [`SlotBuffer::read`] (§4.2 `poll`).
    pub fn poll(&self, reader_id: &str) -> Option<MessageHolder> {
        let mut state = self.state.lock().expect("slot mutex poisoned");
        return Self::try_take(&mut state, reader_id);
    }

    fn try_take(state: &mut SlotState, reader_id: &str) -> Option<MessageHolder> {
        let entry = state.entry.as_ref()?;
        let already_read = *state.read_flags.get(reader_id).unwrap_or(&true);
        if already_read {
            return None;
        }

        let cloned = entry.clone_under_lock();
        state.read_flags.insert(reader_id.to_string(), true);

        if state.read_flags.values().all(|&read| read) {
            state.entry = None;
            state.deleted_count += 1;
        }

        return Some(cloned);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rrr_types::{Array, MessageClass};

    fn holder() -> MessageHolder {
        let message = rrr_types::Message::new(1, MessageClass::Msg, Array::new());
        MessageHolder::new(message, None, crate::holder::Protocol::Tcp)
    }

    #[test]
    fn s2_slot_broadcast_two_readers() {
        let slot = SlotBuffer::new();
        slot.register_reader("a");
        slot.register_reader("b");

        assert!(slot.write(holder(), 100, || false));

        assert!(slot.read("a", 0, || false).is_some());
        assert_eq!(slot.deleted_count(), 0, "slot still holds the value until every reader has read");

        assert!(slot.read("b", 0, || false).is_some());
        assert_eq!(slot.deleted_count(), 1, "slot clears once all readers observed it");

        // writer's next write proceeds without waiting.
        assert!(slot.write(holder(), 100, || false));
        assert_eq!(slot.written_count(), 2);
    }

    #[test]
    fn n_plus_one_th_read_blocks() {
        let slot = SlotBuffer::new();
        slot.register_reader("a");
        assert!(slot.write(holder(), 100, || false));
        assert!(slot.read("a", 0, || false).is_some());
        // a already observed the only entry; a non-blocking poll must see nothing.
        assert!(slot.poll("a").is_none());
    }
}
