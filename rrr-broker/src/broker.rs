use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use crate::fifo::FifoBuffer;
use crate::holder::MessageHolder;
use crate::slot::SlotBuffer;

/// In-flight count above which the broker asks a producer's event loop to
/// pause (§4.3 back-pressure rule). Configurable per [`Broker::new`]
/// caller via [`RatelimitParams`]; these are the defaults.
pub const RATELIMIT_THRESHOLD: u32 = 1000;

/// In-flight count below which the broker asks a producer's event loop to
/// resume after having requested a pause.
pub const RATELIMIT_RELEASE: u32 = 500;

#[derive(Clone, Copy, Debug)]
pub struct RatelimitParams {
    pub threshold: u32,
    pub release: u32,
}

impl Default for RatelimitParams {
    fn default() -> Self {
        return Self {
            threshold: RATELIMIT_THRESHOLD,
            release: RATELIMIT_RELEASE,
        };
    }
}

enum Backing {
    Fifo(FifoBuffer),
    Slot(SlotBuffer),
}

/// A customer record: `{ slot or FIFO, reader-registry, in-flight counter,
/// ratelimit flag }` (§4.2).
pub struct Customer {
    backing: Backing,
    in_flight: AtomicU32,
    ratelimit_active: AtomicBool,
    paused: AtomicBool,
}

impl Customer {
    fn fifo() -> Self {
        return Self {
            backing: Backing::Fifo(FifoBuffer::new()),
            in_flight: AtomicU32::new(0),
            ratelimit_active: AtomicBool::new(true),
            paused: AtomicBool::new(false),
        };
    }

    fn slot() -> Self {
        return Self {
            backing: Backing::Slot(SlotBuffer::new()),
            in_flight: AtomicU32::new(0),
            ratelimit_active: AtomicBool::new(true),
            paused: AtomicBool::new(false),
        };
    }

    pub fn in_flight(&self) -> u32 {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

/// Maps customer name to customer record and routes `write`/`read`/`poll`
/// through the appropriate backing store, applying the back-pressure rule
/// from §4.3 as in-flight counts cross `threshold`/`release` (§4.2).
pub struct Broker {
    customers: Mutex<HashMap<String, Customer>>,
    ratelimit: RatelimitParams,
}

impl Broker {
    pub fn new() -> Self {
        return Self::with_ratelimit(RatelimitParams::default());
    }

    pub fn with_ratelimit(ratelimit: RatelimitParams) -> Self {
        return Self {
            customers: Mutex::new(HashMap::new()),
            ratelimit,
        };
    }

    pub fn register_fifo_customer(&self, name: &str) {
        let mut customers = self.customers.lock().expect("broker mutex poisoned");
        customers.entry(name.to_string()).or_insert_with(Customer::fifo);
    }

    pub fn register_slot_customer(&self, name: &str, reader_ids: &[&str]) {
        let mut customers = self.customers.lock().expect("broker mutex poisoned");
        let customer = customers.entry(name.to_string()).or_insert_with(Customer::slot);
        if let Backing::Slot(slot) = &customer.backing {
            for reader_id in reader_ids {
                slot.register_reader(reader_id);
            }
        }
    }

    pub fn set_ratelimit(&self, name: &str, active: bool) {
        let customers = self.customers.lock().expect("broker mutex poisoned");
        if let Some(customer) = customers.get(name) {
            customer.ratelimit_active.store(active, Ordering::SeqCst);
        }
    }

    pub fn in_flight(&self, name: &str) -> Option<u32> {
        let customers = self.customers.lock().expect("broker mutex poisoned");
        return customers.get(name).map(Customer::in_flight);
    }

    /// Appends `holder` to `name`'s backing store under its write
    /// discipline, then applies the back-pressure rule, invoking
    /// `on_pause_change` at most once if the in-flight count just crossed
    /// `threshold` (request pause) or `release` (request resume).
    pub fn write(
        &self,
        name: &str,
        holder: MessageHolder,
        wait_ms: u64,
        cancel_check: impl Fn() -> bool,
        on_pause_change: impl FnOnce(bool),
    ) -> bool {
        let customers = self.customers.lock().expect("broker mutex poisoned");
        let Some(customer) = customers.get(name) else {
            return false;
        };

        let accepted = match &customer.backing {
            Backing::Fifo(fifo) => {
                fifo.write(holder);
                true
            }
            Backing::Slot(slot) => slot.write(holder, wait_ms, cancel_check),
        };
        if !accepted {
            return false;
        }

        let n = customer.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.maybe_signal(customer, n, on_pause_change);
        return true;
    }

    /// Drains available entries for `self_id`, invoking `callback` on
    /// each and returning how many were delivered. For a FIFO customer
    /// this drains every currently queued entry; for a slot customer it
    /// waits up to `wait_ms` for one entry `self_id` has not yet read.
    pub fn read(
        &self,
        name: &str,
        self_id: &str,
        wait_ms: u64,
        cancel_check: impl Fn() -> bool,
        mut callback: impl FnMut(&MessageHolder),
        on_pause_change: impl FnOnce(bool),
    ) -> usize {
        let customers = self.customers.lock().expect("broker mutex poisoned");
        let Some(customer) = customers.get(name) else {
            return 0;
        };

        let delivered = match &customer.backing {
            Backing::Fifo(fifo) => fifo.read_clear_forward(|holder| {
                callback(holder);
                true
            }),
            Backing::Slot(slot) => match slot.read(self_id, wait_ms, cancel_check) {
                Some(holder) => {
                    callback(&holder);
                    1
                }
                None => 0,
            },
        };

        if delivered > 0 {
            let n = customer
                .in_flight
                .fetch_sub(delivered as u32, Ordering::SeqCst)
                .saturating_sub(delivered as u32);
            self.maybe_signal(customer, n, on_pause_change);
        }
        return delivered;
    }

    /// Non-blocking variant of [`Broker::read`] (§4.2 `poll`).
    pub fn poll(&self, name: &str, self_id: &str, mut callback: impl FnMut(&MessageHolder), on_pause_change: impl FnOnce(bool)) -> usize {
        return self.read(name, self_id, 0, || true, &mut callback, on_pause_change);
    }

    fn maybe_signal(&self, customer: &Customer, in_flight: u32, on_pause_change: impl FnOnce(bool)) {
        if !customer.ratelimit_active.load(Ordering::SeqCst) {
            return;
        }

        let was_paused = customer.paused.load(Ordering::SeqCst);
        if !was_paused && in_flight > self.ratelimit.threshold {
            customer.paused.store(true, Ordering::SeqCst);
            on_pause_change(true);
        } else if was_paused && in_flight < self.ratelimit.release {
            customer.paused.store(false, Ordering::SeqCst);
            on_pause_change(false);
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rrr_types::{Array, Message, MessageClass};
    use std::sync::atomic::AtomicUsize;

    fn holder(timestamp: u64) -> MessageHolder {
        let message = Message::new(timestamp, MessageClass::Msg, Array::new());
        MessageHolder::new(message, None, crate::holder::Protocol::Tcp)
    }

    #[test]
    fn fifo_customer_round_trips_in_order() {
        let broker = Broker::new();
        broker.register_fifo_customer("sensors");

        assert!(broker.write("sensors", holder(1), 0, || false, |_| {}));
        assert!(broker.write("sensors", holder(2), 0, || false, |_| {}));
        assert_eq!(broker.in_flight("sensors"), Some(2));

        let mut seen = Vec::new();
        let delivered = broker.read("sensors", "only-reader", 0, || false, |h| seen.push(h.lock().message().timestamp), |_| {});

        assert_eq!(delivered, 2);
        assert_eq!(seen, vec![1, 2]);
        assert_eq!(broker.in_flight("sensors"), Some(0));
    }

    #[test]
    fn slot_customer_broadcasts_to_all_readers() {
        let broker = Broker::new();
        broker.register_slot_customer("latest", &["a", "b"]);

        assert!(broker.write("latest", holder(7), 100, || false, |_| {}));
        assert_eq!(broker.in_flight("latest"), Some(1));

        let mut a_seen = None;
        broker.read("latest", "a", 0, || false, |h| a_seen = Some(h.lock().message().timestamp), |_| {});
        assert_eq!(a_seen, Some(7));
        assert_eq!(broker.in_flight("latest"), Some(1), "still in flight until the last reader observes it");

        let mut b_seen = None;
        broker.read("latest", "b", 0, || false, |h| b_seen = Some(h.lock().message().timestamp), |_| {});
        assert_eq!(b_seen, Some(7));
        assert_eq!(broker.in_flight("latest"), Some(0));
    }

    #[test]
    fn crossing_threshold_and_release_signals_pause_then_resume() {
        let broker = Broker::with_ratelimit(RatelimitParams { threshold: 2, release: 1 });
        broker.register_fifo_customer("bursty");

        let pause_events = AtomicUsize::new(0);
        let resume_events = AtomicUsize::new(0);

        for ts in 0..3 {
            broker.write("bursty", holder(ts), 0, || false, |paused| {
                if paused {
                    pause_events.fetch_add(1, Ordering::SeqCst);
                } else {
                    resume_events.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
        assert_eq!(pause_events.load(Ordering::SeqCst), 1, "pause requested exactly once when crossing the threshold");

        // drain down below the release mark.
        broker.read("bursty", "r", 0, || false, |_| {}, |paused| {
            assert!(!paused);
            resume_events.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(resume_events.load(Ordering::SeqCst), 1, "resume requested once the in-flight count drops below release");
    }

    #[test]
    fn ratelimit_can_be_disabled() {
        let broker = Broker::with_ratelimit(RatelimitParams { threshold: 0, release: 0 });
        broker.register_fifo_customer("quiet");
        broker.set_ratelimit("quiet", false);

        let mut signalled = false;
        broker.write("quiet", holder(1), 0, || false, |_| signalled = true);
        assert!(!signalled, "no pause signal once ratelimit is disabled for this customer");
    }
}
