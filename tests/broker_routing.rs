//! Cross-crate broker routing scenarios (spec.md §8 S2, property 3 and 4):
//! a `rrr_types::Message` travels through a `rrr_broker::Broker` customer
//! exactly the way a producer instance hands it to a reader instance in
//! the §2 data-flow description.

use rrr_broker::{Broker, MessageHolder, Protocol};
use rrr_types::{Array, Message, MessageClass};

fn sample_holder(topic: &str) -> MessageHolder {
    let message = Message::new(1, MessageClass::Msg, Array::new()).with_topic(topic);
    return MessageHolder::new(message, None, Protocol::Tcp);
}

/// S2: a slot configured for two readers delivers the same value to each,
/// clearing only after the second has observed it.
#[test]
fn slot_broadcasts_to_every_registered_reader_then_clears() {
    let broker = Broker::new();
    broker.register_slot_customer("topics", &["A", "B"]);

    let accepted = broker.write("topics", sample_holder("t"), 0, || true, |_| {});
    assert!(accepted);

    let mut seen_a = Vec::new();
    let delivered_a = broker.read("topics", "A", 0, || true, |h| seen_a.push(h.lock().message().topic.clone()), |_| {});
    assert_eq!(delivered_a, 1);
    assert_eq!(seen_a, vec![Some("t".to_string())]);

    // Writer's next write would block if the slot hadn't been held open for B,
    // so the second write must be rejected at wait_ms=0 while B hasn't read yet.
    let rejected = broker.write("topics", sample_holder("t2"), 0, || true, |_| {});
    assert!(!rejected, "slot must still be occupied until reader B has observed it");

    let mut seen_b = Vec::new();
    let delivered_b = broker.read("topics", "B", 0, || true, |h| seen_b.push(h.lock().message().topic.clone()), |_| {});
    assert_eq!(delivered_b, 1);
    assert_eq!(seen_b, vec![Some("t".to_string())]);

    // Now that both registered readers have observed the entry, the slot is
    // clear and the writer's next write proceeds without waiting.
    let accepted_again = broker.write("topics", sample_holder("t2"), 0, || true, |_| {});
    assert!(accepted_again);
}

/// S4 (FIFO variant) / property 4: a single-producer FIFO preserves
/// write order across a read-clear-forward drain.
#[test]
fn fifo_customer_preserves_write_order_across_drain() {
    let broker = Broker::new();
    broker.register_fifo_customer("log");

    for i in 0..5u64 {
        let message = Message::new(i, MessageClass::Msg, Array::new()).with_topic(format!("t/{i}"));
        let holder = MessageHolder::new(message, None, Protocol::Tcp);
        assert!(broker.write("log", holder, 0, || true, |_| {}));
    }

    let mut seen = Vec::new();
    let delivered = broker.read("log", "reader", 0, || true, |h| seen.push(h.lock().message().timestamp), |_| {});

    assert_eq!(delivered, 5);
    assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    assert_eq!(broker.in_flight("log"), Some(0));
}

/// Property 5 / ref-counting: `clone_under_lock` plus a matching pair of
/// `decref`s frees the underlying storage exactly once, observable via the
/// strong-count contract `Arc` already gives `MessageHolder`.
#[test]
fn clone_under_lock_is_independently_dropped() {
    let original = sample_holder("t");
    let cloned = original.clone_under_lock();

    assert_eq!(original.lock().message().topic, cloned.lock().message().topic);

    drop(original);
    // `cloned` still owns its own copy of the message bytes/address; dropping
    // the original must not have invalidated it.
    assert_eq!(cloned.lock().message().topic, Some("t".to_string()));
}
