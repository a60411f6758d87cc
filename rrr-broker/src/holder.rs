use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use rrr_types::{topic_match, Message};

/// Wire protocol a holder arrived over or should be sent over.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
}

struct HolderInner {
    message: Message,
    addr: Option<SocketAddr>,
    protocol: Protocol,
    send_time: u64,
    /// Number of readers that still owe this holder an observation. Decremented
    /// as each registered reader of the slot/FIFO it travels through consumes
    /// it; independent of the `Arc` strong count, which tracks *handles* to
    /// this holder rather than outstanding logical deliveries.
    usercount: u32,
}

/// Ref-counted, individually-lockable envelope around a message plus its
/// source address and protocol (§3 Message holder, §4.2).
///
/// `incref`/`decref` are realized as `Arc` clone/drop; a mutation must go
/// through [`MessageHolder::lock`], which is the only way to obtain a
/// `&mut HolderInner` and therefore enforces "locked for any mutation"
/// at the type boundary (§9 Design Notes).
#[derive(Clone)]
pub struct MessageHolder(Arc<Mutex<HolderInner>>);

impl MessageHolder {
    pub fn new(message: Message, addr: Option<SocketAddr>, protocol: Protocol) -> Self {
        return Self(Arc::new(Mutex::new(HolderInner {
            message,
            addr,
            protocol,
            send_time: 0,
            usercount: 1,
        })));
    }

    /// Bumps the holder's reference count and returns a new handle sharing
    /// the same underlying storage.
    pub fn incref(&self) -> Self {
        return self.clone();
    }

    /// Drops this handle's reference. Storage is freed once the last
    /// handle is dropped (standard `Arc` semantics).
    pub fn decref(self) {
        drop(self);
    }

    pub fn ref_count(&self) -> usize {
        return Arc::strong_count(&self.0);
    }

    pub fn lock(&self) -> MutexGuard<'_, HolderInner> {
        return self.0.lock().expect("message holder mutex poisoned");
    }

    /// Copies the message bytes and address into an independently owned
    /// holder while holding this holder's lock, per §4.2 `clone_under_lock`.
    pub fn clone_under_lock(&self) -> Self {
        let guard = self.lock();
        return Self(Arc::new(Mutex::new(HolderInner {
            message: guard.message.clone(),
            addr: guard.addr,
            protocol: guard.protocol,
            send_time: guard.send_time,
            usercount: 1,
        })));
    }

    /// Tokenizes `filter` and matches it against this holder's message
    /// topic (§4.2). A holder with no topic never matches.
    pub fn topic_match(&self, filter: &str) -> bool {
        let guard = self.lock();
        match guard.message.topic.as_deref() {
            Some(topic) => topic_match(topic, filter),
            None => false,
        }
    }
}

impl HolderInner {
    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn addr(&self) -> Option<SocketAddr> {
        self.addr
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn send_time(&self) -> u64 {
        self.send_time
    }

    pub fn set_send_time(&mut self, send_time: u64) {
        self.send_time = send_time;
    }

    pub fn usercount(&self) -> u32 {
        self.usercount
    }

    pub fn set_usercount(&mut self, usercount: u32) {
        self.usercount = usercount;
    }
}
