//! Send-side QoS 1/2 state tracking, generalized into the hooks the
//! session storage engine interface names: `iterate_send_queue` walks the
//! lists built here to decide what needs a retry, `heartbeat` drives
//! [`AtLeastOncePacket::should_retry`] / [`ExactlyOncePacket::should_retry`]
//! (§4.4).

use std::time::Duration;

use crate::packet::Packet;

/// Abstraction over a monotonic clock so tests can supply a fake one
/// without sleeping.
pub trait Instant: Ord + Copy {
    fn now() -> Self;
    fn duration_since(&self, earlier: &Self) -> Duration;
}

impl Instant for std::time::Instant {
    fn now() -> Self {
        std::time::Instant::now()
    }

    fn duration_since(&self, earlier: &Self) -> Duration {
        (*self).duration_since(*earlier)
    }
}

/// Retry-delay policy consulted after every unacknowledged attempt.
pub trait ExponentialBackoff: Default + Clone {
    fn inner(&self) -> Duration;
    fn exponential(&self) -> Duration;
    fn set_duration(&mut self, dur: Duration);
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RetryDuration {
    dur: Duration,
}

impl Default for RetryDuration {
    fn default() -> Self {
        return Self { dur: Duration::from_millis(200) };
    }
}

impl ExponentialBackoff for RetryDuration {
    fn inner(&self) -> Duration {
        self.dur
    }

    fn exponential(&self) -> Duration {
        self.dur.checked_mul(2).unwrap_or(Duration::MAX)
    }

    fn set_duration(&mut self, dur: Duration) {
        self.dur = dur;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QosOneStage {
    Origin,
    Published,
    Acked,
}

/// One in-flight QoS 1 publish, tracked from the moment it was sent
/// until its PUBACK arrives.
#[derive(Clone, Debug)]
pub struct AtLeastOncePacket<I: Instant, B: ExponentialBackoff> {
    packet: Packet,
    id: u16,
    stage: QosOneStage,
    last_sent: I,
    retry_duration: B,
}

impl<I: Instant, B: ExponentialBackoff> AtLeastOncePacket<I, B> {
    pub fn origin(packet: Packet, id: u16) -> Self {
        return Self {
            packet,
            id,
            stage: QosOneStage::Origin,
            last_sent: I::now(),
            retry_duration: B::default(),
        };
    }

    pub fn acknowledge(&mut self) {
        self.last_sent = I::now();
        self.stage = QosOneStage::Acked;
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn stage(&self) -> QosOneStage {
        self.stage
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    pub fn is_timed_out(&self) -> bool {
        I::now().duration_since(&self.last_sent) > self.retry_duration.inner()
    }

    pub fn should_retry(&self) -> bool {
        matches!(self.stage, QosOneStage::Origin) && self.is_timed_out()
    }

    pub fn update_retry_duration(&mut self) {
        let next = self.retry_duration.exponential();
        self.retry_duration.set_duration(next);
        self.last_sent = I::now();
    }
}

/// Tracks every QoS 1 publish a session has outstanding; `clean` drains
/// acknowledged entries so the list only ever holds live retries.
#[derive(Clone, Debug)]
pub struct AtLeastOnceList<I: Instant, B: ExponentialBackoff> {
    inner: Vec<AtLeastOncePacket<I, B>>,
}

impl<I: Instant, B: ExponentialBackoff> AtLeastOnceList<I, B> {
    pub fn new() -> Self {
        return Self { inner: Vec::new() };
    }

    pub fn origin(&mut self, packet: Packet, id: u16) {
        self.inner.push(AtLeastOncePacket::origin(packet, id));
    }

    pub fn acknowledge(&mut self, id: u16) {
        for entry in self.inner.iter_mut() {
            if entry.id == id {
                entry.acknowledge();
            }
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, AtLeastOncePacket<I, B>> {
        self.inner.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, AtLeastOncePacket<I, B>> {
        self.inner.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Removes every acknowledged entry, returning their ids for
    /// [`crate::id::IdGenerator::free_id`].
    pub fn clean(&mut self) -> Vec<u16> {
        let mut freed = Vec::new();
        self.inner.retain(|entry| {
            if entry.stage == QosOneStage::Acked {
                freed.push(entry.id);
                return false;
            }
            return true;
        });
        return freed;
    }
}

impl<I: Instant, B: ExponentialBackoff> Default for AtLeastOnceList<I, B> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QosTwoStage {
    Origin,
    Published,
    Received,
    Released,
    Completed,
}

/// One in-flight QoS 2 exchange, tracked through PUBLISH → PUBREC →
/// PUBREL → PUBCOMP.
#[derive(Clone, Debug)]
pub struct ExactlyOncePacket<I: Instant, B: ExponentialBackoff> {
    packet: Packet,
    id: u16,
    stage: QosTwoStage,
    last_sent: I,
    retry_duration: B,
}

impl<I: Instant, B: ExponentialBackoff> ExactlyOncePacket<I, B> {
    pub fn origin(packet: Packet, id: u16) -> Self {
        return Self {
            packet,
            id,
            stage: QosTwoStage::Origin,
            last_sent: I::now(),
            retry_duration: B::default(),
        };
    }

    /// Advances `Origin -> Received` on PUBREC.
    pub fn receive(&mut self) -> bool {
        if self.stage != QosTwoStage::Origin {
            return false;
        }
        self.stage = QosTwoStage::Received;
        self.last_sent = I::now();
        return true;
    }

    /// Advances `Received -> Completed` on PUBCOMP.
    pub fn complete(&mut self) -> bool {
        if self.stage != QosTwoStage::Received {
            return false;
        }
        self.stage = QosTwoStage::Completed;
        self.last_sent = I::now();
        return true;
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn stage(&self) -> QosTwoStage {
        self.stage
    }

    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    pub fn is_timed_out(&self) -> bool {
        I::now().duration_since(&self.last_sent) > self.retry_duration.inner()
    }

    pub fn should_retry(&self) -> bool {
        matches!(self.stage, QosTwoStage::Origin | QosTwoStage::Received) && self.is_timed_out()
    }
}

#[derive(Clone, Debug)]
pub struct ExactlyOnceList<I: Instant, B: ExponentialBackoff> {
    inner: Vec<ExactlyOncePacket<I, B>>,
}

impl<I: Instant, B: ExponentialBackoff> ExactlyOnceList<I, B> {
    pub fn new() -> Self {
        return Self { inner: Vec::new() };
    }

    pub fn origin(&mut self, packet: Packet, id: u16) {
        self.inner.push(ExactlyOncePacket::origin(packet, id));
    }

    pub fn receive(&mut self, id: u16) -> bool {
        self.inner.iter_mut().find(|entry| entry.id == id).map(|entry| entry.receive()).unwrap_or(false)
    }

    pub fn complete(&mut self, id: u16) -> bool {
        self.inner.iter_mut().find(|entry| entry.id == id).map(|entry| entry.complete()).unwrap_or(false)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExactlyOncePacket<I, B>> {
        self.inner.iter()
    }

    pub fn clean(&mut self) -> Vec<u16> {
        let mut freed = Vec::new();
        self.inner.retain(|entry| {
            if entry.stage == QosTwoStage::Completed {
                freed.push(entry.id);
                return false;
            }
            return true;
        });
        return freed;
    }
}

impl<I: Instant, B: ExponentialBackoff> Default for ExactlyOnceList<I, B> {
    fn default() -> Self {
        Self::new()
    }
}
