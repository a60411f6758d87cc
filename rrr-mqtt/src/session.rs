use std::collections::{HashMap, VecDeque};

use crate::err::SessionOutcome;
use crate::msg_assurance::{AtLeastOnceList, ExactlyOnceList, RetryDuration};
use crate::packet::{Packet, PacketType};
use crate::subscription::SubscriptionCollection;

type AtLeastOnce = AtLeastOnceList<std::time::Instant, RetryDuration>;
type ExactlyOnce = ExactlyOnceList<std::time::Instant, RetryDuration>;

/// Pluggable session storage engine interface (§4.4): every operation
/// returns a [`SessionOutcome`]; `Deleted` returned from anywhere except a
/// DISCONNECT handler is a fatal session-loss condition the caller must
/// treat as destroying the connection.
pub trait SessionStorageEngine: Send {
    fn get_session(&mut self, client_id: &str) -> SessionOutcome;
    fn delete_session(&mut self, client_id: &str) -> SessionOutcome;
    fn receive_packet(&mut self, client_id: &str, packet: Packet) -> SessionOutcome;
    fn send_packet(&mut self, client_id: &str, out: Packet) -> SessionOutcome;
    fn iterate_send_queue(&mut self, client_id: &str, visit: &mut dyn FnMut(&Packet)) -> SessionOutcome;
    fn heartbeat(&mut self, client_id: &str) -> SessionOutcome;
    fn notify_disconnect(&mut self, client_id: &str) -> SessionOutcome;
    fn iterate_and_clear_local_delivery(&mut self, client_id: &str, visit: &mut dyn FnMut(Packet)) -> SessionOutcome;
    fn will_publish(&mut self, client_id: &str) -> Option<Packet>;
}

/// One client's persisted state: subscriptions, in-flight QoS 1/2
/// exchanges, queued local deliveries and an optional will.
pub struct Session {
    pub subscriptions: SubscriptionCollection,
    pub at_least_once: AtLeastOnce,
    pub exactly_once: ExactlyOnce,
    pub local_delivery: VecDeque<Packet>,
    pub will: Option<Packet>,
    pub connected: bool,
}

impl Session {
    fn new() -> Self {
        return Self {
            subscriptions: SubscriptionCollection::new(),
            at_least_once: AtLeastOnce::new(),
            exactly_once: ExactlyOnce::new(),
            local_delivery: VecDeque::new(),
            will: None,
            connected: true,
        };
    }
}

/// Default, in-process session storage engine. Real deployments swap
/// this for a persistent engine behind the same trait; this one holds
/// everything in a `HashMap` keyed by client id.
#[derive(Default)]
pub struct InMemorySessionEngine {
    sessions: HashMap<String, Session>,
}

impl InMemorySessionEngine {
    pub fn new() -> Self {
        return Self { sessions: HashMap::new() };
    }

    pub fn session(&self, client_id: &str) -> Option<&Session> {
        self.sessions.get(client_id)
    }

    pub fn session_mut(&mut self, client_id: &str) -> Option<&mut Session> {
        self.sessions.get_mut(client_id)
    }

    pub fn set_will(&mut self, client_id: &str, will: Packet) {
        if let Some(session) = self.sessions.get_mut(client_id) {
            session.will = Some(will);
        }
    }
}

impl SessionStorageEngine for InMemorySessionEngine {
    fn get_session(&mut self, client_id: &str) -> SessionOutcome {
        self.sessions.entry(client_id.to_string()).or_insert_with(Session::new);
        return SessionOutcome::Ok;
    }

    fn delete_session(&mut self, client_id: &str) -> SessionOutcome {
        return match self.sessions.remove(client_id) {
            Some(_) => SessionOutcome::Deleted,
            None => SessionOutcome::SessionError,
        };
    }

    /// For PUBACK/PUBCOMP/PUBREC this advances the matching QoS 1/2 entry
    /// and reports `SessionError` when the packet id wasn't tracked
    /// ("old stale ACKs are tolerated", §4.4 — the caller decides whether
    /// that's fatal). Any other packet type is queued for local delivery.
    fn receive_packet(&mut self, client_id: &str, packet: Packet) -> SessionOutcome {
        let Some(session) = self.sessions.get_mut(client_id) else {
            return SessionOutcome::SessionError;
        };

        match packet.kind {
            PacketType::Puback => {
                let id = packet.packet_id.unwrap_or(0);
                let tracked = session.at_least_once.iter().any(|entry| entry.id() == id);
                session.at_least_once.acknowledge(id);
                return if tracked { SessionOutcome::Ok } else { SessionOutcome::SessionError };
            }
            PacketType::Pubcomp => {
                let id = packet.packet_id.unwrap_or(0);
                let tracked = session.exactly_once.iter().any(|entry| entry.id() == id);
                session.exactly_once.complete(id);
                return if tracked { SessionOutcome::Ok } else { SessionOutcome::SessionError };
            }
            PacketType::Pubrec => {
                let id = packet.packet_id.unwrap_or(0);
                return if session.exactly_once.receive(id) { SessionOutcome::Ok } else { SessionOutcome::SessionError };
            }
            _ => {
                session.local_delivery.push_back(packet);
                return SessionOutcome::Ok;
            }
        }
    }

    /// Registers a freshly originated QoS 1/2 PUBLISH for retry tracking.
    /// Other outbound packet types (acks, SUBACK, ...) need no bookkeeping
    /// here since nothing further is expected back for them.
    fn send_packet(&mut self, client_id: &str, out: Packet) -> SessionOutcome {
        let Some(session) = self.sessions.get_mut(client_id) else {
            return SessionOutcome::SessionError;
        };

        if out.kind == PacketType::Publish {
            if let (Some(id), Some(qos)) = (out.packet_id, out.qos) {
                match qos {
                    crate::qos::QosLevel::AtLeastOnce => session.at_least_once.origin(out, id),
                    crate::qos::QosLevel::ExactlyOnce => session.exactly_once.origin(out, id),
                    crate::qos::QosLevel::AtMostOnce => {}
                }
            }
        }
        return SessionOutcome::Ok;
    }

    fn iterate_send_queue(&mut self, client_id: &str, visit: &mut dyn FnMut(&Packet)) -> SessionOutcome {
        let Some(session) = self.sessions.get_mut(client_id) else {
            return SessionOutcome::SessionError;
        };
        for entry in session.at_least_once.iter() {
            if entry.should_retry() {
                visit(entry.packet());
            }
        }
        for entry in session.exactly_once.iter() {
            if entry.should_retry() {
                visit(entry.packet());
            }
        }
        return SessionOutcome::Ok;
    }

    fn heartbeat(&mut self, client_id: &str) -> SessionOutcome {
        let Some(session) = self.sessions.get_mut(client_id) else {
            return SessionOutcome::SessionError;
        };
        for entry in session.at_least_once.iter_mut() {
            if entry.should_retry() {
                entry.update_retry_duration();
            }
        }
        session.at_least_once.clean();
        session.exactly_once.clean();
        return SessionOutcome::Ok;
    }

    fn notify_disconnect(&mut self, client_id: &str) -> SessionOutcome {
        let Some(session) = self.sessions.get_mut(client_id) else {
            return SessionOutcome::SessionError;
        };
        session.connected = false;
        return SessionOutcome::Ok;
    }

    fn iterate_and_clear_local_delivery(&mut self, client_id: &str, visit: &mut dyn FnMut(Packet)) -> SessionOutcome {
        let Some(session) = self.sessions.get_mut(client_id) else {
            return SessionOutcome::SessionError;
        };
        while let Some(packet) = session.local_delivery.pop_front() {
            visit(packet);
        }
        return SessionOutcome::Ok;
    }

    fn will_publish(&mut self, client_id: &str) -> Option<Packet> {
        self.sessions.get_mut(client_id).and_then(|session| session.will.take())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;

    #[test]
    fn unknown_client_reports_session_error() {
        let mut engine = InMemorySessionEngine::new();
        assert_eq!(engine.receive_packet("ghost", Packet::new(PacketType::Publish)), SessionOutcome::SessionError);
    }

    #[test]
    fn delete_is_reported_as_deleted_not_ok() {
        let mut engine = InMemorySessionEngine::new();
        engine.get_session("c1");
        assert_eq!(engine.delete_session("c1"), SessionOutcome::Deleted);
    }

    #[test]
    fn will_publish_is_consumed_once() {
        let mut engine = InMemorySessionEngine::new();
        engine.get_session("c1");
        engine.set_will("c1", Packet::new(PacketType::Publish).with_topic("lwt"));

        assert!(engine.will_publish("c1").is_some());
        assert!(engine.will_publish("c1").is_none());
    }

    #[test]
    fn local_delivery_drains_in_fifo_order() {
        let mut engine = InMemorySessionEngine::new();
        engine.get_session("c1");
        engine.receive_packet("c1", Packet::new(PacketType::Publish).with_topic("a"));
        engine.receive_packet("c1", Packet::new(PacketType::Publish).with_topic("b"));

        let mut seen = Vec::new();
        engine.iterate_and_clear_local_delivery("c1", &mut |p| seen.push(p.topic.unwrap()));
        assert_eq!(seen, vec!["a", "b"]);
    }
}
