use crate::err::SessionOutcome;
use crate::packet::{Packet, PacketType, ProtocolVersion};
use crate::properties::{parse_properties, validate_properties};
use crate::qos::QosLevel;
use crate::session::SessionStorageEngine;

/// Reason codes this handler set actually produces (§4.4 packet
/// handlers). Not the full MQTT 5 registry — only what the dispatch
/// logic below needs to report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum ReasonCode {
    Success = 0x00,
    UnspecifiedError = 0x80,
    MalformedPacket = 0x81,
    ProtocolError = 0x82,
    PacketIdentifierNotFound = 0x92,
}

/// Result of dispatching one inbound packet: zero or more packets to send
/// back, whether the connection should close, and the protocol version
/// the CONNECT packet pinned down (if this packet was a CONNECT).
#[derive(Default)]
pub struct HandleOutcome {
    pub to_send: Vec<Packet>,
    pub close: bool,
    pub protocol_version: Option<ProtocolVersion>,
}

impl HandleOutcome {
    fn send(packet: Packet) -> Self {
        return Self {
            to_send: vec![packet],
            close: false,
            protocol_version: None,
        };
    }

    fn closing() -> Self {
        return Self {
            to_send: Vec::new(),
            close: true,
            protocol_version: None,
        };
    }

    fn nothing() -> Self {
        return Self::default();
    }
}

/// Dispatches one packet already known to belong to `client_id`'s
/// connection, applying the PUBLISH/PUBACK/PUBREC/PUBREL/PUBCOMP/
/// DISCONNECT rules of §4.4.
pub fn handle_packet(version: ProtocolVersion, engine: &mut dyn SessionStorageEngine, client_id: &str, packet: Packet) -> HandleOutcome {
    match packet.kind {
        PacketType::Publish => handle_publish(version, engine, client_id, packet),
        PacketType::Puback | PacketType::Pubcomp => handle_simple_ack(engine, client_id, packet),
        PacketType::Pubrec => handle_pubrec(version, engine, client_id, packet),
        PacketType::Pubrel => handle_pubrel(engine, client_id, packet),
        PacketType::Disconnect => {
            engine.notify_disconnect(client_id);
            return HandleOutcome::closing();
        }
        _ => HandleOutcome::nothing(),
    }
}

fn handle_publish(version: ProtocolVersion, engine: &mut dyn SessionStorageEngine, client_id: &str, packet: Packet) -> HandleOutcome {
    let qos = packet.qos.unwrap_or(QosLevel::AtMostOnce);

    let malformed = if version == ProtocolVersion::V5 {
        let mut body = packet.body.clone();
        match parse_properties(&mut body).and_then(|props| validate_properties(props).map_err(|(_, e)| e)) {
            Ok(_) => false,
            Err(_) => true,
        }
    } else {
        false
    };

    if malformed {
        if qos == QosLevel::AtMostOnce {
            return HandleOutcome::closing();
        }
        let ack_kind = if qos == QosLevel::AtLeastOnce { PacketType::Puback } else { PacketType::Pubrec };
        let mut ack = Packet::new(ack_kind).with_reason_code(ReasonCode::MalformedPacket as u8);
        if let Some(id) = packet.packet_id {
            ack = ack.with_packet_id(id);
        }
        return HandleOutcome::send(ack);
    }

    let packet_id = packet.packet_id;
    engine.receive_packet(client_id, packet);

    match qos {
        QosLevel::AtMostOnce => HandleOutcome::nothing(),
        QosLevel::AtLeastOnce => {
            let mut ack = Packet::new(PacketType::Puback).with_reason_code(ReasonCode::Success as u8);
            if let Some(id) = packet_id {
                ack = ack.with_packet_id(id);
            }
            HandleOutcome::send(ack)
        }
        QosLevel::ExactlyOnce => {
            let mut ack = Packet::new(PacketType::Pubrec).with_reason_code(ReasonCode::Success as u8);
            if let Some(id) = packet_id {
                ack = ack.with_packet_id(id);
            }
            HandleOutcome::send(ack)
        }
    }
}

/// PUBACK and PUBCOMP share the "notify session; tolerate stale acks"
/// behavior (§4.4): an unknown id is reported but never closes the
/// connection.
fn handle_simple_ack(engine: &mut dyn SessionStorageEngine, client_id: &str, packet: Packet) -> HandleOutcome {
    if engine.receive_packet(client_id, packet) == SessionOutcome::SessionError {
        log::debug!("{client_id}: PACKET_IDENTIFIER_NOT_FOUND for a stale ack, continuing");
    }
    return HandleOutcome::nothing();
}

fn handle_pubrec(version: ProtocolVersion, engine: &mut dyn SessionStorageEngine, client_id: &str, packet: Packet) -> HandleOutcome {
    let id = packet.packet_id.unwrap_or(0);
    let known = engine.receive_packet(client_id, packet) == SessionOutcome::Ok;

    if !known {
        if version == ProtocolVersion::V5 {
            let pubrel = Packet::new(PacketType::Pubrel).with_reason_code(ReasonCode::PacketIdentifierNotFound as u8).with_packet_id(id);
            return HandleOutcome::send(pubrel);
        }
        return HandleOutcome::closing();
    }

    let pubrel = Packet::new(PacketType::Pubrel).with_reason_code(ReasonCode::Success as u8).with_packet_id(id);
    return HandleOutcome::send(pubrel);
}

fn handle_pubrel(engine: &mut dyn SessionStorageEngine, client_id: &str, packet: Packet) -> HandleOutcome {
    let id = packet.packet_id.unwrap_or(0);
    engine.receive_packet(client_id, packet);

    let pubcomp = Packet::new(PacketType::Pubcomp).with_reason_code(ReasonCode::Success as u8).with_packet_id(id);
    return HandleOutcome::send(pubcomp);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::InMemorySessionEngine;

    fn engine_with_session(client_id: &str) -> InMemorySessionEngine {
        let mut engine = InMemorySessionEngine::new();
        engine.get_session(client_id);
        return engine;
    }

    #[test]
    fn qos0_malformed_v5_publish_closes_the_connection() {
        let mut engine = engine_with_session("c1");
        // MaximumQos (0x24) with value 3: out of its valid 0-2 range.
        let body = bytes::Bytes::from_static(&[0x24, 0x03]);
        let packet = Packet::new(PacketType::Publish).with_qos(QosLevel::AtMostOnce).with_body(body);
        let outcome = handle_publish(ProtocolVersion::V5, &mut engine, "c1", packet);
        assert!(outcome.close);
    }

    #[test]
    fn qos1_publish_is_acknowledged_with_original_id() {
        let mut engine = engine_with_session("c1");
        let packet = Packet::new(PacketType::Publish).with_qos(QosLevel::AtLeastOnce).with_packet_id(42);
        let outcome = handle_publish(ProtocolVersion::V311, &mut engine, "c1", packet);

        assert_eq!(outcome.to_send.len(), 1);
        assert_eq!(outcome.to_send[0].kind, PacketType::Puback);
        assert_eq!(outcome.to_send[0].packet_id, Some(42));
    }

    #[test]
    fn pubrel_always_answers_with_pubcomp() {
        let mut engine = engine_with_session("c1");
        let packet = Packet::new(PacketType::Pubrel).with_packet_id(7);
        let outcome = handle_pubrel(&mut engine, "c1", packet);
        assert_eq!(outcome.to_send[0].kind, PacketType::Pubcomp);
        assert_eq!(outcome.to_send[0].packet_id, Some(7));
    }

    #[test]
    fn disconnect_closes_without_a_reply() {
        let mut engine = engine_with_session("c1");
        let packet = Packet::new(PacketType::Disconnect);
        let outcome = handle_packet(ProtocolVersion::V311, &mut engine, "c1", packet);
        assert!(outcome.close);
        assert!(outcome.to_send.is_empty());
    }
}
