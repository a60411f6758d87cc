//! MQTT 3.1.1/5 wire codec: fixed-header framing (packet type/flags byte
//! plus variable-byte-integer remaining length) and per-type
//! variable-header/payload encode+decode, producing and consuming the
//! reduced [`Packet`] shape the rest of this crate operates on (§6 "MQTT
//! on the wire").

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::err::{DecodeError, DecodeErrorKind, EncodeError, EncodeErrorKind};
use crate::packet::{Packet, PacketType, ProtocolVersion};
use crate::properties::{self, decode_variable_byte_integer, encode_variable_byte_integer, parse_properties};
use crate::qos::QosLevel;

/// Fixed header: packet type + flags nibble, and the remaining length
/// (the byte count of everything following the fixed header).
#[derive(Clone, Copy, Debug)]
struct FixedHeader {
    kind: PacketType,
    flags: u8,
    remaining_length: usize,
    /// Bytes occupied by the type byte + the encoded remaining length.
    header_len: usize,
}

/// Reads a variable-byte-integer remaining length from `rest` without
/// consuming it. Returns `Ok(None)` if `rest` ends before the
/// continuation bit clears (the caller hasn't read enough bytes yet);
/// `Err` if it runs past the 4-byte limit (§6, §2.2.3 of the MQTT spec).
fn try_decode_remaining_length(rest: &[u8]) -> Result<Option<(usize, usize)>, DecodeError> {
    let mut value: usize = 0;
    let mut multiplier: usize = 1;

    for i in 0..4 {
        let Some(&byte) = rest.get(i) else {
            return Ok(None);
        };
        value += (byte & 0x7f) as usize * multiplier;
        if byte & 0x80 == 0 {
            return Ok(Some((i + 1, value)));
        }
        multiplier *= 128;
    }

    return Err(DecodeError::new(
        DecodeErrorKind::MalformedLength,
        String::from("remaining length field exceeds 4 bytes"),
    ));
}

/// Peeks the fixed header at the front of `buf` without consuming
/// anything. Returns `Ok(None)` when `buf` doesn't yet hold a complete
/// fixed header.
fn peek_fixed_header(buf: &[u8]) -> Result<Option<FixedHeader>, DecodeError> {
    let Some(&type_byte) = buf.first() else {
        return Ok(None);
    };

    let kind = PacketType::try_from(type_byte >> 4)?;
    let flags = type_byte & 0x0f;

    let Some((len_len, remaining_length)) = try_decode_remaining_length(&buf[1..])? else {
        return Ok(None);
    };

    return Ok(Some(FixedHeader {
        kind,
        flags,
        remaining_length,
        header_len: 1 + len_len,
    }));
}

/// Validates a fixed header's flag nibble against the MQTT spec's
/// per-type requirements (§6): PUBLISH carries DUP/QoS/RETAIN in its
/// flags, PUBREL/SUBSCRIBE/UNSUBSCRIBE require the reserved `0b0010`
/// pattern, everything else requires all-zero flags.
fn publish_flags(flags: u8) -> Result<(bool, QosLevel, bool), DecodeError> {
    let dup = flags & 0b1000 != 0;
    let qos = QosLevel::try_from((flags >> 1) & 0b11)?;
    let retain = flags & 0b0001 != 0;
    return Ok((dup, qos, retain));
}

fn require_reserved_flags(kind: PacketType, flags: u8, expected: u8) -> Result<(), DecodeError> {
    if flags != expected {
        return Err(DecodeError::new(
            DecodeErrorKind::FlagBits,
            format!("{kind:?} requires reserved flag bits {expected:#06b}, got {flags:#06b}"),
        ));
    }
    return Ok(());
}

fn publish_flags_byte(dup: bool, qos: QosLevel, retain: bool) -> u8 {
    let mut byte = (qos as u8) << 1;
    if dup {
        byte |= 0b1000;
    }
    if retain {
        byte |= 0b0001;
    }
    return byte;
}

/// Discards a well-formed MQTT 5 property set from the front of `body`,
/// validating its structure (but not the caller's semantic constraints —
/// callers that care, like PUBLISH, re-parse and validate on their own).
fn skip_properties(body: &mut Bytes) -> Result<(), DecodeError> {
    let len = decode_variable_byte_integer(body)? as usize;
    if body.remaining() < len {
        return Err(DecodeError::new(DecodeErrorKind::MalformedLength, String::from("truncated property set")));
    }
    let mut props = body.split_to(len);
    parse_properties(&mut props)?;
    return Ok(());
}

fn get_u16(body: &mut Bytes, what: &str) -> Result<u16, DecodeError> {
    if body.remaining() < 2 {
        return Err(DecodeError::new(DecodeErrorKind::MalformedLength, format!("truncated {what}")));
    }
    return Ok(body.get_u16());
}

fn get_u8(body: &mut Bytes, what: &str) -> Result<u8, DecodeError> {
    if !body.has_remaining() {
        return Err(DecodeError::new(DecodeErrorKind::MalformedLength, format!("truncated {what}")));
    }
    return Ok(body.get_u8());
}

/// Decodes one complete MQTT packet from the front of `buf`, advancing
/// `buf` past it. Returns `Ok(None)` when `buf` doesn't yet hold a
/// complete packet — the caller should accumulate more bytes and retry,
/// matching `ConnectionCollection::tick`'s `try_read_one` contract
/// (§4.4 Connection collection).
///
/// `version` is consulted for every type except CONNECT, which carries
/// its own protocol level and determines the version for the connection
/// going forward.
pub fn decode_packet(buf: &mut Bytes, version: ProtocolVersion) -> Result<Option<Packet>, DecodeError> {
    let Some(header) = peek_fixed_header(buf)? else {
        return Ok(None);
    };

    let total = header.header_len + header.remaining_length;
    if buf.len() < total {
        return Ok(None);
    }

    buf.advance(header.header_len);
    let mut body = buf.split_to(header.remaining_length);

    let packet = decode_body(header.kind, header.flags, &mut body, version)?;
    return Ok(Some(packet));
}

fn decode_body(kind: PacketType, flags: u8, body: &mut Bytes, version: ProtocolVersion) -> Result<Packet, DecodeError> {
    let mut packet = Packet::new(kind);

    match kind {
        PacketType::Connect => decode_connect(&mut packet, flags, body)?,
        PacketType::Connack => decode_connack(&mut packet, flags, body, version)?,
        PacketType::Publish => decode_publish(&mut packet, flags, body, version)?,
        PacketType::Puback | PacketType::Pubrec | PacketType::Pubcomp => {
            require_reserved_flags(kind, flags, 0)?;
            decode_simple_ack(&mut packet, body, version)?;
        }
        PacketType::Pubrel => {
            require_reserved_flags(kind, flags, 0b0010)?;
            decode_simple_ack(&mut packet, body, version)?;
        }
        PacketType::Subscribe => {
            require_reserved_flags(kind, flags, 0b0010)?;
            decode_packet_id_then_properties(&mut packet, body, version)?;
        }
        PacketType::Unsubscribe => {
            require_reserved_flags(kind, flags, 0b0010)?;
            decode_packet_id_then_properties(&mut packet, body, version)?;
        }
        PacketType::Suback | PacketType::Unsuback => {
            require_reserved_flags(kind, flags, 0)?;
            decode_packet_id_then_properties(&mut packet, body, version)?;
        }
        PacketType::Pingreq | PacketType::Pingresp => {
            require_reserved_flags(kind, flags, 0)?;
            if body.has_remaining() {
                return Err(DecodeError::new(DecodeErrorKind::MalformedLength, format!("{kind:?} must have no payload")));
            }
        }
        PacketType::Disconnect => {
            require_reserved_flags(kind, flags, 0)?;
            decode_reason_with_properties(&mut packet, body, version)?;
        }
        PacketType::Auth => {
            require_reserved_flags(kind, flags, 0)?;
            if version != ProtocolVersion::V5 {
                return Err(DecodeError::new(DecodeErrorKind::MalformedPacket, String::from("AUTH is only valid under MQTT 5")));
            }
            decode_reason_with_properties(&mut packet, body, version)?;
        }
    }

    return Ok(packet);
}

fn decode_connect(packet: &mut Packet, flags: u8, body: &mut Bytes) -> Result<(), DecodeError> {
    require_reserved_flags(PacketType::Connect, flags, 0)?;

    let protocol_name = properties::decode_utf8(body)?;
    if protocol_name != "MQTT" {
        return Err(DecodeError::new(DecodeErrorKind::InvalidProtocol, format!("unsupported protocol name {protocol_name:?}")));
    }

    let level = get_u8(body, "CONNECT protocol level")?;
    let version = match level {
        4 => ProtocolVersion::V311,
        5 => ProtocolVersion::V5,
        other => return Err(DecodeError::new(DecodeErrorKind::InvalidProtocol, format!("unsupported protocol level {other}"))),
    };
    packet.reason_code = Some(level);

    let connect_flags = get_u8(body, "CONNECT flags")?;
    if connect_flags & 0b0000_0001 != 0 {
        return Err(DecodeError::new(DecodeErrorKind::ProtocolError, String::from("CONNECT's reserved flag bit must be zero")));
    }
    let will_flag = connect_flags & 0b0000_0100 != 0;
    let username_flag = connect_flags & 0b1000_0000 != 0;
    let password_flag = connect_flags & 0b0100_0000 != 0;

    let _keep_alive = get_u16(body, "CONNECT keep-alive")?;

    if version == ProtocolVersion::V5 {
        skip_properties(body)?;
    }

    packet.client_id = Some(properties::decode_utf8(body)?);

    if will_flag {
        if version == ProtocolVersion::V5 {
            skip_properties(body)?;
        }
        let _will_topic = properties::decode_utf8(body)?;
        let _will_payload = properties::decode_binary(body)?;
    }
    if username_flag {
        let _username = properties::decode_utf8(body)?;
    }
    if password_flag {
        let _password = properties::decode_binary(body)?;
    }

    return Ok(());
}

fn decode_connack(packet: &mut Packet, flags: u8, body: &mut Bytes, version: ProtocolVersion) -> Result<(), DecodeError> {
    require_reserved_flags(PacketType::Connack, flags, 0)?;

    let ack_flags = get_u8(body, "CONNACK acknowledge flags")?;
    if ack_flags & 0b1111_1110 != 0 {
        return Err(DecodeError::new(DecodeErrorKind::ProtocolError, String::from("CONNACK's reserved bits must be zero")));
    }
    packet.session_present = ack_flags & 1 != 0;
    packet.reason_code = Some(get_u8(body, "CONNACK reason code")?);

    if version == ProtocolVersion::V5 {
        skip_properties(body)?;
    }

    return Ok(());
}

fn decode_publish(packet: &mut Packet, flags: u8, body: &mut Bytes, version: ProtocolVersion) -> Result<(), DecodeError> {
    let (dup, qos, retain) = publish_flags(flags)?;
    packet.dup = dup;
    packet.qos = Some(qos);
    packet.retain = retain;

    packet.topic = Some(properties::decode_utf8(body)?);

    if qos != QosLevel::AtMostOnce {
        packet.packet_id = Some(get_u16(body, "PUBLISH packet identifier")?);
    }

    if version == ProtocolVersion::V5 {
        let len = decode_variable_byte_integer(body)? as usize;
        if body.remaining() < len {
            return Err(DecodeError::new(DecodeErrorKind::MalformedLength, String::from("truncated PUBLISH property set")));
        }
        // Kept raw (not parsed here) so the caller can run its own
        // validation pass over exactly these bytes (§4.4 handle_publish).
        packet.body = body.split_to(len);
    }

    // The application payload that follows isn't modeled on `Packet`;
    // this crate's handlers don't consult it.
    return Ok(());
}

/// PUBACK/PUBREC/PUBCOMP/PUBREL share the MQTT 5 "shorthand" variable
/// header: a bare packet id if `remaining_length == 2` (reason code
/// implied `Success`), else packet id + reason code, optionally followed
/// by a property set if more than 3 bytes remain.
fn decode_simple_ack(packet: &mut Packet, body: &mut Bytes, version: ProtocolVersion) -> Result<(), DecodeError> {
    packet.packet_id = Some(get_u16(body, "packet identifier")?);

    if version != ProtocolVersion::V5 {
        if body.has_remaining() {
            return Err(DecodeError::new(DecodeErrorKind::MalformedLength, String::from("MQTT 3.1.1 ack packets carry only a packet identifier")));
        }
        return Ok(());
    }

    if !body.has_remaining() {
        packet.reason_code = Some(0);
        return Ok(());
    }

    packet.reason_code = Some(get_u8(body, "reason code")?);
    if body.has_remaining() {
        skip_properties(body)?;
    }

    return Ok(());
}

fn decode_packet_id_then_properties(packet: &mut Packet, body: &mut Bytes, version: ProtocolVersion) -> Result<(), DecodeError> {
    packet.packet_id = Some(get_u16(body, "packet identifier")?);
    if version == ProtocolVersion::V5 {
        skip_properties(body)?;
    }
    // The topic-filter/reason-code list that follows isn't modeled on
    // `Packet`; left in `body` for a caller that needs it.
    packet.body = body.split_to(body.remaining());
    return Ok(());
}

/// DISCONNECT/AUTH's MQTT 5 variable header: nothing at all if
/// `remaining_length == 0`, else a reason code optionally followed by a
/// property set.
fn decode_reason_with_properties(packet: &mut Packet, body: &mut Bytes, version: ProtocolVersion) -> Result<(), DecodeError> {
    if !body.has_remaining() {
        packet.reason_code = Some(0);
        return Ok(());
    }
    if version != ProtocolVersion::V5 {
        return Err(DecodeError::new(DecodeErrorKind::MalformedLength, String::from("MQTT 3.1.1 DISCONNECT carries no payload")));
    }

    packet.reason_code = Some(get_u8(body, "reason code")?);
    if body.has_remaining() {
        skip_properties(body)?;
    }

    return Ok(());
}

/// Encodes `packet` to its wire representation under `version`.
pub fn encode_packet(packet: &Packet, version: ProtocolVersion) -> Result<Bytes, EncodeError> {
    let mut variable_and_payload = BytesMut::new();
    let flags = encode_body(packet, version, &mut variable_and_payload)?;

    let mut out = BytesMut::with_capacity(variable_and_payload.len() + 5);
    out.put_u8(((packet.kind as u8) << 4) | flags);
    encode_variable_byte_integer(variable_and_payload.len() as u32, &mut out)?;
    out.put_slice(&variable_and_payload);

    return Ok(out.into());
}

fn encode_body(packet: &Packet, version: ProtocolVersion, out: &mut BytesMut) -> Result<u8, EncodeError> {
    match packet.kind {
        PacketType::Connect => {
            encode_connect(packet, version, out);
            return Ok(0);
        }
        PacketType::Connack => {
            encode_connack(packet, version, out)?;
            return Ok(0);
        }
        PacketType::Publish => return Ok(encode_publish(packet, version, out)?),
        PacketType::Puback | PacketType::Pubrec | PacketType::Pubcomp => {
            encode_simple_ack(packet, version, out)?;
            return Ok(0);
        }
        PacketType::Pubrel => {
            encode_simple_ack(packet, version, out)?;
            return Ok(0b0010);
        }
        PacketType::Subscribe => {
            encode_packet_id_then_body(packet, version, out)?;
            return Ok(0b0010);
        }
        PacketType::Unsubscribe => {
            encode_packet_id_then_body(packet, version, out)?;
            return Ok(0b0010);
        }
        PacketType::Suback | PacketType::Unsuback => {
            encode_packet_id_then_body(packet, version, out)?;
            return Ok(0);
        }
        PacketType::Pingreq | PacketType::Pingresp => return Ok(0),
        PacketType::Disconnect | PacketType::Auth => {
            encode_reason_with_properties(packet, version, out)?;
            return Ok(0);
        }
    }
}

fn encode_connect(packet: &Packet, version: ProtocolVersion, out: &mut BytesMut) {
    properties::encode_utf8(out, "MQTT");
    out.put_u8(if version == ProtocolVersion::V5 { 5 } else { 4 });
    // No will/credentials are modeled on `Packet`; clean_start is always
    // requested since there's no dedicated field to carry it either.
    out.put_u8(0b0000_0010);
    out.put_u16(0);
    if version == ProtocolVersion::V5 {
        out.put_u8(0);
    }
    properties::encode_utf8(out, packet.client_id.as_deref().unwrap_or(""));
}

fn encode_connack(packet: &Packet, version: ProtocolVersion, out: &mut BytesMut) -> Result<(), EncodeError> {
    out.put_u8(if packet.session_present { 1 } else { 0 });
    out.put_u8(packet.reason_code.unwrap_or(0));
    if version == ProtocolVersion::V5 {
        out.put_u8(0);
    }
    return Ok(());
}

fn encode_publish(packet: &Packet, version: ProtocolVersion, out: &mut BytesMut) -> Result<u8, EncodeError> {
    let qos = packet.qos.unwrap_or(QosLevel::AtMostOnce);
    properties::encode_utf8(out, packet.topic.as_deref().unwrap_or(""));
    if qos != QosLevel::AtMostOnce {
        out.put_u16(packet.packet_id.unwrap_or(0));
    }
    if version == ProtocolVersion::V5 {
        encode_variable_byte_integer(packet.body.len() as u32, out)?;
        out.put_slice(&packet.body);
    }
    return Ok(publish_flags_byte(packet.dup, qos, packet.retain));
}

fn encode_simple_ack(packet: &Packet, version: ProtocolVersion, out: &mut BytesMut) -> Result<(), EncodeError> {
    out.put_u16(packet.packet_id.unwrap_or(0));
    if version == ProtocolVersion::V5 {
        let reason = packet.reason_code.unwrap_or(0);
        if reason != 0 {
            out.put_u8(reason);
            out.put_u8(0);
        }
    }
    return Ok(());
}

fn encode_packet_id_then_body(packet: &Packet, version: ProtocolVersion, out: &mut BytesMut) -> Result<(), EncodeError> {
    out.put_u16(packet.packet_id.unwrap_or(0));
    if version == ProtocolVersion::V5 {
        out.put_u8(0);
    }
    out.put_slice(&packet.body);
    return Ok(());
}

fn encode_reason_with_properties(packet: &Packet, version: ProtocolVersion, out: &mut BytesMut) -> Result<(), EncodeError> {
    if version == ProtocolVersion::V5 {
        if let Some(reason) = packet.reason_code {
            out.put_u8(reason);
            out.put_u8(0);
        }
    }
    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pingreq_round_trips_with_an_empty_remaining_length() {
        let encoded = encode_packet(&Packet::new(PacketType::Pingreq), ProtocolVersion::V311).unwrap();
        assert_eq!(&encoded[..], &[0xC0, 0x00]);

        let mut buf = encoded;
        let decoded = decode_packet(&mut buf, ProtocolVersion::V311).unwrap().unwrap();
        assert_eq!(decoded.kind, PacketType::Pingreq);
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_packet_returns_none_on_a_partial_fixed_header() {
        let mut buf = Bytes::from_static(&[0x30]);
        assert!(decode_packet(&mut buf, ProtocolVersion::V311).unwrap().is_none());
        assert_eq!(buf.len(), 1, "an incomplete packet must not be consumed");
    }

    #[test]
    fn decode_packet_returns_none_when_the_body_hasnt_fully_arrived() {
        let full = encode_packet(
            &Packet::new(PacketType::Publish).with_topic("a/b").with_qos(QosLevel::AtMostOnce),
            ProtocolVersion::V311,
        )
        .unwrap();

        let mut partial = full.slice(0..full.len() - 1);
        assert!(decode_packet(&mut partial, ProtocolVersion::V311).unwrap().is_none());
    }

    #[test]
    fn publish_qos1_round_trips_topic_and_packet_id() {
        let packet = Packet::new(PacketType::Publish)
            .with_topic("sensors/temp")
            .with_qos(QosLevel::AtLeastOnce)
            .with_packet_id(77);

        let mut encoded = encode_packet(&packet, ProtocolVersion::V311).unwrap();
        let decoded = decode_packet(&mut encoded, ProtocolVersion::V311).unwrap().unwrap();

        assert_eq!(decoded.topic.as_deref(), Some("sensors/temp"));
        assert_eq!(decoded.qos, Some(QosLevel::AtLeastOnce));
        assert_eq!(decoded.packet_id, Some(77));
        assert!(!decoded.dup);
    }

    #[test]
    fn publish_v5_carries_its_property_bytes_through_body() {
        let props = Bytes::from_static(&[0x24, 0x01]); // MaximumQos = 1
        let packet = Packet::new(PacketType::Publish)
            .with_topic("t")
            .with_qos(QosLevel::AtMostOnce)
            .with_body(props.clone());

        let mut encoded = encode_packet(&packet, ProtocolVersion::V5).unwrap();
        let decoded = decode_packet(&mut encoded, ProtocolVersion::V5).unwrap().unwrap();

        assert_eq!(decoded.body, props);
    }

    #[test]
    fn puback_v311_rejects_a_trailing_reason_code() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x40);
        buf.put_u8(3); // remaining length 3: v3.1.1 PUBACK must be exactly 2
        buf.put_u16(5);
        buf.put_u8(0);
        let mut buf: Bytes = buf.into();

        assert!(decode_packet(&mut buf, ProtocolVersion::V311).is_err());
    }

    #[test]
    fn puback_v5_shorthand_form_implies_success() {
        let packet = Packet::new(PacketType::Puback).with_packet_id(9);
        let mut encoded = encode_packet(&packet, ProtocolVersion::V5).unwrap();
        assert_eq!(encoded.len(), 4, "no reason code/properties means the 2-byte shorthand form");

        let decoded = decode_packet(&mut encoded, ProtocolVersion::V5).unwrap().unwrap();
        assert_eq!(decoded.packet_id, Some(9));
        assert_eq!(decoded.reason_code, Some(0));
    }

    #[test]
    fn pubrel_requires_the_reserved_flag_bits() {
        let mut buf = BytesMut::new();
        buf.put_u8(0x60); // PUBREL with flags 0000 instead of the required 0010
        buf.put_u8(2);
        buf.put_u16(1);
        let mut buf: Bytes = buf.into();

        assert!(decode_packet(&mut buf, ProtocolVersion::V311).is_err());
    }

    #[test]
    fn disconnect_v311_has_no_payload() {
        let packet = Packet::new(PacketType::Disconnect);
        let encoded = encode_packet(&packet, ProtocolVersion::V311).unwrap();
        assert_eq!(&encoded[..], &[0xE0, 0x00]);
    }

    #[test]
    fn connect_round_trips_the_client_id_and_protocol_level() {
        let packet = Packet::new(PacketType::Connect).with_client_id("device-1");
        let mut encoded = encode_packet(&packet, ProtocolVersion::V5).unwrap();
        let decoded = decode_packet(&mut encoded, ProtocolVersion::V311).unwrap().unwrap();

        // decode_connect derives its own version from the protocol level
        // byte regardless of what the caller passed in.
        assert_eq!(decoded.client_id.as_deref(), Some("device-1"));
        assert_eq!(decoded.reason_code, Some(5));
    }

    #[test]
    fn connack_round_trips_session_present_and_reason_code() {
        let packet = Packet::new(PacketType::Connack).with_session_present(true).with_reason_code(0x80);
        let mut encoded = encode_packet(&packet, ProtocolVersion::V311).unwrap();
        let decoded = decode_packet(&mut encoded, ProtocolVersion::V311).unwrap().unwrap();

        assert!(decoded.session_present);
        assert_eq!(decoded.reason_code, Some(0x80));
    }

    #[test]
    fn remaining_length_over_four_bytes_is_malformed() {
        let buf = [0x30u8, 0xff, 0xff, 0xff, 0xff];
        assert!(peek_fixed_header(&buf).is_err());
    }
}
