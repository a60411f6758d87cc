use bytes::Bytes;

use crate::err::{DecodeError, DecodeErrorKind};
use crate::qos::QosLevel;

/// MQTT fixed-header packet type, shared between the 3.1.1 and 5 wire
/// formats (§4.4 Packet types).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
    Auth = 15,
}

impl TryFrom<u8> for PacketType {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, DecodeError> {
        let kind = match value {
            1 => Self::Connect,
            2 => Self::Connack,
            3 => Self::Publish,
            4 => Self::Puback,
            5 => Self::Pubrec,
            6 => Self::Pubrel,
            7 => Self::Pubcomp,
            8 => Self::Subscribe,
            9 => Self::Suback,
            10 => Self::Unsubscribe,
            11 => Self::Unsuback,
            12 => Self::Pingreq,
            13 => Self::Pingresp,
            14 => Self::Disconnect,
            15 => Self::Auth,
            _ => {
                return Err(DecodeError::new(
                    DecodeErrorKind::PacketType,
                    format!("unknown packet type code {value}"),
                ));
            }
        };
        return Ok(kind);
    }
}

impl PacketType {
    /// Whether this type ever carries properties under MQTT 5 —
    /// PINGREQ/PINGRESP never do.
    pub fn carries_properties_v5(&self) -> bool {
        !matches!(self, Self::Pingreq | Self::Pingresp)
    }

    pub fn is_ack(&self) -> bool {
        matches!(
            self,
            Self::Connack | Self::Puback | Self::Pubrec | Self::Pubrel | Self::Pubcomp | Self::Suback | Self::Unsuback
        )
    }
}

/// Protocol version a connection negotiated, distinguishing the two wire
/// formats the session layer must speak.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolVersion {
    V311,
    V5,
    /// CONNECT has not yet been parsed for this connection.
    Unknown,
}

/// A decoded packet, reduced to the fields the protocol state machine
/// (§4.4 packet handlers) actually branches on. Fixed-header framing and
/// per-type variable-header/payload encode+decode live in [`crate::codec`];
/// this struct is what that codec produces and consumes. `body`'s meaning
/// is per-type: for PUBLISH it holds the MQTT 5 property bytes (§4.4
/// property parsing operates directly on it); CONNECT's will/credentials
/// fields and SUBSCRIBE/UNSUBSCRIBE's topic-filter lists aren't modeled
/// here and are dropped by the codec, since nothing downstream of the
/// connection collection consults them.
#[derive(Clone, Debug)]
pub struct Packet {
    pub kind: PacketType,
    pub packet_id: Option<u16>,
    pub qos: Option<QosLevel>,
    pub retain: bool,
    pub dup: bool,
    pub topic: Option<String>,
    pub reason_code: Option<u8>,
    pub body: Bytes,
    /// CONNECT's mandatory first payload field.
    pub client_id: Option<String>,
    /// CONNACK's "session present" bit.
    pub session_present: bool,
}

impl Packet {
    pub fn new(kind: PacketType) -> Self {
        return Self {
            kind,
            packet_id: None,
            qos: None,
            retain: false,
            dup: false,
            topic: None,
            reason_code: None,
            body: Bytes::new(),
            client_id: None,
            session_present: false,
        };
    }

    pub fn with_packet_id(mut self, id: u16) -> Self {
        self.packet_id = Some(id);
        self
    }

    pub fn with_qos(mut self, qos: QosLevel) -> Self {
        self.qos = Some(qos);
        self
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn with_reason_code(mut self, code: u8) -> Self {
        self.reason_code = Some(code);
        self
    }

    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn with_session_present(mut self, session_present: bool) -> Self {
        self.session_present = session_present;
        self
    }
}
