use std::collections::HashSet;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::err::{DecodeError, DecodeErrorKind, EncodeError, EncodeErrorKind};

/// MQTT 5 property identifiers this broker/client pair understands.
/// Subset of the full registry, limited to what the connection and
/// publish paths actually consult (§4.4 Property parsing).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PropertyId {
    PayloadFormatIndicator = 0x01,
    MessageExpiryInterval = 0x02,
    ContentType = 0x03,
    ResponseTopic = 0x08,
    CorrelationData = 0x09,
    SubscriptionIdentifier = 0x0B,
    SessionExpiryInterval = 0x11,
    AssignedClientIdentifier = 0x12,
    ServerKeepAlive = 0x13,
    AuthenticationMethod = 0x15,
    AuthenticationData = 0x16,
    RequestProblemInformation = 0x17,
    WillDelayInterval = 0x18,
    RequestResponseInformation = 0x19,
    ResponseInformation = 0x1A,
    ServerReference = 0x1C,
    ReasonString = 0x1F,
    ReceiveMaximum = 0x21,
    TopicAliasMaximum = 0x22,
    TopicAlias = 0x23,
    MaximumQos = 0x24,
    RetainAvailable = 0x25,
    UserProperty = 0x26,
    MaximumPacketSize = 0x27,
    WildcardSubscriptionAvailable = 0x28,
    SubscriptionIdentifierAvailable = 0x29,
    SharedSubscriptionAvailable = 0x2A,
}

impl TryFrom<u32> for PropertyId {
    type Error = DecodeError;

    fn try_from(value: u32) -> Result<Self, DecodeError> {
        let id = match value {
            0x01 => Self::PayloadFormatIndicator,
            0x02 => Self::MessageExpiryInterval,
            0x03 => Self::ContentType,
            0x08 => Self::ResponseTopic,
            0x09 => Self::CorrelationData,
            0x0B => Self::SubscriptionIdentifier,
            0x11 => Self::SessionExpiryInterval,
            0x12 => Self::AssignedClientIdentifier,
            0x13 => Self::ServerKeepAlive,
            0x15 => Self::AuthenticationMethod,
            0x16 => Self::AuthenticationData,
            0x17 => Self::RequestProblemInformation,
            0x18 => Self::WillDelayInterval,
            0x19 => Self::RequestResponseInformation,
            0x1A => Self::ResponseInformation,
            0x1C => Self::ServerReference,
            0x1F => Self::ReasonString,
            0x21 => Self::ReceiveMaximum,
            0x22 => Self::TopicAliasMaximum,
            0x23 => Self::TopicAlias,
            0x24 => Self::MaximumQos,
            0x25 => Self::RetainAvailable,
            0x26 => Self::UserProperty,
            0x27 => Self::MaximumPacketSize,
            0x28 => Self::WildcardSubscriptionAvailable,
            0x29 => Self::SubscriptionIdentifierAvailable,
            0x2A => Self::SharedSubscriptionAvailable,
            _ => {
                return Err(DecodeError::new(
                    DecodeErrorKind::MalformedPacket,
                    format!("unknown property identifier {value}"),
                ));
            }
        };
        return Ok(id);
    }
}

impl PropertyId {
    /// Properties the spec explicitly allows to repeat within one
    /// property set (§4.4).
    fn may_repeat(&self) -> bool {
        matches!(self, Self::UserProperty | Self::SubscriptionIdentifier)
    }
}

#[derive(Clone, Debug)]
pub enum PropertyValue {
    Byte(u8),
    TwoByteInt(u16),
    FourByteInt(u32),
    VarInt(u32),
    Utf8(String),
    Binary(Bytes),
    Utf8Pair(String, String),
}

#[derive(Clone, Debug)]
pub struct Property {
    pub id: PropertyId,
    pub value: PropertyValue,
}

/// Largest value a 4-byte MQTT variable byte integer can hold (`128^4 - 1`),
/// shared by the remaining-length field in the fixed header and the
/// property-length prefix (§4.4, §6 "MQTT on the wire").
pub const MAX_VARIABLE_BYTE_INTEGER: u32 = 268_435_455;

/// Writes `value` as an MQTT variable byte integer (1-4 bytes, 7 data bits
/// per byte, continuation flag in the high bit) — the encode counterpart
/// of [`decode_variable_byte_integer`], used by the wire codec for both
/// the fixed header's remaining length and property-set lengths.
pub fn encode_variable_byte_integer(mut value: u32, bytes: &mut BytesMut) -> Result<(), EncodeError> {
    if value > MAX_VARIABLE_BYTE_INTEGER {
        return Err(EncodeError::new(
            EncodeErrorKind::OversizedPayload,
            format!("value {value} exceeds the 4-byte variable byte integer range"),
        ));
    }

    loop {
        let mut byte = (value % 128) as u8;
        value /= 128;
        if value > 0 {
            byte |= 0x80;
        }
        bytes.put_u8(byte);
        if value == 0 {
            break;
        }
    }

    return Ok(());
}

/// Reads an MQTT variable byte integer (1-4 bytes, 7 data bits per byte,
/// continuation flag in the high bit).
pub fn decode_variable_byte_integer(bytes: &mut Bytes) -> Result<u32, DecodeError> {
    let mut multiplier: u32 = 1;
    let mut value: u32 = 0;

    for _ in 0..4 {
        if !bytes.has_remaining() {
            return Err(DecodeError::new(DecodeErrorKind::MalformedLength, String::from("truncated variable byte integer")));
        }
        let byte = bytes.get_u8();
        value += (byte & 0x7f) as u32 * multiplier;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        multiplier *= 128;
    }

    return Err(DecodeError::new(
        DecodeErrorKind::MalformedLength,
        String::from("variable byte integer exceeds 4 bytes"),
    ));
}

/// Reads a length-prefixed UTF-8 string (§6 "MQTT on the wire"). Shared by
/// property parsing and the per-type variable-header codec.
pub(crate) fn decode_utf8(bytes: &mut Bytes) -> Result<String, DecodeError> {
    if bytes.remaining() < 2 {
        return Err(DecodeError::new(DecodeErrorKind::MalformedLength, String::from("truncated UTF-8 string length")));
    }
    let len = bytes.get_u16() as usize;
    if bytes.remaining() < len {
        return Err(DecodeError::new(DecodeErrorKind::MalformedLength, String::from("truncated UTF-8 string body")));
    }
    let raw = bytes.split_to(len);
    return String::from_utf8(raw.to_vec()).map_err(|e| DecodeError::new(DecodeErrorKind::Utf8ParseError, e.to_string()));
}

/// Reads a length-prefixed binary blob (§6 "MQTT on the wire").
pub(crate) fn decode_binary(bytes: &mut Bytes) -> Result<Bytes, DecodeError> {
    if bytes.remaining() < 2 {
        return Err(DecodeError::new(DecodeErrorKind::MalformedLength, String::from("truncated binary data length")));
    }
    let len = bytes.get_u16() as usize;
    if bytes.remaining() < len {
        return Err(DecodeError::new(DecodeErrorKind::MalformedLength, String::from("truncated binary data body")));
    }
    return Ok(bytes.split_to(len));
}

/// Writes a length-prefixed UTF-8 string, the encode counterpart of
/// [`decode_utf8`].
pub(crate) fn encode_utf8(bytes: &mut BytesMut, val: &str) {
    bytes.put_u16(val.len() as u16);
    bytes.put_slice(val.as_bytes());
}

/// Writes a length-prefixed binary blob, the encode counterpart of
/// [`decode_binary`].
pub(crate) fn encode_binary(bytes: &mut BytesMut, val: &[u8]) {
    bytes.put_u16(val.len() as u16);
    bytes.put_slice(val);
}

/// Parses the property set occupying the whole of `bytes` (the caller has
/// already sliced out exactly the property-length prefix's worth of
/// bytes).
pub fn parse_properties(bytes: &mut Bytes) -> Result<Vec<Property>, DecodeError> {
    let mut properties = Vec::new();

    while bytes.has_remaining() {
        let id_raw = decode_variable_byte_integer(bytes)?;
        let id = PropertyId::try_from(id_raw)?;

        let value = match id {
            PropertyId::PayloadFormatIndicator | PropertyId::RequestProblemInformation | PropertyId::RequestResponseInformation | PropertyId::MaximumQos | PropertyId::RetainAvailable | PropertyId::WildcardSubscriptionAvailable | PropertyId::SubscriptionIdentifierAvailable | PropertyId::SharedSubscriptionAvailable => {
                if !bytes.has_remaining() {
                    return Err(DecodeError::new(DecodeErrorKind::MalformedLength, String::from("truncated byte property")));
                }
                PropertyValue::Byte(bytes.get_u8())
            }
            PropertyId::ServerKeepAlive | PropertyId::ReceiveMaximum | PropertyId::TopicAliasMaximum | PropertyId::TopicAlias => {
                if bytes.remaining() < 2 {
                    return Err(DecodeError::new(DecodeErrorKind::MalformedLength, String::from("truncated two-byte property")));
                }
                PropertyValue::TwoByteInt(bytes.get_u16())
            }
            PropertyId::MessageExpiryInterval | PropertyId::SessionExpiryInterval | PropertyId::WillDelayInterval | PropertyId::MaximumPacketSize => {
                if bytes.remaining() < 4 {
                    return Err(DecodeError::new(DecodeErrorKind::MalformedLength, String::from("truncated four-byte property")));
                }
                PropertyValue::FourByteInt(bytes.get_u32())
            }
            PropertyId::SubscriptionIdentifier => PropertyValue::VarInt(decode_variable_byte_integer(bytes)?),
            PropertyId::ContentType | PropertyId::ResponseTopic | PropertyId::AssignedClientIdentifier | PropertyId::AuthenticationMethod | PropertyId::ResponseInformation | PropertyId::ServerReference | PropertyId::ReasonString => PropertyValue::Utf8(decode_utf8(bytes)?),
            PropertyId::CorrelationData | PropertyId::AuthenticationData => PropertyValue::Binary(decode_binary(bytes)?),
            PropertyId::UserProperty => {
                let key = decode_utf8(bytes)?;
                let value = decode_utf8(bytes)?;
                PropertyValue::Utf8Pair(key, value)
            }
        };

        properties.push(Property { id, value });
    }

    return Ok(properties);
}

/// Deep-cloned, validated view of a property set (§4.4): duplicates of
/// single-valued properties, out-of-range integers, and other violations
/// are rejected here rather than deferred to the session layer.
#[derive(Clone, Debug, Default)]
pub struct SessionProperties {
    pub receive_maximum: Option<u16>,
    pub request_response_information: Option<u8>,
    pub maximum_qos: Option<u8>,
    pub session_expiry_interval: Option<u32>,
    pub user_properties: Vec<(String, String)>,
    pub subscription_identifiers: Vec<u32>,
}

/// Reason code to report a property-set violation with, per §4.4's
/// "appropriate reason code on violation" rule.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PropertyReasonCode {
    ProtocolError,
    MalformedPacket,
}

pub fn validate_properties(properties: Vec<Property>) -> Result<SessionProperties, (PropertyReasonCode, DecodeError)> {
    let mut seen = HashSet::new();
    let mut out = SessionProperties::default();

    for property in properties {
        if !property.id.may_repeat() && !seen.insert(property.id) {
            return Err((
                PropertyReasonCode::ProtocolError,
                DecodeError::new(DecodeErrorKind::ProtocolError, format!("property {:?} must not repeat", property.id)),
            ));
        }

        match (property.id, property.value) {
            (PropertyId::ReceiveMaximum, PropertyValue::TwoByteInt(0)) => {
                return Err((
                    PropertyReasonCode::ProtocolError,
                    DecodeError::new(DecodeErrorKind::ProtocolError, String::from("receive_maximum must not be zero")),
                ));
            }
            (PropertyId::ReceiveMaximum, PropertyValue::TwoByteInt(v)) => out.receive_maximum = Some(v),
            (PropertyId::RequestResponseInformation, PropertyValue::Byte(v)) if v > 1 => {
                return Err((
                    PropertyReasonCode::ProtocolError,
                    DecodeError::new(DecodeErrorKind::ProtocolError, format!("request_response_information must be 0 or 1, got {v}")),
                ));
            }
            (PropertyId::RequestResponseInformation, PropertyValue::Byte(v)) => out.request_response_information = Some(v),
            (PropertyId::MaximumQos, PropertyValue::Byte(v)) if v > 2 => {
                return Err((
                    PropertyReasonCode::ProtocolError,
                    DecodeError::new(DecodeErrorKind::ProtocolError, format!("maximum_qos must be 0, 1 or 2, got {v}")),
                ));
            }
            (PropertyId::MaximumQos, PropertyValue::Byte(v)) => out.maximum_qos = Some(v),
            (PropertyId::SessionExpiryInterval, PropertyValue::FourByteInt(v)) => out.session_expiry_interval = Some(v),
            (PropertyId::UserProperty, PropertyValue::Utf8Pair(k, v)) => out.user_properties.push((k, v)),
            (PropertyId::SubscriptionIdentifier, PropertyValue::VarInt(v)) => {
                if v == 0 {
                    return Err((
                        PropertyReasonCode::ProtocolError,
                        DecodeError::new(DecodeErrorKind::ProtocolError, String::from("subscription_identifier must not be zero")),
                    ));
                }
                out.subscription_identifiers.push(v);
            }
            // Properties this crate doesn't branch on are accepted and dropped;
            // the bytes were already structurally validated during parsing.
            _ => {}
        }
    }

    return Ok(out);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn receive_maximum_of_zero_is_rejected() {
        let props = vec![Property {
            id: PropertyId::ReceiveMaximum,
            value: PropertyValue::TwoByteInt(0),
        }];
        let (reason, _) = validate_properties(props).unwrap_err();
        assert_eq!(reason, PropertyReasonCode::ProtocolError);
    }

    #[test]
    fn duplicate_non_repeatable_property_is_rejected() {
        let props = vec![
            Property {
                id: PropertyId::SessionExpiryInterval,
                value: PropertyValue::FourByteInt(10),
            },
            Property {
                id: PropertyId::SessionExpiryInterval,
                value: PropertyValue::FourByteInt(20),
            },
        ];
        assert!(validate_properties(props).is_err());
    }

    #[test]
    fn user_property_and_subscription_identifier_may_repeat() {
        let props = vec![
            Property {
                id: PropertyId::UserProperty,
                value: PropertyValue::Utf8Pair("a".into(), "1".into()),
            },
            Property {
                id: PropertyId::UserProperty,
                value: PropertyValue::Utf8Pair("b".into(), "2".into()),
            },
            Property {
                id: PropertyId::SubscriptionIdentifier,
                value: PropertyValue::VarInt(1),
            },
            Property {
                id: PropertyId::SubscriptionIdentifier,
                value: PropertyValue::VarInt(2),
            },
        ];
        let out = validate_properties(props).unwrap();
        assert_eq!(out.user_properties.len(), 2);
        assert_eq!(out.subscription_identifiers, vec![1, 2]);
    }

    #[test]
    fn variable_byte_integer_roundtrips_multi_byte_values() {
        let mut bytes = Bytes::from_static(&[0xff, 0x01]);
        assert_eq!(decode_variable_byte_integer(&mut bytes).unwrap(), 255);
    }
}
