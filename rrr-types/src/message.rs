use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::codec::{decode_array, encode_array, DecodeOptions};
use crate::err::{DecodeError, DecodeErrorKind, EncodeError, EncodeErrorKind};
use crate::value::Array;

/// Message class (§3 Message).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MessageClass {
    Msg = 1,
    Tag = 2,
}

impl TryFrom<u8> for MessageClass {
    type Error = DecodeError;
    fn try_from(value: u8) -> Result<Self, DecodeError> {
        match value {
            1 => Ok(Self::Msg),
            2 => Ok(Self::Tag),
            _ => Err(DecodeError::new(
                DecodeErrorKind::Malformed,
                format!("unknown message class {value}, only 1 (MSG) and 2 (TAG) are valid"),
            )),
        }
    }
}

/// Header fixed-width fields preceding the topic string and array payload.
/// 4 (header crc) + 4 (total_size) + 1 (class) + 1 (type discriminator)
/// + 8 (timestamp) + 2 (topic_length) + 4 (data_length) + 4 (payload crc).
const HEADER_LEN: usize = 4 + 4 + 1 + 1 + 8 + 2 + 4 + 4;

/// An array plus routing metadata (§3 Message). `topic` must be non-empty
/// UTF-8 and a valid MQTT topic name when present.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub timestamp: u64,
    pub class: MessageClass,
    pub type_discriminator: u8,
    pub topic: Option<String>,
    pub array: Array,
}

impl Message {
    pub fn new(timestamp: u64, class: MessageClass, array: Array) -> Self {
        return Self {
            timestamp,
            class,
            type_discriminator: 0,
            topic: None,
            array,
        };
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    pub fn encode(&self) -> Result<Bytes, EncodeError> {
        let topic_bytes = self.topic.as_deref().unwrap_or("").as_bytes();
        if topic_bytes.len() > u16::MAX as usize {
            return Err(EncodeError::new(
                EncodeErrorKind::OversizedTopic,
                format!(
                    "topic of {} bytes exceeds the 65535 byte maximum",
                    topic_bytes.len()
                ),
            ));
        }

        let array_bytes = encode_array(&self.array)?;

        let mut payload = BytesMut::with_capacity(topic_bytes.len() + array_bytes.len());
        payload.put_slice(topic_bytes);
        payload.put_slice(&array_bytes);
        let payload_crc = crc32fast::hash(&payload);

        let data_length = array_bytes.len() as u32;
        let total_size = (HEADER_LEN + payload.len()) as u32;

        let mut header_tail = BytesMut::with_capacity(HEADER_LEN - 4);
        header_tail.put_u32(total_size);
        header_tail.put_u8(self.class as u8);
        header_tail.put_u8(self.type_discriminator);
        header_tail.put_u64(self.timestamp);
        header_tail.put_u16(topic_bytes.len() as u16);
        header_tail.put_u32(data_length);
        header_tail.put_u32(payload_crc);

        let header_crc = crc32fast::hash(&header_tail);

        let mut out = BytesMut::with_capacity(total_size as usize);
        out.put_u32(header_crc);
        out.put_slice(&header_tail);
        out.put_slice(&payload);

        return Ok(out.freeze());
    }

    /// Decodes and validates both checksums before any field is trusted
    /// (§3 invariant). A single flipped byte anywhere in the message causes
    /// one of the two CRC checks to fail with `Malformed` (§8 property 2).
    pub fn decode(bytes: &mut Bytes, opts: DecodeOptions) -> Result<Self, DecodeError> {
        if bytes.len() < HEADER_LEN {
            return Err(DecodeError::new(
                DecodeErrorKind::Malformed,
                format!("need at least {HEADER_LEN} header bytes, have {}", bytes.len()),
            ));
        }

        let header_crc = bytes.get_u32();
        let header_tail = bytes.clone().split_to(HEADER_LEN - 4);
        if crc32fast::hash(&header_tail) != header_crc {
            return Err(DecodeError::new(
                DecodeErrorKind::ChecksumMismatch,
                String::from("message header checksum did not match"),
            ));
        }

        let total_size = bytes.get_u32();
        let class = MessageClass::try_from(bytes.get_u8())?;
        let type_discriminator = bytes.get_u8();
        let timestamp = bytes.get_u64();
        let topic_length = bytes.get_u16() as usize;
        let data_length = bytes.get_u32();
        let payload_crc = bytes.get_u32();

        let expected_payload_len = topic_length + data_length as usize;
        if total_size as usize != HEADER_LEN + expected_payload_len {
            return Err(DecodeError::new(
                DecodeErrorKind::Malformed,
                format!(
                    "declared total_size {total_size} is inconsistent with header ({HEADER_LEN}) + topic ({topic_length}) + data ({data_length})"
                ),
            ));
        }

        if bytes.len() < expected_payload_len {
            return Err(DecodeError::new(
                DecodeErrorKind::Malformed,
                format!(
                    "message declared {expected_payload_len} payload bytes but only {} remain",
                    bytes.len()
                ),
            ));
        }

        let payload = bytes.split_to(expected_payload_len);
        if crc32fast::hash(&payload) != payload_crc {
            return Err(DecodeError::new(
                DecodeErrorKind::ChecksumMismatch,
                String::from("message payload checksum did not match"),
            ));
        }

        let mut payload = payload;
        let topic_bytes = payload.split_to(topic_length);
        let topic = if topic_bytes.is_empty() {
            None
        } else {
            let topic = String::from_utf8(topic_bytes.to_vec())
                .map_err(|_| DecodeError::new(DecodeErrorKind::Utf8ParseError, String::from("topic was not valid UTF-8")))?;
            validate_topic(&topic)?;
            Some(topic)
        };

        let array = decode_array(&mut payload, opts)?;

        return Ok(Self {
            timestamp,
            class,
            type_discriminator,
            topic,
            array,
        });
    }
}

/// MQTT-topic-valid per §3: non-empty, no embedded NUL, no wildcard
/// characters (those are reserved for topic *filters*, never a concrete
/// topic name).
fn validate_topic(topic: &str) -> Result<(), DecodeError> {
    if topic.is_empty() {
        return Err(DecodeError::new(
            DecodeErrorKind::MalformedTopic,
            String::from("topic must not be empty"),
        ));
    }
    if topic.contains('\0') || topic.contains('+') || topic.contains('#') {
        return Err(DecodeError::new(
            DecodeErrorKind::MalformedTopic,
            format!("'{topic}' is not a valid topic name"),
        ));
    }
    return Ok(());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{TypeKind, TypeValue};

    fn sample_array() -> Array {
        let mut array = Array::new();
        array.push(TypeValue::new_integer(TypeKind::Be, 4, None, 42));
        array.push(TypeValue::new_blob(None, Bytes::from_static(b"payload")));
        array
    }

    #[test]
    fn message_roundtrip_preserves_topic_and_timestamp() {
        let msg = Message::new(123456789, MessageClass::Msg, sample_array()).with_topic("a/b/c");
        let encoded = msg.encode().unwrap();
        let mut bytes = encoded;
        let decoded = Message::decode(&mut bytes, DecodeOptions::default()).unwrap();

        assert_eq!(decoded.timestamp, msg.timestamp);
        assert_eq!(decoded.topic.as_deref(), Some("a/b/c"));
        assert_eq!(decoded.array, msg.array);
    }

    #[test]
    fn flipped_byte_fails_checksum() {
        let msg = Message::new(1, MessageClass::Msg, sample_array()).with_topic("t");
        let mut encoded = msg.encode().unwrap().to_vec();
        let last = encoded.len() - 1;
        encoded[last] ^= 0xff;

        let mut bytes = Bytes::from(encoded);
        let err = Message::decode(&mut bytes, DecodeOptions::default()).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::ChecksumMismatch);
    }

    #[test]
    fn flipped_header_byte_fails_header_checksum() {
        let msg = Message::new(1, MessageClass::Msg, sample_array()).with_topic("t");
        let mut encoded = msg.encode().unwrap().to_vec();
        encoded[10] ^= 0xff;

        let mut bytes = Bytes::from(encoded);
        let err = Message::decode(&mut bytes, DecodeOptions::default()).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::ChecksumMismatch);
    }
}
