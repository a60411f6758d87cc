use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::err::{DecodeError, DecodeErrorKind, EncodeError, EncodeErrorKind};
use crate::value::{Array, TypeKind, TypeValue};

/// Wire header length: 1 byte kind tag + 4 byte total_length + 4 byte
/// element count (§4.1).
pub const VALUE_HEADER_LEN: usize = 9;

/// Hard protocol ceiling on a single value's payload length, refused
/// unconditionally regardless of caller configuration (§4.1).
pub const MAX_VALUE_LEN: u32 = 1 << 24;

#[derive(Clone, Copy, Debug)]
pub struct DecodeOptions {
    /// Caller-configured maximum; decoded totals above this are `TooBig`
    /// even though they are still under [`MAX_VALUE_LEN`].
    pub max_total: u32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        return Self {
            max_total: MAX_VALUE_LEN,
        };
    }
}

pub fn encode_value(value: &TypeValue) -> Result<Bytes, EncodeError> {
    let payload = value.payload();
    if payload.len() as u64 > MAX_VALUE_LEN as u64 {
        return Err(EncodeError::new(
            EncodeErrorKind::OversizedPayload,
            format!(
                "value payload of {} bytes exceeds the maximum of {MAX_VALUE_LEN} bytes",
                payload.len()
            ),
        ));
    }

    let mut buf = BytesMut::with_capacity(VALUE_HEADER_LEN + payload.len());
    buf.put_u8(value.kind() as u8);
    buf.put_u32(payload.len() as u32);
    buf.put_u32(value.count());
    buf.put_slice(payload);
    return Ok(buf.freeze());
}

pub fn decode_value(bytes: &mut Bytes, opts: DecodeOptions) -> Result<TypeValue, DecodeError> {
    if bytes.len() < VALUE_HEADER_LEN {
        return Err(DecodeError::new(
            DecodeErrorKind::Malformed,
            format!(
                "need at least {VALUE_HEADER_LEN} bytes for a value header, have {}",
                bytes.len()
            ),
        ));
    }

    let kind = TypeKind::try_from(bytes.get_u8())?;
    let total_length = bytes.get_u32();
    let elements = bytes.get_u32();

    if elements == 0 {
        return Err(DecodeError::new(
            DecodeErrorKind::Malformed,
            String::from("a value must describe at least one element"),
        ));
    }

    if total_length > MAX_VALUE_LEN {
        return Err(DecodeError::new(
            DecodeErrorKind::Malformed,
            format!("value of {total_length} bytes exceeds the protocol maximum of {MAX_VALUE_LEN}"),
        ));
    }

    if total_length > opts.max_total {
        return Err(DecodeError::new(
            DecodeErrorKind::TooBig,
            format!("value of {total_length} bytes exceeds the configured maximum of {}", opts.max_total),
        ));
    }

    if total_length % elements != 0 {
        return Err(DecodeError::new(
            DecodeErrorKind::Malformed,
            format!("{total_length} bytes do not divide evenly into {elements} elements"),
        ));
    }

    let width = total_length / elements;

    if kind.is_integer() && width > 8 {
        return Err(DecodeError::new(
            DecodeErrorKind::Malformed,
            format!("integer element width of {width} bytes exceeds the 8 byte maximum"),
        ));
    }

    if bytes.len() < total_length as usize {
        return Err(DecodeError::new(
            DecodeErrorKind::Malformed,
            format!(
                "value header declared {total_length} payload bytes but only {} remain",
                bytes.len()
            ),
        ));
    }

    let payload = bytes.split_to(total_length as usize);
    let width = if kind == TypeKind::Blob && elements == 1 {
        payload.len().max(1) as u32
    } else {
        width
    };

    return Ok(TypeValue::from_parts(kind, width, None, payload));
}

pub fn decode_array(bytes: &mut Bytes, opts: DecodeOptions) -> Result<Array, DecodeError> {
    let mut array = Array::new();
    while bytes.has_remaining() {
        array.push(decode_value(bytes, opts)?);
    }
    return Ok(array);
}

pub fn encode_array(array: &Array) -> Result<Bytes, EncodeError> {
    let mut buf = BytesMut::new();
    for value in array.iter() {
        buf.put_slice(&encode_value(value)?);
    }
    return Ok(buf.freeze());
}

/// A single field of an array template produced by [`parse_definition`].
#[derive(Clone, Debug, PartialEq)]
pub struct TemplateField {
    pub tag: String,
    pub kind: TypeKind,
    pub width: u32,
}

/// Parses a config-like definition string of the form
/// `"tag:kindWIDTH,tag:kindWIDTH,..."`, e.g. `"temp:be4,name:blob16"`.
///
/// `kind` is one of `be`, `le`, `blob`; `WIDTH` is the fixed per-element
/// byte width used to tag decoded values positionally (§4.1
/// `parse_definition`).
pub fn parse_definition(def: &str) -> Result<Vec<TemplateField>, DecodeError> {
    let mut fields = Vec::new();

    for field_def in def.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let (tag, rest) = field_def.split_once(':').ok_or_else(|| {
            DecodeError::new(
                DecodeErrorKind::DefinitionSyntax,
                format!("field definition '{field_def}' is missing a 'tag:' prefix"),
            )
        })?;

        let kind_start = rest
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(rest.len());
        let (kind_str, width_str) = rest.split_at(kind_start);

        let kind = match kind_str {
            "be" => TypeKind::Be,
            "le" => TypeKind::Le,
            "blob" => TypeKind::Blob,
            other => {
                return Err(DecodeError::new(
                    DecodeErrorKind::DefinitionSyntax,
                    format!("unknown type name '{other}' in field definition '{field_def}'"),
                ))
            }
        };

        let width: u32 = width_str.parse().map_err(|_| {
            DecodeError::new(
                DecodeErrorKind::DefinitionSyntax,
                format!("field definition '{field_def}' has no numeric width"),
            )
        })?;

        if width == 0 || (kind.is_integer() && width > 8) {
            return Err(DecodeError::new(
                DecodeErrorKind::DefinitionSyntax,
                format!("field definition '{field_def}' has an invalid width of {width}"),
            ));
        }

        fields.push(TemplateField {
            tag: tag.to_string(),
            kind,
            width,
        });
    }

    return Ok(fields);
}

/// Decodes `bytes` against an ordered `template`, assigning each decoded
/// value the matching field's tag and verifying its kind. Positional
/// mismatch (wrong kind, fewer values than fields) is a `Malformed` error.
pub fn decode_with_template(
    bytes: &mut Bytes,
    template: &[TemplateField],
    opts: DecodeOptions,
) -> Result<Array, DecodeError> {
    let mut array = Array::new();

    for field in template {
        if !bytes.has_remaining() {
            return Err(DecodeError::new(
                DecodeErrorKind::Malformed,
                format!("template expected a value for tag '{}' but the buffer was exhausted", field.tag),
            ));
        }

        let mut value = decode_value(bytes, opts)?;
        if value.kind() != field.kind {
            return Err(DecodeError::new(
                DecodeErrorKind::Malformed,
                format!(
                    "tag '{}' expected kind {:?} but decoded {:?}",
                    field.tag,
                    field.kind,
                    value.kind()
                ),
            ));
        }
        value.set_tag(field.tag.clone());
        array.push(value);
    }

    return Ok(array);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_roundtrip_s1() {
        let mut array = Array::new();
        array.push(TypeValue::new_integer(TypeKind::Be, 2, None, 33));
        array.push(TypeValue::new_integer(TypeKind::Le, 2, None, 33));
        array.push(TypeValue::new_blob(None, Bytes::from_static(b"abcdefg")));
        array.push(TypeValue::new_blob(None, Bytes::from_static(b"gfedcba")));

        let encoded = encode_array(&array).unwrap();
        let mut bytes = encoded;
        let decoded = decode_array(&mut bytes, DecodeOptions::default()).unwrap();

        assert_eq!(decoded.len(), 4);
        assert_eq!(decoded.get(0).unwrap().integer(0), Some(33));
        assert_eq!(decoded.get(1).unwrap().integer(0), Some(33));
        assert_eq!(decoded.get(0).unwrap().payload().as_ref(), &[0x00, 0x21]);
        assert_eq!(decoded.get(1).unwrap().payload().as_ref(), &[0x21, 0x00]);
        assert_eq!(decoded.get(2).unwrap().blob(0), Some(b"abcdefg".as_slice()));
        assert_eq!(decoded.get(3).unwrap().blob(0), Some(b"gfedcba".as_slice()));
    }

    #[test]
    fn decode_refuses_zero_elements() {
        let mut buf = BytesMut::new();
        buf.put_u8(TypeKind::Blob as u8);
        buf.put_u32(0);
        buf.put_u32(0);
        let mut bytes = buf.freeze();
        let err = decode_value(&mut bytes, DecodeOptions::default()).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Malformed);
    }

    #[test]
    fn decode_refuses_unknown_kind() {
        let mut buf = BytesMut::new();
        buf.put_u8(0xff);
        buf.put_u32(1);
        buf.put_u32(1);
        buf.put_u8(0);
        let mut bytes = buf.freeze();
        let err = decode_value(&mut bytes, DecodeOptions::default()).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Malformed);
    }

    #[test]
    fn parse_definition_and_tag_roundtrip() {
        let template = parse_definition("temp:be2,name:blob7").unwrap();

        let mut array = Array::new();
        array.push(TypeValue::new_integer(TypeKind::Be, 2, None, 33));
        array.push(TypeValue::new_blob(None, Bytes::from_static(b"abcdefg")));

        let encoded = encode_array(&array).unwrap();
        let mut bytes = encoded;
        let decoded = decode_with_template(&mut bytes, &template, DecodeOptions::default()).unwrap();

        assert_eq!(decoded.get(0).unwrap().tag(), Some("temp"));
        assert_eq!(decoded.get(1).unwrap().tag(), Some("name"));
    }
}
