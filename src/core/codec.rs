//! # Typed Codec
//!
//! Fixed-width binary encodings for every [`Value`] variant, and a
//! [`TaggedCodec`] that frames a tagged payload behind its 4-byte length.
//!
//! ## Body encodings
//! - bytes: raw, as-is
//! - string: UTF-8 text, not null-terminated
//! - int32 / float64: big-endian, 4 / 8 bytes
//! - bool: one byte, `0` or `1`
//! - int32[] / float64[]: concatenated big-endian elements
//! - bool[]: one marker byte holding how many bits of the *last* data byte are
//!   significant (1..=8), then the bits packed so that boolean `i` lives in
//!   bit `i % 8` of data byte `i / 8`. The empty array has an empty body.
//!
//! ## Frame
//! ```text
//! [Length(4, big-endian)] [Tag(1)] [Body(Length - 1)]
//! ```
//! Concatenating all datagrams of one message yields exactly one frame, so the
//! same codec drives both single-datagram messages and reassembled ones.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAX_MESSAGE_SIZE;
use crate::core::value::{TypeTag, Value};
use crate::error::{constants, ProtocolError, Result};

/// Size of the big-endian length header that opens every message
pub const LENGTH_HEADER_SIZE: usize = 4;

const INT_WIDTH: usize = 4;
const DOUBLE_WIDTH: usize = 8;

/// Number of body bytes `value` will encode to
pub fn body_len(value: &Value) -> usize {
    match value {
        Value::Bytes(b) => b.len(),
        Value::String(s) => s.len(),
        Value::Int(_) => INT_WIDTH,
        Value::Bool(_) => 1,
        Value::Double(_) => DOUBLE_WIDTH,
        Value::IntArray(v) => v.len() * INT_WIDTH,
        Value::BoolArray(v) if v.is_empty() => 0,
        Value::BoolArray(v) => 1 + v.len().div_ceil(8),
        Value::DoubleArray(v) => v.len() * DOUBLE_WIDTH,
    }
}

/// Append the body encoding of `value` (without tag) to `dst`
pub fn encode_body(value: &Value, dst: &mut BytesMut) {
    dst.reserve(body_len(value));
    match value {
        Value::Bytes(b) => dst.put_slice(b),
        Value::String(s) => dst.put_slice(s.as_bytes()),
        Value::Int(i) => dst.put_i32(*i),
        Value::Bool(b) => dst.put_u8(u8::from(*b)),
        Value::Double(d) => dst.put_f64(*d),
        Value::IntArray(v) => v.iter().for_each(|i| dst.put_i32(*i)),
        Value::BoolArray(v) => encode_bool_array(v, dst),
        Value::DoubleArray(v) => v.iter().for_each(|d| dst.put_f64(*d)),
    }
}

fn encode_bool_array(values: &[bool], dst: &mut BytesMut) {
    if values.is_empty() {
        return;
    }

    let significant = match values.len() % 8 {
        0 => 8,
        rem => rem,
    };
    dst.put_u8(significant as u8);

    for chunk in values.chunks(8) {
        let byte = chunk
            .iter()
            .enumerate()
            .fold(0u8, |acc, (bit, &set)| if set { acc | (1 << bit) } else { acc });
        dst.put_u8(byte);
    }
}

/// Decode a body previously produced by [`encode_body`] for `tag`
pub fn decode_body(tag: TypeTag, mut body: &[u8]) -> Result<Value> {
    match tag {
        TypeTag::Bytes => Ok(Value::Bytes(body.to_vec())),
        TypeTag::String => String::from_utf8(body.to_vec())
            .map(Value::String)
            .map_err(|e| ProtocolError::InvalidFormat(format!("Invalid UTF-8 string: {e}"))),
        TypeTag::Int => {
            if body.len() != INT_WIDTH {
                return Err(ProtocolError::InvalidFormat(constants::ERR_INT_WIDTH.into()));
            }
            Ok(Value::Int(body.get_i32()))
        }
        TypeTag::Bool => match body {
            [0] => Ok(Value::Bool(false)),
            [1] => Ok(Value::Bool(true)),
            _ => Err(ProtocolError::InvalidFormat(constants::ERR_BOOL_VALUE.into())),
        },
        TypeTag::Double => {
            if body.len() != DOUBLE_WIDTH {
                return Err(ProtocolError::InvalidFormat(
                    constants::ERR_DOUBLE_WIDTH.into(),
                ));
            }
            Ok(Value::Double(body.get_f64()))
        }
        TypeTag::IntArray => {
            if body.len() % INT_WIDTH != 0 {
                return Err(ProtocolError::InvalidFormat(
                    constants::ERR_INT_ARRAY_WIDTH.into(),
                ));
            }
            let mut out = Vec::with_capacity(body.len() / INT_WIDTH);
            while body.has_remaining() {
                out.push(body.get_i32());
            }
            Ok(Value::IntArray(out))
        }
        TypeTag::BoolArray => decode_bool_array(body).map(Value::BoolArray),
        TypeTag::DoubleArray => {
            if body.len() % DOUBLE_WIDTH != 0 {
                return Err(ProtocolError::InvalidFormat(
                    constants::ERR_DOUBLE_ARRAY_WIDTH.into(),
                ));
            }
            let mut out = Vec::with_capacity(body.len() / DOUBLE_WIDTH);
            while body.has_remaining() {
                out.push(body.get_f64());
            }
            Ok(Value::DoubleArray(out))
        }
    }
}

fn decode_bool_array(body: &[u8]) -> Result<Vec<bool>> {
    let (significant, data) = match body {
        [] => return Ok(Vec::new()),
        [_] => {
            return Err(ProtocolError::InvalidFormat(
                constants::ERR_BOOL_ARRAY_TOO_SHORT.into(),
            ))
        }
        [marker, data @ ..] => (*marker as usize, data),
    };

    if !(1..=8).contains(&significant) {
        return Err(ProtocolError::InvalidFormat(
            constants::ERR_BOOL_ARRAY_MARKER.into(),
        ));
    }

    let count = (data.len() - 1) * 8 + significant;
    Ok((0..count)
        .map(|i| data[i / 8] & (1 << (i % 8)) != 0)
        .collect())
}

/// Encode `value` as a tagged payload: `[tag][body]`
pub fn encode_tagged(value: &Value) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + body_len(value));
    buf.put_u8(value.tag().as_byte());
    encode_body(value, &mut buf);
    buf.freeze()
}

/// Decode a tagged payload produced by [`encode_tagged`]
pub fn decode_tagged(payload: &[u8]) -> Result<Value> {
    let (&tag, body) = payload.split_first().ok_or_else(|| {
        ProtocolError::MalformedDatagram(constants::ERR_EMPTY_PAYLOAD.into())
    })?;
    decode_body(TypeTag::try_from(tag)?, body)
}

/// Read the tag of a tagged payload without decoding its body
pub fn peek_tag(payload: &[u8]) -> Result<TypeTag> {
    match payload.first() {
        Some(&tag) => TypeTag::try_from(tag),
        None => Err(ProtocolError::MalformedDatagram(
            constants::ERR_EMPTY_PAYLOAD.into(),
        )),
    }
}

/// Length-prefixed codec for tagged payloads.
///
/// Encoding writes `[len][tag][body]`; decoding waits until a whole frame is
/// buffered, rejecting a declared length above `max_message_size` before it
/// allocates anything.
#[derive(Debug, Clone, Copy)]
pub struct TaggedCodec {
    max_message_size: usize,
}

impl TaggedCodec {
    pub fn new(max_message_size: usize) -> Self {
        Self { max_message_size }
    }

    pub fn max_message_size(&self) -> usize {
        self.max_message_size
    }

    /// Validate a declared tagged-payload length against this codec's limit
    pub fn check_len(&self, len: usize) -> Result<()> {
        if len == 0 {
            return Err(ProtocolError::MalformedDatagram(
                constants::ERR_EMPTY_PAYLOAD.into(),
            ));
        }
        if len > self.max_message_size || u32::try_from(len).is_err() {
            return Err(ProtocolError::OversizedPayload(len));
        }
        Ok(())
    }
}

impl Default for TaggedCodec {
    fn default() -> Self {
        Self::new(MAX_MESSAGE_SIZE)
    }
}

impl<'a> Encoder<&'a Value> for TaggedCodec {
    type Error = ProtocolError;

    fn encode(&mut self, value: &'a Value, dst: &mut BytesMut) -> Result<()> {
        let len = 1 + body_len(value);
        self.check_len(len)?;

        dst.reserve(LENGTH_HEADER_SIZE + len);
        dst.put_u32(len as u32);
        dst.put_u8(value.tag().as_byte());
        encode_body(value, dst);
        Ok(())
    }
}

impl Decoder for TaggedCodec {
    type Item = Value;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Value>> {
        if src.len() < LENGTH_HEADER_SIZE {
            return Ok(None);
        }

        let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;
        self.check_len(len)?;

        if src.len() < LENGTH_HEADER_SIZE + len {
            src.reserve(LENGTH_HEADER_SIZE + len - src.len());
            return Ok(None);
        }

        let mut frame = src.split_to(LENGTH_HEADER_SIZE + len);
        frame.advance(LENGTH_HEADER_SIZE);
        decode_tagged(&frame).map(Some)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn roundtrip(value: Value) {
        let payload = encode_tagged(&value);
        assert_eq!(payload.len(), 1 + body_len(&value));
        assert_eq!(decode_tagged(&payload).unwrap(), value);
    }

    #[test]
    fn test_primitive_roundtrips() {
        roundtrip(Value::Bytes(vec![]));
        roundtrip(Value::Bytes(vec![0, 255, 7]));
        roundtrip(Value::String(String::new()));
        roundtrip(Value::String("héllo wörld".into()));
        roundtrip(Value::Int(i32::MIN));
        roundtrip(Value::Int(-1));
        roundtrip(Value::Bool(true));
        roundtrip(Value::Bool(false));
        roundtrip(Value::Double(-0.125));
        roundtrip(Value::Double(f64::MAX));
    }

    #[test]
    fn test_array_boundary_lengths() {
        roundtrip(Value::IntArray(vec![]));
        roundtrip(Value::IntArray(vec![42]));
        roundtrip(Value::DoubleArray(vec![]));
        roundtrip(Value::DoubleArray(vec![3.5]));
        roundtrip(Value::BoolArray(vec![]));
        roundtrip(Value::BoolArray(vec![true]));
    }

    #[test]
    fn test_bool_array_every_marker_value() {
        for len in 1..=17 {
            let values: Vec<bool> = (0..len).map(|i| i % 3 == 0).collect();
            let mut buf = BytesMut::new();
            encode_body(&Value::BoolArray(values.clone()), &mut buf);

            let expected_marker = if len % 8 == 0 { 8 } else { len % 8 };
            assert_eq!(buf[0] as usize, expected_marker, "len {len}");
            assert_eq!(buf.len(), 1 + (len + 7) / 8);

            roundtrip(Value::BoolArray(values));
        }
    }

    #[test]
    fn test_bool_array_bit_layout() {
        let mut buf = BytesMut::new();
        encode_body(
            &Value::BoolArray(vec![true, false, true, false, false, false, false, false, true]),
            &mut buf,
        );
        assert_eq!(&buf[..], &[1, 0b0000_0101, 0b0000_0001]);
    }

    #[test]
    fn test_big_endian_layout() {
        let mut buf = BytesMut::new();
        encode_body(&Value::Int(0x0102_0304), &mut buf);
        assert_eq!(&buf[..], &[1, 2, 3, 4]);

        let mut buf = BytesMut::new();
        encode_body(&Value::Double(1.0), &mut buf);
        assert_eq!(&buf[..], &1.0f64.to_be_bytes());
    }

    #[test]
    fn test_array_width_errors() {
        assert!(matches!(
            decode_body(TypeTag::IntArray, &[0, 0, 0, 1, 0]),
            Err(ProtocolError::InvalidFormat(_))
        ));
        assert!(matches!(
            decode_body(TypeTag::DoubleArray, &[0; 12]),
            Err(ProtocolError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_bool_array_format_errors() {
        assert!(decode_body(TypeTag::BoolArray, &[3]).is_err());
        assert!(decode_body(TypeTag::BoolArray, &[0, 1]).is_err());
        assert!(decode_body(TypeTag::BoolArray, &[9, 1]).is_err());
    }

    #[test]
    fn test_unknown_tag_is_format_error() {
        assert!(matches!(
            decode_tagged(&[99, 1, 2]),
            Err(ProtocolError::UnknownTag(99))
        ));
    }

    #[test]
    fn test_codec_waits_for_whole_frame() {
        let mut codec = TaggedCodec::default();
        let mut buf = BytesMut::new();
        codec.encode(&Value::from("partial"), &mut buf).unwrap();

        let tail = buf.split_off(6);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.unsplit(tail);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Value::from("partial")));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_codec_rejects_declared_oversize() {
        let mut codec = TaggedCodec::new(16);
        let mut buf = BytesMut::from(&(17u32).to_be_bytes()[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(ProtocolError::OversizedPayload(17))
        ));

        let mut out = BytesMut::new();
        assert!(matches!(
            codec.encode(&Value::Bytes(vec![0; 16]), &mut out),
            Err(ProtocolError::OversizedPayload(17))
        ));
    }
}
