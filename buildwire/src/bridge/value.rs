//! Dynamic value model carried by every packet, and its binary encoding.
//!
//! The encoding is self-delimiting: every value starts with a one-byte tag and
//! variable-sized values carry a u32 little-endian length or element count, so
//! arrays and maps embed child values without any extra framing.
//!
//! | tag | value                                                   |
//! |-----|---------------------------------------------------------|
//! | 0   | null                                                    |
//! | 1   | bool (1 byte, non-zero is true)                         |
//! | 2   | i32 (4 bytes LE)                                        |
//! | 3   | string (u32 length + UTF-8)                             |
//! | 4   | bytes (u32 length + raw)                                |
//! | 5   | array (u32 count + values)                              |
//! | 6   | map (u32 count + entries of u32 key length, key, value) |

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use tokio_util::bytes::{BufMut, BytesMut};

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_INT: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_BYTES: u8 = 4;
const TAG_ARRAY: u8 = 5;
const TAG_MAP: u8 = 6;

/// Deepest array/map nesting accepted by the decoder.
pub const MAX_DEPTH: usize = 256;

/// String-keyed map payload. Key order carries no meaning on the wire.
pub type Map = BTreeMap<String, Value>;

/// Wire-level dynamic value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i32),
    String(String),
    /// Raw binary data, used for file contents.
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(Map),
}

impl Value {
    /// Human-readable name of the variant, used in type mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "a boolean",
            Self::Int(_) => "an integer",
            Self::String(_) => "a string",
            Self::Bytes(_) => "bytes",
            Self::Array(_) => "an array",
            Self::Map(_) => "a map",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Self::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<u8>> for Value {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Self::Map(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self::Map(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// JSON view of a value, used for logs and snapshot tests. Bytes serialize as
/// an array of numbers.
impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_unit(),
            Self::Bool(b) => serializer.serialize_bool(*b),
            Self::Int(n) => serializer.serialize_i32(*n),
            Self::String(s) => serializer.serialize_str(s),
            Self::Bytes(b) => serializer.serialize_bytes(b),
            Self::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Self::Map(map) => {
                let mut out = serializer.serialize_map(Some(map.len()))?;
                for (k, v) in map {
                    out.serialize_entry(k, v)?;
                }
                out.end()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },

    #[error("unknown value tag {tag} at offset {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("declared length {length} at offset {offset} exceeds the {remaining} remaining bytes")]
    LengthOutOfBounds {
        length: u32,
        offset: usize,
        remaining: usize,
    },

    #[error("invalid UTF-8 in string at offset {offset}")]
    InvalidUtf8 { offset: usize },

    #[error("values nested deeper than 256 levels")]
    TooDeep,
}

/// Encode a value into a fresh buffer.
pub fn encode_value(value: &Value) -> BytesMut {
    let mut buf = BytesMut::new();
    write_value(&mut buf, value);
    buf
}

/// Append the encoding of `value` to `dst`.
pub fn write_value(dst: &mut BytesMut, value: &Value) {
    match value {
        Value::Null => dst.put_u8(TAG_NULL),
        Value::Bool(b) => {
            dst.put_u8(TAG_BOOL);
            dst.put_u8(u8::from(*b));
        }
        Value::Int(n) => {
            dst.put_u8(TAG_INT);
            dst.put_i32_le(*n);
        }
        Value::String(s) => {
            dst.put_u8(TAG_STRING);
            write_len_prefixed(dst, s.as_bytes());
        }
        Value::Bytes(b) => {
            dst.put_u8(TAG_BYTES);
            write_len_prefixed(dst, b);
        }
        Value::Array(items) => {
            dst.put_u8(TAG_ARRAY);
            write_len(dst, items.len());
            for item in items {
                write_value(dst, item);
            }
        }
        Value::Map(map) => {
            dst.put_u8(TAG_MAP);
            write_len(dst, map.len());
            for (key, item) in map {
                write_len_prefixed(dst, key.as_bytes());
                write_value(dst, item);
            }
        }
    }
}

fn write_len(dst: &mut BytesMut, len: usize) {
    // Frames themselves are capped at u32::MAX, so nothing longer can be sent.
    debug_assert!(u32::try_from(len).is_ok(), "length {len} does not fit in u32");
    dst.put_u32_le(len as u32);
}

fn write_len_prefixed(dst: &mut BytesMut, bytes: &[u8]) {
    write_len(dst, bytes.len());
    dst.put_slice(bytes);
}

/// Decode one value from the head of `bytes`.
///
/// Returns the value and the number of bytes it occupied. Never reads past
/// the end of `bytes`.
pub fn decode_value(bytes: &[u8]) -> Result<(Value, usize), DecodeError> {
    let mut reader = Reader { bytes, pos: 0 };
    let value = reader.read_value(0)?;
    Ok((value, reader.pos))
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let available = self.remaining();
        if n > available {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: n,
                available,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read a length or element count. Every byte string byte and every
    /// element occupies at least one byte, so a count larger than what is
    /// left can be rejected before allocating anything.
    fn read_len(&mut self) -> Result<usize, DecodeError> {
        let offset = self.pos;
        let length = self.read_u32()?;
        let remaining = self.remaining();
        if length as usize > remaining {
            return Err(DecodeError::LengthOutOfBounds {
                length,
                offset,
                remaining,
            });
        }
        Ok(length as usize)
    }

    fn read_len_prefixed(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_len()?;
        self.take(len)
    }

    fn read_string(&mut self) -> Result<String, DecodeError> {
        let offset = self.pos;
        let bytes = self.read_len_prefixed()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8 { offset })
    }

    fn read_value(&mut self, depth: usize) -> Result<Value, DecodeError> {
        if depth >= MAX_DEPTH {
            return Err(DecodeError::TooDeep);
        }

        let offset = self.pos;
        match self.read_u8()? {
            TAG_NULL => Ok(Value::Null),
            TAG_BOOL => Ok(Value::Bool(self.read_u8()? != 0)),
            TAG_INT => Ok(Value::Int(self.read_u32()? as i32)),
            TAG_STRING => self.read_string().map(Value::String),
            TAG_BYTES => Ok(Value::Bytes(self.read_len_prefixed()?.to_vec())),
            TAG_ARRAY => {
                let count = self.read_len()?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.read_value(depth + 1)?);
                }
                Ok(Value::Array(items))
            }
            TAG_MAP => {
                let count = self.read_len()?;
                let mut map = Map::new();
                for _ in 0..count {
                    let key = self.read_string()?;
                    let item = self.read_value(depth + 1)?;
                    map.insert(key, item);
                }
                Ok(Value::Map(map))
            }
            tag => Err(DecodeError::UnknownTag { tag, offset }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: &Value) -> Value {
        let bytes = encode_value(value);
        let (decoded, used) = decode_value(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        decoded
    }

    #[test]
    fn scalar_encodings_match_wire_layout() {
        assert_eq!(&encode_value(&Value::Null)[..], &[0]);
        assert_eq!(&encode_value(&Value::Bool(true))[..], &[1, 1]);
        assert_eq!(&encode_value(&Value::Int(-2))[..], &[2, 0xfe, 0xff, 0xff, 0xff]);
        assert_eq!(
            &encode_value(&Value::from("hi"))[..],
            &[3, 2, 0, 0, 0, b'h', b'i']
        );
        assert_eq!(
            &encode_value(&Value::Bytes(vec![9, 8]))[..],
            &[4, 2, 0, 0, 0, 9, 8]
        );
    }

    #[test]
    fn map_keys_are_untagged_length_prefixed_strings() {
        let value: Value = [("a", Value::Null)].into_iter().collect();
        assert_eq!(&encode_value(&value)[..], &[6, 1, 0, 0, 0, 1, 0, 0, 0, b'a', 0]);
    }

    #[test]
    fn nested_request_survives_roundtrip() {
        let value: Value = [
            ("command", Value::from("build")),
            ("key", Value::Int(7)),
            ("write", Value::Bool(false)),
            (
                "flags",
                Value::Array(vec![Value::from("--bundle"), Value::from("in.js")]),
            ),
            ("stdin", Value::Bytes(b"export default 1".to_vec())),
            ("nothing", Value::Null),
            (
                "plugins",
                Value::Array(vec![[("name", Value::from("p"))].into_iter().collect()]),
            ),
        ]
        .into_iter()
        .collect();

        assert_eq!(roundtrip(&value), value);
    }

    #[test]
    fn decode_reports_bytes_consumed_and_ignores_trailing_input() {
        let mut bytes = encode_value(&Value::Int(5)).to_vec();
        bytes.extend_from_slice(&[0xaa, 0xbb]);
        let (value, used) = decode_value(&bytes).unwrap();
        assert_eq!(value, Value::Int(5));
        assert_eq!(used, 5);
    }

    #[test]
    fn rejects_unknown_tag() {
        assert_eq!(
            decode_value(&[42]),
            Err(DecodeError::UnknownTag { tag: 42, offset: 0 })
        );
    }

    #[test]
    fn rejects_truncated_scalar() {
        assert!(matches!(
            decode_value(&[2, 1, 0]),
            Err(DecodeError::Truncated { needed: 4, available: 2, .. })
        ));
        assert!(matches!(decode_value(&[]), Err(DecodeError::Truncated { .. })));
    }

    #[test]
    fn rejects_length_past_end_of_buffer() {
        // String claims 100 bytes but only 3 follow.
        assert_eq!(
            decode_value(&[3, 100, 0, 0, 0, b'a', b'b', b'c']),
            Err(DecodeError::LengthOutOfBounds {
                length: 100,
                offset: 1,
                remaining: 3,
            })
        );
        // Array claims u32::MAX elements.
        assert!(matches!(
            decode_value(&[5, 0xff, 0xff, 0xff, 0xff, 0]),
            Err(DecodeError::LengthOutOfBounds { .. })
        ));
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert_eq!(
            decode_value(&[3, 1, 0, 0, 0, 0xff]),
            Err(DecodeError::InvalidUtf8 { offset: 1 })
        );
    }

    #[test]
    fn rejects_excessive_nesting() {
        let mut bytes = Vec::new();
        for _ in 0..MAX_DEPTH + 1 {
            bytes.extend_from_slice(&[5, 1, 0, 0, 0]);
        }
        bytes.push(0);
        assert_eq!(decode_value(&bytes), Err(DecodeError::TooDeep));
    }

    #[test]
    fn serializes_as_json() {
        let value: Value = [
            ("code", Value::from("x")),
            ("contents", Value::Bytes(vec![1, 2])),
            ("map", Value::Null),
        ]
        .into_iter()
        .collect();
        insta::assert_json_snapshot!(value, @r#"
        {
          "code": "x",
          "contents": [
            1,
            2
          ],
          "map": null
        }
        "#);
    }
}
