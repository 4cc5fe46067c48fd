//! Typed access to request and response values.
//!
//! Requests arrive as untyped `Value` maps. Every field read goes through
//! `Fields`, which returns either the typed value or a `FieldError` naming the
//! field, so a malformed request becomes a validation error response instead
//! of a crashed handler.

use tokio_util::bytes::Bytes;

use super::value::{Map, Value, encode_value};
use crate::diagnostics::{Location, Message};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("expected a map, found {found}")]
    NotAMap { found: &'static str },

    #[error("missing field {0:?}")]
    Missing(&'static str),

    #[error("field {field:?} must be {expected}, found {found}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("element {index} of {field:?} must be {expected}, found {found}")]
    WrongElement {
        field: &'static str,
        index: usize,
        expected: &'static str,
        found: &'static str,
    },
}

/// Read-only typed view over a map value.
///
/// `Null` is treated the same as an absent field.
#[derive(Debug, Clone, Copy)]
pub struct Fields<'a> {
    map: &'a Map,
}

macro_rules! typed_field {
    ($required:ident, $optional:ident, $ty:ty, $accessor:ident, $expected:literal) => {
        pub fn $required(&self, name: &'static str) -> Result<$ty, FieldError> {
            self.$optional(name)?.ok_or(FieldError::Missing(name))
        }

        pub fn $optional(&self, name: &'static str) -> Result<Option<$ty>, FieldError> {
            match self.get(name) {
                None => Ok(None),
                Some(value) => value.$accessor().map(Some).ok_or(FieldError::WrongType {
                    field: name,
                    expected: $expected,
                    found: value.kind(),
                }),
            }
        }
    };
}

impl<'a> Fields<'a> {
    pub fn new(value: &'a Value) -> Result<Self, FieldError> {
        value
            .as_map()
            .map(Self::from_map)
            .ok_or(FieldError::NotAMap { found: value.kind() })
    }

    pub fn from_map(map: &'a Map) -> Self {
        Self { map }
    }

    pub fn get(&self, name: &str) -> Option<&'a Value> {
        self.map.get(name).filter(|v| !v.is_null())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    typed_field!(str, opt_str, &'a str, as_str, "a string");
    typed_field!(bool, opt_bool, bool, as_bool, "a boolean");
    typed_field!(int, opt_int, i32, as_int, "an integer");
    typed_field!(array, opt_array, &'a [Value], as_array, "an array");
    typed_field!(map, opt_map, &'a Map, as_map, "a map");

    /// Binary field that the host may also send as text.
    pub fn opt_contents(&self, name: &'static str) -> Result<Option<Vec<u8>>, FieldError> {
        match self.get(name) {
            None => Ok(None),
            Some(Value::Bytes(b)) => Ok(Some(b.clone())),
            Some(Value::String(s)) => Ok(Some(s.as_bytes().to_vec())),
            Some(other) => Err(FieldError::WrongType {
                field: name,
                expected: "bytes",
                found: other.kind(),
            }),
        }
    }

    pub fn string_array(&self, name: &'static str) -> Result<Vec<String>, FieldError> {
        self.array(name)?
            .iter()
            .enumerate()
            .map(|(index, item)| {
                item.as_str()
                    .map(str::to_owned)
                    .ok_or(FieldError::WrongElement {
                        field: name,
                        index,
                        expected: "a string",
                        found: item.kind(),
                    })
            })
            .collect()
    }
}

/// First bytes on the output stream: the encoded version string, unframed.
pub fn handshake_preamble(version: &str) -> Bytes {
    encode_value(&Value::from(version)).freeze()
}

/// `{"error": text}`
pub fn error_response(text: impl Into<String>) -> Value {
    [("error", Value::String(text.into()))].into_iter().collect()
}

pub fn encode_messages(messages: &[Message]) -> Value {
    Value::Array(messages.iter().map(encode_message).collect())
}

fn encode_message(message: &Message) -> Value {
    let location = match &message.location {
        None => Value::Null,
        Some(loc) => [
            ("file", Value::from(loc.file.as_str())),
            ("line", Value::Int(loc.line)),
            ("column", Value::Int(loc.column)),
            ("length", Value::Int(loc.length)),
            ("lineText", Value::from(loc.line_text.as_str())),
        ]
        .into_iter()
        .collect(),
    };
    [
        ("text", Value::from(message.text.as_str())),
        ("location", location),
    ]
    .into_iter()
    .collect()
}

pub fn decode_messages(items: &[Value]) -> Result<Vec<Message>, FieldError> {
    items.iter().map(decode_message).collect()
}

pub fn decode_message(value: &Value) -> Result<Message, FieldError> {
    let fields = Fields::new(value)?;
    let text = fields.str("text")?.to_owned();
    let location = match fields.opt_map("location")? {
        None => None,
        Some(loc) => {
            let loc = Fields::from_map(loc);
            let namespace = match loc.opt_str("namespace")? {
                None | Some("") => "file",
                Some(ns) => ns,
            };
            Some(Location {
                file: loc.str("file")?.to_owned(),
                namespace: namespace.to_owned(),
                line: loc.int("line")?,
                column: loc.int("column")?,
                length: loc.int("length")?,
                line_text: loc.str("lineText")?.to_owned(),
            })
        }
    };
    Ok(Message { text, location })
}
