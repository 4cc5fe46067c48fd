//! Packet layout inside a frame payload:
//!
//! ```text
//! u32 LE (id << 1 | is_request) | value
//! ```
//!
//! The low bit of the header flags a request, so ids are 31 bits on the wire.

use tokio_util::bytes::{BufMut, Bytes, BytesMut};

use super::value::{Value, decode_value, write_value};

/// Largest id that survives the header shift.
pub const MAX_PACKET_ID: u32 = u32::MAX >> 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: u32,
    pub is_request: bool,
    pub value: Value,
}

impl Packet {
    pub fn request(id: u32, value: Value) -> Self {
        Self {
            id,
            is_request: true,
            value,
        }
    }

    pub fn response(id: u32, value: Value) -> Self {
        Self {
            id,
            is_request: false,
            value,
        }
    }
}

/// Encode a packet as a frame payload (without the length prefix).
pub fn encode_packet(packet: &Packet) -> Bytes {
    let mut buf = BytesMut::new();
    buf.put_u32_le(((packet.id & MAX_PACKET_ID) << 1) | u32::from(packet.is_request));
    write_value(&mut buf, &packet.value);
    buf.freeze()
}

/// Decode a frame payload. Any structural mismatch, including bytes left over
/// after the value, yields `None`.
pub fn decode_packet(bytes: &[u8]) -> Option<Packet> {
    let header = bytes.get(..4)?;
    let header = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    let body = &bytes[4..];
    let (value, used) = decode_value(body).ok()?;
    if used != body.len() {
        return None;
    }
    Some(Packet {
        id: header >> 1,
        is_request: header & 1 == 1,
        value,
    })
}
