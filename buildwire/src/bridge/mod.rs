//! Wire protocol between the host process and the service.
//!
//! # Layers
//!
//! - **value**: dynamic `Value` model and its self-delimiting binary encoding
//! - **frame**: `u32 LE length | payload` framing and the tokio codec
//! - **packet**: correlation id + request flag + one value per frame
//! - **protocol**: typed field access, diagnostics encoding, handshake

pub mod frame;
pub mod packet;
pub mod protocol;
pub mod value;

pub use frame::FrameCodec;
pub use packet::{Packet, decode_packet, encode_packet};
pub use protocol::{FieldError, Fields};
pub use value::{DecodeError, Map, Value};
