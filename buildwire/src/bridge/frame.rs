//! Length-prefixed framing: `u32 LE length | payload`.
//!
//! `write_frame`/`try_read_frame` are the pure helpers over byte slices;
//! `FrameCodec` is the streaming form used with `FramedRead`/`FramedWrite`, so
//! the dispatcher and the output sequencer work over any AsyncRead/AsyncWrite
//! (stdio, pipes, in-memory duplex streams).

use std::io;

use tokio_util::bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Size of the little-endian length prefix.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Prepend the length prefix to `payload`.
pub fn write_frame(payload: &[u8]) -> io::Result<Vec<u8>> {
    let len = frame_len(payload.len())?;
    let mut out = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

/// Split one complete frame off the head of `buffer`.
///
/// Returns `(payload, remainder)`, or `None` while the prefix or the payload
/// is still incomplete. Nothing past the head frame is inspected.
pub fn try_read_frame(buffer: &[u8]) -> Option<(&[u8], &[u8])> {
    let prefix = buffer.get(..LENGTH_PREFIX_SIZE)?;
    let len = u32::from_le_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]) as usize;
    let rest = &buffer[LENGTH_PREFIX_SIZE..];
    if rest.len() < len {
        return None;
    }
    Some(rest.split_at(len))
}

fn frame_len(len: usize) -> io::Result<u32> {
    u32::try_from(len).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("frame payload of {len} bytes exceeds the u32 length prefix"),
        )
    })
}

/// Largest payload the service accepts from the host by default.
pub const DEFAULT_MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

/// Codec yielding raw frame payloads.
///
/// Wraps a little-endian `LengthDelimitedCodec`. Each decoded payload is split
/// off the read buffer into its own `Bytes`, so handlers never observe the
/// dispatcher's buffer being refilled. A declared length above the codec's
/// limit is an `InvalidData` error, raised before any buffer space is reserved.
#[derive(Debug, Clone)]
pub struct FrameCodec {
    inner: LengthDelimitedCodec,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameCodec {
    /// Accepts any length the prefix can express.
    pub fn new() -> Self {
        Self::with_max_frame_length(u32::MAX as usize)
    }

    pub fn with_max_frame_length(max_frame_length: usize) -> Self {
        Self {
            inner: LengthDelimitedCodec::builder()
                .length_field_length(LENGTH_PREFIX_SIZE)
                .little_endian()
                .max_frame_length(max_frame_length)
                .new_codec(),
        }
    }

    pub fn max_frame_length(&self) -> usize {
        self.inner.max_frame_length()
    }
}

impl Decoder for FrameCodec {
    type Item = Bytes;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        Ok(self.inner.decode(src)?.map(BytesMut::freeze))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None => {
                if !src.is_empty() {
                    tracing::trace!(bytes = src.len(), "Discarding partial frame at end of input");
                    src.clear();
                }
                Ok(None)
            }
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        self.inner.encode(item, dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_roundtrip() {
        for payload in [&b""[..], b"x", b"hello world", &[0u8; 300][..]] {
            let framed = write_frame(payload).unwrap();
            assert_eq!(try_read_frame(&framed), Some((payload, &b""[..])));
        }
    }

    #[test]
    fn prefix_is_little_endian() {
        let framed = write_frame(&[7; 258]).unwrap();
        assert_eq!(&framed[..4], &[2, 1, 0, 0]);
    }

    #[test]
    fn incomplete_frames_yield_none() {
        let framed = write_frame(b"abcdef").unwrap();
        for end in 0..framed.len() {
            assert_eq!(try_read_frame(&framed[..end]), None, "prefix of {end} bytes");
        }
    }

    #[test]
    fn remainder_keeps_following_bytes() {
        let mut stream = write_frame(b"one").unwrap();
        stream.extend(write_frame(b"two").unwrap());
        stream.extend_from_slice(&[5, 0]);

        let (first, rest) = try_read_frame(&stream).unwrap();
        assert_eq!(first, b"one");
        let (second, rest) = try_read_frame(rest).unwrap();
        assert_eq!(second, b"two");
        assert_eq!(rest, &[5, 0]);
        assert_eq!(try_read_frame(rest), None);
    }

    #[test]
    fn decoder_survives_arbitrary_split_points() {
        let payload = b"split me anywhere please".to_vec();
        let framed = write_frame(&payload).unwrap();

        for split in 0..=framed.len() {
            let mut codec = FrameCodec::new();
            let mut buf = BytesMut::new();

            buf.extend_from_slice(&framed[..split]);
            let early = codec.decode(&mut buf).unwrap();
            if split < framed.len() {
                assert!(early.is_none(), "split at {split} yielded a frame early");
                buf.extend_from_slice(&framed[split..]);
                let frame = codec.decode(&mut buf).unwrap().unwrap();
                assert_eq!(&frame[..], &payload[..]);
            } else {
                assert_eq!(&early.unwrap()[..], &payload[..]);
            }
            assert!(buf.is_empty());
            assert!(codec.decode(&mut buf).unwrap().is_none());
        }
    }

    #[test]
    fn decoder_drains_every_complete_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        for payload in [&b"a"[..], b"bb", b"ccc"] {
            buf.extend_from_slice(&write_frame(payload).unwrap());
        }
        buf.extend_from_slice(&[2, 0, 0, 0, b'p']);

        let mut frames = Vec::new();
        while let Some(frame) = codec.decode(&mut buf).unwrap() {
            frames.push(frame);
        }
        assert_eq!(frames, vec![Bytes::from("a"), Bytes::from("bb"), Bytes::from("ccc")]);

        // The partial fourth frame completes once the rest arrives.
        buf.extend_from_slice(b"q");
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Bytes::from("pq")));
    }

    #[test]
    fn decode_eof_discards_partial_tail() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::from(&[3u8, 0, 0, 0, b'a'][..]);
        assert!(codec.decode_eof(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_length_is_rejected_before_reserving() {
        let mut codec = FrameCodec::with_max_frame_length(1024);
        let mut buf = BytesMut::from(&[0xff, 0xff, 0xff, 0xff, 1, 2, 3][..]);

        let err = codec.decode(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert!(buf.capacity() < 1024, "reserved {} bytes", buf.capacity());
    }

    #[test]
    fn frame_at_the_limit_is_accepted() {
        let mut codec = FrameCodec::with_max_frame_length(4);
        let mut buf = BytesMut::from(&write_frame(b"four").unwrap()[..]);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Bytes::from("four")));
        assert_eq!(codec.max_frame_length(), 4);
    }

    #[test]
    fn encoder_prepends_length() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(Bytes::from_static(b"xyz"), &mut buf).unwrap();
        assert_eq!(&buf[..], &[3, 0, 0, 0, b'x', b'y', b'z']);
    }
}
