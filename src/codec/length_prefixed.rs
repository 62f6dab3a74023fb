use bytes::{BufMut, Bytes, BytesMut};
use tracing::warn;

use super::{DecodeCursor, Frame, FrameCodec};
use crate::{AppError, AppResult};

const HEADER_LEN: usize = 4;

/// A 4-byte big-endian signed length followed by that many payload bytes.
///
/// There are no markers to resynchronize on, so a header announcing a
/// negative or oversized body throws away everything buffered.
#[derive(Debug, Clone, Copy)]
pub struct LengthPrefixedCodec {
    max_frame_size: usize,
}

impl LengthPrefixedCodec {
    pub fn new(max_frame_size: usize) -> LengthPrefixedCodec {
        LengthPrefixedCodec {
            max_frame_size: max_frame_size.min(i32::MAX as usize),
        }
    }

    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for LengthPrefixedCodec {
    fn default() -> Self {
        LengthPrefixedCodec::new(1024 * 1024)
    }
}

impl FrameCodec for LengthPrefixedCodec {
    fn encode(&self, payload: &[u8]) -> AppResult<Bytes> {
        if payload.len() > self.max_frame_size {
            return Err(AppError::FrameTooLarge {
                len: payload.len(),
                max: self.max_frame_size,
            });
        }
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
        buf.put_i32(payload.len() as i32);
        buf.put_slice(payload);
        Ok(buf.freeze())
    }

    fn try_decode(&self, cursor: &mut DecodeCursor<'_>) -> Option<Frame> {
        let buf = cursor.remaining();
        if buf.len() < HEADER_LEN {
            return None;
        }
        let body_size = i32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if body_size < 0 || body_size as usize > self.max_frame_size {
            warn!(
                "frame size {} outside 0..={}, discarding {} buffered bytes",
                body_size,
                self.max_frame_size,
                buf.len()
            );
            cursor.skip_all();
            return None;
        }
        let full_frame_len = HEADER_LEN + body_size as usize;
        if buf.len() < full_frame_len {
            return None;
        }
        let frame = Frame::copy_from_slice(&buf[HEADER_LEN..full_frame_len]);
        cursor.advance(full_frame_len);
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use bytes::BytesMut;

    use super::*;
    use crate::codec::drain_frames;

    #[test]
    fn test_encode_layout() {
        let wire = LengthPrefixedCodec::default().encode(b"abc").unwrap();
        assert_eq!(&wire[..], &[0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_partial_header_and_body() {
        let codec = LengthPrefixedCodec::default();
        let wire = codec.encode(b"hello").unwrap();
        let mut buffer = BytesMut::new();

        buffer.extend_from_slice(&wire[..2]);
        assert!(drain_frames(&codec, &mut buffer).is_empty());
        buffer.extend_from_slice(&wire[2..6]);
        assert!(drain_frames(&codec, &mut buffer).is_empty());
        buffer.extend_from_slice(&wire[6..]);
        let frames = drain_frames(&codec, &mut buffer);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"hello");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_oversized_header_discards_buffer() {
        let codec = LengthPrefixedCodec::new(8);
        assert!(matches!(
            codec.encode(&[0u8; 9]),
            Err(AppError::FrameTooLarge { len: 9, max: 8 })
        ));

        let mut buffer = BytesMut::from(&[0u8, 0, 0, 9, 1, 2, 3][..]);
        assert!(drain_frames(&codec, &mut buffer).is_empty());
        assert!(buffer.is_empty());

        let mut buffer = BytesMut::from(&[0xFFu8, 0xFF, 0xFF, 0xFF, 1][..]);
        assert!(drain_frames(&codec, &mut buffer).is_empty());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let codec = LengthPrefixedCodec::default();
        let mut buffer = BytesMut::from(&codec.encode(b"").unwrap()[..]);
        let frames = drain_frames(&codec, &mut buffer);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_empty());
    }
}
