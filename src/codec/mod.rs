//! Frame codecs
//!
//! A codec turns an application payload into wire bytes and slices complete
//! payloads back out of an accumulating receive buffer. Codecs keep no state
//! between calls: all continuation state lives in the caller's buffer and
//! the [`DecodeCursor`] over it, so one codec can be shared by any number of
//! peers.
//!
//! - [`AsciiFrameCodec`]: `0x0A` + 5 ASCII length digits + payload + `0x0D`,
//!   resynchronizing byte by byte after corruption
//! - [`LengthPrefixedCodec`]: 4-byte big-endian length header + payload

use std::ops::Deref;

use bytes::{Buf, Bytes, BytesMut};

use crate::AppResult;

pub use ascii::AsciiFrameCodec;
pub use length_prefixed::LengthPrefixedCodec;

mod ascii;
mod length_prefixed;

/// One complete application payload.
///
/// Always owns its bytes; it never aliases the receive buffer it was
/// decoded from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    payload: Bytes,
}

impl Frame {
    pub fn new(payload: Bytes) -> Frame {
        Frame { payload }
    }

    pub fn copy_from_slice(data: &[u8]) -> Frame {
        Frame {
            payload: Bytes::copy_from_slice(data),
        }
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn into_payload(self) -> Bytes {
        self.payload
    }
}

impl Deref for Frame {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.payload
    }
}

impl AsRef<[u8]> for Frame {
    fn as_ref(&self) -> &[u8] {
        &self.payload
    }
}

/// An `(offset, remaining)` view over a receive buffer.
///
/// Codecs move the offset forward as they consume frames or discard
/// garbage; the caller reads [`consumed`](Self::consumed) afterwards to
/// compact its buffer.
#[derive(Debug)]
pub struct DecodeCursor<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> DecodeCursor<'a> {
    pub fn new(buffer: &'a [u8]) -> DecodeCursor<'a> {
        DecodeCursor { buffer, offset: 0 }
    }

    /// The bytes not yet consumed.
    pub fn remaining(&self) -> &'a [u8] {
        &self.buffer[self.offset..]
    }

    pub fn remaining_len(&self) -> usize {
        self.buffer.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.remaining_len() == 0
    }

    pub fn consumed(&self) -> usize {
        self.offset
    }

    /// Moves past `n` bytes, clamped to the end of the buffer.
    pub fn advance(&mut self, n: usize) {
        debug_assert!(n <= self.remaining_len());
        self.offset = (self.offset + n).min(self.buffer.len());
    }

    pub fn skip_all(&mut self) {
        self.offset = self.buffer.len();
    }
}

pub trait FrameCodec: Send + Sync {
    /// Produces the exact wire representation of `payload`.
    ///
    /// Fails with `FrameTooSmall`/`FrameTooLarge` when the payload length
    /// cannot be represented.
    fn encode(&self, payload: &[u8]) -> AppResult<Bytes>;

    /// Extracts at most one frame from the front of the cursor.
    ///
    /// Returns `None` when the buffered bytes do not hold a complete frame
    /// yet. It may still advance the cursor past bytes that can never be
    /// part of a frame. Never blocks, never fails.
    fn try_decode(&self, cursor: &mut DecodeCursor<'_>) -> Option<Frame>;
}

/// Decodes every complete frame at the front of `buffer`, in order, then
/// drops the consumed prefix so the undecoded tail starts at offset 0.
///
/// Decoding keeps going as long as the codec makes progress, so a discarded
/// garbage prefix followed by a complete frame yields that frame in the same
/// pass.
pub fn drain_frames<C>(codec: &C, buffer: &mut BytesMut) -> Vec<Frame>
where
    C: FrameCodec + ?Sized,
{
    let mut frames = Vec::new();
    let mut cursor = DecodeCursor::new(&buffer[..]);
    loop {
        let before = cursor.consumed();
        match codec.try_decode(&mut cursor) {
            Some(frame) => frames.push(frame),
            None if cursor.consumed() > before => continue,
            None => break,
        }
    }
    let consumed = cursor.consumed();
    buffer.advance(consumed);
    frames
}
