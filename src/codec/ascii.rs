// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use super::{DecodeCursor, Frame, FrameCodec};
use crate::{AppError, AppResult};

pub const START_MARKER: u8 = 0x0A;
pub const END_MARKER: u8 = 0x0D;
/// Width of the zero-padded decimal length field.
pub const LEN_FIELD_WIDTH: usize = 5;
/// The length field counts the payload plus its own five digits.
pub const MAX_LEN_FIELD: usize = 99_999;
pub const MIN_PAYLOAD_LEN: usize = 1;
pub const MAX_PAYLOAD_LEN: usize = MAX_LEN_FIELD - LEN_FIELD_WIDTH;

const HEADER_LEN: usize = 1 + LEN_FIELD_WIDTH;
/// start marker + length field + end marker
const FRAME_OVERHEAD: usize = HEADER_LEN + 1;
/// Nothing is attempted below this many buffered bytes.
const MIN_DECODE_LEN: usize = 7;

/// Length-delimited ASCII framing:
///
/// ```text
/// 0x0A | LEN (5 ASCII digits, zero padded) | PAYLOAD (LEN - 5 bytes) | 0x0D
/// ```
///
/// On a corrupt length field or a missing end marker the leading start
/// marker is dropped and the next call scans for the following one, so a
/// damaged frame costs at most the distance to the next valid marker.
#[derive(Debug, Default, Clone, Copy)]
pub struct AsciiFrameCodec;

fn parse_len_field(digits: &[u8]) -> Option<usize> {
    digits.iter().try_fold(0usize, |acc, &c| {
        if c.is_ascii_digit() {
            Some(acc * 10 + (c - b'0') as usize)
        } else {
            None
        }
    })
}

impl FrameCodec for AsciiFrameCodec {
    fn encode(&self, payload: &[u8]) -> AppResult<Bytes> {
        if payload.len() < MIN_PAYLOAD_LEN {
            return Err(AppError::FrameTooSmall {
                len: payload.len(),
                min: MIN_PAYLOAD_LEN,
            });
        }
        if payload.len() > MAX_PAYLOAD_LEN {
            return Err(AppError::FrameTooLarge {
                len: payload.len(),
                max: MAX_PAYLOAD_LEN,
            });
        }

        let len_field = payload.len() + LEN_FIELD_WIDTH;
        let mut buf = BytesMut::with_capacity(payload.len() + FRAME_OVERHEAD);
        buf.put_u8(START_MARKER);
        buf.put_slice(format!("{:05}", len_field).as_bytes());
        buf.put_slice(payload);
        buf.put_u8(END_MARKER);
        Ok(buf.freeze())
    }

    fn try_decode(&self, cursor: &mut DecodeCursor<'_>) -> Option<Frame> {
        if cursor.remaining_len() < MIN_DECODE_LEN {
            return None;
        }

        let start = match cursor.remaining().iter().position(|&b| b == START_MARKER) {
            Some(start) => start,
            None => {
                trace!(
                    "no start marker in {} buffered bytes, discarding",
                    cursor.remaining_len()
                );
                cursor.skip_all();
                return None;
            }
        };
        if start > 0 {
            trace!("discarding {} bytes before start marker", start);
            cursor.advance(start);
        }

        let buf = cursor.remaining();
        if buf.len() < MIN_DECODE_LEN {
            return None;
        }

        let len_field = match parse_len_field(&buf[1..HEADER_LEN]) {
            Some(len_field) => len_field,
            None => {
                trace!("non-digit length field, dropping start marker");
                cursor.advance(1);
                return None;
            }
        };
        if len_field < LEN_FIELD_WIDTH + MIN_PAYLOAD_LEN || len_field > MAX_LEN_FIELD {
            trace!("length field {} out of range, dropping start marker", len_field);
            cursor.advance(1);
            return None;
        }

        let payload_len = len_field - LEN_FIELD_WIDTH;
        let full_frame_len = FRAME_OVERHEAD + payload_len;
        if buf.len() < full_frame_len {
            return None;
        }
        if buf[full_frame_len - 1] != END_MARKER {
            trace!(
                "missing end marker at {} (found {:#04x}), dropping start marker",
                full_frame_len - 1,
                buf[full_frame_len - 1]
            );
            cursor.advance(1);
            return None;
        }

        let frame = Frame::copy_from_slice(&buf[HEADER_LEN..HEADER_LEN + payload_len]);
        cursor.advance(full_frame_len);
        Some(frame)
    }
}
