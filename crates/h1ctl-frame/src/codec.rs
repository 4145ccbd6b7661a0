use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Size of the big-endian length prefix.
pub const LENGTH_SIZE: usize = 4;

/// Default maximum total frame size: 16 MiB.
pub const DEFAULT_MAX_FRAME: usize = 16 * 1024 * 1024;

/// One length-prefixed unit on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Everything after the length prefix.
    pub payload: Bytes,
}

impl Frame {
    /// Create a new frame.
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
        }
    }

    /// The total wire size of this frame, which is also its length field.
    pub fn wire_size(&self) -> usize {
        LENGTH_SIZE + self.payload.len()
    }
}

/// Encode a message into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────────────┬──────────────────────────┐
/// │ Length L (4B BE)   │ Message (L - 4 bytes)     │
/// │ counts itself      │                           │
/// └────────────────────┴──────────────────────────┘
/// ```
pub fn encode_frame(message: &[u8], dst: &mut BytesMut) -> Result<()> {
    let total = message.len() + LENGTH_SIZE;
    if total > u32::MAX as usize {
        return Err(FrameError::FrameTooLarge {
            size: total,
            max: u32::MAX as usize,
        });
    }
    dst.reserve(total);
    dst.put_u32(total as u32);
    dst.put_slice(message);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet; the
/// buffer is then left untouched. On success, consumes the frame bytes.
///
/// A length below 4 is reported as `InvalidLength` after discarding the
/// length field, so the stream keeps moving. A length above `max_frame` is
/// reported as `FrameTooLarge` without consuming anything: the stream cannot
/// be resynchronised and the caller should reset the buffer.
pub fn decode_frame(src: &mut BytesMut, max_frame: usize) -> Result<Option<Frame>> {
    if src.len() < LENGTH_SIZE {
        return Ok(None); // Need more data
    }

    let length = u32::from_be_bytes([src[0], src[1], src[2], src[3]]);
    let total = length as usize;

    if total < LENGTH_SIZE {
        src.advance(LENGTH_SIZE);
        return Err(FrameError::InvalidLength { length });
    }

    if total > max_frame {
        return Err(FrameError::FrameTooLarge {
            size: total,
            max: max_frame,
        });
    }

    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(LENGTH_SIZE);
    let payload = src.split_to(total - LENGTH_SIZE).freeze();

    Ok(Some(Frame::new(payload)))
}

/// Decode every complete frame currently buffered, in order.
///
/// Stops at the first incomplete frame, or after a `FrameTooLarge` error
/// (which is included as the last item).
pub fn decode_frames(src: &mut BytesMut, max_frame: usize) -> Vec<Result<Frame>> {
    let mut out = Vec::new();
    loop {
        match decode_frame(src, max_frame) {
            Ok(Some(frame)) => out.push(Ok(frame)),
            Ok(None) => break,
            Err(err @ FrameError::FrameTooLarge { .. }) => {
                out.push(Err(err));
                break;
            }
            Err(err) => out.push(Err(err)),
        }
    }
    out
}

/// Configuration for the frame codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum total frame size in bytes. Default: 16 MiB.
    pub max_frame_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME,
        }
    }
}
