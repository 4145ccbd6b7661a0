//! Length-prefixed framing and message classification for the H1 protocol.
//!
//! Every frame on the wire is:
//! - A 4-byte big-endian length that counts the whole frame, itself included
//! - A 4-byte message header (type tag, "more" flag, reserved)
//! - The message body (UTF-8 JSON for type 0)
//!
//! The codec only knows about the length prefix; [`message`] interprets the
//! header.

pub mod codec;
pub mod error;
pub mod message;

pub use codec::{
    decode_frame, decode_frames, encode_frame, Frame, FrameConfig, DEFAULT_MAX_FRAME, LENGTH_SIZE,
};
pub use error::{FrameError, Result};
pub use message::{
    encode_json_message, message_header, type_name, Message, HEADER_SIZE, TYPE_BINARY, TYPE_JSON,
};
