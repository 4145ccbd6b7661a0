//! Message typing inside a frame.
//!
//! Every frame payload starts with a 4-byte message header:
//!
//! ```text
//! ┌──────────┬──────────┬───────────────┬──────────────┐
//! │ Type (1B)│ More (1B)│ Reserved (2B) │ Body          │
//! └──────────┴──────────┴───────────────┴──────────────┘
//! ```
//!
//! Type 0 carries a UTF-8 JSON command or response. Type 1 carries a binary
//! chunk; `more` is non-zero while further chunks follow.

use bytes::{Bytes, BytesMut};

use crate::codec::encode_frame;
use crate::error::{FrameError, Result};

/// Size of the message header at the start of every frame payload.
pub const HEADER_SIZE: usize = 4;

/// JSON command/response.
pub const TYPE_JSON: u8 = 0;

/// Binary/continuation chunk.
pub const TYPE_BINARY: u8 = 1;

/// A classified frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// UTF-8 JSON body.
    Json(Bytes),
    /// Binary chunk; surfaced but never parsed as a command.
    Binary { more: bool, body: Bytes },
    /// Unknown type tag; the whole payload is kept for logging.
    Unclassified { tag: u8, raw: Bytes },
}

impl Message {
    /// Classify a frame payload by its type tag.
    pub fn classify(payload: Bytes) -> Result<Self> {
        if payload.len() < HEADER_SIZE {
            return Err(FrameError::MissingHeader { len: payload.len() });
        }

        match payload[0] {
            TYPE_JSON => {
                let body = payload.slice(HEADER_SIZE..);
                std::str::from_utf8(&body)?;
                Ok(Self::Json(body))
            }
            TYPE_BINARY => Ok(Self::Binary {
                more: payload[1] != 0,
                body: payload.slice(HEADER_SIZE..),
            }),
            tag => Ok(Self::Unclassified { tag, raw: payload }),
        }
    }

    /// The wire type tag of this message.
    pub fn type_tag(&self) -> u8 {
        match self {
            Self::Json(_) => TYPE_JSON,
            Self::Binary { .. } => TYPE_BINARY,
            Self::Unclassified { tag, .. } => *tag,
        }
    }

    /// The JSON text, for JSON messages.
    pub fn json_text(&self) -> Option<&str> {
        match self {
            Self::Json(body) => std::str::from_utf8(body).ok(),
            _ => None,
        }
    }
}

/// Returns a human-readable name for a type tag.
pub fn type_name(tag: u8) -> &'static str {
    match tag {
        TYPE_JSON => "JSON",
        TYPE_BINARY => "BINARY",
        _ => "UNKNOWN",
    }
}

/// Build the 4-byte message header.
pub fn message_header(tag: u8, more: bool) -> [u8; HEADER_SIZE] {
    [tag, u8::from(more), 0, 0]
}

/// Encode a complete JSON command frame: length, header, body.
pub fn encode_json_message(json: &[u8], dst: &mut BytesMut) -> Result<()> {
    let mut message = Vec::with_capacity(HEADER_SIZE + json.len());
    message.extend_from_slice(&message_header(TYPE_JSON, false));
    message.extend_from_slice(json);
    encode_frame(&message, dst)
}
