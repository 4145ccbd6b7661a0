/// Errors that can occur during frame encoding/decoding and classification.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The length field is smaller than the length field itself.
    #[error("invalid frame length {length} (must be at least 4)")]
    InvalidLength { length: u32 },

    /// The frame exceeds the configured maximum size.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The frame payload is shorter than the 4-byte message header.
    #[error("message too short for header ({len} bytes)")]
    MissingHeader { len: usize },

    /// A JSON message body is not valid UTF-8.
    #[error("JSON message is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;
