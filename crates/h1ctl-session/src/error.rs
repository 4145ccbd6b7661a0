use std::time::Duration;

use h1ctl_transport::TransportError;

/// Why a correlated command did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The device answered the command with a non-zero status.
    #[error("device rejected '{command}' (status {status})")]
    Rejected { command: String, status: i64 },

    /// No matching reply arrived within the retry budget.
    #[error("no reply to '{command}' after {attempts} attempts ({waited:?})")]
    Timeout {
        command: String,
        attempts: u32,
        waited: Duration,
    },

    /// The connection is gone; no reply can arrive.
    #[error("device disconnected")]
    Disconnected,

    /// Another correlation is still pending.
    #[error("command '{pending}' is still awaiting its reply")]
    Busy { pending: String },

    /// The command text is not a usable JSON command object.
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// Transport-level error while sending.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Frame-level error while encoding.
    #[error("frame error: {0}")]
    Frame(#[from] h1ctl_frame::FrameError),

    /// JSON serialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CommandError {
    /// True when the failure means the connection itself is unusable.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Disconnected => true,
            Self::Transport(TransportError::NotConnected | TransportError::PeerClosed) => true,
            Self::Transport(TransportError::Io(err)) => matches!(
                err.kind(),
                std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

/// Errors surfaced by the session and the recording workflow.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error (connect failures land here).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// A command failed where failure is not tolerated.
    #[error("command failed: {0}")]
    Command(#[from] CommandError),

    /// The upload trigger failed; the workflow is aborted.
    #[error("upload failed: {0}")]
    UploadFailed(#[source] CommandError),

    /// The device went away mid-sequence.
    #[error("device disconnected")]
    Disconnected,

    /// The inbound poller thread could not be started.
    #[error("failed to start inbound poller: {0}")]
    Poller(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SessionError>;
