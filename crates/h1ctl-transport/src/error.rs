/// Errors that can occur on the device connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The device host name could not be resolved.
    #[error("failed to resolve {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        source: std::io::Error,
    },

    /// Failed to open a connection to the device.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// An operation needed an open socket but the connection is closed.
    #[error("not connected")]
    NotConnected,

    /// The device closed the connection (zero-length read or read failure).
    #[error("connection closed by peer")]
    PeerClosed,

    /// An I/O error occurred on the socket.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TransportError>;
