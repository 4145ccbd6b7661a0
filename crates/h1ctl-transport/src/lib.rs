//! TCP connection management for the H1 recorder command protocol.
//!
//! This is the lowest layer of h1ctl. It owns the socket, performs
//! non-blocking reads into a byte buffer and exact writes, and reports
//! transport-level failure. Framing lives in `h1ctl-frame`.

pub mod connection;
pub mod error;
pub mod stream;

pub use connection::{
    Connection, ShutdownHandle, DEFAULT_CONNECT_TIMEOUT, DEFAULT_PORT, DEFAULT_WRITE_TIMEOUT,
};
pub use error::{Result, TransportError};
pub use stream::DeviceStream;
