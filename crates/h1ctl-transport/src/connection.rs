use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use bytes::BytesMut;
use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::stream::DeviceStream;

const INITIAL_BUFFER_CAPACITY: usize = 8 * 1024;
const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Default device command port.
pub const DEFAULT_PORT: u16 = 9999;

/// Default bound on how long `connect` may block.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on how long `send` waits for the device to drain its
/// receive window.
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

const WRITE_BACKOFF_START: Duration = Duration::from_millis(1);
const WRITE_BACKOFF_MAX: Duration = Duration::from_millis(20);

/// A TCP connection to the device plus its inbound byte buffer.
///
/// The socket is either absent or connected. The buffer only grows through
/// [`Connection::read_nonblocking`] and only shrinks when the frame codec
/// consumes whole frames from [`Connection::buffer_mut`].
pub struct Connection {
    stream: Option<DeviceStream>,
    host: String,
    port: u16,
    buf: BytesMut,
    connect_timeout: Duration,
    write_timeout: Duration,
}

impl Connection {
    /// Create a disconnected connection.
    pub fn new() -> Self {
        Self {
            stream: None,
            host: String::new(),
            port: DEFAULT_PORT,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Override the connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Override how long `send` may stall on a full socket.
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Open a TCP connection to `host:port` and switch it to non-blocking mode.
    ///
    /// Does nothing if already connected. On failure the connection stays
    /// disconnected and the caller decides whether that is fatal.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<()> {
        if self.stream.is_some() {
            debug!(host = %self.host, port = self.port, "already connected");
            return Ok(());
        }

        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                host: host.to_string(),
                port,
                source,
            })?
            .collect();

        let mut last_err = std::io::Error::new(ErrorKind::NotFound, "no addresses resolved");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(tcp) => {
                    let stream = DeviceStream::from_tcp(tcp);
                    stream
                        .set_nonblocking(true)
                        .map_err(|err| connect_error(host, port, err))?;
                    info!(%addr, "connected to device");
                    self.stream = Some(stream);
                    self.host = host.to_string();
                    self.port = port;
                    return Ok(());
                }
                Err(err) => {
                    debug!(%addr, error = %err, "connect attempt failed");
                    last_err = err;
                }
            }
        }

        warn!(host, port, error = %last_err, "could not connect to device");
        Err(TransportError::Connect {
            addr: format!("{host}:{port}"),
            source: last_err,
        })
    }

    /// Close the socket and clear the buffer. Idempotent.
    pub fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.shutdown() {
                debug!(error = %err, "socket shutdown failed");
            }
            info!(host = %self.host, port = self.port, "disconnected");
        }
        self.buf.clear();
    }

    /// Whether a socket is currently open.
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Host of the current (or last) connection.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port of the current (or last) connection.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Append every byte that is available right now to the buffer.
    ///
    /// Returns the number of new bytes, `0` meaning "nothing yet". A
    /// zero-length read or any error other than would-block means the peer
    /// is gone: the connection is closed and `PeerClosed` is returned.
    pub fn read_nonblocking(&mut self) -> Result<usize> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        let mut chunk = [0u8; READ_CHUNK_SIZE];
        let mut total = 0usize;
        let closed = loop {
            match stream.read(&mut chunk) {
                Ok(0) => break true,
                Ok(n) => {
                    self.buf.extend_from_slice(&chunk[..n]);
                    total += n;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => break false,
                Err(err) => {
                    warn!(error = %err, "socket read failed");
                    break true;
                }
            }
        };

        // Hand over what arrived before the close; the next read reports it.
        if closed && total == 0 {
            self.disconnect();
            return Err(TransportError::PeerClosed);
        }
        Ok(total)
    }

    /// Write the exact byte sequence to the socket.
    ///
    /// A full socket is retried with backoff. If no byte can be written for
    /// the write timeout, fails with [`ErrorKind::TimedOut`].
    pub fn send(&mut self, bytes: &[u8]) -> Result<()> {
        let write_timeout = self.write_timeout;
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;

        let mut offset = 0usize;
        let mut stalled_since: Option<Instant> = None;
        let mut backoff = WRITE_BACKOFF_START;
        while offset < bytes.len() {
            match stream.write(&bytes[offset..]) {
                Ok(0) => return Err(TransportError::Io(ErrorKind::WriteZero.into())),
                Ok(n) => {
                    offset += n;
                    stalled_since = None;
                    backoff = WRITE_BACKOFF_START;
                }
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    let since = *stalled_since.get_or_insert_with(Instant::now);
                    if since.elapsed() >= write_timeout {
                        warn!(
                            sent = offset,
                            total = bytes.len(),
                            timeout = ?write_timeout,
                            "device stopped accepting data"
                        );
                        return Err(TransportError::Io(std::io::Error::new(
                            ErrorKind::TimedOut,
                            format!("send stalled for {write_timeout:?}"),
                        )));
                    }
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(WRITE_BACKOFF_MAX);
                }
                Err(err) => return Err(TransportError::Io(err)),
            }
        }
        debug!(bytes = bytes.len(), "sent");
        Ok(())
    }

    /// Bytes received but not yet consumed as frames.
    pub fn buffer(&self) -> &BytesMut {
        &self.buf
    }

    /// Mutable access for the frame codec.
    pub fn buffer_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Create a second connection over the same socket, with its own empty
    /// buffer, to serve as the exclusive read path.
    pub fn try_clone_reader(&self) -> Result<Connection> {
        let stream = self.stream.as_ref().ok_or(TransportError::NotConnected)?;
        Ok(Connection {
            stream: Some(stream.try_clone()?),
            host: self.host.clone(),
            port: self.port,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            connect_timeout: self.connect_timeout,
            write_timeout: self.write_timeout,
        })
    }

    /// A handle that can force the socket closed from another thread.
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        let stream = self.stream.as_ref().ok_or(TransportError::NotConnected)?;
        Ok(ShutdownHandle {
            stream: stream.try_clone()?,
        })
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("connected", &self.stream.is_some())
            .field("buffered", &self.buf.len())
            .finish()
    }
}

/// Forces a process-level disconnect, e.g. from a signal handler.
#[derive(Debug)]
pub struct ShutdownHandle {
    stream: DeviceStream,
}

impl ShutdownHandle {
    /// Shut the socket down in both directions.
    ///
    /// The poller then observes a peer close and every later command fails.
    pub fn shutdown(&self) {
        if let Err(err) = self.stream.shutdown() {
            debug!(error = %err, "forced shutdown failed");
        }
    }
}

fn connect_error(host: &str, port: u16, err: TransportError) -> TransportError {
    match err {
        TransportError::Io(source) => TransportError::Connect {
            addr: format!("{host}:{port}"),
            source,
        },
        other => other,
    }
}
