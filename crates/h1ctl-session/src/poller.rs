use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use h1ctl_frame::{decode_frames, type_name, Frame, FrameConfig, FrameError, Message};
use h1ctl_transport::{Connection, TransportError};
use tracing::{debug, error, info, warn};

use crate::command::Response;
use crate::mailbox::Mailbox;

/// Default poll cadence (10 Hz).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

const PREVIEW_LIMIT: usize = 64;

/// Configuration for the inbound poller.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Sleep between socket drains.
    pub interval: Duration,
    /// Frames above `frame.max_frame_size` mark the stream corrupt.
    pub frame: FrameConfig,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            frame: FrameConfig::default(),
        }
    }
}

/// Drains the read side of the connection and publishes replies.
pub struct Poller {
    conn: Connection,
    mailbox: Arc<Mailbox>,
    config: PollerConfig,
}

impl Poller {
    /// `conn` must be the read path only; nothing else may read from it.
    pub fn new(conn: Connection, mailbox: Arc<Mailbox>, config: PollerConfig) -> Self {
        Self {
            conn,
            mailbox,
            config,
        }
    }

    /// Read what is available, decode every complete frame and publish
    /// JSON replies. Returns the number of replies published.
    pub fn poll_once(&mut self) -> Result<usize, TransportError> {
        let read = self.conn.read_nonblocking()?;
        if read == 0 {
            return Ok(0);
        }
        debug!(bytes = read, buffered = self.conn.buffer().len(), "inbound data");

        let mut published = 0usize;
        for result in decode_frames(self.conn.buffer_mut(), self.config.frame.max_frame_size) {
            match result {
                Ok(frame) => {
                    if self.dispatch(frame) {
                        published += 1;
                    }
                }
                Err(err @ FrameError::FrameTooLarge { .. }) => {
                    warn!(error = %err, "inbound stream corrupt; discarding buffer");
                    self.conn.buffer_mut().clear();
                }
                Err(err) => warn!(error = %err, "dropping frame"),
            }
        }
        Ok(published)
    }

    fn dispatch(&self, frame: Frame) -> bool {
        let message = match Message::classify(frame.payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(error = %err, "dropping frame");
                return false;
            }
        };

        match message {
            Message::Json(body) => match serde_json::from_slice::<Response>(&body) {
                Ok(response) => {
                    debug!(
                        command = %response.command,
                        status = response.status,
                        "reply received"
                    );
                    self.mailbox.publish(response);
                    true
                }
                Err(err) => {
                    warn!(
                        error = %err,
                        body = %preview(&body),
                        "dropping malformed JSON message"
                    );
                    false
                }
            },
            Message::Binary { more, body } => {
                debug!(more, bytes = body.len(), "binary chunk ignored");
                false
            }
            Message::Unclassified { tag, raw } => {
                warn!(
                    tag,
                    kind = type_name(tag),
                    bytes = raw.len(),
                    raw = %preview(&raw),
                    "unhandled message type"
                );
                false
            }
        }
    }

    /// Run on a dedicated thread until the handle is stopped or the peer
    /// closes the connection.
    pub fn spawn(self) -> std::io::Result<PollerHandle> {
        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread = std::thread::Builder::new()
            .name("h1ctl-poller".to_string())
            .spawn(move || self.run(stop_rx))?;
        Ok(PollerHandle {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    fn run(mut self, stop: mpsc::Receiver<()>) {
        debug!(interval = ?self.config.interval, "poller started");
        loop {
            match self.poll_once() {
                Ok(_) => {}
                Err(TransportError::PeerClosed) => {
                    warn!("device closed the connection");
                    break;
                }
                Err(err) => {
                    error!(error = %err, "poller stopped");
                    break;
                }
            }

            match stop.recv_timeout(self.config.interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    debug!("poller stop requested");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
        self.mailbox.close();
        info!("poller finished");
    }
}

/// Owner's side of a running poller.
#[derive(Debug)]
pub struct PollerHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl PollerHandle {
    /// Signal the poller to stop and wait for it to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    /// Whether the poller thread has exited on its own.
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(JoinHandle::is_finished)
    }

    fn shutdown(&mut self) {
        if let Some(stop) = self.stop.take() {
            // A send error only means the poller already exited.
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("poller thread panicked");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn preview(bytes: &[u8]) -> String {
    let shown = &bytes[..bytes.len().min(PREVIEW_LIMIT)];
    match std::str::from_utf8(shown) {
        Ok(text) => text.to_string(),
        // The cut landed inside a multi-byte character.
        Err(err) if err.error_len().is_none() => {
            String::from_utf8_lossy(&shown[..err.valid_up_to()]).into_owned()
        }
        Err(_) => format!("<binary {} bytes>", bytes.len()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};
    use std::time::Instant;

    use bytes::BytesMut;
    use h1ctl_frame::{encode_frame, encode_json_message, message_header, TYPE_BINARY};

    use super::*;
    use crate::mailbox::Delivery;

    fn pair() -> (Connection, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut conn = Connection::new();
        conn.connect("127.0.0.1", port).unwrap();
        let (device, _) = listener.accept().unwrap();
        (conn, device)
    }

    fn reply_frame(json: &str) -> BytesMut {
        let mut buf = BytesMut::new();
        encode_json_message(json.as_bytes(), &mut buf).unwrap();
        buf
    }

    fn poll_until(poller: &mut Poller, want: usize) -> usize {
        let deadline = Instant::now() + Duration::from_secs(3);
        let mut total = 0;
        while total < want {
            total += poller.poll_once().unwrap();
            assert!(Instant::now() < deadline, "timed out waiting for replies");
            std::thread::sleep(Duration::from_millis(5));
        }
        total
    }

    fn wait_for_close(mailbox: &Mailbox) {
        let deadline = Instant::now() + Duration::from_secs(3);
        while !mailbox.is_closed() {
            assert!(Instant::now() < deadline, "mailbox never closed");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn back_to_back_replies_keep_newest() {
        let (conn, mut device) = pair();
        let mailbox = Arc::new(Mailbox::new());
        let mut poller = Poller::new(conn, Arc::clone(&mailbox), PollerConfig::default());

        let mut wire = reply_frame(r#"{"command":"record","status":0}"#);
        wire.extend_from_slice(&reply_frame(r#"{"command":"stoprecord","status":0}"#));
        device.write_all(&wire).unwrap();

        assert_eq!(poll_until(&mut poller, 2), 2);
        match mailbox.take() {
            Delivery::Reply(resp) => assert_eq!(resp.command, "stoprecord"),
            other => panic!("unexpected delivery: {other:?}"),
        }
    }

    #[test]
    fn non_json_frames_are_skipped() {
        let (conn, mut device) = pair();
        let mailbox = Arc::new(Mailbox::new());
        let mut poller = Poller::new(conn, Arc::clone(&mailbox), PollerConfig::default());

        let mut wire = BytesMut::new();
        let mut chunk = message_header(TYPE_BINARY, true).to_vec();
        chunk.extend_from_slice(b"\x00\x01\x02");
        encode_frame(&chunk, &mut wire).unwrap();
        encode_frame(&[9, 0, 0, 0, b'x'], &mut wire).unwrap();
        encode_frame(&[0, 0], &mut wire).unwrap();
        wire.extend_from_slice(&reply_frame("{not json"));
        wire.extend_from_slice(&reply_frame(r#"{"command":"ping","status":0}"#));
        device.write_all(&wire).unwrap();

        assert_eq!(poll_until(&mut poller, 1), 1);
        match mailbox.take() {
            Delivery::Reply(resp) => assert_eq!(resp.command, "ping"),
            other => panic!("unexpected delivery: {other:?}"),
        }
    }

    #[test]
    fn reply_split_across_writes() {
        let (conn, mut device) = pair();
        let mailbox = Arc::new(Mailbox::new());
        let mut poller = Poller::new(conn, Arc::clone(&mailbox), PollerConfig::default());

        let wire = reply_frame(r#"{"command":"status","status":0}"#);
        device.write_all(&wire[..6]).unwrap();
        device.flush().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(poller.poll_once().unwrap(), 0);
        assert_eq!(mailbox.take(), Delivery::Empty);

        device.write_all(&wire[6..]).unwrap();
        assert_eq!(poll_until(&mut poller, 1), 1);
    }

    #[test]
    fn oversized_frame_discards_buffer() {
        let (conn, mut device) = pair();
        let mailbox = Arc::new(Mailbox::new());
        let config = PollerConfig {
            frame: FrameConfig { max_frame_size: 64 },
            ..PollerConfig::default()
        };
        let mut poller = Poller::new(conn, Arc::clone(&mailbox), config);

        let mut garbage = 1000u32.to_be_bytes().to_vec();
        garbage.extend_from_slice(&[0u8; 12]);
        device.write_all(&garbage).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(poller.poll_once().unwrap(), 0);
        assert!(poller.conn.buffer().is_empty());

        device
            .write_all(&reply_frame(r#"{"command":"ping","status":0}"#))
            .unwrap();
        assert_eq!(poll_until(&mut poller, 1), 1);
    }

    #[test]
    fn peer_close_closes_mailbox() {
        let (conn, device) = pair();
        let mailbox = Arc::new(Mailbox::new());
        let handle = Poller::new(conn, Arc::clone(&mailbox), PollerConfig::default())
            .spawn()
            .unwrap();

        drop(device);
        wait_for_close(&mailbox);
        assert_eq!(mailbox.take(), Delivery::Closed);
        handle.stop();
    }

    #[test]
    fn stop_signal_ends_thread_promptly() {
        let (conn, _device) = pair();
        let mailbox = Arc::new(Mailbox::new());
        let config = PollerConfig {
            interval: Duration::from_secs(30),
            ..PollerConfig::default()
        };
        let handle = Poller::new(conn, Arc::clone(&mailbox), config)
            .spawn()
            .unwrap();
        assert!(!handle.is_finished());

        let started = Instant::now();
        handle.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(mailbox.is_closed());
    }

    #[test]
    fn published_while_running() {
        let (conn, mut device) = pair();
        let mailbox = Arc::new(Mailbox::new());
        let config = PollerConfig {
            interval: Duration::from_millis(10),
            ..PollerConfig::default()
        };
        let handle = Poller::new(conn, Arc::clone(&mailbox), config)
            .spawn()
            .unwrap();

        device
            .write_all(&reply_frame(r#"{"command":"upload","status":0}"#))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(3);
        loop {
            match mailbox.take() {
                Delivery::Reply(resp) => {
                    assert_eq!(resp.command, "upload");
                    break;
                }
                Delivery::Empty => {
                    assert!(Instant::now() < deadline, "reply never published");
                    std::thread::sleep(Duration::from_millis(5));
                }
                Delivery::Closed => panic!("mailbox closed early"),
            }
        }
        handle.stop();
    }

    #[test]
    fn preview_truncates() {
        assert_eq!(preview(b"abc"), "abc");
        assert_eq!(preview(&[0xff, 0xfe]), "<binary 2 bytes>");
        assert_eq!(preview(&[b'a'; 100]).len(), PREVIEW_LIMIT);
    }

    #[test]
    fn preview_keeps_text_cut_inside_a_character() {
        // 63 ASCII bytes put the limit in the middle of the two-byte "é".
        let text = format!("{{\"msg\":\"{}é tail\"}}", "x".repeat(63 - 8));
        assert_eq!(text.as_bytes()[PREVIEW_LIMIT - 1], 0xc3);

        let shown = preview(text.as_bytes());
        assert_eq!(shown.len(), PREVIEW_LIMIT - 1);
        assert!(shown.starts_with("{\"msg\":\"xxx"));
    }
}
