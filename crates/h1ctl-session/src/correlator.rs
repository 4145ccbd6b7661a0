use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use h1ctl_frame::encode_json_message;
use h1ctl_transport::Connection;
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::command::{Command, Response};
use crate::error::CommandError;
use crate::mailbox::{Delivery, Mailbox};

/// Default number of mailbox checks per command.
pub const DEFAULT_ATTEMPTS: u32 = 20;

/// Default spacing between mailbox checks.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(100);

/// Outbound half of the device link.
pub trait FrameSink {
    /// Write one fully encoded frame.
    fn send_frame(&mut self, frame: &[u8]) -> h1ctl_transport::Result<()>;
}

impl FrameSink for Connection {
    fn send_frame(&mut self, frame: &[u8]) -> h1ctl_transport::Result<()> {
        self.send(frame)
    }
}

/// How long a command may wait for its reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl RetryPolicy {
    /// Upper bound on the time spent waiting for one reply.
    pub fn budget(&self) -> Duration {
        self.interval.saturating_mul(self.attempts)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_ATTEMPTS,
            interval: DEFAULT_RETRY_INTERVAL,
        }
    }
}

/// Sends commands and waits for the reply with the same command name.
pub struct Correlator<S, C> {
    sink: S,
    mailbox: Arc<Mailbox>,
    clock: C,
    policy: RetryPolicy,
    buf: BytesMut,
}

impl<S: FrameSink, C: Clock> Correlator<S, C> {
    pub fn new(sink: S, mailbox: Arc<Mailbox>, clock: C, policy: RetryPolicy) -> Self {
        Self {
            sink,
            mailbox,
            clock,
            policy,
            buf: BytesMut::new(),
        }
    }

    /// Send `command` and block until its reply arrives or the budget runs out.
    ///
    /// Replies naming a different command are consumed and ignored; the
    /// attempt they arrived in still counts. A matching reply with a
    /// non-zero status is returned as [`CommandError::Rejected`].
    pub fn send(&mut self, command: &Command) -> Result<Response, CommandError> {
        let mailbox = Arc::clone(&self.mailbox);
        let mut pending =
            mailbox.begin(command.name(), self.policy.attempts, self.policy.interval)?;

        let json = command.to_json()?;
        self.buf.clear();
        encode_json_message(&json, &mut self.buf)?;
        self.sink.send_frame(&self.buf)?;
        debug!(command = %command.name(), bytes = self.buf.len(), "command sent");

        let mut waited = Duration::ZERO;
        while pending.next_attempt() {
            self.clock.sleep(pending.interval());
            waited = waited.saturating_add(pending.interval());

            match mailbox.take() {
                Delivery::Reply(reply) if reply.answers(pending.command()) => {
                    if reply.is_success() {
                        debug!(command = %reply.command, ?waited, "command acknowledged");
                        return Ok(reply);
                    }
                    warn!(command = %reply.command, status = reply.status, "command rejected");
                    return Err(CommandError::Rejected {
                        command: reply.command,
                        status: reply.status,
                    });
                }
                Delivery::Reply(reply) => {
                    debug!(
                        expected = %pending.command(),
                        received = %reply.command,
                        status = reply.status,
                        "ignoring unrelated reply"
                    );
                }
                Delivery::Empty => {}
                Delivery::Closed => {
                    warn!(command = %pending.command(), "connection closed while awaiting reply");
                    return Err(CommandError::Disconnected);
                }
            }
        }

        warn!(command = %command.name(), ?waited, "no reply");
        Err(CommandError::Timeout {
            command: command.name().to_string(),
            attempts: self.policy.attempts,
            waited,
        })
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn mailbox(&self) -> &Arc<Mailbox> {
        &self.mailbox
    }
}
