use std::sync::Arc;
use std::time::Duration;

use h1ctl_frame::FrameConfig;
use h1ctl_transport::{Connection, ShutdownHandle, DEFAULT_CONNECT_TIMEOUT, DEFAULT_WRITE_TIMEOUT};
use tracing::{debug, info};

use crate::clock::SystemClock;
use crate::command::{Command, Response};
use crate::correlator::{Correlator, RetryPolicy};
use crate::error::{CommandError, Result, SessionError};
use crate::mailbox::Mailbox;
use crate::poller::{Poller, PollerConfig, PollerHandle, DEFAULT_POLL_INTERVAL};
use crate::sequencer::{RecordingJob, SequenceReport, SequenceTimings, Sequencer, WorkflowReport};

/// Tuning for a device session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub connect_timeout: Duration,
    pub write_timeout: Duration,
    pub poll_interval: Duration,
    pub frame: FrameConfig,
    pub retry: RetryPolicy,
    pub timings: SequenceTimings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            frame: FrameConfig::default(),
            retry: RetryPolicy::default(),
            timings: SequenceTimings::default(),
        }
    }
}

/// A live connection to one device: the write path, the poller on the read
/// path, and the mailbox between them.
///
/// Dropping the session closes the socket and joins the poller.
pub struct Session {
    correlator: Correlator<Connection, SystemClock>,
    poller: Option<PollerHandle>,
    timings: SequenceTimings,
}

impl Session {
    /// Connect with the default configuration.
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        Self::connect_with_config(host, port, SessionConfig::default())
    }

    /// Connect, start the inbound poller and return the session.
    pub fn connect_with_config(host: &str, port: u16, config: SessionConfig) -> Result<Self> {
        let mut conn = Connection::new()
            .with_connect_timeout(config.connect_timeout)
            .with_write_timeout(config.write_timeout);
        conn.connect(host, port)?;
        let reader = conn.try_clone_reader()?;

        let mailbox = Arc::new(Mailbox::new());
        let poller = Poller::new(
            reader,
            Arc::clone(&mailbox),
            PollerConfig {
                interval: config.poll_interval,
                frame: config.frame,
            },
        )
        .spawn()
        .map_err(SessionError::Poller)?;

        info!(host, port, "session established");
        Ok(Self {
            correlator: Correlator::new(conn, mailbox, SystemClock, config.retry),
            poller: Some(poller),
            timings: config.timings,
        })
    }

    /// Send one command and wait for its correlated reply.
    pub fn send_command(
        &mut self,
        command: &Command,
    ) -> std::result::Result<Response, CommandError> {
        self.correlator.send(command)
    }

    /// Record `clip_count` clips of `clip_length_secs` seconds on `camera`.
    pub fn run_recording_sequence(
        &mut self,
        camera: u32,
        clip_length_secs: u64,
        clip_count: u32,
    ) -> Result<SequenceReport> {
        let job = RecordingJob::new(camera, clip_length_secs, clip_count);
        self.sequencer().run(&job)
    }

    /// Wait the upload delay, then trigger the upload. Failure is fatal.
    pub fn start_upload(&mut self) -> Result<Response> {
        self.sequencer().upload()
    }

    /// Record `job`, then upload if `upload` is set.
    pub fn run_workflow(&mut self, job: &RecordingJob, upload: bool) -> Result<WorkflowReport> {
        self.sequencer().run_workflow(job, upload)
    }

    /// Handle for forcing the connection closed from another thread.
    pub fn shutdown_handle(&self) -> Result<ShutdownHandle> {
        Ok(self.correlator.sink().shutdown_handle()?)
    }

    /// Whether the socket is open and the poller still running.
    pub fn is_connected(&self) -> bool {
        self.correlator.sink().is_connected() && !self.correlator.mailbox().is_closed()
    }

    pub fn host(&self) -> &str {
        self.correlator.sink().host()
    }

    pub fn port(&self) -> u16 {
        self.correlator.sink().port()
    }

    /// Close the socket and stop the poller.
    pub fn disconnect(mut self) {
        self.close();
    }

    fn sequencer(&mut self) -> Sequencer<'_, Connection, SystemClock> {
        Sequencer::new(&mut self.correlator, self.timings)
    }

    fn close(&mut self) {
        self.correlator.sink_mut().disconnect();
        if let Some(poller) = self.poller.take() {
            poller.stop();
            debug!("poller joined");
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("connection", self.correlator.sink())
            .field("polling", &self.poller.is_some())
            .field("pending", &self.correlator.mailbox().pending())
            .field("timings", &self.timings)
            .finish()
    }
}
