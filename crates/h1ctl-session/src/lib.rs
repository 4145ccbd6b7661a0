//! Command correlation and recording orchestration for the H1 recorder.
//!
//! This is the "just works" layer. A [`Session`] connects to the device,
//! runs the inbound [`Poller`] on its own thread, and correlates each
//! outbound [`Command`] with the reply that names it. The [`Sequencer`]
//! builds the timed record/stop/upload workflow on top.

pub mod clock;
pub mod command;
pub mod correlator;
pub mod error;
pub mod mailbox;
pub mod poller;
pub mod sequencer;
pub mod session;

#[cfg(test)]
mod testing;

pub use clock::{Clock, SystemClock};
pub use command::{CameraInit, Command, Response, PING, RECORD, STATUS, STOP_RECORD, UPLOAD};
pub use correlator::{
    Correlator, FrameSink, RetryPolicy, DEFAULT_ATTEMPTS, DEFAULT_RETRY_INTERVAL,
};
pub use error::{CommandError, Result, SessionError};
pub use mailbox::{Delivery, Mailbox, PendingCorrelation};
pub use poller::{Poller, PollerConfig, PollerHandle, DEFAULT_POLL_INTERVAL};
pub use sequencer::{
    RecordingJob, SequenceReport, SequenceTimings, Sequencer, SequencerState, WorkflowReport,
    DEFAULT_INTER_CLIP, DEFAULT_UPLOAD_DELAY, DEFAULT_WARM_UP,
};
pub use session::{Session, SessionConfig};
