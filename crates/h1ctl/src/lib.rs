//! Client for the H1 in-car recorder's TCP command protocol.
//!
//! h1ctl connects to the recorder, frames JSON commands, correlates each
//! command with its reply, and drives timed record/stop/upload workflows.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP connection with non-blocking reads
//! - [`frame`]: length-prefixed framing and message classification
//! - [`session`]: reply correlation, the inbound poller and the recording sequencer
//!
//! ```no_run
//! use h1ctl::session::Session;
//!
//! let mut session = Session::connect("192.168.1.50", 9999)?;
//! let report = session.run_recording_sequence(1, 5, 2)?;
//! println!("recorded {} clips", report.clips);
//! session.start_upload()?;
//! session.disconnect();
//! # Ok::<(), h1ctl::session::SessionError>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use h1ctl_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use h1ctl_frame::*;
}

/// Re-export session types.
pub mod session {
    pub use h1ctl_session::*;
}

pub use h1ctl_session::{Command, CommandError, Response, Session, SessionConfig, SessionError};
