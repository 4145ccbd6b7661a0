use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::clock::Clock;
use crate::command::{Command, Response};
use crate::correlator::{Correlator, FrameSink};
use crate::error::{Result, SessionError};

/// Wait before the first clip.
pub const DEFAULT_WARM_UP: Duration = Duration::from_secs(2);
/// Wait between two clips.
pub const DEFAULT_INTER_CLIP: Duration = Duration::from_secs(5);
/// Wait before triggering the upload.
pub const DEFAULT_UPLOAD_DELAY: Duration = Duration::from_secs(10);

/// A batch of clips to record on one camera.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordingJob {
    pub camera: u32,
    pub clip_length: Duration,
    pub clip_count: u32,
}

impl RecordingJob {
    pub fn new(camera: u32, clip_length_secs: u64, clip_count: u32) -> Self {
        Self {
            camera,
            clip_length: Duration::from_secs(clip_length_secs),
            clip_count,
        }
    }
}

/// Fixed delays of the recording workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceTimings {
    pub warm_up: Duration,
    pub inter_clip: Duration,
    pub upload_delay: Duration,
}

impl Default for SequenceTimings {
    fn default() -> Self {
        Self {
            warm_up: DEFAULT_WARM_UP,
            inter_clip: DEFAULT_INTER_CLIP,
            upload_delay: DEFAULT_UPLOAD_DELAY,
        }
    }
}

/// Where the sequencer is in the clip loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    Idle,
    /// Recording clip number `clip` (1-based).
    RecordingClip { clip: u32 },
    /// Waiting before clip number `next`.
    PostClipDelay { next: u32 },
    Done,
}

/// Outcome of a completed clip loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SequenceReport {
    /// Clips attempted.
    pub clips: u32,
    /// `record` commands that failed.
    pub start_failures: u32,
    /// `stoprecord` commands that failed.
    pub stop_failures: u32,
}

impl SequenceReport {
    /// Whether every start and stop was acknowledged.
    pub fn is_clean(&self) -> bool {
        self.start_failures == 0 && self.stop_failures == 0
    }
}

/// Outcome of the full record-then-upload workflow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowReport {
    pub sequence: SequenceReport,
    /// Upload acknowledgement, when an upload was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<Response>,
}

/// Drives record/stop cycles and the upload trigger over a correlator.
///
/// Start and stop failures are logged and counted; the loop moves on. A lost
/// connection aborts with [`SessionError::Disconnected`]. A failed upload
/// aborts with [`SessionError::UploadFailed`].
pub struct Sequencer<'a, S, C> {
    correlator: &'a mut Correlator<S, C>,
    timings: SequenceTimings,
    state: SequencerState,
}

impl<'a, S: FrameSink, C: Clock> Sequencer<'a, S, C> {
    pub fn new(correlator: &'a mut Correlator<S, C>, timings: SequenceTimings) -> Self {
        Self {
            correlator,
            timings,
            state: SequencerState::Idle,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Record `job.clip_count` clips of `job.clip_length` each.
    ///
    /// Every run starts from `Idle`, whatever an earlier run left behind.
    pub fn run(&mut self, job: &RecordingJob) -> Result<SequenceReport> {
        self.state = SequencerState::Idle;
        let mut report = SequenceReport::default();
        let mut remaining = job.clip_count;

        loop {
            match self.state {
                SequencerState::Idle => {
                    if remaining == 0 {
                        info!(camera = job.camera, "no clips requested");
                        self.state = SequencerState::Done;
                        continue;
                    }
                    info!(
                        camera = job.camera,
                        clips = job.clip_count,
                        clip_length = ?job.clip_length,
                        "starting recording sequence"
                    );
                    self.wait(self.timings.warm_up);
                    self.state = SequencerState::RecordingClip { clip: 1 };
                }
                SequencerState::RecordingClip { clip } => {
                    report.clips += 1;
                    info!(camera = job.camera, clip, "recording clip");
                    if !self.best_effort(&Command::record(job.camera))? {
                        report.start_failures += 1;
                    }
                    self.wait(job.clip_length);
                    if !self.best_effort(&Command::stop_record(job.camera))? {
                        report.stop_failures += 1;
                    }

                    remaining -= 1;
                    self.state = if remaining > 0 {
                        SequencerState::PostClipDelay { next: clip + 1 }
                    } else {
                        SequencerState::Done
                    };
                }
                SequencerState::PostClipDelay { next } => {
                    self.wait(self.timings.inter_clip);
                    self.state = SequencerState::RecordingClip { clip: next };
                }
                SequencerState::Done => break,
            }
        }

        info!(
            camera = job.camera,
            clips = report.clips,
            start_failures = report.start_failures,
            stop_failures = report.stop_failures,
            "recording sequence finished"
        );
        Ok(report)
    }

    /// Wait the upload delay, then ask the device to start uploading.
    pub fn upload(&mut self) -> Result<Response> {
        self.wait(self.timings.upload_delay);
        info!("starting upload");
        self.correlator
            .send(&Command::upload(true))
            .map_err(|err| {
                error!(error = %err, "upload failed");
                SessionError::UploadFailed(err)
            })
    }

    /// Run the clip loop, then the upload if requested.
    pub fn run_workflow(&mut self, job: &RecordingJob, upload: bool) -> Result<WorkflowReport> {
        let sequence = self.run(job)?;
        let upload = if upload { Some(self.upload()?) } else { None };
        Ok(WorkflowReport { sequence, upload })
    }

    fn wait(&self, duration: Duration) {
        self.correlator.clock().sleep(duration);
    }

    /// `Ok(false)` for a tolerated failure, `Err` when the link is gone.
    fn best_effort(&mut self, command: &Command) -> Result<bool> {
        match self.correlator.send(command) {
            Ok(_) => Ok(true),
            Err(err) if err.is_disconnect() => {
                error!(command = %command.name(), error = %err, "device lost; aborting sequence");
                Err(SessionError::Disconnected)
            }
            Err(err) => {
                warn!(command = %command.name(), error = %err, "command failed; continuing");
                Ok(false)
            }
        }
    }
}
