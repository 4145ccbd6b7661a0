use h1ctl_session::{RecordingJob, SequenceTimings};
use tracing::{info, warn};

use crate::cmd::{connect, parse_duration, RecordArgs};
use crate::exit::{session_error, CliResult, SUCCESS};
use crate::output::{print_report, OutputFormat};

pub fn run(args: RecordArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = args.device.session_config()?;
    config.timings = SequenceTimings {
        warm_up: parse_duration(&args.warm_up)?,
        inter_clip: parse_duration(&args.inter_clip)?,
        upload_delay: parse_duration(&args.upload_delay)?,
    };
    let job = RecordingJob::new(args.camera, args.clip_length, args.count);

    let mut session = connect(&args.device, config)?;
    let result = session.run_workflow(&job, args.upload);
    session.disconnect();

    let report = result.map_err(|err| session_error("record failed", err))?;
    if !report.sequence.is_clean() {
        warn!(
            start_failures = report.sequence.start_failures,
            stop_failures = report.sequence.stop_failures,
            "some record/stop commands were not acknowledged"
        );
    }
    info!(clips = report.sequence.clips, "workflow complete");
    print_report(&report, &args.device.host, args.camera, format);
    Ok(SUCCESS)
}
