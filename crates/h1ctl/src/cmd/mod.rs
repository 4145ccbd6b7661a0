use std::time::Duration;

use clap::{Args, Subcommand};
use h1ctl_session::{RetryPolicy, Session, SessionConfig};
use h1ctl_transport::DEFAULT_PORT;
use tracing::{info, warn};

use crate::exit::{session_error, CliError, CliResult, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod record;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record clips on a camera, then optionally trigger the upload.
    Record(RecordArgs),
    /// Send one JSON command and print the correlated reply.
    Send(SendArgs),
    /// Check that the device answers.
    Ping(DeviceArgs),
    /// Print the device status report.
    Status(DeviceArgs),
    /// Start (or stop) the upload immediately.
    Upload(UploadArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Record(args) => record::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Ping(args) => send::ping(args, format),
        Command::Status(args) => send::status(args, format),
        Command::Upload(args) => send::upload(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug, Clone)]
pub struct DeviceArgs {
    /// Device IP address or host name.
    #[arg(env = "H1CTL_HOST")]
    pub host: String,
    /// Device command port.
    #[arg(long, short = 'p', env = "H1CTL_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,
    /// Connection timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
    /// Inbound poll interval.
    #[arg(long, default_value = "100ms")]
    pub poll_interval: String,
    /// Reply checks per command before giving up.
    #[arg(long, default_value_t = h1ctl_session::DEFAULT_ATTEMPTS)]
    pub retry_attempts: u32,
    /// Spacing between reply checks.
    #[arg(long, default_value = "100ms")]
    pub retry_interval: String,
}

impl DeviceArgs {
    pub fn session_config(&self) -> CliResult<SessionConfig> {
        if self.retry_attempts == 0 {
            return Err(CliError::new(USAGE, "--retry-attempts must be at least 1"));
        }
        Ok(SessionConfig {
            connect_timeout: parse_duration(&self.connect_timeout)?,
            poll_interval: parse_duration(&self.poll_interval)?,
            retry: RetryPolicy {
                attempts: self.retry_attempts,
                interval: parse_duration(&self.retry_interval)?,
            },
            ..SessionConfig::default()
        })
    }
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Camera to record on.
    #[arg(long, short = 'c', default_value_t = 1)]
    pub camera: u32,
    /// Length of each clip in seconds.
    #[arg(long, short = 'l', default_value_t = 5)]
    pub clip_length: u64,
    /// Number of clips to record.
    #[arg(long, short = 'n', default_value_t = 1)]
    pub count: u32,
    /// Trigger the upload after the last clip.
    #[arg(long)]
    pub upload: bool,
    /// Delay before the first clip.
    #[arg(long, default_value = "2s")]
    pub warm_up: String,
    /// Delay between clips.
    #[arg(long, default_value = "5s")]
    pub inter_clip: String,
    /// Delay before the upload trigger.
    #[arg(long, default_value = "10s")]
    pub upload_delay: String,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Full JSON command object, e.g. '{"command":"initpool","size":512}'.
    #[arg(long, conflicts_with_all = ["command", "field"], required_unless_present = "command")]
    pub json: Option<String>,
    /// Command name.
    #[arg(long)]
    pub command: Option<String>,
    /// Extra field as key=value; values that parse as JSON are sent as JSON.
    #[arg(long = "field", short = 'f', value_name = "KEY=VALUE", requires = "command")]
    pub field: Vec<String>,
}

#[derive(Args, Debug)]
pub struct UploadArgs {
    #[command(flatten)]
    pub device: DeviceArgs,
    /// Stop a running upload instead of starting one.
    #[arg(long)]
    pub stop: bool,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Connect and arrange for Ctrl-C to force the connection closed.
pub fn connect(device: &DeviceArgs, config: SessionConfig) -> CliResult<Session> {
    let session = Session::connect_with_config(&device.host, device.port, config)
        .map_err(|err| session_error("connect failed", err))?;
    install_ctrlc_handler(&session)?;
    Ok(session)
}

fn install_ctrlc_handler(session: &Session) -> CliResult<()> {
    let handle = session
        .shutdown_handle()
        .map_err(|err| session_error("connect failed", err))?;
    ctrlc::set_handler(move || {
        warn!("interrupted; closing device connection");
        handle.shutdown();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))?;
    info!("press Ctrl-C to disconnect");
    Ok(())
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
