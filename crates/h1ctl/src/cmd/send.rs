use h1ctl_session::Command;
use serde_json::Value;

use crate::cmd::{connect, DeviceArgs, SendArgs, UploadArgs};
use crate::exit::{command_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_response, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let command = build_command(&args)?;
    exchange(&args.device, &command, format)
}

pub fn ping(args: DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    exchange(&args, &Command::ping(), format)
}

pub fn status(args: DeviceArgs, format: OutputFormat) -> CliResult<i32> {
    exchange(&args, &Command::status(), format)
}

pub fn upload(args: UploadArgs, format: OutputFormat) -> CliResult<i32> {
    exchange(&args.device, &Command::upload(!args.stop), format)
}

fn exchange(device: &DeviceArgs, command: &Command, format: OutputFormat) -> CliResult<i32> {
    let mut session = connect(device, device.session_config()?)?;
    let result = session.send_command(command);
    session.disconnect();

    let response = result.map_err(|err| command_error(command.name(), err))?;
    print_response(&response, &device.host, format);
    Ok(SUCCESS)
}

fn build_command(args: &SendArgs) -> CliResult<Command> {
    if let Some(json) = &args.json {
        return Command::from_json(json).map_err(|err| command_error("--json", err));
    }
    let Some(name) = &args.command else {
        return Err(CliError::new(USAGE, "either --json or --command is required"));
    };

    let mut command = Command::new(name.as_str());
    for field in &args.field {
        let (key, value) = parse_field(field)?;
        command = command.with_field(key, value);
    }
    Ok(command)
}

/// Split `key=value`. The value is taken as JSON when it parses, so
/// `camera=1` sends a number and `on=true` a boolean.
fn parse_field(field: &str) -> CliResult<(String, Value)> {
    let Some((key, raw)) = field.split_once('=') else {
        return Err(CliError::new(
            USAGE,
            format!("--field expects KEY=VALUE, got '{field}'"),
        ));
    };
    let key = key.trim();
    if key.is_empty() || key == "command" {
        return Err(CliError::new(USAGE, format!("invalid field name in '{field}'")));
    }
    let value =
        serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}
