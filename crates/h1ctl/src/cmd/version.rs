use crate::cmd::VersionArgs;
use crate::exit::{CliResult, SUCCESS};

pub fn run(args: VersionArgs) -> CliResult<i32> {
    println!("h1ctl {}", env!("CARGO_PKG_VERSION"));
    if !args.extended {
        return Ok(SUCCESS);
    }

    println!("target: {}", option_env!("H1CTL_BUILD_TARGET").unwrap_or("unknown"));
    println!("target_os: {}", std::env::consts::OS);
    println!("target_arch: {}", std::env::consts::ARCH);
    println!("default_port: {}", h1ctl_transport::DEFAULT_PORT);
    println!(
        "retry: {} x {:?}",
        h1ctl_session::DEFAULT_ATTEMPTS,
        h1ctl_session::DEFAULT_RETRY_INTERVAL
    );

    Ok(SUCCESS)
}
