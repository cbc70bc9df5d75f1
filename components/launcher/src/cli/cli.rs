//! Maps argv to a launch and the launch result to an exit status.

use crate::{
    helpers::load_config::Config,
    launcher::{
        attach::JcmdAttach,
        options::{LaunchOptions, OptionsError, usage},
    },
    relay::{relay::RelayOutcome, sink::StdoutSink},
    runtime::runtime::launch,
};
use std::process::ExitCode;

/// Exit status for command line errors, printed together with the usage text.
pub const EXIT_USAGE: u8 = 1;

/// Exit status for any failure after the command line was accepted.
pub const EXIT_LAUNCH_FAILED: u8 = 2;

/// Entry function for CLI
///
/// `args` excludes the program name.
pub async fn run<I>(args: I, config: &Config) -> ExitCode
where
    I: IntoIterator<Item = String>,
{
    ExitCode::from(status(args, config).await)
}

async fn status<I>(args: I, config: &Config) -> u8
where
    I: IntoIterator<Item = String>,
{
    let options = match LaunchOptions::from_args(args) {
        Ok(options) => options,
        Err(OptionsError::Parse(e)) => {
            eprintln!("{e}");
            eprintln!();
            eprint!("{}", usage());
            return EXIT_USAGE;
        }
        Err(e) => {
            tracing::error!(error = %e, "Invalid launch options");
            eprintln!("error: {e}");
            return EXIT_LAUNCH_FAILED;
        }
    };

    let attach = JcmdAttach::new(&config.attach.jcmd_path);
    let sink = StdoutSink::default();

    match launch(&options, &attach, config.relay.bind_address, sink).await {
        Ok(RelayOutcome::Closed { .. }) | Ok(RelayOutcome::TimedOut) => 0,
        Err(e) => {
            tracing::error!(error = %e, "Launch failed");
            eprintln!("error: {e}");
            EXIT_LAUNCH_FAILED
        }
    }
}
