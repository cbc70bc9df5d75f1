//! `jleaker` command line launcher.

use jleaker::{cli, helpers::load_config::Config, instrumentation};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(cli::cli::EXIT_LAUNCH_FAILED);
        }
    };

    // Keep the file writer's guard alive until exit so buffered events flush.
    let _guard = match instrumentation::tracing::init_tracing(&config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::from(cli::cli::EXIT_LAUNCH_FAILED);
        }
    };
    instrumentation::tracing::init_panic_handler();

    // Main entrypoint simply delegates control to CLI layer.
    cli::cli::run(std::env::args().skip(1), &config).await
}
