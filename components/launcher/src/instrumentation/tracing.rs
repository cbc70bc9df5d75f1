//! Global tracing subscriber and panic hook.

// Local crates
use crate::helpers::load_config::LoggingConfig;

// External crates
use anyhow::{Context, Result};
use std::io;
use std::panic;
use tracing::error;
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    filter::{Directive, EnvFilter},
    fmt,
    prelude::*,
    registry::Registry,
};

const LOG_FILE_NAME: &str = "jleaker.log";

/// Install the global subscriber.
///
/// Human-readable events go to stderr, since stdout carries the agent's
/// report. When a log directory is configured, events are also written to a
/// daily rolling file. The returned guard must outlive the program's logging.
pub fn init_tracing(cfg: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.level));

    // The runtime's own instrumentation is far too chatty for a CLI.
    if let Ok(tokio_directive) = "tokio=warn".parse::<Directive>() {
        filter = filter.add_directive(tokio_directive);
    }
    for progress in ["jleaker::runtime=info", "jleaker::relay=info"] {
        if let Ok(directive) = progress.parse::<Directive>() {
            filter = filter.add_directive(directive);
        }
    }

    let stderr_layer = fmt::layer()
        .with_ansi(true)
        .with_writer(io::stderr)
        .with_target(false)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let (plain_layer, json_layer, guard) = match &cfg.directory {
        Some(dir) => {
            let file_appender = rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(file_appender);

            if cfg.json {
                let json_layer = fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_file(true)
                    .with_line_number(true)
                    .with_thread_ids(true)
                    .with_timer(fmt::time::UtcTime::rfc_3339());
                (None, Some(json_layer), Some(guard))
            } else {
                let plain_layer = fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_file(true)
                    .with_line_number(true)
                    .with_thread_ids(true)
                    .with_timer(fmt::time::UtcTime::rfc_3339());
                (Some(plain_layer), None, Some(guard))
            }
        }
        None => (None, None, None),
    };

    let subscriber = Registry::default()
        .with(filter)
        .with(stderr_layer)
        .with(plain_layer)
        .with(json_layer)
        .with(ErrorLayer::default());

    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global tracing subscriber")?;

    Ok(guard)
}

/// Log panics as error events before the default hook runs.
pub fn init_panic_handler() {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(move |panic_info| {
        let msg = match panic_info.payload().downcast_ref::<&str>() {
            Some(s) => (*s).to_string(),
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => s.clone(),
                None => "Unknown panic".to_string(),
            },
        };

        let location = panic_info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_else(|| "unknown location".to_string());

        error!(
            message = %msg,
            location = %location,
            "JLeaker panicked!"
        );
        default_hook(panic_info);
    }));
}
