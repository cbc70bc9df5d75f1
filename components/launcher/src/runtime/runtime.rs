//! The launch sequence.

// Local crates
use crate::{
    launcher::{
        attach::{AttachError, AttachMechanism, ensure_running},
        options::LaunchOptions,
    },
    relay::{
        relay::{BindFailure, LogRelay, RelayError, RelayOutcome},
        sink::LineSink,
    },
};

// External crates
use std::net::IpAddr;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, instrument};

/// Everything that can stop a launch.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The target could not be inspected or the agent was not loaded.
    #[error(transparent)]
    Attach(#[from] AttachError),

    /// No file at the library path after `<ARCH>` substitution.
    #[error("Cannot find agent library at {}", .0.display())]
    LibraryNotFound(PathBuf),

    /// The relay could not listen, so the agent was never loaded.
    #[error(transparent)]
    Bind(#[from] BindFailure),

    /// The relay failed after the agent was loaded.
    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// Attach the agent to the target and relay its output until it disconnects.
///
/// The relay is bound before the agent is loaded, so the agent always finds
/// a listener on the port it is given. If loading fails the relay is left to
/// time out on its own.
#[instrument(
    name = "jleaker_runtime::launch",
    target = "runtime::runtime",
    level = "info",
    skip_all,
    fields(pid = options.pid)
)]
pub async fn launch<A, S>(
    options: &LaunchOptions,
    attach: &A,
    bind_address: IpAddr,
    sink: S,
) -> Result<RelayOutcome, LaunchError>
where
    A: AttachMechanism,
    S: LineSink,
{
    let process_name = ensure_running(options.pid)?;
    info!(process_name = %process_name, "Attaching to target process");

    let arch = attach.target_arch(options.pid).await?;
    let library = resolve_library(options, &arch)?;
    tracing::debug!(arch = %arch, library = %library.display(), "Agent library resolved");

    let relay = LogRelay::new(bind_address, sink).spawn();
    let port = relay.port().await?;

    let agent_options = options.agent_options(port);
    tracing::debug!(agent_options = %agent_options, "Loading agent");
    if let Err(e) = attach
        .load_agent(options.pid, &library, &agent_options)
        .await
    {
        if !relay.state().is_terminal() {
            tracing::debug!(port, "Log relay detached, it stops at its accept timeout");
        }
        return Err(e.into());
    }
    info!(port, "Agent loaded, waiting for its report");

    let outcome = relay.join().await?;
    match outcome {
        RelayOutcome::Closed { lines } => info!(lines, "Agent report finished"),
        RelayOutcome::TimedOut => info!("Agent never connected back, no report received"),
    }

    Ok(outcome)
}

/// Substitute `<ARCH>`, require the file to exist and make it absolute.
pub fn resolve_library(options: &LaunchOptions, arch: &str) -> Result<PathBuf, LaunchError> {
    let library = options.library_for_arch(arch);
    if !library.exists() {
        return Err(LaunchError::LibraryNotFound(library));
    }
    std::path::absolute(&library).map_err(|_| LaunchError::LibraryNotFound(library))
}
