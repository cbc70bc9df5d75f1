//! The relay task and its owner-side handle.

// Local crates
use crate::relay::{codec::ReportLineCodec, gate::StartupGate, sink::LineSink};

// External crates
use futures::StreamExt;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::codec::FramedRead;
use tracing::{Instrument, info_span};

/// How long the relay waits for the agent to connect back.
pub const ACCEPT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default address the relay listens on.
pub const DEFAULT_BIND_ADDRESS: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// Observable state of a relay session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    /// The listener is not bound yet.
    WaitingForBind,
    /// Bound and waiting for the agent to connect.
    Listening,
    /// The agent is connected and lines are being relayed.
    Connected,
    /// The agent hung up after sending its report.
    Closed,
    /// Nobody connected within the accept timeout.
    TimedOut,
    /// Binding, accepting, reading or writing failed.
    Failed,
}

impl RelayState {
    /// Whether the session can no longer change state.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RelayState::Closed | RelayState::TimedOut | RelayState::Failed
        )
    }
}

/// Bind failure as carried through the startup gate to waiters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("failed to bind log relay on {address}: {message}")]
pub struct BindFailure {
    /// Address the relay tried to bind.
    pub address: SocketAddr,
    /// Kind of the underlying I/O error.
    pub kind: io::ErrorKind,
    /// Text of the underlying I/O error.
    pub message: String,
}

impl BindFailure {
    fn new(address: SocketAddr, err: &io::Error) -> Self {
        Self {
            address,
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Failures reported by [`RelayHandle::join`].
#[derive(Debug, Error)]
pub enum RelayError {
    /// The listener could not be bound.
    #[error(transparent)]
    Bind(#[from] BindFailure),

    /// Accepting the agent's connection failed.
    #[error("failed to accept log relay connection: {0}")]
    Accept(#[source] io::Error),

    /// Reading from the agent failed; `lines` were relayed before that.
    #[error("log relay stream failed after {lines} lines: {source}")]
    Stream {
        /// Lines relayed before the failure.
        lines: u64,
        /// The read error.
        #[source]
        source: io::Error,
    },

    /// Writing to the sink failed; `lines` were relayed before that.
    #[error("log relay output failed after {lines} lines: {source}")]
    Sink {
        /// Lines relayed before the failure.
        lines: u64,
        /// The write error.
        #[source]
        source: io::Error,
    },

    /// The relay task panicked or was cancelled.
    #[error("log relay task ended abnormally: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// How a relay session that did not fail ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayOutcome {
    /// The peer closed the connection after `lines` lines were relayed.
    Closed {
        /// Number of lines relayed.
        lines: u64,
    },
    /// Nobody connected within the accept timeout.
    TimedOut,
}

type Readiness = Result<SocketAddr, BindFailure>;

/// Single-shot log relay.
///
/// Listens on an ephemeral port, accepts exactly one connection and copies
/// its newline-delimited text to a [`LineSink`] until the peer hangs up.
#[derive(Debug)]
pub struct LogRelay<S> {
    bind_address: IpAddr,
    accept_timeout: Duration,
    sink: S,
}

impl<S: LineSink> LogRelay<S> {
    /// A relay that will listen on `bind_address` and write to `sink`.
    pub fn new(bind_address: IpAddr, sink: S) -> Self {
        Self {
            bind_address,
            accept_timeout: ACCEPT_TIMEOUT,
            sink,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_accept_timeout(mut self, accept_timeout: Duration) -> Self {
        self.accept_timeout = accept_timeout;
        self
    }

    /// Start the relay on its own task.
    ///
    /// The returned handle's [`RelayHandle::port`] resolves once the listener
    /// is bound, or with the bind failure.
    pub fn spawn(self) -> RelayHandle {
        let gate = StartupGate::new();
        let (state_tx, state_rx) = watch::channel(RelayState::WaitingForBind);

        let span = info_span!(target: "relay::relay", "jleaker_relay::session");
        let join = tokio::spawn(self.run(gate.clone(), state_tx).instrument(span));

        RelayHandle {
            gate,
            state: state_rx,
            join,
        }
    }

    async fn run(
        mut self,
        gate: StartupGate<Readiness>,
        state: watch::Sender<RelayState>,
    ) -> Result<RelayOutcome, RelayError> {
        let requested = SocketAddr::new(self.bind_address, 0);

        let bound = match TcpListener::bind(requested).await {
            Ok(listener) => listener.local_addr().map(|addr| (listener, addr)),
            Err(e) => Err(e),
        };
        let (listener, local_addr) = match bound {
            Ok(pair) => pair,
            Err(e) => {
                let failure = BindFailure::new(requested, &e);
                tracing::error!(error = %e, address = %requested, "Log relay failed to bind");
                state.send_replace(RelayState::Failed);
                gate.signal(Err(failure.clone()));
                return Err(failure.into());
            }
        };

        state.send_replace(RelayState::Listening);
        gate.signal(Ok(local_addr));
        tracing::debug!(address = %local_addr, "Log relay listening");

        let accepted = timeout(self.accept_timeout, listener.accept()).await;
        // Accept-once: no further connections are possible past this point.
        drop(listener);

        let (stream, peer) = match accepted {
            Err(_) => {
                tracing::info!(
                    timeout_ms = self.accept_timeout.as_millis() as u64,
                    "No agent connected to the log relay in time"
                );
                state.send_replace(RelayState::TimedOut);
                return Ok(RelayOutcome::TimedOut);
            }
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Log relay accept failed");
                state.send_replace(RelayState::Failed);
                return Err(RelayError::Accept(e));
            }
            Ok(Ok(pair)) => pair,
        };

        state.send_replace(RelayState::Connected);
        tracing::debug!(peer = %peer, "Agent connected to log relay");

        let mut frames = FramedRead::new(stream, ReportLineCodec::new());
        let mut lines = 0u64;

        while let Some(line) = frames.next().await {
            let line = match line {
                Ok(line) => line,
                Err(source) => {
                    tracing::error!(error = %source, lines, "Log relay stream failed");
                    state.send_replace(RelayState::Failed);
                    return Err(RelayError::Stream { lines, source });
                }
            };

            if let Err(source) = self.sink.write_line(&line).await {
                tracing::error!(error = %source, lines, "Log relay output failed");
                state.send_replace(RelayState::Failed);
                return Err(RelayError::Sink { lines, source });
            }
            lines += 1;
        }

        tracing::debug!(lines, "Agent closed the log relay connection");
        state.send_replace(RelayState::Closed);
        Ok(RelayOutcome::Closed { lines })
    }
}

/// Owner-side handle of a running relay.
#[derive(Debug)]
pub struct RelayHandle {
    gate: StartupGate<Readiness>,
    state: watch::Receiver<RelayState>,
    join: JoinHandle<Result<RelayOutcome, RelayError>>,
}

impl RelayHandle {
    /// Wait for the listener to be bound and return its address.
    pub async fn local_addr(&self) -> Result<SocketAddr, BindFailure> {
        self.gate.wait().await
    }

    /// Wait for the listener to be bound and return its port.
    pub async fn port(&self) -> Result<u16, BindFailure> {
        self.local_addr().await.map(|addr| addr.port())
    }

    /// Current session state.
    pub fn state(&self) -> RelayState {
        *self.state.borrow()
    }

    /// Receiver observing every state transition.
    pub fn subscribe_state(&self) -> watch::Receiver<RelayState> {
        self.state.clone()
    }

    /// Wait for the relay task to finish.
    pub async fn join(self) -> Result<RelayOutcome, RelayError> {
        self.join.await?
    }
}
