//! Launcher for the JLeaker heap leak detection agent.
//!
//! The launcher parses its switches, attaches to a running JVM, loads the
//! native agent with a computed option string and relays the agent's report,
//! streamed back over a local TCP connection, to standard output.

pub mod cli;
pub mod helpers;
pub mod instrumentation;
pub mod launcher;
pub mod relay;
pub mod runtime;
pub mod switches;
