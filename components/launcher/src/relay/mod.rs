//! Single-shot log relay between the injected agent and the launcher.
//!
//! ```text
//! LogRelay::spawn -> bind :0 -> StartupGate::signal(port) -> accept once -> lines -> LineSink
//! ```

pub mod codec;
pub mod gate;
pub mod relay;
pub mod sink;
