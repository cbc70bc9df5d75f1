//! Logging setup.

pub mod tracing;
