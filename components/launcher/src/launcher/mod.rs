//! Launcher options and JVM attach.

pub mod attach;
pub mod options;
