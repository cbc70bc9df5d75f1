//! Launch orchestration.

pub mod runtime;
