//! Declarative command line switch parsing.
//!
//! A [`spec::SwitchSpec`] is built once from `"<name>=<flags>"` declarations
//! and [`parser::parse`] validates a token sequence against it.

pub mod parser;
pub mod spec;
