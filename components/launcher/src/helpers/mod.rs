//! Launcher settings.

pub mod load_config;
