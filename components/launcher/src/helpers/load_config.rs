//! Layered launcher settings: defaults, an optional TOML file, then
//! `JLEAKER_*` environment variables.

// Local crates
use crate::relay::relay::DEFAULT_BIND_ADDRESS;

// External crates
use anyhow::{Context, Result};
use config::{ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use tracing::instrument;

/// Environment variable naming an optional TOML settings file.
pub const CONFIG_PATH_ENV: &str = "JLEAKER_CONFIG";

/// Prefix of environment overrides, e.g. `JLEAKER_RELAY__BIND_ADDRESS`.
pub const ENV_PREFIX: &str = "JLEAKER";

/// `[relay]` settings.
#[derive(Debug, Deserialize, Clone)]
pub struct RelayConfig {
    /// Address the log relay listens on.
    pub bind_address: IpAddr,
}

/// `[attach]` settings.
#[derive(Debug, Deserialize, Clone)]
pub struct AttachConfig {
    /// The `jcmd` executable, looked up on `PATH` when not absolute.
    pub jcmd_path: PathBuf,
}

/// `[logging]` settings.
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Directory for the rolling log file; no file logging when unset.
    pub directory: Option<PathBuf>,
    /// Write the log file as JSON lines.
    pub json: bool,
}

/// Launcher settings. These never carry command line switches, which are
/// always parsed from argv.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Log relay settings.
    pub relay: RelayConfig,
    /// How the target JVM is reached.
    pub attach: AttachConfig,
    /// Where and how the launcher logs.
    pub logging: LoggingConfig,
}

impl Config {
    /// Load defaults, the file named by `JLEAKER_CONFIG` if set, and
    /// `JLEAKER_*` environment overrides.
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::load_from(path.as_deref(), Self::environment())
    }

    /// Load with an explicit settings file and environment source.
    #[instrument(
        name = "config_loader",
        target = "helpers::load_config",
        level = "trace",
        skip_all
    )]
    pub fn load_from(path: Option<&Path>, environment: Environment) -> Result<Self> {
        let mut builder = Self::defaults().context("Failed to set configuration defaults")?;

        if let Some(path) = path {
            tracing::trace!(
                configuration_file_path = %path.display(),
                "Loading JLeaker configuration file"
            );
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        let config = builder
            .add_source(environment)
            .build()
            .with_context(|| match path {
                Some(path) => format!("Failed to read configuration from {:?}", path),
                None => "Failed to read configuration".to_string(),
            })?
            .try_deserialize::<Config>()
            .context("Invalid JLeaker configuration")?;

        tracing::trace!("JLeaker configuration loaded successfully");
        Ok(config)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, config::ConfigError> {
        config::Config::builder()
            .set_default("relay.bind_address", DEFAULT_BIND_ADDRESS.to_string())?
            .set_default("attach.jcmd_path", "jcmd")?
            .set_default("logging.level", "warn")?
            .set_default("logging.json", false)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            relay: RelayConfig {
                bind_address: DEFAULT_BIND_ADDRESS,
            },
            attach: AttachConfig {
                jcmd_path: PathBuf::from("jcmd"),
            },
            logging: LoggingConfig {
                level: "warn".to_string(),
                directory: None,
                json: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    fn no_env() -> Environment {
        Config::environment().source(Some(HashMap::new()))
    }

    fn from_toml(toml: &str) -> Result<Config> {
        Config::defaults()?
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?
            .try_deserialize()
            .context("Invalid JLeaker configuration")
    }

    #[test]
    fn defaults_without_any_source() {
        let cfg = Config::load_from(None, no_env()).unwrap();
        assert_eq!(cfg.relay.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(cfg.attach.jcmd_path, PathBuf::from("jcmd"));
        assert_eq!(cfg.logging.level, "warn");
        assert_eq!(cfg.logging.directory, None);
        assert!(!cfg.logging.json);
    }

    #[test]
    fn toml_overrides_defaults() {
        let cfg = from_toml(
            r#"
            [relay]
            bind_address = "0.0.0.0"

            [logging]
            level = "debug"
            directory = "/var/log/jleaker"
            json = true
            "#,
        )
        .unwrap();

        assert_eq!(cfg.relay.bind_address, IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        assert_eq!(cfg.attach.jcmd_path, PathBuf::from("jcmd"));
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.directory, Some(PathBuf::from("/var/log/jleaker")));
        assert!(cfg.logging.json);
    }

    #[test]
    fn file_then_environment() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jleaker.toml");
        std::fs::write(&path, "[attach]\njcmd_path = \"/opt/jdk/bin/jcmd\"\n").unwrap();

        let env = HashMap::from([(
            "JLEAKER_LOGGING__LEVEL".to_string(),
            "trace".to_string(),
        )]);
        let cfg = Config::load_from(Some(&path), Config::environment().source(Some(env))).unwrap();

        assert_eq!(cfg.attach.jcmd_path, PathBuf::from("/opt/jdk/bin/jcmd"));
        assert_eq!(cfg.logging.level, "trace");
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Config::load_from(Some(Path::new("/nonexistent/jleaker.toml")), no_env())
            .unwrap_err();
        assert!(format!("{err:#}").contains("Failed to read configuration"));
    }

    #[test]
    fn bad_address_is_rejected() {
        assert!(from_toml("[relay]\nbind_address = \"nowhere\"\n").is_err());
    }
}
