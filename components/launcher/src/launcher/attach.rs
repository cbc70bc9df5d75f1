//! Attaching to a running JVM and loading the agent into it.

// External crates
use regex::Regex;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::LazyLock;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use thiserror::Error;
use tokio::process::Command;
use tracing::instrument;

const AGENT_LOAD_COMMAND: &str = "JVMTI.agent_load";

static OS_ARCH_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?m)^os\.arch\s*=\s*(\S+)\s*$"));

/// Failures while reaching into the target JVM.
#[derive(Debug, Error)]
pub enum AttachError {
    /// The pid does not name a live process.
    #[error("No process with pid {0} is running")]
    ProcessNotFound(u32),

    /// The attach tool could not be started.
    #[error("Failed to run `{tool}': {source}")]
    Spawn {
        /// Path of the tool.
        tool: String,
        /// Why it could not be started.
        #[source]
        source: io::Error,
    },

    /// The tool ran but the command did not succeed.
    #[error("`{command}' failed for pid {pid}: {detail}")]
    CommandFailed {
        /// Diagnostic command name.
        command: String,
        /// Target process.
        pid: u32,
        /// The tool's own error output.
        detail: String,
    },

    /// `os.arch` was missing from the target's system properties.
    #[error("Target {0} did not report its os.arch system property")]
    UnknownArchitecture(u32),

    /// The built-in `os.arch` pattern failed to compile.
    #[error("invalid os.arch pattern: {0}")]
    Pattern(String),
}

/// How the launcher reaches into a running JVM.
///
/// Implementations perform a single attempt per call; the launcher never
/// retries.
pub trait AttachMechanism: Send + Sync {
    /// The target's `os.arch` system property.
    fn target_arch(&self, pid: u32) -> impl Future<Output = Result<String, AttachError>> + Send;

    /// Load the native agent at `library` into the target with `options`.
    fn load_agent(
        &self,
        pid: u32,
        library: &Path,
        options: &str,
    ) -> impl Future<Output = Result<(), AttachError>> + Send;
}

/// Attaches through the JDK's `jcmd` diagnostic command tool.
#[derive(Debug, Clone)]
pub struct JcmdAttach {
    jcmd: PathBuf,
}

impl JcmdAttach {
    /// Use the `jcmd` executable at `jcmd`.
    pub fn new(jcmd: impl Into<PathBuf>) -> Self {
        Self { jcmd: jcmd.into() }
    }

    async fn run(&self, pid: u32, command: &[&str]) -> Result<String, AttachError> {
        let output: Output = Command::new(&self.jcmd)
            .arg(pid.to_string())
            .args(command)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| AttachError::Spawn {
                tool: self.jcmd.display().to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            return Err(AttachError::CommandFailed {
                command: command.join(" "),
                pid,
                detail,
            });
        }

        Ok(stdout)
    }
}

impl Default for JcmdAttach {
    fn default() -> Self {
        Self::new("jcmd")
    }
}

impl AttachMechanism for JcmdAttach {
    #[instrument(
        name = "jleaker_attach::target_arch",
        target = "launcher::attach",
        level = "debug",
        skip(self)
    )]
    async fn target_arch(&self, pid: u32) -> Result<String, AttachError> {
        let properties = self.run(pid, &["VM.system_properties"]).await?;
        parse_os_arch(&properties)?.ok_or(AttachError::UnknownArchitecture(pid))
    }

    #[instrument(
        name = "jleaker_attach::load_agent",
        target = "launcher::attach",
        level = "debug",
        skip(self)
    )]
    async fn load_agent(&self, pid: u32, library: &Path, options: &str) -> Result<(), AttachError> {
        let command = agent_load_command(library, options);
        let command: Vec<&str> = command.iter().map(String::as_str).collect();
        let output = self.run(pid, &command).await?;

        // jcmd exits successfully even when the JVM rejects the agent.
        let reply = output.trim();
        if reply.contains("return code: 0") || !reply.contains("return code:") {
            tracing::debug!(reply = %reply, "Agent load acknowledged");
            Ok(())
        } else {
            Err(AttachError::CommandFailed {
                command: AGENT_LOAD_COMMAND.to_string(),
                pid,
                detail: reply.to_string(),
            })
        }
    }
}

/// Arguments after the pid for loading `library` with `options`.
///
/// jcmd joins its arguments into one command line that the JVM splits on
/// whitespace, so both values are quoted.
fn agent_load_command(library: &Path, options: &str) -> [String; 3] {
    [
        AGENT_LOAD_COMMAND.to_string(),
        quote_argument(&library.display().to_string()),
        quote_argument(options),
    ]
}

fn quote_argument(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\\\""))
}

/// Extract `os.arch` from `VM.system_properties` output.
pub fn parse_os_arch(properties: &str) -> Result<Option<String>, AttachError> {
    let re = OS_ARCH_RE
        .as_ref()
        .map_err(|e| AttachError::Pattern(e.to_string()))?;
    Ok(re
        .captures(properties)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string()))
}

/// Fail early if `pid` does not name a live process.
#[instrument(
    name = "jleaker_attach::ensure_running",
    target = "launcher::attach",
    level = "debug"
)]
pub fn ensure_running(pid: u32) -> Result<String, AttachError> {
    let target = Pid::from_u32(pid);
    let mut system = System::new();
    system.refresh_processes_specifics(
        ProcessesToUpdate::Some(&[target]),
        true,
        ProcessRefreshKind::nothing(),
    );

    match system.process(target) {
        Some(process) => {
            let name = process.name().to_string_lossy().into_owned();
            tracing::debug!(pid, process_name = %name, "Target process found");
            Ok(name)
        }
        None => Err(AttachError::ProcessNotFound(pid)),
    }
}
