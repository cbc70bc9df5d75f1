//! The launcher's switch table and the agent settings derived from it.

// Local crates
use crate::switches::{
    parser::{ParseError, ParsedArguments, parse},
    spec::{SpecError, SwitchSpec},
};

// External crates
use std::fs::File;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::instrument;

/// `size_threshold` when `--size-threshold` is absent.
pub const DEFAULT_SIZE_THRESHOLD: i32 = 300;
/// `reference_chain_length` when `--reference-chain-length` is absent.
pub const DEFAULT_REFERENCE_CHAIN_LENGTH: i32 = 60;

/// Name of the configuration file always appended to the agent's list.
pub const DEFAULT_CONF_FILE_NAME: &str = "jleaker.conf";

/// Placeholder in `--lib-path` replaced by the target's architecture.
pub const ARCH_PLACEHOLDER: &str = "<ARCH>";

/// Agent library, may contain `<ARCH>`.
pub const ARG_LIB_PATH: &str = "lib-path=m";
/// Directory holding the default `jleaker.conf`.
pub const ARG_CONF_PATH: &str = "conf-path=m";
/// Smallest data structure size reported.
pub const ARG_SIZE_THRESHOLD: &str = "size-threshold=i";
/// Target JVM.
pub const ARG_PID: &str = "pid=im";
/// Maximum references followed towards a GC root.
pub const ARG_REFERENCE_CHAIN_LENGTH: &str = "reference-chain-length=i";
/// Referrer limit per object.
pub const ARG_MAX_FAN_IN: &str = "max_fan_in=i";
/// Verbose agent logging.
pub const ARG_DEBUG: &str = "debug=b";
/// Print direct referrers instead of chains to root.
pub const ARG_SHOW_UNREACHABLES: &str = "show-unreachables=b";
/// Let the agent inspect itself.
pub const ARG_SELF_CHECK: &str = "self-check=b";
/// Skip the garbage collection before scanning.
pub const ARG_NO_GC: &str = "no-gc=b";
/// Extra configuration files.
pub const ARG_CONF_FILE: &str = "conf-file=s";
/// Treat local and JNI local references as roots.
pub const ARG_CONSIDER_LOCAL_REF: &str = "consider-local-references=b";

/// Every switch the launcher understands, in declaration order.
pub const ALL_ARGS: [&str; 12] = [
    ARG_LIB_PATH,
    ARG_CONF_PATH,
    ARG_SIZE_THRESHOLD,
    ARG_PID,
    ARG_REFERENCE_CHAIN_LENGTH,
    ARG_MAX_FAN_IN,
    ARG_DEBUG,
    ARG_SELF_CHECK,
    ARG_CONF_FILE,
    ARG_NO_GC,
    ARG_SHOW_UNREACHABLES,
    ARG_CONSIDER_LOCAL_REF,
];

/// Platform separator between entries of `--conf-file`.
#[cfg(windows)]
pub const PATH_LIST_SEPARATOR: char = ';';
/// Platform separator between entries of `--conf-file`.
#[cfg(not(windows))]
pub const PATH_LIST_SEPARATOR: char = ':';

/// Why the command line could not be turned into [`LaunchOptions`].
#[derive(Debug, Error)]
pub enum OptionsError {
    /// The command line itself is malformed.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// The built-in switch table is malformed.
    #[error("invalid launcher switch table: {0}")]
    Spec(#[from] SpecError),

    /// `--pid` is zero or negative.
    #[error("Argument {0} must be a positive process id")]
    InvalidPid(i32),

    /// A `--conf-file` entry is missing or unreadable.
    #[error("Configuration file {} is not accessible", .0.display())]
    ConfNotAccessible(PathBuf),
}

/// The launcher's switch table.
pub fn switch_spec() -> Result<SwitchSpec, SpecError> {
    SwitchSpec::from_declarations(ALL_ARGS)
}

/// Agent settings derived from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Target process.
    pub pid: u32,
    /// Library path as given, `<ARCH>` not yet substituted.
    pub lib_path: String,
    /// Base directory for relative configuration files.
    pub conf_path: PathBuf,
    /// `--size-threshold` or its default.
    pub size_threshold: i32,
    /// `--reference-chain-length` or its default.
    pub reference_chain_length: i32,
    /// `--max_fan_in`, left out of the agent options when absent.
    pub max_fan_in: Option<i32>,
    /// `--debug`.
    pub debug: bool,
    /// `--self-check`.
    pub self_check: bool,
    /// `--show-unreachables`.
    pub show_unreachables: bool,
    /// `--no-gc`.
    pub no_gc: bool,
    /// `--consider-local-references`.
    pub consider_local_references: bool,
    /// Resolved `conf_file` agent option.
    pub conf_file: String,
}

impl LaunchOptions {
    /// Parse raw command line tokens (without the program name).
    #[instrument(
        name = "jleaker_launcher::options_from_args",
        target = "launcher::options",
        level = "debug",
        skip_all
    )]
    pub fn from_args<I, S>(tokens: I) -> Result<Self, OptionsError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let spec = switch_spec()?;
        let args = parse(tokens, &spec)?;
        Self::from_parsed(&args)
    }

    /// Build options from an already validated argument map.
    pub fn from_parsed(args: &ParsedArguments) -> Result<Self, OptionsError> {
        // Both are mandatory, so a successful parse guarantees them.
        let lib_path = args.string(ARG_LIB_PATH).unwrap_or_default().to_string();
        let conf_path = PathBuf::from(args.string(ARG_CONF_PATH).unwrap_or_default());

        let raw_pid = args.integer(ARG_PID).unwrap_or_default();
        let pid = u32::try_from(raw_pid)
            .ok()
            .filter(|pid| *pid > 0)
            .ok_or(OptionsError::InvalidPid(raw_pid))?;

        let conf_file = resolve_conf_files(&conf_path, args.string(ARG_CONF_FILE))?;

        Ok(Self {
            pid,
            lib_path,
            size_threshold: args
                .integer(ARG_SIZE_THRESHOLD)
                .unwrap_or(DEFAULT_SIZE_THRESHOLD),
            reference_chain_length: args
                .integer(ARG_REFERENCE_CHAIN_LENGTH)
                .unwrap_or(DEFAULT_REFERENCE_CHAIN_LENGTH),
            max_fan_in: args.integer(ARG_MAX_FAN_IN),
            debug: args.exists(ARG_DEBUG),
            self_check: args.exists(ARG_SELF_CHECK),
            show_unreachables: args.exists(ARG_SHOW_UNREACHABLES),
            no_gc: args.exists(ARG_NO_GC),
            consider_local_references: args.exists(ARG_CONSIDER_LOCAL_REF),
            conf_path,
            conf_file,
        })
    }

    /// Comma separated option string handed to the agent on load.
    pub fn agent_options(&self, tcp_port: u16) -> String {
        let mut options = String::new();

        if self.debug {
            options.push_str("debug,");
        }
        if self.self_check {
            options.push_str("self_check,");
        }
        if let Some(max_fan_in) = self.max_fan_in {
            options.push_str(&format!("max_fan_in={max_fan_in},"));
        }
        if self.show_unreachables {
            options.push_str("show_unreachables,");
        }
        if self.no_gc {
            options.push_str("no_gc,");
        }
        if self.consider_local_references {
            options.push_str("consider_local_references,");
        }
        options.push_str(&format!("conf_file={},", self.conf_file));
        options.push_str(&format!(
            "size_threshold={},reference_chain_length={},tcp_port={}",
            self.size_threshold, self.reference_chain_length, tcp_port
        ));

        options
    }

    /// `--lib-path` with every `<ARCH>` replaced by `arch`.
    pub fn library_for_arch(&self, arch: &str) -> PathBuf {
        PathBuf::from(self.lib_path.replace(ARCH_PLACEHOLDER, arch))
    }
}

/// Resolve the `conf_file` agent option.
///
/// Without `--conf-file` this is `<conf-path>/jleaker.conf`. Otherwise every
/// listed file is resolved against `conf-path` when relative, must be readable,
/// and the default file is appended to the list.
#[instrument(
    name = "jleaker_launcher::resolve_conf_files",
    target = "launcher::options",
    level = "debug",
    skip_all
)]
pub fn resolve_conf_files(conf_path: &Path, conf_file: Option<&str>) -> Result<String, OptionsError> {
    let default_conf = conf_path.join(DEFAULT_CONF_FILE_NAME);
    let default_conf = default_conf.display().to_string();

    let Some(raw) = conf_file else {
        return Ok(default_conf);
    };

    let entries: Vec<&str> = raw
        .split(PATH_LIST_SEPARATOR)
        .filter(|entry| !entry.is_empty())
        .collect();
    if entries.is_empty() {
        return Ok(raw.to_string());
    }

    let mut normalized = String::new();
    for entry in entries {
        let mut path = PathBuf::from(entry);
        if !path.is_absolute() {
            path = conf_path.join(path);
        }
        if !is_readable_file(&path) {
            tracing::error!(path = %path.display(), "Configuration file is not accessible");
            return Err(OptionsError::ConfNotAccessible(path));
        }
        normalized.push_str(&path.display().to_string());
        normalized.push(PATH_LIST_SEPARATOR);
    }
    normalized.push_str(&default_conf);

    tracing::debug!(conf_file = %normalized, "Configuration files resolved");
    Ok(normalized)
}

fn is_readable_file(path: &Path) -> bool {
    path.is_file() && File::open(path).is_ok()
}

/// Text printed after a command line error.
pub fn usage() -> String {
    let sep = PATH_LIST_SEPARATOR;
    format!(
        "\
Usage:
jleaker --pid <JAVA PID> --lib-path <AGENT LIBRARY> --conf-path <CONF DIR> [options]
Options are:
\t--size-threshold <num> \t\tAlert only on data structures with size bigger than <num> (default is {DEFAULT_SIZE_THRESHOLD})
\t--reference-chain-length <num> \tMax number of references to iterate when searching for the reference chain to root (default is {DEFAULT_REFERENCE_CHAIN_LENGTH})
\t--max_fan_in <num> \t\tLimit the number of referrers followed per object
\t--debug \t\t\tEnable verbose logging in JLeaker
\t--show-unreachables \t\tDon't try to find reference chain to root for leaking objects, display all direct reference to it instead
\t--self-check \t\t\tUse JLeaker to check itself for memory leaks
\t--no-gc \t\t\tDon't run garbage collection prior to the memory leak scanning (Default is to run GC)
\t--conf-file <FILES> \t\tA list of JLeaker configuration files, separated by a '{sep}' character
\t--consider-local-references \tConsider local variable references and JNI local references as a heap root references (Default: No)
"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn base_args(conf_path: &str) -> Vec<String> {
        ["--pid", "4821", "--lib-path", "/opt/jleaker/<ARCH>/libjleaker.so", "--conf-path", conf_path]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn switch_table_is_valid() {
        let spec = switch_spec().unwrap();
        assert_eq!(spec.len(), ALL_ARGS.len());
        assert!(spec.get("pid").unwrap().mandatory);
    }

    #[test]
    fn defaults_apply_when_switches_are_absent() {
        let opts = LaunchOptions::from_args(base_args("/etc/jleaker")).unwrap();

        assert_eq!(opts.pid, 4821);
        assert_eq!(opts.size_threshold, DEFAULT_SIZE_THRESHOLD);
        assert_eq!(opts.reference_chain_length, DEFAULT_REFERENCE_CHAIN_LENGTH);
        assert_eq!(opts.max_fan_in, None);
        assert!(!opts.debug);
        assert_eq!(
            opts.conf_file,
            Path::new("/etc/jleaker").join("jleaker.conf").display().to_string()
        );
    }

    #[test]
    fn option_string_has_fixed_order() {
        let mut args = base_args("/etc/jleaker");
        args.extend(
            [
                "--consider-local-references",
                "--no-gc",
                "--show-unreachables",
                "--max_fan_in",
                "5",
                "--self-check",
                "--debug",
                "--size-threshold",
                "500",
                "--reference-chain-length",
                "10",
            ]
            .iter()
            .map(|s| s.to_string()),
        );

        let opts = LaunchOptions::from_args(args).unwrap();
        let conf = Path::new("/etc/jleaker").join("jleaker.conf").display().to_string();

        assert_eq!(
            opts.agent_options(40123),
            format!(
                "debug,self_check,max_fan_in=5,show_unreachables,no_gc,consider_local_references,\
                 conf_file={conf},size_threshold=500,reference_chain_length=10,tcp_port=40123"
            )
        );
    }

    #[test]
    fn minimal_option_string() {
        let opts = LaunchOptions::from_args(base_args("/c")).unwrap();
        let conf = Path::new("/c").join("jleaker.conf").display().to_string();
        assert_eq!(
            opts.agent_options(1),
            format!("conf_file={conf},size_threshold=300,reference_chain_length=60,tcp_port=1")
        );
    }

    #[test]
    fn parse_errors_are_propagated() {
        let err = LaunchOptions::from_args(["--pid", "12"]).unwrap_err();
        assert!(matches!(
            err,
            OptionsError::Parse(ParseError::MissingMandatorySwitch(ref name)) if name == "lib-path"
        ));
    }

    #[test]
    fn non_positive_pid_is_rejected() {
        let mut args = base_args("/c");
        args[1] = "-3".to_string();
        assert!(matches!(
            LaunchOptions::from_args(args),
            Err(OptionsError::InvalidPid(-3))
        ));
    }

    #[test]
    fn arch_placeholder_is_substituted() {
        let opts = LaunchOptions::from_args(base_args("/c")).unwrap();
        assert_eq!(
            opts.library_for_arch("amd64"),
            PathBuf::from("/opt/jleaker/amd64/libjleaker.so")
        );
    }

    #[test]
    fn relative_conf_files_resolve_against_conf_path() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("extra.conf"), "x").unwrap();
        let absolute = dir.path().join("abs.conf");
        fs::write(&absolute, "y").unwrap();

        let raw = format!("extra.conf{PATH_LIST_SEPARATOR}{}", absolute.display());
        let resolved = resolve_conf_files(dir.path(), Some(&raw)).unwrap();

        let expected = format!(
            "{}{sep}{}{sep}{}",
            dir.path().join("extra.conf").display(),
            absolute.display(),
            dir.path().join(DEFAULT_CONF_FILE_NAME).display(),
            sep = PATH_LIST_SEPARATOR
        );
        assert_eq!(resolved, expected);
    }

    #[test]
    fn unreadable_conf_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_conf_files(dir.path(), Some("missing.conf")).unwrap_err();
        match err {
            OptionsError::ConfNotAccessible(path) => {
                assert_eq!(path, dir.path().join("missing.conf"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_conf_list_is_kept_verbatim() {
        let raw = PATH_LIST_SEPARATOR.to_string();
        assert_eq!(resolve_conf_files(Path::new("/c"), Some(&raw)).unwrap(), raw);
    }

    #[test]
    fn usage_mentions_defaults() {
        let text = usage();
        assert!(text.contains("--pid <JAVA PID>"));
        assert!(text.contains("(default is 300)"));
        assert!(text.contains("(default is 60)"));
    }
}
