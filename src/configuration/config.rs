use super::types::*;
use crate::error_handling::types::ConfigError;
use clap::Parser;
use log::debug;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Runtime configuration of the proxy.
///
/// The proxy forwards its whole command line to the child, so nothing here
/// comes from argv. Values are layered: built-in defaults, then the TOML file
/// named by `SIPHON_CONFIG`, then individual `SIPHON_*` environment variables.
///
/// # Fields Overview
///
/// - `target`: executable launched as the child
/// - `log_file`: append-only destination of session records
/// - `chunk_size`: upper bound of a single read on any stream
/// - `sink_capacity`: records queued for the log writer before producers wait
/// - `drain_timeout`: grace period for the child's output pipes to reach EOF
///   after it exits, before their forwarders are cancelled
/// - `diagnostics_file`: where diagnostics go when enabled through `SIPHON_LOG`
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub target: PathBuf,
    pub log_file: PathBuf,
    pub chunk_size: usize,
    pub sink_capacity: usize,
    pub drain_timeout: Duration,
    pub diagnostics_file: Option<PathBuf>,
}

/// Environment layer. Parsed with an empty argument list so clap only ever
/// looks at the environment.
#[derive(Parser, Debug, Default)]
#[command(name = "siphon")]
struct EnvOverrides {
    #[arg(long, env = "SIPHON_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "SIPHON_TARGET")]
    target: Option<PathBuf>,

    #[arg(long, env = "SIPHON_LOG_FILE")]
    log_file: Option<PathBuf>,

    #[arg(long, env = "SIPHON_CHUNK_SIZE")]
    chunk_size: Option<usize>,

    #[arg(long, env = "SIPHON_SINK_CAPACITY")]
    sink_capacity: Option<usize>,

    #[arg(long, env = "SIPHON_DRAIN_TIMEOUT_MS")]
    drain_timeout_ms: Option<u64>,

    #[arg(long, env = "SIPHON_DIAGNOSTICS_FILE")]
    diagnostics_file: Option<PathBuf>,
}

impl Config {
    /// Configuration for launching `target` with records appended to
    /// `log_file`, everything else at its default.
    pub fn new(target: impl Into<PathBuf>, log_file: impl Into<PathBuf>) -> Self {
        Self {
            target: target.into(),
            log_file: log_file.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            sink_capacity: DEFAULT_SINK_CAPACITY,
            drain_timeout: Duration::from_millis(DEFAULT_DRAIN_TIMEOUT_MS),
            diagnostics_file: None,
        }
    }

    /// Resolves the configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let env = EnvOverrides::try_parse_from(["siphon"])
            .map_err(|e| ConfigError::InvalidValue(e.to_string().trim().to_string()))?;
        let file = match env.config.as_deref() {
            Some(path) => Self::read_file(&expand_home(path.to_path_buf()))?,
            None => ConfigFile::default(),
        };
        Self::resolve(file, env)
    }

    /// Parses a TOML configuration file.
    pub fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
        debug!("Reading configuration from {}", path.display());
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    fn resolve(file: ConfigFile, env: EnvOverrides) -> Result<Self, ConfigError> {
        let target = match env.target.or(file.target) {
            Some(target) => expand_home(target),
            None => default_target()?,
        };
        let log_file = env
            .log_file
            .or(file.log_file)
            .map(expand_home)
            .unwrap_or_else(default_log_file);

        let config = Config {
            target,
            log_file,
            chunk_size: env
                .chunk_size
                .or(file.chunk_size)
                .unwrap_or(DEFAULT_CHUNK_SIZE),
            sink_capacity: env
                .sink_capacity
                .or(file.sink_capacity)
                .unwrap_or(DEFAULT_SINK_CAPACITY),
            drain_timeout: Duration::from_millis(
                env.drain_timeout_ms
                    .or(file.drain_timeout_ms)
                    .unwrap_or(DEFAULT_DRAIN_TIMEOUT_MS),
            ),
            diagnostics_file: env
                .diagnostics_file
                .or(file.diagnostics_file)
                .map(expand_home),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CHUNK_SIZE).contains(&self.chunk_size) {
            return Err(ConfigError::NotInRange(format!(
                "chunk_size must be between 1 and {}, got {}",
                MAX_CHUNK_SIZE, self.chunk_size
            )));
        }
        if !(1..=MAX_SINK_CAPACITY).contains(&self.sink_capacity) {
            return Err(ConfigError::NotInRange(format!(
                "sink_capacity must be between 1 and {}, got {}",
                MAX_SINK_CAPACITY, self.sink_capacity
            )));
        }
        if self.drain_timeout > Duration::from_millis(MAX_DRAIN_TIMEOUT_MS) {
            return Err(ConfigError::NotInRange(format!(
                "drain_timeout_ms must be at most {}, got {}",
                MAX_DRAIN_TIMEOUT_MS,
                self.drain_timeout.as_millis()
            )));
        }
        if self.target.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue("target must not be empty".into()));
        }
        if self.log_file.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue("log_file must not be empty".into()));
        }
        Ok(())
    }
}

/// `_real_<name>` beside the proxy as invoked, so the proxy can be installed
/// (or symlinked) under the name of the binary it wraps.
fn default_target() -> Result<PathBuf, ConfigError> {
    let exe = std::env::current_exe()?;
    real_target(std::env::args_os().next().map(PathBuf::from), &exe)
}

/// Name and directory come from `argv[0]`, which keeps a symlink's name where
/// `current_exe` would resolve it. A bare command name found through `PATH`
/// has no directory, so the resolved executable's is used instead.
fn real_target(argv0: Option<PathBuf>, exe: &Path) -> Result<PathBuf, ConfigError> {
    let invoked = argv0
        .filter(|p| p.file_name().is_some())
        .unwrap_or_else(|| exe.to_path_buf());
    let name = invoked.file_name().ok_or_else(|| {
        ConfigError::InvalidValue(format!("cannot derive target from {}", exe.display()))
    })?;
    let dir = match invoked.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => exe.parent().unwrap_or_else(|| Path::new(".")),
    };
    let mut real = std::ffi::OsString::from(REAL_BINARY_PREFIX);
    real.push(name);
    Ok(dir.join(real))
}

fn default_log_file() -> PathBuf {
    home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_LOG_FILE_NAME)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .filter(|h| !h.is_empty())
        .map(PathBuf::from)
}

fn expand_home(path: PathBuf) -> PathBuf {
    match (path.strip_prefix("~"), home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;
    use tempfile::TempDir;

    const VARS: [&str; 7] = [
        "SIPHON_CONFIG",
        "SIPHON_TARGET",
        "SIPHON_LOG_FILE",
        "SIPHON_CHUNK_SIZE",
        "SIPHON_SINK_CAPACITY",
        "SIPHON_DRAIN_TIMEOUT_MS",
        "SIPHON_DIAGNOSTICS_FILE",
    ];

    fn clear_env() {
        for var in VARS {
            env::remove_var(var);
        }
    }

    #[test]
    #[serial]
    fn defaults_without_environment() {
        clear_env();
        let config = Config::load().unwrap();

        let expected = real_target(
            env::args_os().next().map(PathBuf::from),
            &env::current_exe().unwrap(),
        )
        .unwrap();
        assert_eq!(config.target, expected);
        assert!(config
            .target
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(REAL_BINARY_PREFIX));
        assert!(config.log_file.ends_with(DEFAULT_LOG_FILE_NAME));
        assert_eq!(config.chunk_size, 4096);
        assert_eq!(config.sink_capacity, 1024);
        assert_eq!(config.drain_timeout, Duration::from_millis(1000));
        assert_eq!(config.diagnostics_file, None);
    }

    #[test]
    fn target_follows_the_invoked_name_not_the_resolved_binary() {
        let exe = Path::new("/opt/siphon/bin/siphon");

        let symlinked = real_target(Some(PathBuf::from("/usr/local/bin/claude")), exe);
        assert_eq!(symlinked.unwrap(), PathBuf::from("/usr/local/bin/_real_claude"));

        let relative = real_target(Some(PathBuf::from("./tools/claude")), exe);
        assert_eq!(relative.unwrap(), PathBuf::from("./tools/_real_claude"));

        let from_path = real_target(Some(PathBuf::from("claude")), exe);
        assert_eq!(from_path.unwrap(), PathBuf::from("/opt/siphon/bin/_real_claude"));

        let unknown = real_target(None, exe);
        assert_eq!(unknown.unwrap(), PathBuf::from("/opt/siphon/bin/_real_siphon"));
    }

    #[test]
    #[serial]
    fn environment_overrides_defaults() {
        clear_env();
        env::set_var("SIPHON_TARGET", "/usr/bin/true");
        env::set_var("SIPHON_LOG_FILE", "/tmp/siphon-test.log");
        env::set_var("SIPHON_CHUNK_SIZE", "512");
        env::set_var("SIPHON_DRAIN_TIMEOUT_MS", "0");

        let config = Config::load();
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.target, PathBuf::from("/usr/bin/true"));
        assert_eq!(config.log_file, PathBuf::from("/tmp/siphon-test.log"));
        assert_eq!(config.chunk_size, 512);
        assert_eq!(config.drain_timeout, Duration::ZERO);
    }

    #[test]
    #[serial]
    fn file_layer_sits_below_environment() {
        clear_env();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("siphon.toml");
        std::fs::write(
            &path,
            "target = \"/from/file\"\nlog_file = \"/var/tmp/file.log\"\nchunk_size = 8192\n",
        )
        .unwrap();
        env::set_var("SIPHON_CONFIG", &path);
        env::set_var("SIPHON_TARGET", "/from/env");

        let config = Config::load();
        clear_env();
        let config = config.unwrap();

        assert_eq!(config.target, PathBuf::from("/from/env"));
        assert_eq!(config.log_file, PathBuf::from("/var/tmp/file.log"));
        assert_eq!(config.chunk_size, 8192);
    }

    #[test]
    #[serial]
    fn unknown_file_keys_are_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("siphon.toml");
        std::fs::write(&path, "rotate = true\n").unwrap();

        match Config::read_file(&path) {
            Err(ConfigError::TomlError(msg)) => assert!(msg.contains("rotate")),
            other => panic!("expected TomlError, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn out_of_range_values_fail_validation() {
        clear_env();
        env::set_var("SIPHON_TARGET", "/usr/bin/true");
        env::set_var("SIPHON_CHUNK_SIZE", "0");
        let result = Config::load();
        clear_env();
        assert!(matches!(result, Err(ConfigError::NotInRange(_))));
    }

    #[test]
    #[serial]
    fn malformed_numbers_are_invalid_values() {
        clear_env();
        env::set_var("SIPHON_TARGET", "/usr/bin/true");
        env::set_var("SIPHON_SINK_CAPACITY", "lots");
        let result = Config::load();
        clear_env();
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    #[serial]
    fn tilde_expands_to_home() {
        let home = env::var_os("HOME");
        env::set_var("HOME", "/home/operator");
        let expanded = expand_home(PathBuf::from("~/logs/siphon.log"));
        let untouched = expand_home(PathBuf::from("/abs/~/x"));
        match home {
            Some(h) => env::set_var("HOME", h),
            None => env::remove_var("HOME"),
        }
        assert_eq!(expanded, PathBuf::from("/home/operator/logs/siphon.log"));
        assert_eq!(untouched, PathBuf::from("/abs/~/x"));
    }
}
