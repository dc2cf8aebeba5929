use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(Debug)]
pub enum ConfigError {
    IoError(io::Error),
    TomlError(String),
    InvalidValue(String),
    NotInRange(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::InvalidValue(e) => write!(f, "Invalid value: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<io::Error> for ConfigError {
    fn from(err: io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

/// Failure of a single stream forwarder. Never fatal to the session.
#[derive(Debug)]
pub enum CaptureError {
    Read(io::Error),
    Write(io::Error),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::Read(e) => write!(f, "read failed: {}", e),
            CaptureError::Write(e) => write!(f, "write failed: {}", e),
        }
    }
}

impl std::error::Error for CaptureError {}

#[derive(Debug)]
pub enum SessionError {
    SpawnFailed(PathBuf, io::Error),
    MissingPipe(&'static str),
    WaitFailed(io::Error),
}

impl SessionError {
    /// Exit code the proxy reports when the session could not run at all,
    /// following the shell convention for unlaunchable commands.
    pub fn exit_code(&self) -> i32 {
        match self {
            SessionError::SpawnFailed(_, e) => match e.kind() {
                io::ErrorKind::NotFound => 127,
                io::ErrorKind::PermissionDenied => 126,
                _ => 1,
            },
            _ => 1,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::SpawnFailed(path, e) => {
                write!(f, "failed to launch {}: {}", path.display(), e)
            }
            SessionError::MissingPipe(name) => write!(f, "child {} was not piped", name),
            SessionError::WaitFailed(e) => write!(f, "failed to wait for child: {}", e),
        }
    }
}

impl std::error::Error for SessionError {}

#[derive(Debug)]
pub enum AnonymizeError {
    IoError(io::Error),
    InputNotFound(PathBuf),
    PersistFailed(String),
    InvalidPattern(regex::Error),
}

impl fmt::Display for AnonymizeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnonymizeError::IoError(e) => write!(f, "IO error: {}", e),
            AnonymizeError::InputNotFound(p) => {
                write!(f, "Input file '{}' does not exist", p.display())
            }
            AnonymizeError::PersistFailed(e) => write!(f, "Failed to replace input file: {}", e),
            AnonymizeError::InvalidPattern(e) => write!(f, "Invalid UUID pattern: {}", e),
        }
    }
}

impl std::error::Error for AnonymizeError {}

impl From<io::Error> for AnonymizeError {
    fn from(err: io::Error) -> Self {
        AnonymizeError::IoError(err)
    }
}
