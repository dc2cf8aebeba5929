use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_CHUNK_SIZE: usize = 4096;
pub const DEFAULT_SINK_CAPACITY: usize = 1024;
pub const DEFAULT_DRAIN_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_LOG_FILE_NAME: &str = "siphon_mitm.log";
/// Prefix of the real binary installed next to the proxy.
pub const REAL_BINARY_PREFIX: &str = "_real_";

pub const MAX_CHUNK_SIZE: usize = 1 << 20;
pub const MAX_SINK_CAPACITY: usize = 1 << 20;
pub const MAX_DRAIN_TIMEOUT_MS: u64 = 60_000;

/// Optional overrides read from the TOML file named by `SIPHON_CONFIG`.
///
/// ```toml
/// target = "/opt/tool/_real_tool"
/// log_file = "~/logs/tool.log"
/// chunk_size = 8192
/// drain_timeout_ms = 500
/// ```
#[derive(Debug, Default, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub target: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
    pub chunk_size: Option<usize>,
    pub sink_capacity: Option<usize>,
    pub drain_timeout_ms: Option<u64>,
    pub diagnostics_file: Option<PathBuf>,
}
