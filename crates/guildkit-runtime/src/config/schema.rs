//! Runtime configuration schema.
//!
//! ```toml
//! concurrent_guild_load_limit = 4
//! error_channel_capacity = 128
//!
//! [logging]
//! level = "debug"
//! format = "pretty"
//! output = "file"
//! file_path = "logs/guildkit.log"
//! rotation = "daily"
//! spans = "timing"
//!
//! [logging.filters]
//! guildkit_framework = "trace"
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default capacity of the runtime's error broadcast channel.
pub const DEFAULT_ERROR_CHANNEL_CAPACITY: usize = 64;

fn default_error_channel_capacity() -> usize {
    DEFAULT_ERROR_CHANNEL_CAPACITY
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level configuration of a [`GuildRuntime`](crate::GuildRuntime).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Maximum number of guilds loading at the same time. `None` loads every
    /// guild as soon as it becomes available.
    pub concurrent_guild_load_limit: Option<usize>,

    /// Capacity of the error broadcast channel. Slow receivers lag rather
    /// than block the runtime.
    #[serde(default = "default_error_channel_capacity")]
    pub error_channel_capacity: usize,

    pub logging: LoggingConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            concurrent_guild_load_limit: None,
            error_channel_capacity: DEFAULT_ERROR_CHANNEL_CAPACITY,
            logging: LoggingConfig::default(),
        }
    }
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines are written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Written to [`LoggingConfig::file_path`].
    File,
}

/// How often a log file is rotated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// How the runtime's `guild_load`, `guild_unload` and `global_load` spans
/// show up in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanMode {
    /// Spans only annotate the lines logged inside them.
    #[default]
    Off,
    /// One line per closed span with its busy and idle time, i.e. how long
    /// each guild took to load or unload.
    Timing,
    /// Creation, every enter and exit, and close.
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Base level. `RUST_LOG` takes precedence when set.
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Log file, used when `output` is `file`.
    pub file_path: Option<PathBuf>,
    pub rotation: LogRotation,
    pub spans: SpanMode,
    pub thread_ids: bool,
    /// Include file and line of the log site.
    pub file_location: bool,
    /// Per-target levels, e.g. `guildkit_framework = "trace"` for hook and
    /// listener tracing.
    pub filters: HashMap<String, LogLevel>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            rotation: LogRotation::Never,
            spans: SpanMode::Off,
            thread_ids: false,
            file_location: false,
            filters: HashMap::new(),
        }
    }
}
