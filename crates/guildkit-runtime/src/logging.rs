//! Subscriber setup for the runtime and its plugins.
//!
//! Everything guildkit logs carries structured fields: `guild_id` on guild
//! loads and unloads, `plugin` on hooks, listeners and commands. Loads and
//! unloads run inside the `guild_load`, `guild_unload` and `global_load`
//! spans, so [`SpanMode::Timing`] yields one line per guild with its load
//! time.
//!
//! ```rust,ignore
//! use guildkit_runtime::logging::LoggingBuilder;
//! use guildkit_runtime::{LogLevel, SpanMode};
//!
//! LoggingBuilder::new()
//!     .plugins(LogLevel::Debug)
//!     .spans(SpanMode::Timing)
//!     .init();
//! ```

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use tracing::level_filters::LevelFilter;
use tracing::{debug, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::config::{LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig, SpanMode};

/// Target of plugin hooks, listeners, commands and config overrides.
pub const PLUGIN_TARGET: &str = "guildkit_framework";

/// Target of guild loads, unloads and the error channel.
pub const RUNTIME_TARGET: &str = "guildkit_runtime";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

impl SpanMode {
    fn fmt_span(self) -> FmtSpan {
        match self {
            SpanMode::Off => FmtSpan::NONE,
            SpanMode::Timing => FmtSpan::CLOSE,
            SpanMode::Full => FmtSpan::FULL,
        }
    }
}

impl From<LogRotation> for Rotation {
    fn from(rotation: LogRotation) -> Self {
        match rotation {
            LogRotation::Never => Rotation::NEVER,
            LogRotation::Hourly => Rotation::HOURLY,
            LogRotation::Daily => Rotation::DAILY,
        }
    }
}

/// Installs the global subscriber described by `config`.
///
/// Does nothing if a subscriber is already installed, so embedding
/// applications keep their own.
pub fn init_from_config(config: &LoggingConfig) {
    if LoggingBuilder::from_config(config).try_init().is_err() {
        debug!("A tracing subscriber is already installed; keeping it");
    }
}

/// Builder for the global `tracing` subscriber.
#[derive(Debug)]
pub struct LoggingBuilder {
    level: LogLevel,
    /// `(target, level)`, applied in order after `RUST_LOG`.
    targets: Vec<(String, LogLevel)>,
    spans: SpanMode,
    format: LogFormat,
    output: LogOutput,
    file_path: Option<PathBuf>,
    rotation: LogRotation,
    thread_ids: bool,
    file_location: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self {
            level: LogLevel::Info,
            targets: Vec::new(),
            spans: SpanMode::Off,
            format: LogFormat::Compact,
            output: LogOutput::Stdout,
            file_path: None,
            rotation: LogRotation::Never,
            thread_ids: false,
            file_location: false,
        }
    }

    pub fn from_config(config: &LoggingConfig) -> Self {
        let mut targets: Vec<_> = config
            .filters
            .iter()
            .map(|(target, level)| (target.clone(), *level))
            .collect();
        targets.sort_by(|a, b| a.0.cmp(&b.0));

        Self {
            level: config.level,
            targets,
            spans: config.spans,
            format: config.format,
            output: config.output,
            file_path: config.file_path.clone(),
            rotation: config.rotation,
            thread_ids: config.thread_ids,
            file_location: config.file_location,
        }
    }

    /// Base level for every target without its own.
    pub fn level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the level of one target, e.g. a plugin crate.
    pub fn target(mut self, target: impl Into<String>, level: LogLevel) -> Self {
        self.targets.push((target.into(), level));
        self
    }

    /// Level of plugin hooks, listeners and commands.
    pub fn plugins(self, level: LogLevel) -> Self {
        self.target(PLUGIN_TARGET, level)
    }

    /// Level of guild loads, unloads and reported errors.
    pub fn runtime(self, level: LogLevel) -> Self {
        self.target(RUNTIME_TARGET, level)
    }

    pub fn spans(mut self, spans: SpanMode) -> Self {
        self.spans = spans;
        self
    }

    pub fn format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Writes to `path`, rotated per `rotation`. Implies [`LogOutput::File`].
    pub fn file(mut self, path: impl Into<PathBuf>, rotation: LogRotation) -> Self {
        self.output = LogOutput::File;
        self.file_path = Some(path.into());
        self.rotation = rotation;
        self
    }

    pub fn thread_ids(mut self, enabled: bool) -> Self {
        self.thread_ids = enabled;
        self
    }

    pub fn file_location(mut self, enabled: bool) -> Self {
        self.file_location = enabled;
        self
    }

    /// `RUST_LOG` replaces the base level. Per-target levels apply on top.
    fn filter(&self) -> EnvFilter {
        let base = EnvFilter::builder()
            .with_default_directive(LevelFilter::from_level(self.level.to_tracing_level()).into())
            .from_env_lossy();
        self.targets
            .iter()
            .fold(base, |filter, (target, level)| {
                match format!("{target}={level}").parse() {
                    Ok(directive) => filter.add_directive(directive),
                    Err(e) => {
                        warn!(target_name = %target, error = %e, "Ignoring invalid log target");
                        filter
                    }
                }
            })
    }

    fn writer(&self) -> BoxMakeWriter {
        match (self.output, &self.file_path) {
            (LogOutput::Stdout, _) => BoxMakeWriter::new(std::io::stdout),
            (LogOutput::Stderr, _) => BoxMakeWriter::new(std::io::stderr),
            (LogOutput::File, Some(path)) => {
                let dir = path
                    .parent()
                    .filter(|dir| !dir.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                let prefix = path
                    .file_name()
                    .and_then(OsStr::to_str)
                    .unwrap_or("guildkit.log");
                match RollingFileAppender::builder()
                    .rotation(self.rotation.into())
                    .filename_prefix(prefix)
                    .build(dir)
                {
                    Ok(appender) => BoxMakeWriter::new(appender),
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Cannot open log file; writing to stdout");
                        BoxMakeWriter::new(std::io::stdout)
                    }
                }
            }
            (LogOutput::File, None) => {
                warn!("File logging has no file_path; writing to stdout");
                BoxMakeWriter::new(std::io::stdout)
            }
        }
    }

    fn layer(&self) -> BoxedLayer {
        let layer = fmt::layer()
            .with_writer(self.writer())
            .with_span_events(self.spans.fmt_span())
            .with_thread_ids(self.thread_ids)
            .with_file(self.file_location)
            .with_line_number(self.file_location);
        match self.format {
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Full => layer.boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            #[cfg(feature = "json-log")]
            LogFormat::Json => layer.json().boxed(),
        }
    }

    pub fn init(self) {
        let _ = self.try_init();
    }

    /// Installs the subscriber, failing if one is already installed.
    pub fn try_init(self) -> Result<(), TryInitError> {
        tracing_subscriber::registry()
            .with(self.layer())
            .with(self.filter())
            .try_init()?;
        debug!(
            level = %self.level,
            spans = ?self.spans,
            output = ?self.output,
            "Logging initialized"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_sorts_targets() {
        let mut config = LoggingConfig {
            level: LogLevel::Debug,
            thread_ids: true,
            spans: SpanMode::Timing,
            ..Default::default()
        };
        config
            .filters
            .insert("guildkit_runtime".to_string(), LogLevel::Trace);
        config
            .filters
            .insert("guildkit_core".to_string(), LogLevel::Warn);

        let builder = LoggingBuilder::from_config(&config);
        assert_eq!(builder.level, LogLevel::Debug);
        assert_eq!(builder.spans, SpanMode::Timing);
        assert!(builder.thread_ids);
        assert_eq!(
            builder.targets,
            vec![
                ("guildkit_core".to_string(), LogLevel::Warn),
                ("guildkit_runtime".to_string(), LogLevel::Trace),
            ]
        );
    }

    #[test]
    fn test_plugin_and_runtime_shorthands() {
        let builder = LoggingBuilder::new()
            .plugins(LogLevel::Trace)
            .runtime(LogLevel::Warn);
        assert_eq!(
            builder.targets,
            vec![
                (PLUGIN_TARGET.to_string(), LogLevel::Trace),
                (RUNTIME_TARGET.to_string(), LogLevel::Warn),
            ]
        );
    }

    #[test]
    fn test_span_modes() {
        assert_eq!(SpanMode::Off.fmt_span(), FmtSpan::NONE);
        assert_eq!(SpanMode::Timing.fmt_span(), FmtSpan::CLOSE);
        assert_eq!(SpanMode::Full.fmt_span(), FmtSpan::FULL);
    }

    #[test]
    fn test_file_implies_file_output() {
        let builder = LoggingBuilder::new().file("logs/bot.log", LogRotation::Daily);
        assert_eq!(builder.output, LogOutput::File);
        assert_eq!(builder.rotation, LogRotation::Daily);
    }

    #[test]
    fn test_second_init_does_not_panic() {
        LoggingBuilder::new().init();
        init_from_config(&LoggingConfig::default());
        assert!(LoggingBuilder::new().try_init().is_err());
    }
}
