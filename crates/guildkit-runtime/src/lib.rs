//! # guildkit Runtime
//!
//! The orchestration layer of the guildkit plugin runtime.
//!
//! This crate provides:
//! - [`GuildRuntime`], the guild load/unload state machine with signal
//!   deduplication, bounded load concurrency and the process-level error
//!   channel
//! - [`ConfigAccessor`], the collaborator supplying enabled plugins and
//!   plugin configuration, and the in-memory [`StaticConfigAccessor`]
//! - [`RuntimeConfig`] loading through figment ([`ConfigLoader`])
//! - Logging setup on top of `tracing-subscriber` ([`logging`])
//!
//! ```ignore
//! use guildkit_runtime::{GuildRuntime, StaticConfigAccessor};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = guildkit_core::EventBus::shared();
//!     let runtime = GuildRuntime::builder()
//!         .config_file("guildkit.toml")
//!         .init_logging(true)
//!         .guild_plugins([welcome.erase()])
//!         .accessor(StaticConfigAccessor::new().enable(1u64, ["welcome"]))
//!         .event_source(gateway.clone())
//!         .build()?;
//!
//!     runtime.initialize().await?;
//!     gateway.emit(guildkit_core::GuildAvailable { guild_id: 1u64.into() });
//!     // ...
//!     runtime.destroy().await?;
//!     Ok(())
//! }
//! ```

pub mod accessor;
pub mod config;
pub mod error;
pub mod guild;
pub mod logging;
pub mod runtime;

pub use accessor::{ConfigAccessor, StaticConfigAccessor};
pub use config::{
    ConfigError, ConfigLoader, ConfigResult, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, RuntimeConfig, SpanMode,
};
pub use error::{RuntimeError, RuntimeResult};
pub use guild::{GuildStatus, LoadedGuild};
pub use logging::LoggingBuilder;
pub use runtime::{GuildRuntime, GuildRuntimeBuilder};

// Re-export tracing for use by plugin crates
pub use tracing;

/// Logging macros for plugin code.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
