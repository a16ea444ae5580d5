//! Configuration of the runtime itself.
//!
//! This covers the knobs of the process (load concurrency, error channel
//! capacity, logging). Plugin configuration is supplied separately through
//! a [`ConfigAccessor`](crate::ConfigAccessor).

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use schema::{
    DEFAULT_ERROR_CHANNEL_CAPACITY, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    RuntimeConfig, SpanMode,
};
pub use validation::validate_config;
