//! Range checks that serde cannot express.

use super::error::{ConfigError, ConfigResult};
use super::schema::{LogOutput, LoggingConfig, RuntimeConfig};

/// Validates `config` after extraction. The builder runs this again after
/// applying its own overrides.
pub fn validate_config(config: &RuntimeConfig) -> ConfigResult<()> {
    if config.concurrent_guild_load_limit == Some(0) {
        return Err(ConfigError::invalid(
            "concurrent_guild_load_limit",
            "must be greater than 0; omit it to load every guild at once",
        ));
    }
    if config.error_channel_capacity == 0 {
        return Err(ConfigError::invalid(
            "error_channel_capacity",
            "must be greater than 0",
        ));
    }
    validate_logging(&config.logging)
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::invalid(
            "logging.file_path",
            "required when logging.output is \"file\"",
        ));
    }

    // Targets are spliced into `target=level` filter directives.
    if let Some(target) = logging
        .filters
        .keys()
        .find(|target| target.is_empty() || target.contains(['=', ',', ' ']))
    {
        return Err(ConfigError::invalid(
            "logging.filters",
            format!("'{target}' is not a module path"),
        ));
    }
    Ok(())
}
