use std::path::PathBuf;

use thiserror::Error;

/// Why a [`RuntimeConfig`](super::RuntimeConfig) could not be produced.
#[derive(Error, Debug, Clone)]
pub enum ConfigError {
    /// An explicitly requested config file is missing.
    #[error("runtime config file {} does not exist", .0.display())]
    FileNotFound(PathBuf),

    /// The file's extension names no enabled format (`toml-config`,
    /// `yaml-config`).
    #[error("runtime config file {} is not in an enabled format", .0.display())]
    UnsupportedFormat(PathBuf),

    /// A source failed to parse, or a value has the wrong type. Figment's
    /// error names the key and the source it came from.
    #[error(transparent)]
    Extract(Box<figment::Error>),

    /// A value parsed but is out of range for the runtime.
    #[error("invalid `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }

    /// The offending config key, for [`Invalid`](Self::Invalid) errors.
    pub fn key(&self) -> Option<&'static str> {
        match self {
            Self::Invalid { key, .. } => Some(key),
            _ => None,
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(error: figment::Error) -> Self {
        Self::Extract(Box::new(error))
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
