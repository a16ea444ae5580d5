//! Runtime error types.

use std::sync::Arc;

use guildkit_core::{BoxError, GuildId};
use guildkit_framework::{ConfigurationError, HookError, PluginError};
use thiserror::Error;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors raised by [`GuildRuntime`](crate::GuildRuntime) operations and
/// published on its error channel.
#[derive(Error, Debug, Clone)]
pub enum RuntimeError {
    /// A plugin failed: bad configuration, a failing hook, listener or
    /// command, or a misplaced lookup.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// The config accessor failed to supply a plugin list or config.
    #[error("config accessor failed for {}: {source}", scope_label(.guild_id))]
    Accessor {
        guild_id: Option<GuildId>,
        #[source]
        source: Arc<dyn std::error::Error + Send + Sync>,
    },

    /// A guild load was rolled back. The guild is unloaded with zero
    /// plugins.
    #[error("load of guild {guild_id} was aborted: {source}")]
    LoadAborted {
        guild_id: GuildId,
        #[source]
        source: PluginError,
    },

    /// A pending load was dropped because the guild was unloaded before it
    /// started.
    #[error("load of guild {guild_id} was superseded by an unload")]
    Superseded { guild_id: GuildId },

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The runtime has been destroyed.
    #[error("runtime has been destroyed")]
    Destroyed,

    /// A guild operation was requested before `initialize()`.
    #[error("runtime is not initialized")]
    NotInitialized,

    #[error("runtime is already initialized")]
    AlreadyInitialized,
}

fn scope_label(guild_id: &Option<GuildId>) -> String {
    match guild_id {
        Some(id) => format!("guild {id}"),
        None => "the global scope".to_string(),
    }
}

impl RuntimeError {
    pub(crate) fn accessor(guild_id: Option<GuildId>, source: BoxError) -> Self {
        Self::Accessor {
            guild_id,
            source: Arc::from(source),
        }
    }

    /// The guild this error belongs to, `None` for global or process-level
    /// errors.
    pub fn guild_id(&self) -> Option<GuildId> {
        match self {
            RuntimeError::Accessor { guild_id, .. } => *guild_id,
            RuntimeError::LoadAborted { guild_id, .. } | RuntimeError::Superseded { guild_id } => {
                Some(*guild_id)
            }
            RuntimeError::Plugin(PluginError::Hook(e)) => e.guild_id,
            _ => None,
        }
    }
}

impl From<ConfigurationError> for RuntimeError {
    fn from(error: ConfigurationError) -> Self {
        Self::Plugin(error.into())
    }
}

impl From<HookError> for RuntimeError {
    fn from(error: HookError) -> Self {
        Self::Plugin(error.into())
    }
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
