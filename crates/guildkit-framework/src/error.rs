//! Error types for the guildkit plugin layer.

use std::sync::Arc;

use guildkit_core::{BoxError, GuildId, LookupError};
use thiserror::Error;

use crate::lifecycle::LifecycleStage;

// =============================================================================
// PluginError
// =============================================================================

/// Any failure raised while loading, running or unloading plugin instances.
#[derive(Debug, Clone, Error)]
pub enum PluginError {
    /// The plugin set or its configuration is invalid. Never retried.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A hook, listener or command returned an error.
    #[error(transparent)]
    Hook(#[from] HookError),

    /// A cross-plugin lookup was made outside its valid window.
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Result type for plugin operations.
pub type PluginResult<T> = Result<T, PluginError>;

// =============================================================================
// ConfigurationError
// =============================================================================

/// Errors in the plugin set or in plugin configuration.
///
/// These are detected before any hook runs for the affected scope.
#[derive(Debug, Clone, Error)]
pub enum ConfigurationError {
    /// The dependency graph contains a cycle.
    #[error("plugin dependency cycle detected among: {}", plugins.join(", "))]
    DependencyCycle {
        /// Plugins that could not be ordered.
        plugins: Vec<String>,
    },

    /// A name was requested that no registered plugin carries.
    #[error("unknown plugin '{name}'")]
    UnknownPlugin { name: String },

    /// Two distinct definitions share a name within one scope.
    #[error("plugin name '{name}' is used by more than one definition")]
    DuplicateName { name: String },

    /// A guild plugin declared a dependency on a global plugin (or the other
    /// way round).
    #[error(
        "plugin '{plugin}' depends on '{dependency}' which belongs to a different scope; \
         use the global lookups to reach global plugins"
    )]
    ScopeMismatch { plugin: String, dependency: String },

    /// A plugin was registered or requested in a scope it was not declared
    /// for.
    #[error("plugin '{plugin}' is not a {expected} plugin")]
    WrongScope {
        plugin: String,
        expected: &'static str,
    },

    /// The config schema could not produce or apply its defaults.
    #[error("invalid config for plugin '{plugin}': {reason}")]
    Schema { plugin: String, reason: String },

    /// The guild configuration handed to the plugin was malformed.
    #[error("malformed configuration for plugin '{plugin}': {reason}")]
    Malformed { plugin: String, reason: String },
}

// =============================================================================
// HookError
// =============================================================================

/// Where a [`HookError`] originated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookSite {
    /// A lifecycle hook.
    Stage(LifecycleStage),
    /// An event listener for the named event.
    Listener(String),
    /// A message or interaction command with the given trigger.
    Command(String),
}

impl std::fmt::Display for HookSite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookSite::Stage(stage) => write!(f, "{stage}"),
            HookSite::Listener(event) => write!(f, "listener for '{event}'"),
            HookSite::Command(trigger) => write!(f, "command '{trigger}'"),
        }
    }
}

/// A user-supplied hook, listener or command failed.
#[derive(Debug, Clone, Error)]
#[error("plugin '{plugin}' failed in {site}{}: {source}", guild_suffix(.guild_id))]
pub struct HookError {
    /// The failing plugin.
    pub plugin: String,
    /// The guild the instance belongs to, `None` for global instances.
    pub guild_id: Option<GuildId>,
    /// Where the error was raised.
    pub site: HookSite,
    /// The error returned by user code.
    #[source]
    pub source: Arc<dyn std::error::Error + Send + Sync>,
}

fn guild_suffix(guild_id: &Option<GuildId>) -> String {
    guild_id
        .map(|id| format!(" (guild {id})"))
        .unwrap_or_default()
}

impl HookError {
    pub fn new(
        plugin: impl Into<String>,
        guild_id: Option<GuildId>,
        site: HookSite,
        source: BoxError,
    ) -> Self {
        Self {
            plugin: plugin.into(),
            guild_id,
            site,
            source: Arc::from(source),
        }
    }
}

// =============================================================================
// OverrideResolutionError
// =============================================================================

/// An override rule could not be evaluated.
///
/// Never propagated: the rule is treated as not matching and resolution
/// continues with the next rule.
#[derive(Debug, Error)]
pub enum OverrideResolutionError {
    /// The rule named a criteria the plugin never registered.
    #[error("plugin '{plugin}' has no custom override criteria named '{criteria}'")]
    UnknownCriteria { plugin: String, criteria: String },

    /// A custom predicate returned an error.
    #[error("override criteria '{criteria}' of plugin '{plugin}' failed: {source}")]
    Predicate {
        plugin: String,
        criteria: String,
        #[source]
        source: BoxError,
    },
}

/// Callback receiving errors raised by listeners and commands, which have no
/// caller to return them to.
pub type ErrorReporter = Arc<dyn Fn(PluginError) + Send + Sync>;

/// An [`ErrorReporter`] that drops everything. Errors are still logged at the
/// site that raised them.
pub fn discard_errors() -> ErrorReporter {
    Arc::new(|_| {})
}
