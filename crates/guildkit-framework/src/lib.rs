//! # guildkit Framework
//!
//! The plugin layer of the guildkit runtime.
//!
//! This layer provides:
//! - [`PluginDefinition`] and its builder, the unit integrators declare
//! - [`PluginData`], the per-instance handle handed to every hook, listener
//!   and command
//! - [`DependencyResolver`] for load ordering
//! - [`PluginHookSequencer`], the per-scope lifecycle stage machine
//! - [`EventScope`], listener registration with in-flight tracking
//! - [`PluginConfigManager`], per-context config override resolution
//! - Message and interaction commands
//!
//! Guild bookkeeping (availability signals, concurrency limits, the error
//! channel) lives in `guildkit-runtime`.

pub mod command;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod plugin;
pub mod resolver;

pub use command::{
    CommandContext, InteractionCommand, InteractionCommandManager, InteractionContext,
    MessageCommand, MessageCommandManager,
};
pub use config::{
    ConfigMap, ConfigSchema, DEFAULT_PREFIX, GuildConfig, MatchParams, OverrideRule,
    PluginConfigManager, PluginOptions, SerdeSchema, merge_config,
};
pub use error::{
    ConfigurationError, ErrorReporter, HookError, HookSite, OverrideResolutionError, PluginError,
    PluginResult, discard_errors,
};
pub use events::EventScope;
pub use lifecycle::{LifecycleStage, PluginHookSequencer, StageCell};
pub use plugin::{
    AnyPlugin, InstanceContext, PluginBuilder, PluginData, PluginDefinition, PluginInstance,
    PluginKey, PluginRef, PluginRegistry, PluginScope, PublicInterface,
};
pub use resolver::{DependencyResolver, ResolvedPlugin};

/// Prelude for plugin authors.
pub mod prelude {
    pub use super::{
        AnyPlugin, CommandContext, ConfigSchema, GuildConfig, InteractionCommand,
        InteractionContext, LifecycleStage, MatchParams, MessageCommand, OverrideRule, PluginData,
        PluginDefinition, PluginError, PluginOptions, PluginScope,
    };
}

#[cfg(test)]
mod tests;
