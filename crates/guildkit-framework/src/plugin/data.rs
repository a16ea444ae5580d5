//! The per-instance handle handed to plugin code.

use std::fmt;
use std::sync::Arc;

use guildkit_core::{CooldownManager, GuildId, LockManager, LookupError};

use super::definition::{PluginDefinition, PluginKey, PluginRef};
use super::registry::PluginRegistry;
use crate::command::{InteractionCommandManager, MessageCommandManager};
use crate::config::PluginConfigManager;
use crate::error::{ErrorReporter, PluginError};
use crate::events::EventScope;
use crate::lifecycle::{LifecycleStage, StageCell};

/// Everything one plugin instance owns.
///
/// Every hook, listener, command and criteria predicate receives an
/// `Arc<PluginData<S>>`. Listeners and commands capture it weakly, so the
/// instance is dropped once its scope unloads.
pub struct PluginData<S> {
    pub(crate) name: Arc<str>,
    pub(crate) key: PluginKey,
    pub(crate) guild_id: Option<GuildId>,
    pub(crate) explicit: bool,
    pub(crate) stage: StageCell,
    pub(crate) state: S,
    pub(crate) config: PluginConfigManager,
    pub(crate) events: EventScope,
    pub(crate) locks: LockManager,
    pub(crate) cooldowns: CooldownManager,
    pub(crate) message_commands: MessageCommandManager<S>,
    pub(crate) interaction_commands: InteractionCommandManager<S>,
    pub(crate) registry: Arc<PluginRegistry>,
    pub(crate) global_registry: Arc<PluginRegistry>,
    pub(crate) reporter: ErrorReporter,
}

impl<S> PluginData<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> PluginKey {
        self.key
    }

    /// The owning guild, `None` for global instances.
    pub fn guild_id(&self) -> Option<GuildId> {
        self.guild_id
    }

    /// Whether the plugin was enabled directly rather than pulled in as a
    /// dependency.
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    pub fn stage(&self) -> LifecycleStage {
        self.stage.get()
    }

    /// The plugin's own state.
    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn config(&self) -> &PluginConfigManager {
        &self.config
    }

    pub fn events(&self) -> &EventScope {
        &self.events
    }

    pub fn locks(&self) -> &LockManager {
        &self.locks
    }

    pub fn cooldowns(&self) -> &CooldownManager {
        &self.cooldowns
    }

    pub fn message_commands(&self) -> &MessageCommandManager<S> {
        &self.message_commands
    }

    pub fn interaction_commands(&self) -> &InteractionCommandManager<S> {
        &self.interaction_commands
    }

    // ─── Cross-plugin lookups ──────────────────────────────────────────────

    fn check_lookup_window(&self) -> Result<(), LookupError> {
        let stage = self.stage.get();
        if stage.allows_lookups() {
            Ok(())
        } else {
            Err(LookupError::UnavailableInStage {
                plugin: self.name.to_string(),
                stage: stage.as_str(),
            })
        }
    }

    /// Whether `plugin` is loaded in this instance's scope.
    ///
    /// Fails outside `beforeStart..=beforeUnload`.
    pub fn has_plugin(&self, plugin: &impl PluginRef) -> Result<bool, LookupError> {
        self.check_lookup_window()?;
        Ok(self.registry.contains(plugin.plugin_key()))
    }

    /// Returns the public interface of `plugin` as loaded in this instance's
    /// scope.
    ///
    /// Fails outside `beforeStart..=beforeUnload`, and when the plugin is not
    /// loaded or exposes no public interface.
    pub fn get_plugin<T, P>(&self, plugin: &PluginDefinition<T, P>) -> Result<Arc<P>, LookupError>
    where
        P: Send + Sync + 'static,
    {
        self.check_lookup_window()?;
        self.registry.public(plugin.key(), plugin.name())
    }

    /// Whether the global `plugin` is loaded.
    ///
    /// Unlike [`has_plugin`](Self::has_plugin) this is valid in every stage.
    /// Globals load before any guild and unload after every guild, so the
    /// global registry is stable for the whole life of a guild instance.
    pub fn has_global_plugin(&self, plugin: &impl PluginRef) -> bool {
        self.global_registry.contains(plugin.plugin_key())
    }

    /// Returns the public interface of the global `plugin`. Valid in every
    /// stage, like [`has_global_plugin`](Self::has_global_plugin).
    pub fn get_global_plugin<T, P>(
        &self,
        plugin: &PluginDefinition<T, P>,
    ) -> Result<Arc<P>, LookupError>
    where
        P: Send + Sync + 'static,
    {
        self.global_registry.public(plugin.key(), plugin.name())
    }

    /// Hands an error to the process-level error channel.
    pub fn report(&self, error: impl Into<PluginError>) {
        (self.reporter)(error.into());
    }
}

impl<S> fmt::Debug for PluginData<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginData")
            .field("name", &self.name)
            .field("guild_id", &self.guild_id)
            .field("explicit", &self.explicit)
            .field("stage", &self.stage.get())
            .finish_non_exhaustive()
    }
}
