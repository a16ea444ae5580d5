//! The configuration collaborator.

use std::collections::HashMap;

use async_trait::async_trait;
use guildkit_core::{BoxError, GuildId};
use guildkit_framework::{GuildConfig, PluginOptions};
use parking_lot::RwLock;

/// Supplies the enabled plugins and plugin configuration of every scope.
///
/// Implementations typically read a database or a config service. Every
/// method may be called concurrently for different guilds.
#[async_trait]
pub trait ConfigAccessor: Send + Sync {
    /// Names of the guild plugins enabled in `guild_id`.
    async fn enabled_plugins(&self, guild_id: GuildId) -> Result<Vec<String>, BoxError>;

    /// Prefix and per-plugin options of `guild_id`.
    async fn guild_config(&self, guild_id: GuildId) -> Result<GuildConfig, BoxError>;

    /// Per-plugin options of the global scope.
    async fn global_config(&self) -> Result<GuildConfig, BoxError> {
        Ok(GuildConfig::default())
    }
}

#[derive(Debug, Default, Clone)]
struct GuildEntry {
    enabled: Vec<String>,
    config: GuildConfig,
}

/// In-memory [`ConfigAccessor`].
///
/// Guilds without an entry have no plugins enabled and no overrides.
///
/// ```rust,ignore
/// let accessor = StaticConfigAccessor::new()
///     .enable(GuildId(1), ["moderation", "welcome"])
///     .with_guild_config(GuildId(1), GuildConfig::new().prefix("?"));
/// ```
#[derive(Debug, Default)]
pub struct StaticConfigAccessor {
    guilds: RwLock<HashMap<GuildId, GuildEntry>>,
    global: RwLock<GuildConfig>,
}

impl StaticConfigAccessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables `plugins` in `guild_id`, in addition to already enabled ones.
    pub fn enable<I, N>(self, guild_id: impl Into<GuildId>, plugins: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        self.set_enabled(guild_id, plugins);
        self
    }

    /// Replaces the prefix and plugin options of `guild_id`.
    pub fn with_guild_config(self, guild_id: impl Into<GuildId>, config: GuildConfig) -> Self {
        self.set_guild_config(guild_id, config);
        self
    }

    /// Sets the options of one plugin in one guild.
    pub fn plugin_options(
        self,
        guild_id: impl Into<GuildId>,
        plugin: impl Into<String>,
        options: PluginOptions,
    ) -> Self {
        self.guilds
            .write()
            .entry(guild_id.into())
            .or_default()
            .config
            .plugins
            .insert(plugin.into(), options);
        self
    }

    pub fn global(self, config: GuildConfig) -> Self {
        *self.global.write() = config;
        self
    }

    // ─── Runtime mutation ──────────────────────────────────────────────────

    /// Adds enabled plugins. Takes effect on the guild's next load.
    pub fn set_enabled<I, N>(&self, guild_id: impl Into<GuildId>, plugins: I)
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let mut guilds = self.guilds.write();
        let entry = guilds.entry(guild_id.into()).or_default();
        for plugin in plugins {
            let plugin = plugin.into();
            if !entry.enabled.contains(&plugin) {
                entry.enabled.push(plugin);
            }
        }
    }

    /// Replaces the config of `guild_id`. Takes effect on the guild's next
    /// load.
    pub fn set_guild_config(&self, guild_id: impl Into<GuildId>, config: GuildConfig) {
        self.guilds.write().entry(guild_id.into()).or_default().config = config;
    }

    /// Forgets everything about `guild_id`.
    pub fn remove_guild(&self, guild_id: impl Into<GuildId>) {
        self.guilds.write().remove(&guild_id.into());
    }
}

#[async_trait]
impl ConfigAccessor for StaticConfigAccessor {
    async fn enabled_plugins(&self, guild_id: GuildId) -> Result<Vec<String>, BoxError> {
        Ok(self
            .guilds
            .read()
            .get(&guild_id)
            .map(|entry| entry.enabled.clone())
            .unwrap_or_default())
    }

    async fn guild_config(&self, guild_id: GuildId) -> Result<GuildConfig, BoxError> {
        Ok(self
            .guilds
            .read()
            .get(&guild_id)
            .map(|entry| entry.config.clone())
            .unwrap_or_default())
    }

    async fn global_config(&self) -> Result<GuildConfig, BoxError> {
        Ok(self.global.read().clone())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn test_unknown_guild_has_empty_defaults() {
        let accessor = StaticConfigAccessor::new();
        assert!(accessor.enabled_plugins(GuildId(9)).await.unwrap().is_empty());
        let config = accessor.guild_config(GuildId(9)).await.unwrap();
        assert_eq!(config.prefix, "!");
        assert!(config.plugins.is_empty());
    }

    #[tokio::test]
    async fn test_builder_accumulates() {
        let options: PluginOptions =
            serde_json::from_value(json!({ "config": { "greeting": "hi" } })).unwrap();
        let accessor = StaticConfigAccessor::new()
            .enable(1u64, ["a", "b"])
            .enable(1u64, ["b", "c"])
            .with_guild_config(1u64, GuildConfig::new().prefix("?"))
            .plugin_options(1u64, "a", options.clone())
            .global(GuildConfig::new().prefix("$"));

        assert_eq!(
            accessor.enabled_plugins(GuildId(1)).await.unwrap(),
            vec!["a", "b", "c"]
        );
        let config = accessor.guild_config(GuildId(1)).await.unwrap();
        assert_eq!(config.prefix, "?");
        assert_eq!(config.options_for("a"), options);
        assert_eq!(accessor.global_config().await.unwrap().prefix, "$");

        accessor.remove_guild(1u64);
        assert!(accessor.enabled_plugins(GuildId(1)).await.unwrap().is_empty());
    }
}
