//! Plugin configuration.
//!
//! Configuration reaches a plugin instance in three layers:
//!
//! 1. **Schema defaults**, declared with
//!    [`PluginBuilder::config_schema`](crate::PluginBuilder::config_schema).
//! 2. **Static plugin config** from [`PluginOptions::config`], shallow-merged
//!    over the defaults. Together these form the instance's base config.
//! 3. **Override rules** from [`PluginOptions::overrides`], evaluated per
//!    invocation context by [`PluginConfigManager`]. The first matching rule's
//!    patch is shallow-merged over the base config.
//!
//! # Wire shape
//!
//! ```json
//! {
//!   "prefix": "!",
//!   "plugins": {
//!     "moderation": {
//!       "config": { "can_ban": false },
//!       "overrides": [
//!         { "role": "1100", "config": { "can_ban": true } },
//!         { "extra": { "is_staff": true }, "config": { "can_ban": true } }
//!       ]
//!     }
//!   }
//! }
//! ```

mod overrides;
mod schema;

use std::collections::HashMap;

use guildkit_core::{ChannelId, RoleId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use overrides::{MatchParams, PluginConfigManager};
pub use schema::{ConfigSchema, SerdeSchema};

pub(crate) use overrides::ErasedCriteria;
pub(crate) use schema::{resolve_base, validate_overrides};

/// A JSON object.
pub type ConfigMap = Map<String, Value>;

/// Default command prefix.
pub const DEFAULT_PREFIX: &str = "!";

fn default_prefix() -> String {
    DEFAULT_PREFIX.to_string()
}

// =============================================================================
// GuildConfig
// =============================================================================

/// Configuration of one scope (a guild, or the global scope).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildConfig {
    /// Message-command prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Per-plugin options, keyed by plugin name.
    #[serde(default)]
    pub plugins: HashMap<String, PluginOptions>,
}

impl Default for GuildConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            plugins: HashMap::new(),
        }
    }
}

impl GuildConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn plugin(mut self, name: impl Into<String>, options: PluginOptions) -> Self {
        self.plugins.insert(name.into(), options);
        self
    }

    /// Options for `plugin`, or empty defaults when absent.
    pub fn options_for(&self, plugin: &str) -> PluginOptions {
        self.plugins.get(plugin).cloned().unwrap_or_default()
    }
}

// =============================================================================
// PluginOptions
// =============================================================================

/// Static config and override rules for one plugin in one scope.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginOptions {
    #[serde(default)]
    pub config: ConfigMap,

    /// Override rules, in evaluation order.
    #[serde(default)]
    pub overrides: Vec<OverrideRule>,
}

impl PluginOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ConfigMap) -> Self {
        self.config = config;
        self
    }

    pub fn override_rule(mut self, rule: OverrideRule) -> Self {
        self.overrides.push(rule);
        self
    }
}

// =============================================================================
// OverrideRule
// =============================================================================

/// A conditional config patch.
///
/// The rule matches when every clause it specifies matches; a rule without
/// clauses always matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OverrideRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserId>,

    /// Matches when the invoking member holds this role.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<RoleId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelId>,

    /// Custom criteria clauses: criteria name to the value handed to the
    /// plugin's predicate.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: ConfigMap,

    /// The patch applied when the rule matches.
    #[serde(default)]
    pub config: ConfigMap,
}

impl OverrideRule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user: impl Into<UserId>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn role(mut self, role: impl Into<RoleId>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn channel(mut self, channel: impl Into<ChannelId>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    /// Adds a custom criteria clause.
    pub fn criteria(mut self, name: impl Into<String>, value: Value) -> Self {
        self.extra.insert(name.into(), value);
        self
    }

    /// Sets the config patch.
    pub fn patch(mut self, patch: ConfigMap) -> Self {
        self.config = patch;
        self
    }

    /// Returns `true` if the rule has no clauses.
    pub fn is_unconditional(&self) -> bool {
        self.user.is_none() && self.role.is_none() && self.channel.is_none() && self.extra.is_empty()
    }
}

/// Shallow merge: keys of `patch` replace keys of `base`.
pub fn merge_config(base: &ConfigMap, patch: &ConfigMap) -> ConfigMap {
    let mut merged = base.clone();
    for (key, value) in patch {
        merged.insert(key.clone(), value.clone());
    }
    merged
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_guild_config_defaults() {
        let config: GuildConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.prefix, "!");
        assert!(config.plugins.is_empty());
        assert_eq!(config.options_for("missing"), PluginOptions::default());
    }

    #[test]
    fn test_override_rule_wire_shape() {
        let config: GuildConfig = serde_json::from_value(json!({
            "prefix": "?",
            "plugins": {
                "mod": {
                    "config": { "can_ban": false },
                    "overrides": [
                        { "user": "10", "config": { "can_ban": true } },
                        { "role": 20, "channel": "30", "extra": { "staff": true }, "config": {} },
                        { "config": { "level": 1 } }
                    ]
                }
            }
        }))
        .unwrap();

        let options = config.options_for("mod");
        assert_eq!(options.config.get("can_ban"), Some(&json!(false)));
        assert_eq!(options.overrides[0].user, Some(UserId(10)));
        assert_eq!(options.overrides[1].role, Some(RoleId(20)));
        assert_eq!(options.overrides[1].channel, Some(ChannelId(30)));
        assert_eq!(options.overrides[1].extra.get("staff"), Some(&json!(true)));
        assert!(options.overrides[2].is_unconditional());
    }

    #[test]
    fn test_merge_is_shallow() {
        let base = json!({ "a": 1, "nested": { "x": 1, "y": 2 } });
        let patch = json!({ "nested": { "x": 5 }, "b": 2 });
        let merged = merge_config(base.as_object().unwrap(), patch.as_object().unwrap());
        assert_eq!(
            Value::Object(merged),
            json!({ "a": 1, "b": 2, "nested": { "x": 5 } })
        );
    }
}
