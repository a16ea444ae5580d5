//! Per-context config resolution.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::{self, BoxFuture};
use guildkit_core::{BoxError, ChannelId, GuildId, Interaction, Message, RoleId, UserId};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{trace, warn};

use super::{ConfigMap, OverrideRule, merge_config};
use crate::error::OverrideResolutionError;

/// A custom criteria predicate with the plugin instance already bound.
pub(crate) type ErasedCriteria =
    Arc<dyn Fn(MatchParams, Value) -> BoxFuture<'static, Result<bool, BoxError>> + Send + Sync>;

// =============================================================================
// MatchParams
// =============================================================================

/// The invocation context override rules are matched against.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchParams {
    pub guild_id: Option<GuildId>,
    pub user_id: Option<UserId>,
    pub channel_id: Option<ChannelId>,
    /// Roles held by the invoking member.
    pub member_roles: Vec<RoleId>,
}

impl MatchParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user: impl Into<UserId>) -> Self {
        self.user_id = Some(user.into());
        self
    }

    pub fn channel(mut self, channel: impl Into<ChannelId>) -> Self {
        self.channel_id = Some(channel.into());
        self
    }

    pub fn roles(mut self, roles: impl IntoIterator<Item = RoleId>) -> Self {
        self.member_roles = roles.into_iter().collect();
        self
    }

    pub fn from_message(message: &Message) -> Self {
        Self {
            guild_id: message.guild_id,
            user_id: Some(message.author),
            channel_id: Some(message.channel_id),
            member_roles: message.member_roles.clone(),
        }
    }

    pub fn from_interaction(interaction: &Interaction) -> Self {
        Self {
            guild_id: interaction.guild_id,
            user_id: Some(interaction.user_id),
            channel_id: Some(interaction.channel_id),
            member_roles: interaction.member_roles.clone(),
        }
    }
}

// =============================================================================
// PluginConfigManager
// =============================================================================

/// Resolves a plugin instance's effective config.
///
/// The base config is computed once when the instance is created and never
/// mutated; every resolution works on a fresh copy, so concurrent resolutions
/// for different contexts do not interfere.
pub struct PluginConfigManager {
    plugin: Arc<str>,
    base: Arc<ConfigMap>,
    overrides: Arc<[OverrideRule]>,
    criteria: HashMap<String, ErasedCriteria>,
}

impl PluginConfigManager {
    pub(crate) fn new(
        plugin: Arc<str>,
        base: ConfigMap,
        overrides: Vec<OverrideRule>,
        criteria: HashMap<String, ErasedCriteria>,
    ) -> Self {
        Self {
            plugin,
            base: Arc::new(base),
            overrides: overrides.into(),
            criteria,
        }
    }

    /// The base config (schema defaults plus static plugin config).
    pub fn get(&self) -> &ConfigMap {
        &self.base
    }

    /// Deserializes the base config into `T`.
    pub fn get_as<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(Value::Object(self.base.as_ref().clone()))
    }

    /// The override rules, in evaluation order.
    pub fn overrides(&self) -> &[OverrideRule] {
        &self.overrides
    }

    /// Resolves the effective config for `params`.
    ///
    /// Rules are tried in order and the first full match wins. Returns the
    /// base config when no rule matches.
    pub async fn get_matching(&self, params: &MatchParams) -> ConfigMap {
        for (index, rule) in self.overrides.iter().enumerate() {
            if self.rule_matches(rule, params).await {
                trace!(plugin = %self.plugin, rule = index, "Override rule matched");
                return merge_config(&self.base, &rule.config);
            }
        }
        self.base.as_ref().clone()
    }

    /// Resolves the effective config for `params` and deserializes it.
    pub async fn get_matching_as<T: DeserializeOwned>(
        &self,
        params: &MatchParams,
    ) -> serde_json::Result<T> {
        T::deserialize(Value::Object(self.get_matching(params).await))
    }

    pub async fn get_for_message(&self, message: &Message) -> ConfigMap {
        self.get_matching(&MatchParams::from_message(message)).await
    }

    pub async fn get_for_interaction(&self, interaction: &Interaction) -> ConfigMap {
        self.get_matching(&MatchParams::from_interaction(interaction))
            .await
    }

    /// Built-in clauses are compared first and short-circuit; custom
    /// predicates only run once all of them matched, and then run
    /// concurrently.
    async fn rule_matches(&self, rule: &OverrideRule, params: &MatchParams) -> bool {
        if let Some(user) = rule.user
            && params.user_id != Some(user)
        {
            return false;
        }
        if let Some(role) = rule.role
            && !params.member_roles.contains(&role)
        {
            return false;
        }
        if let Some(channel) = rule.channel
            && params.channel_id != Some(channel)
        {
            return false;
        }
        if rule.extra.is_empty() {
            return true;
        }

        let mut pending = Vec::with_capacity(rule.extra.len());
        for (name, value) in &rule.extra {
            let Some(predicate) = self.criteria.get(name) else {
                let err = OverrideResolutionError::UnknownCriteria {
                    plugin: self.plugin.to_string(),
                    criteria: name.clone(),
                };
                warn!(error = %err, "Override rule skipped");
                return false;
            };
            let fut = predicate(params.clone(), value.clone());
            pending.push(async move { (name, fut.await) });
        }

        let mut matched = true;
        for (name, outcome) in future::join_all(pending).await {
            match outcome {
                Ok(true) => {}
                Ok(false) => matched = false,
                Err(source) => {
                    let err = OverrideResolutionError::Predicate {
                        plugin: self.plugin.to_string(),
                        criteria: name.clone(),
                        source,
                    };
                    warn!(error = %err, "Override rule skipped");
                    matched = false;
                }
            }
        }
        matched
    }
}

impl fmt::Debug for PluginConfigManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginConfigManager")
            .field("plugin", &self.plugin)
            .field("base", &self.base)
            .field("overrides", &self.overrides.len())
            .field("criteria", &self.criteria.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    fn object(value: Value) -> ConfigMap {
        value.as_object().cloned().unwrap_or_default()
    }

    fn criteria<F>(f: F) -> ErasedCriteria
    where
        F: Fn(MatchParams, Value) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        Arc::new(move |params: MatchParams, value: Value| {
            let f = f.clone();
            let check: BoxFuture<'static, Result<bool, BoxError>> = Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                f(params, value)
            });
            check
        })
    }

    fn manager(
        overrides: Vec<OverrideRule>,
        criteria: HashMap<String, ErasedCriteria>,
    ) -> PluginConfigManager {
        PluginConfigManager::new(
            Arc::from("perms"),
            object(json!({ "can_a": false, "can_b": false, "can_r": false })),
            overrides,
            criteria,
        )
    }

    #[tokio::test]
    async fn test_first_matching_rule_wins() {
        let manager = manager(
            vec![
                OverrideRule::new().user(1u64).patch(object(json!({ "can_a": true }))),
                OverrideRule::new().user(2u64).patch(object(json!({ "can_b": true }))),
                OverrideRule::new().role(9u64).patch(object(json!({ "can_r": true }))),
                OverrideRule::new().patch(object(json!({ "can_b": true }))),
            ],
            HashMap::new(),
        );

        let a = manager.get_matching(&MatchParams::new().user(1u64)).await;
        assert_eq!(a.get("can_a"), Some(&json!(true)));
        assert_eq!(a.get("can_b"), Some(&json!(false)));

        let c = manager
            .get_matching(&MatchParams::new().user(3u64).roles([RoleId(9)]))
            .await;
        assert_eq!(c.get("can_r"), Some(&json!(true)));
        assert_eq!(c.get("can_a"), Some(&json!(false)));

        // Falls through to the unconditional rule.
        let other = manager.get_matching(&MatchParams::new().user(4u64)).await;
        assert_eq!(other.get("can_b"), Some(&json!(true)));

        // Base is never mutated.
        assert_eq!(manager.get().get("can_a"), Some(&json!(false)));
    }

    #[tokio::test]
    async fn test_all_clauses_must_match() {
        let manager = manager(
            vec![OverrideRule::new()
                .user(1u64)
                .channel(5u64)
                .patch(object(json!({ "can_a": true })))],
            HashMap::new(),
        );

        let wrong_channel = MatchParams::new().user(1u64).channel(6u64);
        assert_eq!(manager.get_matching(&wrong_channel).await, *manager.get());

        let both = MatchParams::new().user(1u64).channel(5u64);
        assert_eq!(
            manager.get_matching(&both).await.get("can_a"),
            Some(&json!(true))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_custom_criteria() {
        let mut registered = HashMap::new();
        registered.insert(
            "is_user".to_string(),
            criteria(|params, value| {
                let expected: UserId = serde_json::from_value(value)?;
                Ok(params.user_id == Some(expected))
            }),
        );
        let manager = manager(
            vec![OverrideRule::new()
                .criteria("is_user", json!("1"))
                .patch(object(json!({ "can_a": true })))],
            registered,
        );

        let a = manager.get_matching(&MatchParams::new().user(1u64)).await;
        assert_eq!(a.get("can_a"), Some(&json!(true)));
        let b = manager.get_matching(&MatchParams::new().user(2u64)).await;
        assert_eq!(b.get("can_a"), Some(&json!(false)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_or_unknown_criteria_do_not_match() {
        let mut registered = HashMap::new();
        registered.insert(
            "broken".to_string(),
            criteria(|_, _| Err("predicate exploded".into())),
        );
        let manager = manager(
            vec![
                OverrideRule::new()
                    .criteria("broken", json!(true))
                    .patch(object(json!({ "can_a": true }))),
                OverrideRule::new()
                    .criteria("never_registered", json!(true))
                    .patch(object(json!({ "can_b": true }))),
                OverrideRule::new().patch(object(json!({ "can_r": true }))),
            ],
            registered,
        );

        let resolved = manager.get_matching(&MatchParams::new().user(1u64)).await;
        assert_eq!(resolved.get("can_a"), Some(&json!(false)));
        assert_eq!(resolved.get("can_b"), Some(&json!(false)));
        assert_eq!(resolved.get("can_r"), Some(&json!(true)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_builtin_clauses_short_circuit_predicates() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut registered = HashMap::new();
        registered.insert(
            "counted".to_string(),
            criteria(move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            }),
        );
        let manager = manager(
            vec![OverrideRule::new()
                .role(7u64)
                .criteria("counted", json!(null))
                .patch(object(json!({ "can_r": true })))],
            registered,
        );

        manager.get_matching(&MatchParams::new().user(1u64)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let resolved = manager
            .get_matching(&MatchParams::new().user(1u64).roles([RoleId(7)]))
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolved.get("can_r"), Some(&json!(true)));
    }

    #[test]
    fn test_get_as() {
        #[derive(serde::Deserialize)]
        struct Perms {
            can_a: bool,
        }
        let manager = manager(Vec::new(), HashMap::new());
        let perms: Perms = manager.get_as().unwrap();
        assert!(!perms.can_a);
    }
}
