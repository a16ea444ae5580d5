//! Message and interaction commands.
//!
//! Commands are declared on a plugin definition and registered into the
//! instance's managers when an explicit instance starts. Argument parsing is
//! left to the command: message commands receive the raw whitespace-split
//! tokens after the trigger.
//!
//! A command may name a `permission`: a boolean key of the plugin's config.
//! The command only runs when the config resolved for the invoking member
//! (see [`PluginConfigManager`](crate::PluginConfigManager)) has that key set
//! to `true`.

use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use guildkit_core::{BoxError, Interaction, InteractionId, Message, MessageId};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, trace};

use crate::config::ConfigMap;
use crate::error::{HookError, HookSite};
use crate::plugin::PluginData;

/// How many recently handled ids a manager remembers.
const HANDLED_HISTORY: usize = 256;

fn permitted(config: &ConfigMap, permission: Option<&str>) -> bool {
    match permission {
        None => true,
        Some(key) => matches!(config.get(key), Some(Value::Bool(true))),
    }
}

/// Remembers recently handled ids so the same message is never dispatched
/// twice (once explicitly by the host and once by the default listener).
struct HandledIds<T> {
    ids: Mutex<VecDeque<T>>,
}

impl<T: PartialEq> HandledIds<T> {
    fn new() -> Self {
        Self {
            ids: Mutex::new(VecDeque::with_capacity(HANDLED_HISTORY)),
        }
    }

    /// Returns `false` if `id` was already marked.
    fn mark(&self, id: T) -> bool {
        let mut ids = self.ids.lock();
        if ids.contains(&id) {
            return false;
        }
        if ids.len() == HANDLED_HISTORY {
            ids.pop_front();
        }
        ids.push_back(id);
        true
    }
}

// =============================================================================
// Message commands
// =============================================================================

/// Context handed to a message command.
pub struct CommandContext<S> {
    pub plugin: Arc<PluginData<S>>,
    pub message: Message,
    /// The trigger as written in the command declaration.
    pub trigger: String,
    /// Whitespace-split tokens following the trigger.
    pub args: Vec<String>,
}

type MessageRunFn<S> =
    Arc<dyn Fn(CommandContext<S>) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// A prefix-triggered text command.
pub struct MessageCommand<S> {
    triggers: Vec<String>,
    permission: Option<String>,
    description: Option<String>,
    run: MessageRunFn<S>,
}

impl<S> Clone for MessageCommand<S> {
    fn clone(&self) -> Self {
        Self {
            triggers: self.triggers.clone(),
            permission: self.permission.clone(),
            description: self.description.clone(),
            run: self.run.clone(),
        }
    }
}

impl<S: Send + Sync + 'static> MessageCommand<S> {
    /// Creates a command with one trigger.
    pub fn new<F, Fut>(trigger: impl Into<String>, run: F) -> Self
    where
        F: Fn(CommandContext<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            triggers: vec![trigger.into()],
            permission: None,
            description: None,
            run: Arc::new(
                move |ctx: CommandContext<S>| -> BoxFuture<'static, Result<(), BoxError>> {
                    Box::pin(run(ctx))
                },
            ),
        }
    }

    /// Adds an alternative trigger.
    pub fn alias(mut self, trigger: impl Into<String>) -> Self {
        self.triggers.push(trigger.into());
        self
    }

    /// Requires the named boolean config key to be `true`.
    pub fn permission(mut self, key: impl Into<String>) -> Self {
        self.permission = Some(key.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl<S> MessageCommand<S> {
    pub fn triggers(&self) -> &[String] {
        &self.triggers
    }

    pub fn permission_key(&self) -> Option<&str> {
        self.permission.as_deref()
    }

    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Matches `input` (the content after the prefix) against the triggers.
    ///
    /// A trigger matches case-insensitively when followed by end of input or
    /// whitespace. Returns the matched trigger and the remaining tokens.
    fn match_input(&self, input: &str) -> Option<(String, Vec<String>)> {
        self.triggers.iter().find_map(|trigger| {
            let head = input.get(..trigger.len())?;
            if !head.eq_ignore_ascii_case(trigger) {
                return None;
            }
            let rest = &input[trigger.len()..];
            if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
                return None;
            }
            let args = rest.split_whitespace().map(str::to_string).collect();
            Some((trigger.clone(), args))
        })
    }
}

impl<S> fmt::Debug for MessageCommand<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageCommand")
            .field("triggers", &self.triggers)
            .field("permission", &self.permission)
            .finish()
    }
}

/// Message commands registered on one plugin instance.
pub struct MessageCommandManager<S> {
    prefix: String,
    commands: RwLock<Vec<Arc<MessageCommand<S>>>>,
    handled: HandledIds<MessageId>,
}

impl<S: Send + Sync + 'static> MessageCommandManager<S> {
    pub(crate) fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            commands: RwLock::new(Vec::new()),
            handled: HandledIds::new(),
        }
    }

    /// The guild's command prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn add(&self, command: MessageCommand<S>) {
        debug!(triggers = ?command.triggers, "Message command registered");
        self.commands.write().push(Arc::new(command));
    }

    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }

    /// Finds the first command matching `content`.
    pub fn find(&self, content: &str) -> Option<(Arc<MessageCommand<S>>, String, Vec<String>)> {
        let input = content.strip_prefix(self.prefix.as_str())?;
        self.commands.read().iter().find_map(|command| {
            command
                .match_input(input)
                .map(|(trigger, args)| (command.clone(), trigger, args))
        })
    }

    /// Runs the command matching `message`, if any.
    ///
    /// Returns `Ok(true)` if a command ran. A message is dispatched at most
    /// once per manager.
    pub async fn dispatch(
        &self,
        data: &Arc<PluginData<S>>,
        message: &Message,
    ) -> Result<bool, HookError> {
        let Some((command, trigger, args)) = self.find(&message.content) else {
            return Ok(false);
        };
        if !self.handled.mark(message.id) {
            trace!(plugin = %data.name(), message_id = %message.id, "Message already dispatched");
            return Ok(false);
        }

        if command.permission.is_some() {
            let config = data.config().get_for_message(message).await;
            if !permitted(&config, command.permission_key()) {
                debug!(
                    plugin = %data.name(),
                    command = %trigger,
                    user = %message.author,
                    "Command not permitted"
                );
                return Ok(false);
            }
        }

        let ctx = CommandContext {
            plugin: data.clone(),
            message: message.clone(),
            trigger: trigger.clone(),
            args,
        };
        (command.run)(ctx).await.map_err(|source| {
            HookError::new(data.name(), data.guild_id(), HookSite::Command(trigger), source)
        })?;
        Ok(true)
    }
}

// =============================================================================
// Interaction commands
// =============================================================================

/// Context handed to an interaction command.
pub struct InteractionContext<S> {
    pub plugin: Arc<PluginData<S>>,
    pub interaction: Interaction,
}

type InteractionRunFn<S> =
    Arc<dyn Fn(InteractionContext<S>) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// A named application command.
pub struct InteractionCommand<S> {
    name: String,
    permission: Option<String>,
    description: Option<String>,
    run: InteractionRunFn<S>,
}

impl<S> Clone for InteractionCommand<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            permission: self.permission.clone(),
            description: self.description.clone(),
            run: self.run.clone(),
        }
    }
}

impl<S: Send + Sync + 'static> InteractionCommand<S> {
    pub fn new<F, Fut>(name: impl Into<String>, run: F) -> Self
    where
        F: Fn(InteractionContext<S>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            permission: None,
            description: None,
            run: Arc::new(
                move |ctx: InteractionContext<S>| -> BoxFuture<'static, Result<(), BoxError>> {
                    Box::pin(run(ctx))
                },
            ),
        }
    }

    pub fn permission(mut self, key: impl Into<String>) -> Self {
        self.permission = Some(key.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl<S> InteractionCommand<S> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn permission_key(&self) -> Option<&str> {
        self.permission.as_deref()
    }

    pub fn description_text(&self) -> Option<&str> {
        self.description.as_deref()
    }
}

impl<S> fmt::Debug for InteractionCommand<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InteractionCommand")
            .field("name", &self.name)
            .field("permission", &self.permission)
            .finish()
    }
}

/// Interaction commands registered on one plugin instance.
pub struct InteractionCommandManager<S> {
    commands: RwLock<Vec<Arc<InteractionCommand<S>>>>,
    handled: HandledIds<InteractionId>,
}

impl<S: Send + Sync + 'static> InteractionCommandManager<S> {
    pub(crate) fn new() -> Self {
        Self {
            commands: RwLock::new(Vec::new()),
            handled: HandledIds::new(),
        }
    }

    pub fn add(&self, command: InteractionCommand<S>) {
        debug!(name = %command.name, "Interaction command registered");
        self.commands.write().push(Arc::new(command));
    }

    pub fn len(&self) -> usize {
        self.commands.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.read().is_empty()
    }

    pub fn find(&self, name: &str) -> Option<Arc<InteractionCommand<S>>> {
        self.commands
            .read()
            .iter()
            .find(|command| command.name == name)
            .cloned()
    }

    /// Runs the command named by `interaction`, if any.
    pub async fn dispatch(
        &self,
        data: &Arc<PluginData<S>>,
        interaction: &Interaction,
    ) -> Result<bool, HookError> {
        let Some(command) = self.find(&interaction.command_name) else {
            return Ok(false);
        };
        if !self.handled.mark(interaction.id) {
            return Ok(false);
        }

        if command.permission.is_some() {
            let config = data.config().get_for_interaction(interaction).await;
            if !permitted(&config, command.permission_key()) {
                debug!(
                    plugin = %data.name(),
                    command = %command.name,
                    user = %interaction.user_id,
                    "Command not permitted"
                );
                return Ok(false);
            }
        }

        let ctx = InteractionContext {
            plugin: data.clone(),
            interaction: interaction.clone(),
        };
        (command.run)(ctx).await.map_err(|source| {
            HookError::new(
                data.name(),
                data.guild_id(),
                HookSite::Command(command.name.clone()),
                source,
            )
        })?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command(trigger: &str) -> MessageCommand<()> {
        MessageCommand::new(trigger, |_ctx| async { Ok(()) })
    }

    #[test]
    fn test_trigger_matching() {
        let manager = MessageCommandManager::<()>::new("!");
        manager.add(command("ban").alias("b"));
        manager.add(command("banlist"));

        let (_, trigger, args) = manager.find("!ban 123 spam").unwrap();
        assert_eq!(trigger, "ban");
        assert_eq!(args, vec!["123", "spam"]);

        let (_, trigger, args) = manager.find("!BANLIST").unwrap();
        assert_eq!(trigger, "banlist");
        assert!(args.is_empty());

        let (_, trigger, _) = manager.find("!b\t1").unwrap();
        assert_eq!(trigger, "b");

        assert!(manager.find("!bans").is_none());
        assert!(manager.find("ban 123").is_none());
        assert!(manager.find("?ban").is_none());
    }

    #[test]
    fn test_multibyte_content_does_not_panic() {
        let manager = MessageCommandManager::<()>::new("!");
        manager.add(command("ab"));
        assert!(manager.find("!é").is_none());
        assert!(manager.find("!aé").is_none());
    }

    #[test]
    fn test_permission_check() {
        let config: ConfigMap = serde_json::from_str(r#"{"can_ban": true, "can_kick": "yes"}"#).unwrap();
        assert!(permitted(&config, None));
        assert!(permitted(&config, Some("can_ban")));
        assert!(!permitted(&config, Some("can_kick")));
        assert!(!permitted(&config, Some("missing")));
    }

    #[test]
    fn test_handled_ids_are_bounded() {
        let handled = HandledIds::new();
        assert!(handled.mark(MessageId(1)));
        assert!(!handled.mark(MessageId(1)));
        for id in 2..=(HANDLED_HISTORY as u64 + 1) {
            handled.mark(MessageId(id));
        }
        // The oldest id has been forgotten.
        assert!(handled.mark(MessageId(1)));
    }
}
