//! Plugin instances.
//!
//! A [`PluginDefinition`] is instantiated once per scope it is loaded in. The
//! runtime only sees instances through the object-safe [`PluginInstance`]
//! trait; [`TypedInstance`] is the one implementation.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use guildkit_core::{
    BoxError, CooldownManager, EventSource, GuildId, Interaction, InteractionCreate, LockManager,
    Message, MessageCreate,
};
use serde_json::Value;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{error, trace};

use super::data::PluginData;
use super::definition::{PluginDefinition, PluginKey};
use super::registry::{PluginRegistry, PublicInterface};
use crate::command::{InteractionCommandManager, MessageCommandManager};
use crate::config::{
    ErasedCriteria, MatchParams, PluginConfigManager, PluginOptions, resolve_base,
    validate_overrides,
};
use crate::error::{ConfigurationError, ErrorReporter, HookError, HookSite};
use crate::events::EventScope;
use crate::lifecycle::{LifecycleStage, StageCell};

/// Everything an instance needs from the scope it is created in.
#[derive(Clone)]
pub struct InstanceContext {
    /// The owning guild, `None` for the global scope.
    pub guild_id: Option<GuildId>,
    pub explicit: bool,
    /// Message-command prefix of the scope.
    pub prefix: String,
    pub options: PluginOptions,
    pub source: Arc<dyn EventSource>,
    /// Capability registry of the scope.
    pub registry: Arc<PluginRegistry>,
    /// The process-wide registry of global plugins.
    pub global_registry: Arc<PluginRegistry>,
    pub reporter: ErrorReporter,
}

impl fmt::Debug for InstanceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceContext")
            .field("guild_id", &self.guild_id)
            .field("explicit", &self.explicit)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// PluginInstance
// =============================================================================

/// Type-erased plugin instance, driven by
/// [`PluginHookSequencer`](crate::PluginHookSequencer).
pub trait PluginInstance: Send + Sync {
    fn name(&self) -> &str;

    fn key(&self) -> PluginKey;

    fn guild_id(&self) -> Option<GuildId>;

    fn is_explicit(&self) -> bool;

    fn stage(&self) -> LifecycleStage;

    /// Sets the stage without running a hook.
    fn force_stage(&self, stage: LifecycleStage);

    /// Moves to `stage` and runs its hook, if the plugin declared one.
    fn enter(&self, stage: LifecycleStage) -> BoxFuture<'_, Result<(), HookError>>;

    /// Builds the public interface, if the plugin declares one.
    fn public_interface(&self) -> Option<PublicInterface>;

    /// Registers declared commands, the default command listeners and the
    /// declared event listeners. No-op for non-explicit instances.
    fn register_handlers(&self);

    /// Revokes every listener and waits for in-flight invocations.
    fn stop_events(&self) -> BoxFuture<'_, ()>;

    fn listener_count(&self) -> usize;

    fn message_command_count(&self) -> usize;

    fn interaction_command_count(&self) -> usize;

    /// Runs the message command matching `message`, bypassing the default
    /// listener. Returns `Ok(true)` if a command ran.
    fn dispatch_message<'a>(
        &'a self,
        message: &'a Message,
    ) -> BoxFuture<'a, Result<bool, HookError>>;

    /// Runs the interaction command named by `interaction`.
    fn dispatch_interaction<'a>(
        &'a self,
        interaction: &'a Interaction,
    ) -> BoxFuture<'a, Result<bool, HookError>>;

    /// The instance's `Arc<PluginData<S>>`, type-erased.
    fn data_any(&self) -> Arc<dyn Any + Send + Sync>;
}

impl dyn PluginInstance {
    /// Returns the instance's data if its state type is `S`.
    pub fn data<S>(&self) -> Option<Arc<PluginData<S>>>
    where
        S: Send + Sync + 'static,
    {
        self.data_any().downcast::<PluginData<S>>().ok()
    }
}

impl fmt::Debug for dyn PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("name", &self.name())
            .field("guild_id", &self.guild_id())
            .field("explicit", &self.is_explicit())
            .field("stage", &self.stage())
            .finish()
    }
}

// =============================================================================
// TypedInstance
// =============================================================================

pub(crate) struct TypedInstance<S, P> {
    definition: PluginDefinition<S, P>,
    data: Arc<PluginData<S>>,
}

impl<S, P> TypedInstance<S, P>
where
    S: Default + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    /// Resolves the instance's base config and builds its data.
    ///
    /// Fails if the config does not satisfy the plugin's schema, including
    /// any override patch applied over the base config.
    pub(crate) fn new(
        definition: PluginDefinition<S, P>,
        ctx: InstanceContext,
    ) -> Result<Self, ConfigurationError> {
        let inner = definition.inner();
        let name: Arc<str> = Arc::from(inner.name.as_str());
        let schema = inner.schema.as_deref();
        let base = resolve_base(&name, schema, &ctx.options.config)?;
        validate_overrides(&name, schema, &base, &ctx.options.overrides)?;

        let key = definition.key();
        let data = Arc::new_cyclic(|weak: &Weak<PluginData<S>>| {
            let criteria: HashMap<String, ErasedCriteria> = inner
                .criteria
                .iter()
                .map(|(criteria, predicate)| {
                    let weak = weak.clone();
                    let predicate = predicate.clone();
                    let erased: ErasedCriteria = Arc::new(
                        move |params: MatchParams, value: Value| -> BoxFuture<'static, Result<bool, BoxError>> {
                            match weak.upgrade() {
                                Some(data) => predicate(data, params, value),
                                None => Box::pin(async { Ok(false) }),
                            }
                        },
                    );
                    (criteria.clone(), erased)
                })
                .collect();

            PluginData {
                name: name.clone(),
                key,
                guild_id: ctx.guild_id,
                explicit: ctx.explicit,
                stage: StageCell::new(),
                state: S::default(),
                config: PluginConfigManager::new(
                    name.clone(),
                    base,
                    ctx.options.overrides.clone(),
                    criteria,
                ),
                events: EventScope::new(
                    name.clone(),
                    ctx.guild_id,
                    ctx.source.clone(),
                    ctx.reporter.clone(),
                ),
                locks: LockManager::new(),
                cooldowns: CooldownManager::new(),
                message_commands: MessageCommandManager::new(ctx.prefix.clone()),
                interaction_commands: InteractionCommandManager::new(),
                registry: ctx.registry.clone(),
                global_registry: ctx.global_registry.clone(),
                reporter: ctx.reporter.clone(),
            }
        });

        trace!(
            plugin = %name,
            guild_id = ?ctx.guild_id,
            explicit = ctx.explicit,
            "Plugin instance created"
        );
        Ok(Self { definition, data })
    }

    /// Holds the instance's event scope open for a direct dispatch. `None`
    /// unless the instance is running and its events are not being stopped.
    fn running_token(&self) -> Option<TaskTrackerToken> {
        if self.data.stage.get() != LifecycleStage::Running {
            return None;
        }
        self.data.events.track()
    }

    fn register_default_listeners(&self) {
        let weak = Arc::downgrade(&self.data);
        self.data.events.on(move |event: MessageCreate| {
            let data = weak.upgrade();
            async move {
                let Some(data) = data else {
                    return Ok(());
                };
                if let Err(e) = data.message_commands.dispatch(&data, &event.message).await {
                    error!(plugin = %data.name, error = %e, "Message command failed");
                    data.report(e);
                }
                Ok(())
            }
        });

        let weak = Arc::downgrade(&self.data);
        self.data.events.on(move |event: InteractionCreate| {
            let data = weak.upgrade();
            async move {
                let Some(data) = data else {
                    return Ok(());
                };
                if let Err(e) = data
                    .interaction_commands
                    .dispatch(&data, &event.interaction)
                    .await
                {
                    error!(plugin = %data.name, error = %e, "Interaction command failed");
                    data.report(e);
                }
                Ok(())
            }
        });
    }
}

impl<S, P> PluginInstance for TypedInstance<S, P>
where
    S: Default + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.data.name
    }

    fn key(&self) -> PluginKey {
        self.data.key
    }

    fn guild_id(&self) -> Option<GuildId> {
        self.data.guild_id
    }

    fn is_explicit(&self) -> bool {
        self.data.explicit
    }

    fn stage(&self) -> LifecycleStage {
        self.data.stage.get()
    }

    fn force_stage(&self, stage: LifecycleStage) {
        self.data.stage.set(stage);
    }

    fn enter(&self, stage: LifecycleStage) -> BoxFuture<'_, Result<(), HookError>> {
        Box::pin(async move {
            self.data.stage.set(stage);
            let hooks = &self.definition.inner().hooks;
            let hook = match stage {
                LifecycleStage::BeforeLoad => hooks.before_load.as_ref(),
                LifecycleStage::BeforeStart => hooks.before_start.as_ref(),
                LifecycleStage::AfterLoad => hooks.after_load.as_ref(),
                LifecycleStage::BeforeUnload => hooks.before_unload.as_ref(),
                LifecycleStage::AfterUnload => hooks.after_unload.as_ref(),
                _ => None,
            };
            let Some(hook) = hook else {
                return Ok(());
            };

            trace!(plugin = %self.data.name, stage = %stage, "Running hook");
            hook(self.data.clone()).await.map_err(|source| {
                HookError::new(
                    self.data.name.as_ref(),
                    self.data.guild_id,
                    HookSite::Stage(stage),
                    source,
                )
            })
        })
    }

    fn public_interface(&self) -> Option<PublicInterface> {
        let factory = self.definition.inner().public.as_ref()?;
        let public: PublicInterface = Arc::new(factory(self.data.clone()));
        Some(public)
    }

    fn register_handlers(&self) {
        if !self.data.explicit {
            return;
        }
        let inner = self.definition.inner();

        for command in &inner.message_commands {
            self.data.message_commands.add(command.clone());
        }
        for command in &inner.interaction_commands {
            self.data.interaction_commands.add(command.clone());
        }
        self.register_default_listeners();

        for (event_name, listener) in &inner.events {
            let weak = Arc::downgrade(&self.data);
            let listener = listener.clone();
            self.data.events.register(event_name, move |event| {
                let fut = weak.upgrade().map(|data| listener(data, event));
                async move {
                    match fut {
                        Some(fut) => fut.await,
                        None => Ok(()),
                    }
                }
            });
        }
    }

    fn stop_events(&self) -> BoxFuture<'_, ()> {
        Box::pin(self.data.events.unregister_all())
    }

    fn listener_count(&self) -> usize {
        self.data.events.listener_count()
    }

    fn message_command_count(&self) -> usize {
        self.data.message_commands.len()
    }

    fn interaction_command_count(&self) -> usize {
        self.data.interaction_commands.len()
    }

    fn dispatch_message<'a>(
        &'a self,
        message: &'a Message,
    ) -> BoxFuture<'a, Result<bool, HookError>> {
        Box::pin(async move {
            let Some(_token) = self.running_token() else {
                return Ok(false);
            };
            self.data.message_commands.dispatch(&self.data, message).await
        })
    }

    fn dispatch_interaction<'a>(
        &'a self,
        interaction: &'a Interaction,
    ) -> BoxFuture<'a, Result<bool, HookError>> {
        Box::pin(async move {
            let Some(_token) = self.running_token() else {
                return Ok(false);
            };
            self.data
                .interaction_commands
                .dispatch(&self.data, interaction)
                .await
        })
    }

    fn data_any(&self) -> Arc<dyn Any + Send + Sync> {
        self.data.clone()
    }
}
