//! Guild orchestration.
//!
//! [`GuildRuntime`] turns the gateway's availability signals into guild
//! loads and unloads. Signals are deduplicated synchronously, at the moment
//! they arrive; the actual work runs in one driver task per guild, gated by
//! an optional concurrency limit.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use guildkit_runtime::{GuildRuntime, StaticConfigAccessor};
//!
//! let runtime = GuildRuntime::builder()
//!     .guild_plugins([moderation.erase(), welcome.erase()])
//!     .global_plugins([cache.erase()])
//!     .accessor(StaticConfigAccessor::new().enable(guild_id, ["welcome"]))
//!     .event_source(gateway.clone())
//!     .concurrent_guild_load_limit(4)
//!     .build()?;
//!
//! runtime.initialize().await?;
//! // ... the gateway emits guildAvailable / guildUnavailable / ready ...
//! runtime.destroy().await?;
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;
use guildkit_core::{
    BoxedEvent, EventBus, EventSource, GuildAvailable, GuildId, GuildUnavailable, Interaction,
    Listener, Message, NamedEvent, Ready, SubscriptionId,
};
use guildkit_framework::{
    AnyPlugin, DependencyResolver, ErrorReporter, GuildConfig, HookError, InstanceContext,
    PluginError, PluginHookSequencer, PluginInstance, PluginRegistry, PluginScope, ResolvedPlugin,
};
use parking_lot::Mutex;
use tokio::sync::{Semaphore, broadcast};
use tokio_util::task::TaskTracker;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::accessor::{ConfigAccessor, StaticConfigAccessor};
use crate::config::{ConfigLoader, RuntimeConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::guild::{GuildSlot, GuildStatus, LoadedGuild, Step};
use crate::logging;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Initializing,
    Running,
    Destroying,
    Destroyed,
}

struct Lifecycle {
    phase: Phase,
    subscriptions: Vec<SubscriptionId>,
}

struct RuntimeInner {
    config: RuntimeConfig,
    guild_resolver: DependencyResolver,
    global_resolver: DependencyResolver,
    accessor: Arc<dyn ConfigAccessor>,
    source: Arc<dyn EventSource>,
    global_registry: Arc<PluginRegistry>,
    globals: Mutex<Vec<Arc<dyn PluginInstance>>>,
    guilds: Mutex<HashMap<GuildId, GuildSlot>>,
    generations: AtomicU64,
    load_slots: Option<Arc<Semaphore>>,
    drivers: TaskTracker,
    errors: broadcast::Sender<Arc<RuntimeError>>,
    lifecycle: Mutex<Lifecycle>,
}

/// The guild lifecycle runtime.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct GuildRuntime {
    inner: Arc<RuntimeInner>,
}

impl GuildRuntime {
    pub fn builder() -> GuildRuntimeBuilder {
        GuildRuntimeBuilder::new()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    /// The gateway collaborator the runtime listens to.
    pub fn event_source(&self) -> Arc<dyn EventSource> {
        self.inner.source.clone()
    }

    /// Subscribes to the process-level error channel.
    ///
    /// Only errors raised after subscribing are received. A receiver that
    /// falls more than `error_channel_capacity` errors behind lags.
    pub fn errors(&self) -> broadcast::Receiver<Arc<RuntimeError>> {
        self.inner.errors.subscribe()
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Loads every global plugin, then starts listening to the gateway's
    /// `guildAvailable`, `guildUnavailable` and `ready` events.
    ///
    /// If a global plugin fails to load, the global plugins are rolled back
    /// and the runtime stays uninitialized.
    pub async fn initialize(&self) -> RuntimeResult<()> {
        {
            let mut lifecycle = self.inner.lifecycle.lock();
            match lifecycle.phase {
                Phase::Created => lifecycle.phase = Phase::Initializing,
                Phase::Destroying | Phase::Destroyed => return Err(RuntimeError::Destroyed),
                Phase::Initializing | Phase::Running => {
                    return Err(RuntimeError::AlreadyInitialized);
                }
            }
        }

        if let Err(e) = self.inner.load_globals().await {
            self.inner.lifecycle.lock().phase = Phase::Created;
            return Err(e);
        }

        let subscriptions = self.inner.subscribe_gateway();
        let mut lifecycle = self.inner.lifecycle.lock();
        lifecycle.subscriptions = subscriptions;
        lifecycle.phase = Phase::Running;
        info!(
            global_plugins = self.inner.globals.lock().len(),
            guild_plugins = self.inner.guild_resolver.plugins().len(),
            load_limit = ?self.inner.config.concurrent_guild_load_limit,
            "Guild runtime initialized"
        );
        Ok(())
    }

    /// Stops listening to the gateway, unloads every guild, then unloads the
    /// global plugins.
    ///
    /// Guilds still loading finish their load first. Idempotent.
    pub async fn destroy(&self) -> RuntimeResult<()> {
        let subscriptions = {
            let mut lifecycle = self.inner.lifecycle.lock();
            match lifecycle.phase {
                Phase::Destroying | Phase::Destroyed => return Ok(()),
                Phase::Initializing => return Err(RuntimeError::NotInitialized),
                Phase::Created => {
                    lifecycle.phase = Phase::Destroyed;
                    return Ok(());
                }
                Phase::Running => lifecycle.phase = Phase::Destroying,
            }
            std::mem::take(&mut lifecycle.subscriptions)
        };
        info!("Destroying guild runtime");

        for id in subscriptions {
            self.inner.source.unsubscribe(id);
        }

        {
            let mut guilds = self.inner.guilds.lock();
            let guild_ids: Vec<GuildId> = guilds.keys().copied().collect();
            for guild_id in guild_ids {
                self.inner.unload_slot(&mut guilds, guild_id);
            }
        }
        self.inner.drivers.close();
        self.inner.drivers.wait().await;

        let globals = std::mem::take(&mut *self.inner.globals.lock());
        let failures = PluginHookSequencer::unload(&globals, &self.inner.global_registry).await;
        for failure in failures {
            self.inner.publish(failure.into());
        }

        self.inner.lifecycle.lock().phase = Phase::Destroyed;
        info!("Guild runtime destroyed");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.inner.phase() == Phase::Running
    }

    // =========================================================================
    // Gateway signals
    // =========================================================================

    /// A guild became available. Starts a load unless the guild is already
    /// loading or loaded.
    ///
    /// Returns `true` if this signal started a load.
    pub fn notify_available(&self, guild_id: GuildId) -> bool {
        if !self.accepts_signals("guildAvailable") {
            return false;
        }
        self.inner.request_load(guild_id)
    }

    /// A guild became unavailable. A loading guild finishes its load and is
    /// then unloaded.
    ///
    /// Returns `true` if this signal started an unload.
    pub fn notify_unavailable(&self, guild_id: GuildId) -> bool {
        if !self.accepts_signals("guildUnavailable") {
            return false;
        }
        self.inner.request_unload(guild_id)
    }

    /// The connection delivered every guild it knows about. Guilds not yet
    /// seen are loaded.
    ///
    /// Returns the number of loads started.
    pub fn notify_ready(&self, known_guilds: &[GuildId]) -> usize {
        if !self.accepts_signals("ready") {
            return 0;
        }
        known_guilds
            .iter()
            .filter(|guild_id| self.inner.request_load(**guild_id))
            .count()
    }

    fn accepts_signals(&self, signal: &'static str) -> bool {
        let phase = self.inner.phase();
        if phase != Phase::Running {
            warn!(signal, phase = ?phase, "Guild signal ignored: runtime is not running");
            return false;
        }
        true
    }

    // =========================================================================
    // Programmatic surface
    // =========================================================================

    /// Loads `guild_id` and waits until the load has finished.
    ///
    /// Returns immediately if the guild is loaded. If it is unloading, the
    /// load starts once the unload completes.
    ///
    /// Must not be awaited from a hook, listener or command of the same
    /// guild.
    pub async fn load(&self, guild_id: GuildId) -> RuntimeResult<()> {
        let waiter = {
            let mut guilds = self.inner.guilds.lock();
            self.inner.ensure_running()?;
            let slot = guilds.entry(guild_id).or_default();
            if slot.is_loaded_and_settled() {
                return Ok(());
            }
            let waiter = slot.wait_for_load();
            if let Some(step) = slot.request_load(&self.inner.generations) {
                self.inner.spawn_driver(guild_id, step);
            }
            waiter
        };
        waiter.await.unwrap_or(Err(RuntimeError::Destroyed))
    }

    /// Unloads `guild_id` and waits until it is unloaded.
    ///
    /// A loading guild finishes its load first. Unload hook failures are
    /// published on the error channel and do not fail the call.
    ///
    /// Must not be awaited from a hook, listener or command of the same
    /// guild.
    pub async fn unload(&self, guild_id: GuildId) -> RuntimeResult<()> {
        let waiter = {
            let mut guilds = self.inner.guilds.lock();
            self.inner.ensure_running()?;
            let Some(slot) = guilds.get_mut(&guild_id) else {
                return Ok(());
            };
            let waiter = slot.wait_for_unload();
            if let Some(step) = slot.request_unload(&self.inner.generations) {
                self.inner.spawn_driver(guild_id, step);
            }
            waiter
        };
        let _ = waiter.await;
        Ok(())
    }

    /// The loaded plugin instances of `guild_id`, if it is fully loaded.
    pub fn get_loaded(&self, guild_id: GuildId) -> Option<LoadedGuild> {
        self.inner
            .guilds
            .lock()
            .get(&guild_id)
            .and_then(|slot| slot.loaded().cloned())
    }

    pub fn guild_status(&self, guild_id: GuildId) -> GuildStatus {
        self.inner
            .guilds
            .lock()
            .get(&guild_id)
            .map(|slot| slot.status())
            .unwrap_or_default()
    }

    /// Ids of every fully loaded guild, in ascending order.
    pub fn loaded_guild_ids(&self) -> Vec<GuildId> {
        let mut ids: Vec<GuildId> = self
            .inner
            .guilds
            .lock()
            .iter()
            .filter(|(_, slot)| slot.status() == GuildStatus::Loaded)
            .map(|(id, _)| *id)
            .collect();
        ids.sort();
        ids
    }

    /// Names of the loaded global plugins, in load order.
    pub fn global_plugin_names(&self) -> Vec<String> {
        self.inner
            .globals
            .lock()
            .iter()
            .map(|instance| instance.name().to_string())
            .collect()
    }

    /// Runs the message commands matching `message` directly, bypassing the
    /// default `messageCreate` listeners.
    ///
    /// Commands of the message's guild and of global plugins are considered.
    /// Returns the number of commands that ran. Command failures are
    /// published on the error channel.
    pub async fn dispatch_message_commands(&self, message: &Message) -> RuntimeResult<usize> {
        self.inner.ensure_running()?;
        let mut ran = 0;
        for instance in self.inner.dispatch_targets(message.guild_id) {
            match instance.dispatch_message(message).await {
                Ok(true) => ran += 1,
                Ok(false) => {}
                Err(e) => self.inner.report_command_failure(e),
            }
        }
        Ok(ran)
    }

    /// Runs the interaction command named by `interaction` directly,
    /// bypassing the default `interactionCreate` listeners.
    pub async fn dispatch_interaction_commands(
        &self,
        interaction: &Interaction,
    ) -> RuntimeResult<usize> {
        self.inner.ensure_running()?;
        let mut ran = 0;
        for instance in self.inner.dispatch_targets(interaction.guild_id) {
            match instance.dispatch_interaction(interaction).await {
                Ok(true) => ran += 1,
                Ok(false) => {}
                Err(e) => self.inner.report_command_failure(e),
            }
        }
        Ok(ran)
    }
}

impl std::fmt::Debug for GuildRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuildRuntime")
            .field("phase", &self.inner.phase())
            .field("guilds", &self.inner.guilds.lock().len())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// RuntimeInner
// =============================================================================

impl RuntimeInner {
    fn phase(&self) -> Phase {
        self.lifecycle.lock().phase
    }

    fn ensure_running(&self) -> RuntimeResult<()> {
        match self.phase() {
            Phase::Running => Ok(()),
            Phase::Created | Phase::Initializing => Err(RuntimeError::NotInitialized),
            Phase::Destroying | Phase::Destroyed => Err(RuntimeError::Destroyed),
        }
    }

    fn publish(&self, error: RuntimeError) {
        // No receivers is fine; the error has been logged where it was raised.
        let _ = self.errors.send(Arc::new(error));
    }

    fn reporter(&self) -> ErrorReporter {
        let errors = self.errors.clone();
        Arc::new(move |error: PluginError| {
            let _ = errors.send(Arc::new(RuntimeError::Plugin(error)));
        })
    }

    fn report_command_failure(&self, error: HookError) {
        error!(
            plugin = %error.plugin,
            guild_id = ?error.guild_id,
            error = %error,
            "Command dispatch failed"
        );
        self.publish(error.into());
    }

    /// Explicit instances that may handle an event of `guild_id`.
    fn dispatch_targets(&self, guild_id: Option<GuildId>) -> Vec<Arc<dyn PluginInstance>> {
        let mut targets: Vec<Arc<dyn PluginInstance>> = guild_id
            .and_then(|id| {
                self.guilds
                    .lock()
                    .get(&id)
                    .and_then(|slot| slot.loaded().map(|g| g.instances().to_vec()))
            })
            .unwrap_or_default();
        targets.extend(self.globals.lock().iter().cloned());
        targets.retain(|instance| instance.is_explicit());
        targets
    }

    // ─── Signals ─────────────────────────────────────────────────────────

    // Phase checks happen under the guild map lock so that `destroy` sees
    // every slot a concurrent signal created.

    /// Returns `true` if a driver was started.
    fn request_load(self: &Arc<Self>, guild_id: GuildId) -> bool {
        let mut guilds = self.guilds.lock();
        if self.phase() != Phase::Running {
            return false;
        }
        let slot = guilds.entry(guild_id).or_default();
        match slot.request_load(&self.generations) {
            Some(step) => {
                self.spawn_driver(guild_id, step);
                true
            }
            None => {
                debug!(guild_id = %guild_id, status = %slot.status(), "Load signal deduplicated");
                false
            }
        }
    }

    fn request_unload(self: &Arc<Self>, guild_id: GuildId) -> bool {
        let mut guilds = self.guilds.lock();
        if self.phase() != Phase::Running {
            return false;
        }
        self.unload_slot(&mut guilds, guild_id)
    }

    fn unload_slot(
        self: &Arc<Self>,
        guilds: &mut HashMap<GuildId, GuildSlot>,
        guild_id: GuildId,
    ) -> bool {
        let Some(slot) = guilds.get_mut(&guild_id) else {
            debug!(guild_id = %guild_id, "Unload signal for unknown guild ignored");
            return false;
        };
        match slot.request_unload(&self.generations) {
            Some(step) => {
                self.spawn_driver(guild_id, step);
                true
            }
            None => {
                debug!(guild_id = %guild_id, status = %slot.status(), "Unload signal recorded");
                false
            }
        }
    }

    fn spawn_driver(self: &Arc<Self>, guild_id: GuildId, step: Step) {
        let inner = self.clone();
        self.drivers.spawn(inner.drive(guild_id, step));
    }

    /// Performs the transitions of one guild until it reaches the state the
    /// latest signal asked for.
    async fn drive(self: Arc<Self>, guild_id: GuildId, mut step: Step) {
        loop {
            match step {
                Step::Load(generation) => {
                    let result = self.load_guild(guild_id, generation).await;
                    self.guilds
                        .lock()
                        .entry(guild_id)
                        .or_default()
                        .finish_load(result);
                }
                Step::Unload(loaded) => {
                    self.unload_guild(loaded).await;
                    self.guilds
                        .lock()
                        .entry(guild_id)
                        .or_default()
                        .finish_unload();
                }
                Step::Settle => {}
            }

            let mut guilds = self.guilds.lock();
            let slot = guilds.entry(guild_id).or_default();
            step = slot.advance(&self.generations);
            if matches!(step, Step::Settle) {
                slot.settle(guild_id);
                if slot.is_idle() {
                    guilds.remove(&guild_id);
                }
                return;
            }
        }
    }

    // ─── Load / unload ───────────────────────────────────────────────────

    async fn load_guild(&self, guild_id: GuildId, generation: u64) -> RuntimeResult<LoadedGuild> {
        let span = info_span!("guild_load", guild_id = %guild_id, generation);
        async {
            let _permit = match &self.load_slots {
                Some(slots) => {
                    let queued = slots.available_permits() == 0;
                    if queued {
                        debug!("Waiting for a load slot");
                    }
                    slots.clone().acquire_owned().await.ok()
                }
                None => None,
            };

            match self.try_load_guild(guild_id, generation).await {
                Ok(loaded) => {
                    info!(plugins = ?loaded.plugin_names(), "Guild loaded");
                    Ok(loaded)
                }
                Err(e) => {
                    error!(error = %e, "Guild load failed");
                    self.publish(e.clone());
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn try_load_guild(
        &self,
        guild_id: GuildId,
        generation: u64,
    ) -> RuntimeResult<LoadedGuild> {
        // ─── Collaborator lookups ───────────────────────────────────────
        let enabled = self
            .accessor
            .enabled_plugins(guild_id)
            .await
            .map_err(|e| RuntimeError::accessor(Some(guild_id), e))?;
        let config = self
            .accessor
            .guild_config(guild_id)
            .await
            .map_err(|e| RuntimeError::accessor(Some(guild_id), e))?;

        // ─── Resolution and instantiation, before any hook ──────────────
        let resolved = self.guild_resolver.resolve_names(&enabled)?;
        let registry = Arc::new(PluginRegistry::new());
        let instances =
            self.instantiate(&resolved, Some(guild_id), &config, registry.clone())?;

        // ─── Hooks ──────────────────────────────────────────────────────
        PluginHookSequencer::load(&instances, &registry)
            .await
            .map_err(|e| RuntimeError::LoadAborted {
                guild_id,
                source: e.into(),
            })?;

        Ok(LoadedGuild::new(guild_id, generation, instances, registry))
    }

    async fn unload_guild(&self, loaded: LoadedGuild) {
        let span = info_span!(
            "guild_unload",
            guild_id = %loaded.guild_id(),
            generation = loaded.generation()
        );
        async {
            let failures = PluginHookSequencer::unload(loaded.instances(), loaded.registry()).await;
            if failures.is_empty() {
                info!("Guild unloaded");
            } else {
                warn!(failures = failures.len(), "Guild unloaded with hook failures");
            }
            for failure in failures {
                self.publish(failure.into());
            }
        }
        .instrument(span)
        .await
    }

    fn instantiate(
        &self,
        resolved: &[ResolvedPlugin],
        guild_id: Option<GuildId>,
        config: &GuildConfig,
        registry: Arc<PluginRegistry>,
    ) -> RuntimeResult<Vec<Arc<dyn PluginInstance>>> {
        let reporter = self.reporter();
        resolved
            .iter()
            .map(|entry| {
                let ctx = InstanceContext {
                    guild_id,
                    explicit: entry.explicit,
                    prefix: config.prefix.clone(),
                    options: config.options_for(entry.plugin.name()),
                    source: self.source.clone(),
                    registry: registry.clone(),
                    global_registry: self.global_registry.clone(),
                    reporter: reporter.clone(),
                };
                entry.plugin.instantiate(ctx).map_err(RuntimeError::from)
            })
            .collect()
    }

    async fn load_globals(&self) -> RuntimeResult<()> {
        let span = info_span!("global_load");
        async {
            let config = self
                .accessor
                .global_config()
                .await
                .map_err(|e| RuntimeError::accessor(None, e))?;
            let resolved = self
                .global_resolver
                .resolve(self.global_resolver.plugins())?;
            let instances =
                self.instantiate(&resolved, None, &config, self.global_registry.clone())?;

            if let Err(e) = PluginHookSequencer::load(&instances, &self.global_registry).await {
                error!(error = %e, "Global plugin load failed");
                let error = RuntimeError::from(e);
                self.publish(error.clone());
                return Err(error);
            }
            info!(plugins = instances.len(), "Global plugins loaded");
            *self.globals.lock() = instances;
            Ok(())
        }
        .instrument(span)
        .await
    }

    // ─── Gateway subscriptions ───────────────────────────────────────────

    fn subscribe_gateway(self: &Arc<Self>) -> Vec<SubscriptionId> {
        let handlers: [(&str, fn(&Arc<RuntimeInner>, &BoxedEvent)); 3] = [
            (GuildAvailable::NAME, |inner, event| {
                if let Some(e) = event.downcast::<GuildAvailable>() {
                    inner.request_load(e.guild_id);
                }
            }),
            (GuildUnavailable::NAME, |inner, event| {
                if let Some(e) = event.downcast::<GuildUnavailable>() {
                    inner.request_unload(e.guild_id);
                }
            }),
            (Ready::NAME, |inner, event| {
                if let Some(e) = event.downcast::<Ready>() {
                    for guild_id in &e.guilds {
                        inner.request_load(*guild_id);
                    }
                }
            }),
        ];

        handlers
            .into_iter()
            .map(|(event_name, handle)| {
                let weak: Weak<RuntimeInner> = Arc::downgrade(self);
                // The decision runs synchronously inside `emit`, so duplicate
                // signals are deduplicated in arrival order.
                let listener: Listener =
                    Arc::new(move |event: BoxedEvent| -> BoxFuture<'static, ()> {
                        if let Some(inner) = weak.upgrade() {
                            handle(&inner, &event);
                        }
                        Box::pin(async {})
                    });
                self.source.subscribe(event_name, listener)
            })
            .collect()
    }
}

// =============================================================================
// GuildRuntimeBuilder
// =============================================================================

enum ConfigSource {
    Value(RuntimeConfig),
    Loader(ConfigLoader),
}

/// Builder for [`GuildRuntime`].
///
/// Without an accessor no guild plugin is ever enabled; without an event
/// source an in-process [`EventBus`] is created.
pub struct GuildRuntimeBuilder {
    guild_plugins: Vec<AnyPlugin>,
    global_plugins: Vec<AnyPlugin>,
    accessor: Option<Arc<dyn ConfigAccessor>>,
    source: Option<Arc<dyn EventSource>>,
    config: ConfigSource,
    load_limit: Option<usize>,
    init_logging: bool,
}

impl GuildRuntimeBuilder {
    pub fn new() -> Self {
        Self {
            guild_plugins: Vec::new(),
            global_plugins: Vec::new(),
            accessor: None,
            source: None,
            config: ConfigSource::Value(RuntimeConfig::default()),
            load_limit: None,
            init_logging: false,
        }
    }

    pub fn guild_plugins(mut self, plugins: impl IntoIterator<Item = AnyPlugin>) -> Self {
        self.guild_plugins.extend(plugins);
        self
    }

    pub fn global_plugins(mut self, plugins: impl IntoIterator<Item = AnyPlugin>) -> Self {
        self.global_plugins.extend(plugins);
        self
    }

    pub fn accessor(mut self, accessor: impl ConfigAccessor + 'static) -> Self {
        self.accessor = Some(Arc::new(accessor));
        self
    }

    pub fn shared_accessor(mut self, accessor: Arc<dyn ConfigAccessor>) -> Self {
        self.accessor = Some(accessor);
        self
    }

    pub fn event_source(mut self, source: Arc<dyn EventSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = ConfigSource::Value(config);
        self
    }

    /// Loads the runtime config from `path` plus `GUILDKIT_*` variables.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config = ConfigSource::Loader(ConfigLoader::new().file(path));
        self
    }

    /// Loads the runtime config with a custom loader.
    pub fn config_loader(mut self, loader: ConfigLoader) -> Self {
        self.config = ConfigSource::Loader(loader);
        self
    }

    /// Overrides `concurrent_guild_load_limit` from the config.
    pub fn concurrent_guild_load_limit(mut self, limit: usize) -> Self {
        self.load_limit = Some(limit);
        self
    }

    /// Installs the global `tracing` subscriber from the config's `logging`
    /// section when building.
    pub fn init_logging(mut self, enabled: bool) -> Self {
        self.init_logging = enabled;
        self
    }

    /// Builds the runtime.
    ///
    /// Fails if the config is invalid, if two distinct plugins share a name
    /// within a scope, or if a plugin is registered in the wrong scope.
    pub fn build(self) -> RuntimeResult<GuildRuntime> {
        let mut config = match self.config {
            ConfigSource::Value(config) => config,
            ConfigSource::Loader(loader) => loader.load()?,
        };
        if let Some(limit) = self.load_limit {
            config.concurrent_guild_load_limit = Some(limit);
        }
        validate_config(&config)?;

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let guild_resolver = DependencyResolver::new(PluginScope::Guild, self.guild_plugins)?;
        let global_resolver = DependencyResolver::new(PluginScope::Global, self.global_plugins)?;
        let accessor = self
            .accessor
            .unwrap_or_else(|| -> Arc<dyn ConfigAccessor> { Arc::new(StaticConfigAccessor::new()) });
        let source = self
            .source
            .unwrap_or_else(|| -> Arc<dyn EventSource> { EventBus::shared() });
        let load_slots = config
            .concurrent_guild_load_limit
            .map(|limit| Arc::new(Semaphore::new(limit)));
        let (errors, _) = broadcast::channel(config.error_channel_capacity);

        debug!(
            guild_plugins = guild_resolver.plugins().len(),
            global_plugins = global_resolver.plugins().len(),
            load_limit = ?config.concurrent_guild_load_limit,
            "Guild runtime built"
        );

        Ok(GuildRuntime {
            inner: Arc::new(RuntimeInner {
                config,
                guild_resolver,
                global_resolver,
                accessor,
                source,
                global_registry: Arc::new(PluginRegistry::new()),
                globals: Mutex::new(Vec::new()),
                guilds: Mutex::new(HashMap::new()),
                generations: AtomicU64::new(0),
                load_slots,
                drivers: TaskTracker::new(),
                errors,
                lifecycle: Mutex::new(Lifecycle {
                    phase: Phase::Created,
                    subscriptions: Vec::new(),
                }),
            }),
        })
    }
}

impl Default for GuildRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
