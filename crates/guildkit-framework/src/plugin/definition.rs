//! Plugin definitions and the builder used to declare them.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use guildkit_core::{BoxError, BoxedEvent, NamedEvent};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::data::PluginData;
use super::instance::{InstanceContext, PluginInstance, TypedInstance};
use crate::command::{InteractionCommand, MessageCommand};
use crate::config::{ConfigSchema, MatchParams, SerdeSchema};
use crate::error::ConfigurationError;

// ─── Callback types ──────────────────────────────────────────────────────────

pub(crate) type HookFn<S> =
    Arc<dyn Fn(Arc<PluginData<S>>) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

pub(crate) type EventFn<S> = Arc<
    dyn Fn(Arc<PluginData<S>>, BoxedEvent) -> BoxFuture<'static, Result<(), BoxError>>
        + Send
        + Sync,
>;

pub(crate) type CriteriaFn<S> = Arc<
    dyn Fn(Arc<PluginData<S>>, MatchParams, Value) -> BoxFuture<'static, Result<bool, BoxError>>
        + Send
        + Sync,
>;

pub(crate) type PublicFn<S, P> = Arc<dyn Fn(Arc<PluginData<S>>) -> P + Send + Sync>;

type DependenciesFn = Arc<dyn Fn() -> Vec<AnyPlugin> + Send + Sync>;

// ─── PluginScope ─────────────────────────────────────────────────────────────

/// Whether a plugin is instantiated once per guild or once per process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginScope {
    Guild,
    Global,
}

impl PluginScope {
    pub fn as_str(self) -> &'static str {
        match self {
            PluginScope::Guild => "guild",
            PluginScope::Global => "global",
        }
    }
}

// ─── PluginKey ───────────────────────────────────────────────────────────────

/// Identity of a plugin definition.
///
/// Two handles have the same key iff they were cloned from the same
/// definition; names play no part.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PluginKey(usize);

/// Something that identifies a plugin definition.
pub trait PluginRef {
    fn plugin_key(&self) -> PluginKey;
    fn plugin_name(&self) -> &str;
}

// ─── Hooks ───────────────────────────────────────────────────────────────────

pub(crate) struct Hooks<S> {
    pub before_load: Option<HookFn<S>>,
    pub before_start: Option<HookFn<S>>,
    pub after_load: Option<HookFn<S>>,
    pub before_unload: Option<HookFn<S>>,
    pub after_unload: Option<HookFn<S>>,
}

impl<S> Default for Hooks<S> {
    fn default() -> Self {
        Self {
            before_load: None,
            before_start: None,
            after_load: None,
            before_unload: None,
            after_unload: None,
        }
    }
}

fn hook<S, F, Fut>(f: F) -> HookFn<S>
where
    F: Fn(Arc<PluginData<S>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    Arc::new(
        move |data: Arc<PluginData<S>>| -> BoxFuture<'static, Result<(), BoxError>> {
            Box::pin(f(data))
        },
    )
}

// =============================================================================
// PluginDefinition
// =============================================================================

pub(crate) struct DefinitionInner<S, P> {
    pub name: String,
    pub scope: PluginScope,
    pub dependencies: Option<DependenciesFn>,
    pub schema: Option<Arc<dyn ConfigSchema>>,
    pub hooks: Hooks<S>,
    pub events: Vec<(String, EventFn<S>)>,
    pub message_commands: Vec<MessageCommand<S>>,
    pub interaction_commands: Vec<InteractionCommand<S>>,
    pub criteria: HashMap<String, CriteriaFn<S>>,
    pub public: Option<PublicFn<S, P>>,
}

/// An immutable plugin declaration.
///
/// `S` is the per-instance state type, created with [`Default`] for every
/// instance. `P` is the type of the public interface the plugin exposes to
/// its dependents.
///
/// Cheap to clone. Identity is by definition, not by name: see
/// [`PluginKey`].
///
/// # Example
///
/// ```rust,ignore
/// let counter = PluginDefinition::<CounterState, CounterApi>::guild("counter")
///     .config_schema::<CounterConfig>()
///     .before_load(|data| async move {
///         data.state().count.store(0, Ordering::SeqCst);
///         Ok(())
///     })
///     .message_command(MessageCommand::new("count", |ctx| async move {
///         ctx.plugin.state().count.fetch_add(1, Ordering::SeqCst);
///         Ok(())
///     }))
///     .public(|data| CounterApi { data })
///     .build();
/// ```
pub struct PluginDefinition<S = (), P = ()> {
    inner: Arc<DefinitionInner<S, P>>,
}

impl<S, P> Clone for PluginDefinition<S, P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<S, P> PluginDefinition<S, P>
where
    S: Default + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    /// Starts declaring a guild-scoped plugin.
    pub fn guild(name: impl Into<String>) -> PluginBuilder<S, P> {
        PluginBuilder::new(name.into(), PluginScope::Guild)
    }

    /// Starts declaring a process-wide plugin.
    pub fn global(name: impl Into<String>) -> PluginBuilder<S, P> {
        PluginBuilder::new(name.into(), PluginScope::Global)
    }

    /// Type-erases this definition.
    pub fn erase(&self) -> AnyPlugin {
        AnyPlugin {
            inner: Arc::new(self.clone()),
        }
    }
}

impl<S, P> PluginDefinition<S, P> {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn scope(&self) -> PluginScope {
        self.inner.scope
    }

    pub fn key(&self) -> PluginKey {
        PluginKey(Arc::as_ptr(&self.inner) as *const () as usize)
    }

    pub(crate) fn inner(&self) -> &DefinitionInner<S, P> {
        &self.inner
    }
}

impl<S, P> PluginRef for PluginDefinition<S, P> {
    fn plugin_key(&self) -> PluginKey {
        self.key()
    }

    fn plugin_name(&self) -> &str {
        self.name()
    }
}

impl<S, P> fmt::Debug for PluginDefinition<S, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDefinition")
            .field("name", &self.inner.name)
            .field("scope", &self.inner.scope)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// PluginBuilder
// =============================================================================

/// Builder for [`PluginDefinition`].
pub struct PluginBuilder<S, P> {
    inner: DefinitionInner<S, P>,
}

impl<S, P> PluginBuilder<S, P>
where
    S: Default + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    fn new(name: String, scope: PluginScope) -> Self {
        Self {
            inner: DefinitionInner {
                name,
                scope,
                dependencies: None,
                schema: None,
                hooks: Hooks::default(),
                events: Vec::new(),
                message_commands: Vec::new(),
                interaction_commands: Vec::new(),
                criteria: HashMap::new(),
                public: None,
            },
        }
    }

    /// Declares dependencies lazily.
    ///
    /// The closure runs when a scope's plugin set is resolved, so definitions
    /// may refer to each other regardless of declaration order.
    pub fn dependencies<F>(mut self, dependencies: F) -> Self
    where
        F: Fn() -> Vec<AnyPlugin> + Send + Sync + 'static,
    {
        self.inner.dependencies = Some(Arc::new(dependencies));
        self
    }

    /// Declares dependencies eagerly.
    pub fn depends_on(self, dependencies: impl IntoIterator<Item = AnyPlugin>) -> Self {
        let dependencies: Vec<AnyPlugin> = dependencies.into_iter().collect();
        self.dependencies(move || dependencies.clone())
    }

    /// Declares the config type. Its [`Default`] supplies defaults and its
    /// [`Deserialize`](serde::Deserialize) impl validates.
    pub fn config_schema<T>(mut self) -> Self
    where
        T: Serialize + DeserializeOwned + Default + 'static,
    {
        self.inner.schema = Some(Arc::new(SerdeSchema::<T>::new()));
        self
    }

    /// Uses a custom [`ConfigSchema`].
    pub fn schema(mut self, schema: impl ConfigSchema + 'static) -> Self {
        self.inner.schema = Some(Arc::new(schema));
        self
    }

    pub fn before_load<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<PluginData<S>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.inner.hooks.before_load = Some(hook(f));
        self
    }

    pub fn before_start<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<PluginData<S>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.inner.hooks.before_start = Some(hook(f));
        self
    }

    pub fn after_load<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<PluginData<S>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.inner.hooks.after_load = Some(hook(f));
        self
    }

    pub fn before_unload<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<PluginData<S>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.inner.hooks.before_unload = Some(hook(f));
        self
    }

    pub fn after_unload<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Arc<PluginData<S>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.inner.hooks.after_unload = Some(hook(f));
        self
    }

    /// Declares a typed event listener.
    pub fn event<E, F, Fut>(self, listener: F) -> Self
    where
        E: NamedEvent + Clone,
        F: Fn(Arc<PluginData<S>>, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.on_event(E::NAME, move |data, event: BoxedEvent| {
            let fut = event
                .downcast::<E>()
                .cloned()
                .map(|event| listener(data, event));
            async move {
                match fut {
                    Some(fut) => fut.await,
                    None => Ok(()),
                }
            }
        })
    }

    /// Declares a listener for events named `event_name`.
    pub fn on_event<F, Fut>(mut self, event_name: impl Into<String>, listener: F) -> Self
    where
        F: Fn(Arc<PluginData<S>>, BoxedEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let listener: EventFn<S> = Arc::new(
            move |data: Arc<PluginData<S>>,
                  event: BoxedEvent|
                  -> BoxFuture<'static, Result<(), BoxError>> {
                Box::pin(listener(data, event))
            },
        );
        self.inner.events.push((event_name.into(), listener));
        self
    }

    pub fn message_command(mut self, command: MessageCommand<S>) -> Self {
        self.inner.message_commands.push(command);
        self
    }

    pub fn interaction_command(mut self, command: InteractionCommand<S>) -> Self {
        self.inner.interaction_commands.push(command);
        self
    }

    /// Registers a custom override criteria.
    ///
    /// Override rules name it in their `extra` clauses; the predicate receives
    /// the instance, the invocation context and the clause value.
    pub fn custom_criteria<F, Fut>(mut self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(Arc<PluginData<S>>, MatchParams, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, BoxError>> + Send + 'static,
    {
        let predicate: CriteriaFn<S> = Arc::new(
            move |data: Arc<PluginData<S>>,
                  params: MatchParams,
                  value: Value|
                  -> BoxFuture<'static, Result<bool, BoxError>> {
                Box::pin(predicate(data, params, value))
            },
        );
        self.inner.criteria.insert(name.into(), predicate);
        self
    }

    /// Sets the factory for the public interface handed to dependents.
    ///
    /// Called once per instance when it is published.
    pub fn public<F>(mut self, f: F) -> Self
    where
        F: Fn(Arc<PluginData<S>>) -> P + Send + Sync + 'static,
    {
        self.inner.public = Some(Arc::new(f));
        self
    }

    pub fn build(self) -> PluginDefinition<S, P> {
        PluginDefinition {
            inner: Arc::new(self.inner),
        }
    }
}

// =============================================================================
// AnyPlugin
// =============================================================================

/// Object-safe view of a [`PluginDefinition`].
pub(crate) trait ErasedPlugin: Send + Sync {
    fn name(&self) -> &str;
    fn scope(&self) -> PluginScope;
    fn key(&self) -> PluginKey;
    fn dependencies(&self) -> Vec<AnyPlugin>;
    fn instantiate(
        &self,
        ctx: InstanceContext,
    ) -> Result<Arc<dyn PluginInstance>, ConfigurationError>;
}

impl<S, P> ErasedPlugin for PluginDefinition<S, P>
where
    S: Default + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    fn name(&self) -> &str {
        PluginDefinition::name(self)
    }

    fn scope(&self) -> PluginScope {
        PluginDefinition::scope(self)
    }

    fn key(&self) -> PluginKey {
        PluginDefinition::key(self)
    }

    fn dependencies(&self) -> Vec<AnyPlugin> {
        self.inner
            .dependencies
            .as_ref()
            .map(|f| f())
            .unwrap_or_default()
    }

    fn instantiate(
        &self,
        ctx: InstanceContext,
    ) -> Result<Arc<dyn PluginInstance>, ConfigurationError> {
        Ok(Arc::new(TypedInstance::new(self.clone(), ctx)?))
    }
}

/// A type-erased plugin definition.
#[derive(Clone)]
pub struct AnyPlugin {
    inner: Arc<dyn ErasedPlugin>,
}

impl AnyPlugin {
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn scope(&self) -> PluginScope {
        self.inner.scope()
    }

    pub fn key(&self) -> PluginKey {
        self.inner.key()
    }

    /// Evaluates the declared dependencies.
    pub fn dependencies(&self) -> Vec<AnyPlugin> {
        self.inner.dependencies()
    }

    /// Creates an instance for one scope.
    pub fn instantiate(
        &self,
        ctx: InstanceContext,
    ) -> Result<Arc<dyn PluginInstance>, ConfigurationError> {
        self.inner.instantiate(ctx)
    }
}

impl PluginRef for AnyPlugin {
    fn plugin_key(&self) -> PluginKey {
        self.key()
    }

    fn plugin_name(&self) -> &str {
        self.name()
    }
}

impl PartialEq for AnyPlugin {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for AnyPlugin {}

impl fmt::Debug for AnyPlugin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyPlugin")
            .field("name", &self.name())
            .field("scope", &self.scope())
            .finish()
    }
}

impl<S, P> From<PluginDefinition<S, P>> for AnyPlugin
where
    S: Default + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    fn from(definition: PluginDefinition<S, P>) -> Self {
        definition.erase()
    }
}

impl<S, P> From<&PluginDefinition<S, P>> for AnyPlugin
where
    S: Default + Send + Sync + 'static,
    P: Send + Sync + 'static,
{
    fn from(definition: &PluginDefinition<S, P>) -> Self {
        definition.erase()
    }
}
