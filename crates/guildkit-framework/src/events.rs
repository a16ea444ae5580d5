//! Per-instance event listener scope.
//!
//! An [`EventScope`] binds listeners to the gateway's [`EventSource`] for the
//! lifetime of one plugin instance:
//!
//! - Guild-scoped listeners only see events whose guild matches the
//!   instance's guild; events without a guild are dropped for them.
//! - Every invocation is tracked. [`EventScope::unregister_all`] revokes all
//!   subscriptions, then waits until every invocation that had already
//!   started has finished.
//! - Once unloading has begun, the scope accepts no new registrations and
//!   starts no new invocations, including for listeners an in-flight
//!   invocation registers.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use guildkit_core::{BoxError, BoxedEvent, EventSource, GuildId, Listener, NamedEvent, SubscriptionId};
use parking_lot::Mutex;
use tokio_util::task::TaskTracker;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tracing::{debug, error, warn};

use crate::error::{ErrorReporter, HookError, HookSite};

type ScopedListener =
    Arc<dyn Fn(BoxedEvent) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

#[derive(Default)]
struct ScopeState {
    unloading: bool,
    subscriptions: Vec<(String, SubscriptionId)>,
}

struct ScopeInner {
    plugin: Arc<str>,
    guild_id: Option<GuildId>,
    source: Arc<dyn EventSource>,
    state: Mutex<ScopeState>,
    tracker: TaskTracker,
    reporter: ErrorReporter,
}

impl ScopeInner {
    /// Runs synchronously at dispatch time. The in-flight token is taken
    /// under the state lock so that `unregister_all` either sees it or
    /// prevents it.
    fn invoke(
        &self,
        event_name: &Arc<str>,
        listener: &ScopedListener,
        event: BoxedEvent,
    ) -> BoxFuture<'static, ()> {
        if let Some(guild_id) = self.guild_id
            && event.guild_id() != Some(guild_id)
        {
            return Box::pin(async {});
        }

        let token = {
            let state = self.state.lock();
            if state.unloading {
                return Box::pin(async {});
            }
            self.tracker.token()
        };

        let fut = listener(event);
        let plugin = self.plugin.clone();
        let guild_id = self.guild_id;
        let event_name = event_name.clone();
        let reporter = self.reporter.clone();
        Box::pin(async move {
            let _token = token;
            if let Err(source) = fut.await {
                error!(
                    plugin = %plugin,
                    event = %event_name,
                    error = %source,
                    "Event listener failed"
                );
                reporter(
                    HookError::new(
                        plugin.as_ref(),
                        guild_id,
                        HookSite::Listener(event_name.to_string()),
                        source,
                    )
                    .into(),
                );
            }
        })
    }
}

/// Listener registrations of one plugin instance.
#[derive(Clone)]
pub struct EventScope {
    inner: Arc<ScopeInner>,
}

impl EventScope {
    pub(crate) fn new(
        plugin: Arc<str>,
        guild_id: Option<GuildId>,
        source: Arc<dyn EventSource>,
        reporter: ErrorReporter,
    ) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                plugin,
                guild_id,
                source,
                state: Mutex::new(ScopeState::default()),
                tracker: TaskTracker::new(),
                reporter,
            }),
        }
    }

    /// Registers a listener for events named `event_name`.
    ///
    /// Returns `None` (and logs) if the scope has begun unloading.
    pub fn register<F, Fut>(&self, event_name: &str, listener: F) -> Option<SubscriptionId>
    where
        F: Fn(BoxedEvent) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let listener: ScopedListener = Arc::new(
            move |event: BoxedEvent| -> BoxFuture<'static, Result<(), BoxError>> {
                Box::pin(listener(event))
            },
        );
        self.register_boxed(event_name, listener)
    }

    /// Registers a typed listener for `E`.
    pub fn on<E, F, Fut>(&self, listener: F) -> Option<SubscriptionId>
    where
        E: NamedEvent + Clone,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.register(E::NAME, move |event: BoxedEvent| {
            let fut = event.downcast::<E>().cloned().map(&listener);
            async move {
                match fut {
                    Some(fut) => fut.await,
                    None => Ok(()),
                }
            }
        })
    }

    fn register_boxed(&self, event_name: &str, listener: ScopedListener) -> Option<SubscriptionId> {
        let mut state = self.inner.state.lock();
        if state.unloading {
            warn!(
                plugin = %self.inner.plugin,
                event = event_name,
                "Listener registered while unloading; ignored"
            );
            return None;
        }

        let scope = Arc::downgrade(&self.inner);
        let name: Arc<str> = Arc::from(event_name);
        let wrapper: Listener = Arc::new(move |event: BoxedEvent| -> BoxFuture<'static, ()> {
            match scope.upgrade() {
                Some(scope) => scope.invoke(&name, &listener, event),
                None => Box::pin(async {}),
            }
        });

        let id = self.inner.source.subscribe(event_name, wrapper);
        state.subscriptions.push((event_name.to_string(), id));
        debug!(plugin = %self.inner.plugin, event = event_name, "Listener registered");
        Some(id)
    }

    /// Removes a single registration.
    pub fn unregister(&self, id: SubscriptionId) -> bool {
        let mut state = self.inner.state.lock();
        let Some(pos) = state.subscriptions.iter().position(|(_, s)| *s == id) else {
            return false;
        };
        state.subscriptions.remove(pos);
        self.inner.source.unsubscribe(id)
    }

    /// Revokes every registration and waits for in-flight invocations.
    ///
    /// Idempotent; later calls only wait.
    pub async fn unregister_all(&self) {
        let subscriptions = {
            let mut state = self.inner.state.lock();
            state.unloading = true;
            std::mem::take(&mut state.subscriptions)
        };
        for (_, id) in &subscriptions {
            self.inner.source.unsubscribe(*id);
        }
        self.inner.tracker.close();

        let in_flight = self.inner.tracker.len();
        if in_flight > 0 {
            debug!(
                plugin = %self.inner.plugin,
                in_flight,
                "Waiting for in-flight listeners"
            );
        }
        self.inner.tracker.wait().await;
    }

    /// Marks work outside a listener as in flight, so that
    /// [`unregister_all`](Self::unregister_all) waits for it.
    ///
    /// Returns `None` once unloading has begun.
    pub fn track(&self) -> Option<TaskTrackerToken> {
        let state = self.inner.state.lock();
        if state.unloading {
            return None;
        }
        Some(self.inner.tracker.token())
    }

    /// Number of live registrations.
    pub fn listener_count(&self) -> usize {
        self.inner.state.lock().subscriptions.len()
    }

    /// Number of invocations currently running.
    pub fn in_flight(&self) -> usize {
        self.inner.tracker.len()
    }

    pub fn is_unloading(&self) -> bool {
        self.inner.state.lock().unloading
    }
}

impl fmt::Debug for EventScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventScope")
            .field("plugin", &self.inner.plugin)
            .field("guild_id", &self.inner.guild_id)
            .field("listeners", &self.listener_count())
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use guildkit_core::{
        Channel, ChannelCreate, ChannelId, EventBus, Message, MessageCreate, MessageId, UserId,
        UserUpdate,
    };
    use parking_lot::Mutex as SyncMutex;

    use super::*;
    use crate::error::{PluginError, discard_errors};

    fn scope(bus: &Arc<EventBus>, guild: Option<u64>) -> EventScope {
        EventScope::new(
            Arc::from("test"),
            guild.map(GuildId),
            bus.clone(),
            discard_errors(),
        )
    }

    fn message_in(guild: u64) -> MessageCreate {
        MessageCreate {
            message: Message::new(MessageId(1), ChannelId(2), UserId(3), "hi").in_guild(GuildId(guild)),
        }
    }

    #[tokio::test]
    async fn test_guild_scope_filters_other_guilds() {
        let bus = EventBus::shared();
        let scope = scope(&bus, Some(1));
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        scope.on::<MessageCreate, _, _>(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });

        bus.emit_and_wait(message_in(1)).await;
        bus.emit_and_wait(message_in(2)).await;
        bus.emit_and_wait(UserUpdate { user_id: UserId(3) }).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_global_scope_sees_everything() {
        let bus = EventBus::shared();
        let scope = scope(&bus, None);
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        scope.register("messageCreate", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        });

        bus.emit_and_wait(message_in(1)).await;
        bus.emit_and_wait(message_in(2)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_all_waits_for_in_flight() {
        let bus = EventBus::shared();
        let scope = scope(&bus, Some(1));
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        scope.register("messageCreate", move |_| {
            let flag = flag.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                flag.store(true, Ordering::SeqCst);
                Ok(())
            }
        });
        assert_eq!(scope.listener_count(), 1);

        bus.emit(message_in(1));
        tokio::task::yield_now().await;
        assert_eq!(scope.in_flight(), 1);

        scope.unregister_all().await;
        assert!(finished.load(Ordering::SeqCst));
        assert_eq!(scope.listener_count(), 0);
        assert_eq!(bus.total_listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registration_from_in_flight_listener_is_revoked() {
        let bus = EventBus::shared();
        let scope = scope(&bus, Some(1));
        let count = Arc::new(AtomicUsize::new(1));

        let inner_scope = scope.clone();
        let inner_bus = Arc::downgrade(&bus);
        let counter = count.clone();
        scope.register("messageCreate", move |_| {
            let scope = inner_scope.clone();
            let bus = inner_bus.clone();
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                let late = counter.clone();
                let registered = scope.register("channelCreate", move |_| {
                    late.fetch_add(1, Ordering::SeqCst);
                    async { Ok(()) }
                });
                assert!(registered.is_none());
                if let Some(bus) = bus.upgrade() {
                    bus.emit(ChannelCreate {
                        channel: Channel::new(ChannelId(2), Some(GuildId(1))),
                    });
                }
                Ok(())
            }
        });

        bus.emit(message_in(1));
        tokio::task::yield_now().await;
        scope.unregister_all().await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert!(scope.is_unloading());
    }

    #[tokio::test]
    async fn test_listener_errors_are_reported() {
        let bus = EventBus::shared();
        let reported = Arc::new(SyncMutex::new(Vec::new()));
        let sink = reported.clone();
        let scope = EventScope::new(
            Arc::from("failing"),
            Some(GuildId(1)),
            bus.clone(),
            Arc::new(move |err: PluginError| sink.lock().push(err.to_string())),
        );
        scope.register("messageCreate", |_| async { Err::<(), BoxError>("boom".into()) });

        bus.emit_and_wait(message_in(1)).await;
        let reported = reported.lock();
        assert_eq!(reported.len(), 1);
        assert!(reported[0].contains("failing"));
        assert!(reported[0].contains("boom"));
    }

    #[tokio::test]
    async fn test_unregister_single() {
        let bus = EventBus::shared();
        let scope = scope(&bus, Some(1));
        let id = scope
            .register("messageCreate", |_| async { Ok(()) })
            .unwrap();
        scope.register("messageCreate", |_| async { Ok(()) });

        assert!(scope.unregister(id));
        assert!(!scope.unregister(id));
        assert_eq!(scope.listener_count(), 1);
        assert_eq!(bus.listener_count("messageCreate"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_all_waits_for_tracked_work() {
        let bus = EventBus::shared();
        let scope = scope(&bus, Some(1));
        let finished = Arc::new(AtomicBool::new(false));

        let token = scope.track().unwrap();
        assert_eq!(scope.in_flight(), 1);
        let flag = finished.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            flag.store(true, Ordering::SeqCst);
            drop(token);
        });

        scope.unregister_all().await;
        assert!(finished.load(Ordering::SeqCst));
        assert!(scope.track().is_none());
    }
}
