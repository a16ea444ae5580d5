//! Lifecycle tests driving instances through [`PluginHookSequencer`].

use std::future::{self, Ready};
use std::sync::Arc;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};
use std::time::Duration;

use guildkit_core::{
    BoxError, ChannelCreate, Channel, EventBus, GuildId, Interaction, InteractionCreate, Message,
    MessageCreate, RoleId, UserId,
};
use parking_lot::Mutex;
use serde_json::{Value, json};

use crate::prelude::*;
use crate::{
    ErrorReporter, HookSite, InstanceContext, PluginHookSequencer, PluginInstance, PluginRegistry,
    discard_errors,
};

const GUILD: u64 = 1;

type Log = Arc<Mutex<Vec<String>>>;

struct Scope {
    bus: Arc<EventBus>,
    registry: Arc<PluginRegistry>,
    global_registry: Arc<PluginRegistry>,
    reporter: ErrorReporter,
}

impl Scope {
    fn new() -> Self {
        Self {
            bus: EventBus::shared(),
            registry: Arc::new(PluginRegistry::new()),
            global_registry: Arc::new(PluginRegistry::new()),
            reporter: discard_errors(),
        }
    }

    fn instance(
        &self,
        plugin: impl Into<AnyPlugin>,
        explicit: bool,
        options: PluginOptions,
    ) -> Arc<dyn PluginInstance> {
        let ctx = InstanceContext {
            guild_id: Some(GuildId(GUILD)),
            explicit,
            prefix: "!".to_string(),
            options,
            source: self.bus.clone(),
            registry: self.registry.clone(),
            global_registry: self.global_registry.clone(),
            reporter: self.reporter.clone(),
        };
        plugin.into().instantiate(ctx).unwrap()
    }
}

fn object(value: Value) -> serde_json::Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

fn push(log: &Log, entry: String) -> Ready<Result<(), BoxError>> {
    log.lock().push(entry);
    future::ready(Ok(()))
}

/// A plugin that records every hook it runs.
fn recording(name: &'static str, log: &Log) -> PluginDefinition {
    let (l1, l2, l3, l4, l5) = (log.clone(), log.clone(), log.clone(), log.clone(), log.clone());
    PluginDefinition::<()>::guild(name)
        .before_load(move |_| push(&l1, format!("{name}:beforeLoad")))
        .before_start(move |_| push(&l2, format!("{name}:beforeStart")))
        .after_load(move |_| push(&l3, format!("{name}:afterLoad")))
        .before_unload(move |_| push(&l4, format!("{name}:beforeUnload")))
        .after_unload(move |_| push(&l5, format!("{name}:afterUnload")))
        .build()
}

fn failing() -> BoxError {
    "hook exploded".into()
}

#[tokio::test]
async fn test_hooks_run_in_lockstep_and_unload_in_reverse() {
    let scope = Scope::new();
    let log: Log = Arc::default();
    let instances = vec![
        scope.instance(recording("dep", &log), false, PluginOptions::new()),
        scope.instance(recording("app", &log), true, PluginOptions::new()),
    ];

    PluginHookSequencer::load(&instances, &scope.registry)
        .await
        .unwrap();
    assert!(instances.iter().all(|i| i.stage() == LifecycleStage::Running));
    assert_eq!(scope.registry.len(), 2);

    let failures = PluginHookSequencer::unload(&instances, &scope.registry).await;
    assert!(failures.is_empty());
    assert!(scope.registry.is_empty());
    assert!(instances.iter().all(|i| i.stage() == LifecycleStage::Destroyed));

    assert_eq!(
        *log.lock(),
        vec![
            "dep:beforeLoad",
            "app:beforeLoad",
            "dep:beforeStart",
            "app:beforeStart",
            "dep:afterLoad",
            "app:afterLoad",
            "app:beforeUnload",
            "dep:beforeUnload",
            "app:afterUnload",
            "dep:afterUnload",
        ]
    );
}

#[tokio::test]
async fn test_lookups_fail_outside_their_window() {
    struct Api(u32);

    let scope = Scope::new();
    let dep = PluginDefinition::<(), Api>::guild("dep")
        .public(|_| Api(7))
        .build();

    type Seen = Arc<Mutex<Vec<(LifecycleStage, Option<u32>)>>>;

    let seen: Seen = Arc::default();
    let record = |seen: &Seen, dep: &PluginDefinition<(), Api>| {
        let seen = seen.clone();
        let dep = dep.clone();
        move |data: Arc<PluginData<()>>| {
            let looked_up = data.get_plugin(&dep).ok().map(|api| api.0);
            seen.lock().push((data.stage(), looked_up));
            async { Ok(()) }
        }
    };
    let app = PluginDefinition::<()>::guild("app")
        .dependencies({
            let dep = dep.erase();
            move || vec![dep.clone()]
        })
        .before_load(record(&seen, &dep))
        .before_start(record(&seen, &dep))
        .after_load(record(&seen, &dep))
        .before_unload(record(&seen, &dep))
        .after_unload(record(&seen, &dep))
        .build();

    let instances = vec![
        scope.instance(dep.clone(), false, PluginOptions::new()),
        scope.instance(app, true, PluginOptions::new()),
    ];
    PluginHookSequencer::load(&instances, &scope.registry)
        .await
        .unwrap();
    PluginHookSequencer::unload(&instances, &scope.registry).await;

    assert_eq!(
        *seen.lock(),
        vec![
            (LifecycleStage::BeforeLoad, None),
            (LifecycleStage::BeforeStart, Some(7)),
            (LifecycleStage::AfterLoad, Some(7)),
            (LifecycleStage::BeforeUnload, Some(7)),
            (LifecycleStage::AfterUnload, None),
        ]
    );
}

#[tokio::test]
async fn test_lookup_error_names_the_stage() {
    let scope = Scope::new();
    let other = PluginDefinition::<()>::guild("other").build();
    let outcome: Arc<Mutex<Option<String>>> = Arc::default();
    let slot = outcome.clone();
    let early = PluginDefinition::<()>::guild("early")
        .before_load(move |data| {
            *slot.lock() = data.has_plugin(&other).err().map(|e| e.to_string());
            async { Ok(()) }
        })
        .build();

    let instances = vec![scope.instance(early, true, PluginOptions::new())];
    PluginHookSequencer::load(&instances, &scope.registry)
        .await
        .unwrap();

    let message = outcome.lock().clone().unwrap();
    assert!(message.contains("beforeLoad"), "{message}");
    assert!(message.contains("early"), "{message}");
}

#[tokio::test]
async fn test_global_lookups_work_in_every_stage() {
    let scope = Scope::new();
    let everywhere = PluginDefinition::<()>::global("everywhere").build();
    let globals = vec![
        everywhere
            .erase()
            .instantiate(InstanceContext {
                guild_id: None,
                explicit: true,
                prefix: "!".into(),
                options: PluginOptions::new(),
                source: scope.bus.clone(),
                registry: scope.global_registry.clone(),
                global_registry: scope.global_registry.clone(),
                reporter: discard_errors(),
            })
            .unwrap(),
    ];
    PluginHookSequencer::load(&globals, &scope.global_registry)
        .await
        .unwrap();

    type Seen = Arc<Mutex<Vec<(LifecycleStage, bool, bool)>>>;

    let seen: Seen = Arc::default();
    let record = |seen: &Seen| {
        let seen = seen.clone();
        let everywhere = everywhere.clone();
        move |data: Arc<PluginData<()>>| {
            let scoped = data.has_plugin(&everywhere).is_ok();
            seen.lock()
                .push((data.stage(), scoped, data.has_global_plugin(&everywhere)));
            async { Ok(()) }
        }
    };
    let app = PluginDefinition::<()>::guild("app")
        .before_load(record(&seen))
        .after_unload(record(&seen))
        .build();

    let instances = vec![scope.instance(app, true, PluginOptions::new())];
    PluginHookSequencer::load(&instances, &scope.registry)
        .await
        .unwrap();
    PluginHookSequencer::unload(&instances, &scope.registry).await;
    assert_eq!(
        *seen.lock(),
        vec![
            (LifecycleStage::BeforeLoad, false, true),
            (LifecycleStage::AfterUnload, false, true),
        ]
    );

    let data = instances[0].data::<()>().unwrap();
    PluginHookSequencer::unload(&globals, &scope.global_registry).await;
    assert!(!data.has_global_plugin(&everywhere));
}

#[tokio::test]
async fn test_before_start_failure_rolls_back_every_instance() {
    let scope = Scope::new();
    let counter = Arc::new(AtomicI32::new(0));

    let counted = |name: &'static str, fail: bool| {
        let (up, down) = (counter.clone(), counter.clone());
        PluginDefinition::<()>::guild(name)
            .before_load(move |_| {
                up.fetch_add(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .before_start(move |_| async move { if fail { Err(failing()) } else { Ok(()) } })
            .before_unload(move |_| {
                down.fetch_sub(1, Ordering::SeqCst);
                async { Ok(()) }
            })
            .build()
    };

    let instances = vec![
        scope.instance(counted("a", false), true, PluginOptions::new()),
        scope.instance(counted("b", true), true, PluginOptions::new()),
        scope.instance(counted("c", false), true, PluginOptions::new()),
    ];
    let err = PluginHookSequencer::load(&instances, &scope.registry)
        .await
        .unwrap_err();

    assert_eq!(err.plugin, "b");
    assert_eq!(err.site, HookSite::Stage(LifecycleStage::BeforeStart));
    assert_eq!(counter.load(Ordering::SeqCst), 0);
    assert!(scope.registry.is_empty());
    assert!(instances.iter().all(|i| i.stage() == LifecycleStage::Destroyed));
    assert!(instances.iter().all(|i| i.listener_count() == 0));
}

#[tokio::test]
async fn test_before_load_failure_only_unloads_completed_instances() {
    let scope = Scope::new();
    let log: Log = Arc::default();
    let broken = {
        let log = log.clone();
        PluginDefinition::<()>::guild("broken")
            .before_load(|_| async { Err(failing()) })
            .before_unload(move |_| push(&log, "broken:beforeUnload".to_string()))
            .build()
    };

    let instances = vec![
        scope.instance(recording("first", &log), true, PluginOptions::new()),
        scope.instance(broken, true, PluginOptions::new()),
        scope.instance(recording("never", &log), true, PluginOptions::new()),
    ];
    let err = PluginHookSequencer::load(&instances, &scope.registry)
        .await
        .unwrap_err();

    assert_eq!(err.plugin, "broken");
    assert_eq!(
        *log.lock(),
        vec![
            "first:beforeLoad",
            "first:beforeUnload",
            "first:afterUnload",
        ]
    );
    assert!(instances.iter().all(|i| i.stage() == LifecycleStage::Destroyed));
}

#[tokio::test]
async fn test_unload_hook_failures_do_not_stop_unload() {
    let scope = Scope::new();
    let log: Log = Arc::default();
    let grumpy = PluginDefinition::<()>::guild("grumpy")
        .before_unload(|_| async { Err(failing()) })
        .after_unload(|_| async { Err(failing()) })
        .build();
    let instances = vec![
        scope.instance(recording("calm", &log), true, PluginOptions::new()),
        scope.instance(grumpy, true, PluginOptions::new()),
    ];
    PluginHookSequencer::load(&instances, &scope.registry)
        .await
        .unwrap();

    let failures = PluginHookSequencer::unload(&instances, &scope.registry).await;
    assert_eq!(failures.len(), 2);
    assert!(log.lock().contains(&"calm:afterUnload".to_string()));
    assert!(instances.iter().all(|i| i.stage() == LifecycleStage::Destroyed));
}

#[tokio::test]
async fn test_dependency_only_instances_register_nothing() {
    #[derive(Default)]
    struct Hits(AtomicUsize);

    let scope = Scope::new();
    let plugin = |name: &'static str| {
        PluginDefinition::<Hits, usize>::guild(name)
            .event(|data: Arc<PluginData<Hits>>, _: ChannelCreate| async move {
                data.state().0.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .message_command(MessageCommand::new("ping", |_| async { Ok(()) }))
            .interaction_command(InteractionCommand::new("ping", |_| async { Ok(()) }))
            .public(|_| 42)
            .build()
    };
    let dep = plugin("dep");
    let app = plugin("app");

    let instances = vec![
        scope.instance(dep.clone(), false, PluginOptions::new()),
        scope.instance(app, true, PluginOptions::new()),
    ];
    PluginHookSequencer::load(&instances, &scope.registry)
        .await
        .unwrap();

    let (dep_instance, app_instance) = (&instances[0], &instances[1]);
    assert_eq!(dep_instance.listener_count(), 0);
    assert_eq!(dep_instance.message_command_count(), 0);
    assert_eq!(dep_instance.interaction_command_count(), 0);
    // messageCreate and interactionCreate dispatch, plus the declared listener.
    assert_eq!(app_instance.listener_count(), 3);
    assert_eq!(app_instance.message_command_count(), 1);
    assert_eq!(app_instance.interaction_command_count(), 1);

    // The dependency is still reachable from its dependents.
    let app_data = app_instance.data::<Hits>().unwrap();
    assert_eq!(*app_data.get_plugin(&dep).unwrap(), 42);
    assert!(app_data.has_plugin(&dep).unwrap());

    scope
        .bus
        .emit_and_wait(ChannelCreate {
            channel: Channel::new(5u64, Some(GuildId(GUILD))),
        })
        .await;
    assert_eq!(app_data.state().0.load(Ordering::SeqCst), 1);
    assert_eq!(
        dep_instance.data::<Hits>().unwrap().state().0.load(Ordering::SeqCst),
        0
    );
}

// =============================================================================
// Commands and override-gated permissions
// =============================================================================

#[derive(Default)]
struct Runs {
    a: AtomicUsize,
    b: AtomicUsize,
    r: AtomicUsize,
}

fn gated_commands() -> PluginDefinition<Runs> {
    PluginDefinition::<Runs>::guild("perms")
        .message_command(
            MessageCommand::new("a", |ctx: CommandContext<Runs>| async move {
                ctx.plugin.state().a.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .permission("can_a"),
        )
        .message_command(
            MessageCommand::new("b", |ctx: CommandContext<Runs>| async move {
                ctx.plugin.state().b.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .permission("can_b"),
        )
        .message_command(
            MessageCommand::new("r", |ctx: CommandContext<Runs>| async move {
                ctx.plugin.state().r.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .permission("can_r"),
        )
        .build()
}

fn message(id: u64, author: u64, content: &str) -> Message {
    Message::new(id, 10u64, author, content).in_guild(GUILD)
}

#[tokio::test]
async fn test_override_rules_gate_commands_per_user() {
    let scope = Scope::new();
    let options = PluginOptions::new()
        .config(object(json!({ "can_a": false, "can_b": false, "can_r": false })))
        .override_rule(OverrideRule::new().user(1u64).patch(object(json!({ "can_a": true }))))
        .override_rule(OverrideRule::new().user(2u64).patch(object(json!({ "can_b": true }))))
        .override_rule(OverrideRule::new().role(9u64).patch(object(json!({ "can_r": true }))));
    let instances = vec![scope.instance(gated_commands(), true, options)];
    PluginHookSequencer::load(&instances, &scope.registry)
        .await
        .unwrap();
    let data = instances[0].data::<Runs>().unwrap();

    let mut id = 0;
    for (author, roles) in [(1u64, vec![]), (2, vec![]), (3, vec![RoleId(9)]), (4, vec![])] {
        for trigger in ["!a", "!b", "!r"] {
            id += 1;
            let msg = message(id, author, trigger).with_roles(roles.clone());
            scope.bus.emit_and_wait(MessageCreate { message: msg }).await;
        }
    }

    let state = data.state();
    assert_eq!(state.a.load(Ordering::SeqCst), 1);
    assert_eq!(state.b.load(Ordering::SeqCst), 1);
    assert_eq!(state.r.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_async_custom_criteria_gates_command() {
    let scope = Scope::new();
    let plugin = PluginDefinition::<Runs>::guild("perms")
        .custom_criteria("is_user", |_data, params: MatchParams, value: Value| async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let expected = serde_json::from_value::<UserId>(value).ok();
            Ok(expected.is_some() && params.user_id == expected)
        })
        .message_command(
            MessageCommand::new("a", |ctx: CommandContext<Runs>| async move {
                ctx.plugin.state().a.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .permission("can_a"),
        )
        .build();
    let options = PluginOptions::new()
        .config(object(json!({ "can_a": false })))
        .override_rule(
            OverrideRule::new()
                .criteria("is_user", json!("1"))
                .patch(object(json!({ "can_a": true }))),
        );
    let instances = vec![scope.instance(plugin, true, options)];
    PluginHookSequencer::load(&instances, &scope.registry)
        .await
        .unwrap();

    scope
        .bus
        .emit_and_wait(MessageCreate { message: message(1, 1, "!a") })
        .await;
    scope
        .bus
        .emit_and_wait(MessageCreate { message: message(2, 2, "!a") })
        .await;

    let data = instances[0].data::<Runs>().unwrap();
    assert_eq!(data.state().a.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_explicit_dispatch_and_default_listener_run_once() {
    let scope = Scope::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let plugin = PluginDefinition::<()>::guild("echo")
        .message_command(MessageCommand::new("echo", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(()) }
        }))
        .build();
    let instances = vec![scope.instance(plugin, true, PluginOptions::new())];
    PluginHookSequencer::load(&instances, &scope.registry)
        .await
        .unwrap();

    let msg = message(77, 1, "!echo hi");
    assert!(instances[0].dispatch_message(&msg).await.unwrap());
    scope
        .bus
        .emit_and_wait(MessageCreate { message: msg.clone() })
        .await;
    assert!(!instances[0].dispatch_message(&msg).await.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_interaction_commands_dispatch_by_name() {
    let scope = Scope::new();
    let seen: Arc<Mutex<Vec<Value>>> = Arc::default();
    let sink = seen.clone();
    let plugin = PluginDefinition::<()>::guild("slash")
        .interaction_command(InteractionCommand::new("roll", move |ctx: InteractionContext<()>| {
            sink.lock().push(ctx.interaction.options.clone());
            async { Ok(()) }
        }))
        .build();
    let instances = vec![scope.instance(plugin, true, PluginOptions::new())];
    PluginHookSequencer::load(&instances, &scope.registry)
        .await
        .unwrap();

    let roll = Interaction::new(1u64, 10u64, 3u64, "roll")
        .in_guild(GUILD)
        .with_options(json!({ "sides": 6 }));
    let other = Interaction::new(2u64, 10u64, 3u64, "flip").in_guild(GUILD);
    scope
        .bus
        .emit_and_wait(InteractionCreate { interaction: roll })
        .await;
    scope
        .bus
        .emit_and_wait(InteractionCreate { interaction: other })
        .await;

    assert_eq!(*seen.lock(), vec![json!({ "sides": 6 })]);
}

#[tokio::test]
async fn test_command_errors_reach_the_reporter() {
    let mut scope = Scope::new();
    let errors: Arc<Mutex<Vec<PluginError>>> = Arc::default();
    let sink = errors.clone();
    scope.reporter = Arc::new(move |e| sink.lock().push(e));

    let plugin = PluginDefinition::<()>::guild("boom")
        .message_command(MessageCommand::new("boom", |_| async { Err(failing()) }))
        .build();
    let instances = vec![scope.instance(plugin, true, PluginOptions::new())];
    PluginHookSequencer::load(&instances, &scope.registry)
        .await
        .unwrap();

    scope
        .bus
        .emit_and_wait(MessageCreate { message: message(1, 1, "!boom") })
        .await;

    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        PluginError::Hook(e) => assert_eq!(e.site, HookSite::Command("boom".into())),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_invalid_plugin_config_fails_instantiation() {
    #[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
    #[serde(default)]
    struct Limits {
        max: u32,
    }

    let scope = Scope::new();
    let plugin = PluginDefinition::<()>::guild("limits")
        .config_schema::<Limits>()
        .build();
    let ctx = |options: PluginOptions| InstanceContext {
        guild_id: Some(GuildId(GUILD)),
        explicit: true,
        prefix: "!".into(),
        options,
        source: scope.bus.clone(),
        registry: scope.registry.clone(),
        global_registry: scope.global_registry.clone(),
        reporter: discard_errors(),
    };

    let bad = PluginOptions::new().config(object(json!({ "max": "lots" })));
    assert!(plugin.erase().instantiate(ctx(bad)).is_err());

    let good = PluginOptions::new().config(object(json!({ "max": 3 })));
    let instance = plugin.erase().instantiate(ctx(good)).unwrap();
    let data = instance.data::<()>().unwrap();
    assert_eq!(data.config().get_as::<Limits>().unwrap().max, 3);
}
