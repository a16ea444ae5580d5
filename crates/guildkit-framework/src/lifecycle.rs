//! Plugin instance lifecycle.
//!
//! Every instance walks the same stages, in order, without skipping:
//!
//! ```text
//! Created ──► BeforeLoad ──► BeforeStart ──► (commands/events registered)
//!         ──► AfterLoad ──► Running ──► (events stopped and drained)
//!         ──► BeforeUnload ──► AfterUnload ──► Destroyed
//! ```
//!
//! [`PluginHookSequencer`] drives all instances of one scope (a guild, or the
//! global scope) through these stages in lockstep: every instance finishes a
//! stage before any instance enters the next one. Instances are given in
//! dependency order; unload stages run in reverse order.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use futures::future;
use tracing::{debug, error, info, warn};

use crate::error::HookError;
use crate::plugin::{PluginInstance, PluginRegistry};

// =============================================================================
// LifecycleStage
// =============================================================================

/// The lifecycle stage of a plugin instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum LifecycleStage {
    /// Instantiated, no hook has run yet.
    Created = 0,
    BeforeLoad = 1,
    BeforeStart = 2,
    AfterLoad = 3,
    /// Fully loaded and receiving events.
    Running = 4,
    BeforeUnload = 5,
    AfterUnload = 6,
    /// Unloaded; the instance is about to be dropped.
    Destroyed = 7,
}

impl LifecycleStage {
    /// Returns the stage name as used in logs and errors.
    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleStage::Created => "created",
            LifecycleStage::BeforeLoad => "beforeLoad",
            LifecycleStage::BeforeStart => "beforeStart",
            LifecycleStage::AfterLoad => "afterLoad",
            LifecycleStage::Running => "running",
            LifecycleStage::BeforeUnload => "beforeUnload",
            LifecycleStage::AfterUnload => "afterUnload",
            LifecycleStage::Destroyed => "destroyed",
        }
    }

    /// Whether scope-local plugin lookups are permitted in this stage.
    ///
    /// Dependencies are not guaranteed to exist before `beforeStart` or after
    /// `beforeUnload`.
    pub fn allows_lookups(self) -> bool {
        matches!(
            self,
            LifecycleStage::BeforeStart
                | LifecycleStage::AfterLoad
                | LifecycleStage::Running
                | LifecycleStage::BeforeUnload
        )
    }

    /// Whether this stage has a user hook attached.
    pub fn has_hook(self) -> bool {
        matches!(
            self,
            LifecycleStage::BeforeLoad
                | LifecycleStage::BeforeStart
                | LifecycleStage::AfterLoad
                | LifecycleStage::BeforeUnload
                | LifecycleStage::AfterUnload
        )
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => LifecycleStage::BeforeLoad,
            2 => LifecycleStage::BeforeStart,
            3 => LifecycleStage::AfterLoad,
            4 => LifecycleStage::Running,
            5 => LifecycleStage::BeforeUnload,
            6 => LifecycleStage::AfterUnload,
            7 => LifecycleStage::Destroyed,
            _ => LifecycleStage::Created,
        }
    }
}

impl fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic holder for an instance's current [`LifecycleStage`].
#[derive(Debug)]
pub struct StageCell(AtomicU8);

impl StageCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(LifecycleStage::Created as u8))
    }

    pub fn get(&self) -> LifecycleStage {
        LifecycleStage::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, stage: LifecycleStage) {
        self.0.store(stage as u8, Ordering::Release);
    }
}

impl Default for StageCell {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// PluginHookSequencer
// =============================================================================

/// Drives the instances of one scope through their lifecycle.
pub struct PluginHookSequencer;

impl PluginHookSequencer {
    /// Loads `instances` (given in dependency order) into `registry`.
    ///
    /// On the first hook failure the remaining steps are abandoned and every
    /// instance whose `beforeLoad` had completed is rolled back through
    /// [`unload`](Self::unload). The instances end up `Destroyed` and the
    /// failure is returned.
    pub async fn load(
        instances: &[Arc<dyn PluginInstance>],
        registry: &PluginRegistry,
    ) -> Result<(), HookError> {
        // ── 1. beforeLoad ────────────────────────────────────────────────
        for (i, instance) in instances.iter().enumerate() {
            if let Err(e) = instance.enter(LifecycleStage::BeforeLoad).await {
                instance.force_stage(LifecycleStage::Destroyed);
                Self::abandon(&instances[i + 1..]);
                Self::rollback(&instances[..i], registry).await;
                return Err(e);
            }
        }

        // ── 2. Publish into the scope's capability registry ───────────────
        for instance in instances {
            registry.publish(instance.as_ref());
        }

        // ── 3. beforeStart ───────────────────────────────────────────────
        for instance in instances {
            if let Err(e) = instance.enter(LifecycleStage::BeforeStart).await {
                Self::rollback(instances, registry).await;
                return Err(e);
            }
        }

        // ── 4. Commands and events (explicit instances only) ─────────────
        for instance in instances {
            instance.register_handlers();
        }

        // ── 5. afterLoad ─────────────────────────────────────────────────
        for instance in instances {
            if let Err(e) = instance.enter(LifecycleStage::AfterLoad).await {
                Self::rollback(instances, registry).await;
                return Err(e);
            }
        }

        for instance in instances {
            instance.force_stage(LifecycleStage::Running);
            debug!(
                plugin = %instance.name(),
                explicit = instance.is_explicit(),
                listeners = instance.listener_count(),
                "Plugin instance running"
            );
        }
        Ok(())
    }

    /// Unloads `instances` (given in dependency order).
    ///
    /// Unload never stops half-way: hook failures are logged, collected and
    /// returned once every instance has reached `Destroyed`.
    pub async fn unload(
        instances: &[Arc<dyn PluginInstance>],
        registry: &PluginRegistry,
    ) -> Vec<HookError> {
        let mut failures = Vec::new();

        // ── 1. Stop events and wait for in-flight listeners ──────────────
        future::join_all(instances.iter().map(|instance| instance.stop_events())).await;

        // ── 2. beforeUnload, dependents first ────────────────────────────
        for instance in instances.iter().rev() {
            if let Err(e) = instance.enter(LifecycleStage::BeforeUnload).await {
                error!(plugin = %instance.name(), error = %e, "beforeUnload hook failed");
                failures.push(e);
            }
        }

        // ── 3. Withdraw from the registry ────────────────────────────────
        for instance in instances {
            registry.withdraw(instance.key());
        }

        // ── 4. afterUnload, dependents first ─────────────────────────────
        for instance in instances.iter().rev() {
            if let Err(e) = instance.enter(LifecycleStage::AfterUnload).await {
                error!(plugin = %instance.name(), error = %e, "afterUnload hook failed");
                failures.push(e);
            }
        }

        for instance in instances {
            instance.force_stage(LifecycleStage::Destroyed);
        }
        failures
    }

    async fn rollback(loaded: &[Arc<dyn PluginInstance>], registry: &PluginRegistry) {
        if loaded.is_empty() {
            return;
        }
        warn!(instances = loaded.len(), "Rolling back partially loaded plugins");
        let failures = Self::unload(loaded, registry).await;
        if failures.is_empty() {
            info!("Rollback completed");
        } else {
            warn!(failures = failures.len(), "Rollback completed with hook failures");
        }
    }

    fn abandon(pending: &[Arc<dyn PluginInstance>]) {
        for instance in pending {
            instance.force_stage(LifecycleStage::Destroyed);
        }
    }
}
