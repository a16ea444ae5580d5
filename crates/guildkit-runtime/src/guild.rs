//! Per-guild load state.
//!
//! Every guild the runtime has heard of owns one [`GuildSlot`]. Signals only
//! flip the slot's desired state; a single driver task per guild performs the
//! transitions one at a time, so load and unload of one guild never overlap.
//!
//! ```text
//!            request_load                  load ok
//! Unloaded ───────────────► Loading ────────────────► Loaded
//!    ▲                         │ load failed              │ request_unload
//!    │◄────────────────────────┘                          ▼
//!    └─────────────────────────────────────────────── Unloading
//! ```

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use guildkit_core::GuildId;
use guildkit_framework::{PluginInstance, PluginRegistry};
use tokio::sync::oneshot;

use crate::error::{RuntimeError, RuntimeResult};

/// Load status of a guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GuildStatus {
    #[default]
    Unloaded,
    /// Queued for a load slot, or running load hooks.
    Loading,
    Loaded,
    /// Draining listeners or running unload hooks.
    Unloading,
}

impl GuildStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GuildStatus::Unloaded => "unloaded",
            GuildStatus::Loading => "loading",
            GuildStatus::Loaded => "loaded",
            GuildStatus::Unloading => "unloading",
        }
    }
}

impl fmt::Display for GuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// LoadedGuild
// =============================================================================

/// The plugin instances of one loaded guild, in load order.
///
/// Cheap to clone. Holding a `LoadedGuild` does not keep the guild loaded;
/// once it unloads, its instances report [`LifecycleStage::Destroyed`].
///
/// [`LifecycleStage::Destroyed`]: guildkit_framework::LifecycleStage::Destroyed
#[derive(Clone)]
pub struct LoadedGuild {
    guild_id: GuildId,
    generation: u64,
    instances: Arc<[Arc<dyn PluginInstance>]>,
    registry: Arc<PluginRegistry>,
}

impl LoadedGuild {
    pub(crate) fn new(
        guild_id: GuildId,
        generation: u64,
        instances: Vec<Arc<dyn PluginInstance>>,
        registry: Arc<PluginRegistry>,
    ) -> Self {
        Self {
            guild_id,
            generation,
            instances: instances.into(),
            registry,
        }
    }

    pub fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    /// Increases with every load of any guild.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Instances in dependency order.
    pub fn instances(&self) -> &[Arc<dyn PluginInstance>] {
        &self.instances
    }

    pub fn plugin_names(&self) -> Vec<&str> {
        self.instances.iter().map(|i| i.name()).collect()
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.instance(name).is_some()
    }

    pub fn instance(&self, name: &str) -> Option<&Arc<dyn PluginInstance>> {
        self.instances.iter().find(|i| i.name() == name)
    }

    /// Whether `name` was enabled directly. `None` if it is not loaded.
    pub fn is_explicit(&self, name: &str) -> Option<bool> {
        self.instance(name).map(|i| i.is_explicit())
    }

    /// Names of the directly enabled plugins.
    pub fn explicit_plugins(&self) -> Vec<&str> {
        self.instances
            .iter()
            .filter(|i| i.is_explicit())
            .map(|i| i.name())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub(crate) fn registry(&self) -> &PluginRegistry {
        &self.registry
    }
}

impl fmt::Debug for LoadedGuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedGuild")
            .field("guild_id", &self.guild_id)
            .field("generation", &self.generation)
            .field("plugins", &self.plugin_names())
            .finish()
    }
}

// =============================================================================
// GuildSlot
// =============================================================================

/// The next transition a guild's driver performs.
pub(crate) enum Step {
    Load(u64),
    Unload(LoadedGuild),
    Settle,
}

#[derive(Default)]
pub(crate) struct GuildSlot {
    status: GuildStatus,
    /// Where the latest signal wants the guild to end up.
    wants_loaded: bool,
    /// A driver task owns the slot's transitions.
    driving: bool,
    loaded: Option<LoadedGuild>,
    load_waiters: Vec<oneshot::Sender<RuntimeResult<()>>>,
    unload_waiters: Vec<oneshot::Sender<()>>,
}

impl GuildSlot {
    pub(crate) fn status(&self) -> GuildStatus {
        self.status
    }

    pub(crate) fn loaded(&self) -> Option<&LoadedGuild> {
        match self.status {
            GuildStatus::Loaded => self.loaded.as_ref(),
            _ => None,
        }
    }

    /// Whether the slot holds nothing and can be discarded.
    pub(crate) fn is_idle(&self) -> bool {
        self.status == GuildStatus::Unloaded && !self.driving
    }

    /// Whether the guild is loaded, or will be once pending work finishes.
    pub(crate) fn is_loaded_and_settled(&self) -> bool {
        self.status == GuildStatus::Loaded && self.wants_loaded && !self.driving
    }

    pub(crate) fn wait_for_load(&mut self) -> oneshot::Receiver<RuntimeResult<()>> {
        let (tx, rx) = oneshot::channel();
        self.load_waiters.push(tx);
        rx
    }

    pub(crate) fn wait_for_unload(&mut self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        self.unload_waiters.push(tx);
        rx
    }

    /// Records a load signal. Returns the first step of a new driver, or
    /// `None` if the signal is a duplicate or a running driver picks it up.
    pub(crate) fn request_load(&mut self, generations: &AtomicU64) -> Option<Step> {
        self.wants_loaded = true;
        self.start_driver(generations)
    }

    /// Records an unload signal. Same contract as
    /// [`request_load`](Self::request_load).
    pub(crate) fn request_unload(&mut self, generations: &AtomicU64) -> Option<Step> {
        self.wants_loaded = false;
        self.start_driver(generations)
    }

    fn start_driver(&mut self, generations: &AtomicU64) -> Option<Step> {
        if self.driving {
            return None;
        }
        match self.advance(generations) {
            Step::Settle => None,
            step => {
                self.driving = true;
                Some(step)
            }
        }
    }

    /// Picks the transition towards the desired state. Called by the driver
    /// between transitions; [`Step::Settle`] ends the driver.
    pub(crate) fn advance(&mut self, generations: &AtomicU64) -> Step {
        match (self.status, self.wants_loaded) {
            (GuildStatus::Unloaded, true) => {
                self.status = GuildStatus::Loading;
                Step::Load(generations.fetch_add(1, Ordering::Relaxed) + 1)
            }
            (GuildStatus::Loaded, false) => match self.loaded.take() {
                Some(loaded) => {
                    self.status = GuildStatus::Unloading;
                    Step::Unload(loaded)
                }
                None => {
                    self.status = GuildStatus::Unloaded;
                    Step::Settle
                }
            },
            _ => Step::Settle,
        }
    }

    /// A load finished. A failed load is not retried until the next signal.
    pub(crate) fn finish_load(&mut self, result: RuntimeResult<LoadedGuild>) {
        let outcome = match result {
            Ok(loaded) => {
                self.status = GuildStatus::Loaded;
                self.loaded = Some(loaded);
                Ok(())
            }
            Err(e) => {
                self.status = GuildStatus::Unloaded;
                self.wants_loaded = false;
                Err(e)
            }
        };
        for waiter in self.load_waiters.drain(..) {
            let _ = waiter.send(outcome.clone());
        }
    }

    pub(crate) fn finish_unload(&mut self) {
        self.status = GuildStatus::Unloaded;
        self.loaded = None;
        for waiter in self.unload_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    /// The driver exits. Waiters whose transition never happened are
    /// released.
    pub(crate) fn settle(&mut self, guild_id: GuildId) {
        self.driving = false;
        for waiter in self.load_waiters.drain(..) {
            let outcome = match self.status {
                GuildStatus::Loaded => Ok(()),
                _ => Err(RuntimeError::Superseded { guild_id }),
            };
            let _ = waiter.send(outcome);
        }
        for waiter in self.unload_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(generation: u64) -> LoadedGuild {
        LoadedGuild::new(
            GuildId(1),
            generation,
            Vec::new(),
            Arc::new(PluginRegistry::new()),
        )
    }

    #[test]
    fn test_duplicate_load_signals_start_one_driver() {
        let generations = AtomicU64::new(0);
        let mut slot = GuildSlot::default();

        assert!(matches!(slot.request_load(&generations), Some(Step::Load(1))));
        assert_eq!(slot.status(), GuildStatus::Loading);
        assert!(slot.request_load(&generations).is_none());
        assert!(slot.request_load(&generations).is_none());

        slot.finish_load(Ok(loaded(1)));
        assert!(matches!(slot.advance(&generations), Step::Settle));
        slot.settle(GuildId(1));
        assert_eq!(slot.status(), GuildStatus::Loaded);
        assert!(slot.request_load(&generations).is_none());
        assert_eq!(generations.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_unload_during_load_runs_after_load() {
        let generations = AtomicU64::new(0);
        let mut slot = GuildSlot::default();
        let first = slot.request_load(&generations);
        assert!(first.is_some());

        // The driver is busy; the signal is only recorded.
        assert!(slot.request_unload(&generations).is_none());
        assert_eq!(slot.status(), GuildStatus::Loading);

        slot.finish_load(Ok(loaded(1)));
        assert!(matches!(slot.advance(&generations), Step::Unload(_)));
        assert_eq!(slot.status(), GuildStatus::Unloading);
        assert!(slot.loaded().is_none());

        slot.finish_unload();
        assert!(matches!(slot.advance(&generations), Step::Settle));
        slot.settle(GuildId(1));
        assert!(slot.is_idle());
    }

    #[test]
    fn test_load_during_unload_is_deferred() {
        let generations = AtomicU64::new(0);
        let mut slot = GuildSlot::default();
        slot.request_load(&generations);
        slot.finish_load(Ok(loaded(1)));
        slot.settle(GuildId(1));

        assert!(matches!(slot.request_unload(&generations), Some(Step::Unload(_))));
        assert!(slot.request_load(&generations).is_none());
        slot.finish_unload();
        assert!(matches!(slot.advance(&generations), Step::Load(2)));
    }

    #[test]
    fn test_failed_load_is_not_retried() {
        let generations = AtomicU64::new(0);
        let mut slot = GuildSlot::default();
        slot.request_load(&generations);
        let mut waiter = slot.wait_for_load();

        slot.finish_load(Err(RuntimeError::NotInitialized));
        assert!(matches!(waiter.try_recv(), Ok(Err(RuntimeError::NotInitialized))));
        assert!(matches!(slot.advance(&generations), Step::Settle));
        slot.settle(GuildId(1));
        assert!(slot.is_idle());
    }

    #[test]
    fn test_superseded_load_releases_waiters() {
        let generations = AtomicU64::new(0);
        let mut slot = GuildSlot::default();
        slot.request_load(&generations);
        slot.finish_load(Ok(loaded(1)));
        slot.settle(GuildId(1));

        slot.request_unload(&generations);
        slot.request_load(&generations);
        let mut waiter = slot.wait_for_load();
        slot.request_unload(&generations);
        slot.finish_unload();
        assert!(matches!(slot.advance(&generations), Step::Settle));
        slot.settle(GuildId(7));
        assert!(matches!(
            waiter.try_recv(),
            Ok(Err(RuntimeError::Superseded { guild_id: GuildId(7) }))
        ));
    }
}
