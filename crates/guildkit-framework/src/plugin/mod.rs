//! Plugin definitions, instances and the per-scope capability registry.
//!
//! # Architecture
//!
//! - A [`PluginDefinition`] is the immutable declaration an integrator
//!   builds once: name, scope, dependencies, config schema, lifecycle hooks,
//!   commands, event listeners, custom override criteria and the public
//!   interface factory. [`AnyPlugin`] is its type-erased handle.
//! - A [`PluginInstance`] is created from a definition for every scope the
//!   plugin is loaded in (each guild, or once for the global scope). Plugin
//!   code sees the instance as an `Arc<PluginData<S>>`.
//! - A [`PluginRegistry`] maps plugin identity to the public interfaces of
//!   the instances loaded in one scope. Lookups go through
//!   [`PluginData::get_plugin`] and are keyed by definition identity, never
//!   by name.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use guildkit::prelude::*;
//!
//! #[derive(Default)]
//! struct Counter(AtomicUsize);
//!
//! pub struct CounterApi(Arc<PluginData<Counter>>);
//!
//! impl CounterApi {
//!     pub fn count(&self) -> usize {
//!         self.0.state().0.load(Ordering::SeqCst)
//!     }
//! }
//!
//! let counter = PluginDefinition::<Counter, CounterApi>::guild("counter")
//!     .event(|data, _: MessageCreate| async move {
//!         data.state().0.fetch_add(1, Ordering::SeqCst);
//!         Ok(())
//!     })
//!     .public(CounterApi)
//!     .build();
//! ```

// ─── Submodules ──────────────────────────────────────────────────────────────
mod data;
mod definition;
mod instance;
mod registry;

// ─── Re-exports from submodules ──────────────────────────────────────────────
pub use data::PluginData;
pub use definition::{AnyPlugin, PluginBuilder, PluginDefinition, PluginKey, PluginRef, PluginScope};
pub use instance::{InstanceContext, PluginInstance};
pub use registry::{PluginRegistry, PublicInterface};
