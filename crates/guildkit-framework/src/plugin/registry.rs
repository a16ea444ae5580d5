//! Per-scope capability registry.
//!
//! Maps plugin identity to the published public interface of the instance
//! loaded in that scope. Each guild has its own registry; global plugins share
//! one process-wide registry.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use guildkit_core::LookupError;
use parking_lot::RwLock;
use tracing::trace;

use super::definition::PluginKey;
use super::instance::PluginInstance;

/// Type-erased public interface. Holds an `Arc<P>` behind `dyn Any`.
pub type PublicInterface = Arc<dyn Any + Send + Sync>;

struct Published {
    name: String,
    public: Option<PublicInterface>,
}

/// Capability map for one scope, keyed by plugin identity.
#[derive(Default)]
pub struct PluginRegistry {
    entries: RwLock<HashMap<PluginKey, Published>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes an instance, computing its public interface.
    pub fn publish(&self, instance: &dyn PluginInstance) {
        let public = instance.public_interface();
        trace!(plugin = %instance.name(), public = public.is_some(), "Plugin published");
        self.entries.write().insert(
            instance.key(),
            Published {
                name: instance.name().to_string(),
                public,
            },
        );
    }

    /// Removes a published instance.
    pub fn withdraw(&self, key: PluginKey) -> bool {
        self.entries.write().remove(&key).is_some()
    }

    pub fn contains(&self, key: PluginKey) -> bool {
        self.entries.read().contains_key(&key)
    }

    /// Returns the public interface published under `key`, downcast to `P`.
    ///
    /// `name` is only used in error messages.
    pub fn public<P>(&self, key: PluginKey, name: &str) -> Result<Arc<P>, LookupError>
    where
        P: Send + Sync + 'static,
    {
        let public = {
            let entries = self.entries.read();
            let entry = entries.get(&key).ok_or_else(|| LookupError::NotLoaded {
                target: name.to_string(),
            })?;
            entry
                .public
                .clone()
                .ok_or_else(|| LookupError::NoPublicInterface {
                    target: name.to_string(),
                })?
        };
        public.downcast::<P>().map_err(|_| LookupError::TypeMismatch {
            target: name.to_string(),
        })
    }

    /// Names of all published plugins, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().values().map(|e| e.name.clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("plugins", &self.names())
            .finish()
    }
}
