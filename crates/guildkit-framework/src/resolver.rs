//! Dependency resolution.
//!
//! Turns the set of plugins enabled for a scope into a load order that
//! includes every transitive dependency.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::debug;

use crate::error::ConfigurationError;
use crate::plugin::{AnyPlugin, PluginKey, PluginScope};

/// One entry of a resolved load order.
#[derive(Debug, Clone)]
pub struct ResolvedPlugin {
    pub plugin: AnyPlugin,
    /// `false` if the plugin is only loaded to satisfy a dependency.
    pub explicit: bool,
}

/// Plugins discovered while walking the dependency closure, in discovery
/// order.
#[derive(Default)]
struct Closure {
    nodes: Vec<AnyPlugin>,
    index: HashMap<PluginKey, usize>,
    names: HashMap<String, PluginKey>,
}

impl Closure {
    fn discover(&mut self, plugin: &AnyPlugin) -> Result<usize, ConfigurationError> {
        if let Some(&i) = self.index.get(&plugin.key()) {
            return Ok(i);
        }
        if let Some(existing) = self.names.insert(plugin.name().to_string(), plugin.key())
            && existing != plugin.key()
        {
            return Err(ConfigurationError::DuplicateName {
                name: plugin.name().to_string(),
            });
        }
        let i = self.nodes.len();
        self.index.insert(plugin.key(), i);
        self.nodes.push(plugin.clone());
        Ok(i)
    }
}

/// Resolves plugin names and dependency closures for one scope.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    scope: PluginScope,
    plugins: Vec<AnyPlugin>,
}

impl DependencyResolver {
    /// Creates a resolver over the plugins registered for `scope`.
    ///
    /// Fails if two distinct definitions share a name or a plugin belongs to
    /// a different scope.
    pub fn new(
        scope: PluginScope,
        plugins: impl IntoIterator<Item = AnyPlugin>,
    ) -> Result<Self, ConfigurationError> {
        let mut registered: Vec<AnyPlugin> = Vec::new();
        for plugin in plugins {
            if plugin.scope() != scope {
                return Err(ConfigurationError::WrongScope {
                    plugin: plugin.name().to_string(),
                    expected: scope.as_str(),
                });
            }
            if let Some(existing) = registered.iter().find(|p| p.name() == plugin.name()) {
                if existing.key() == plugin.key() {
                    continue;
                }
                return Err(ConfigurationError::DuplicateName {
                    name: plugin.name().to_string(),
                });
            }
            registered.push(plugin);
        }
        Ok(Self {
            scope,
            plugins: registered,
        })
    }

    pub fn scope(&self) -> PluginScope {
        self.scope
    }

    /// Registered plugins, in registration order.
    pub fn plugins(&self) -> &[AnyPlugin] {
        &self.plugins
    }

    pub fn find(&self, name: &str) -> Option<&AnyPlugin> {
        self.plugins.iter().find(|p| p.name() == name)
    }

    /// Resolves enabled plugin names. Unknown names are a configuration
    /// error.
    pub fn resolve_names<I, N>(&self, names: I) -> Result<Vec<ResolvedPlugin>, ConfigurationError>
    where
        I: IntoIterator<Item = N>,
        N: AsRef<str>,
    {
        let requested = names
            .into_iter()
            .map(|name| {
                let name = name.as_ref();
                self.find(name)
                    .cloned()
                    .ok_or_else(|| ConfigurationError::UnknownPlugin {
                        name: name.to_string(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.resolve(&requested)
    }

    /// Resolves `requested` into a load order.
    ///
    /// Every plugin comes after all of its dependencies. Ties are broken by
    /// discovery order: requested plugins in the given order, then
    /// dependencies breadth-first.
    ///
    /// # Errors
    ///
    /// - [`ConfigurationError::DependencyCycle`] if the closure has a cycle.
    /// - [`ConfigurationError::DuplicateName`] if two distinct definitions
    ///   in the closure share a name.
    /// - [`ConfigurationError::ScopeMismatch`] if a dependency edge crosses
    ///   scopes.
    pub fn resolve(
        &self,
        requested: &[AnyPlugin],
    ) -> Result<Vec<ResolvedPlugin>, ConfigurationError> {
        // ─── Transitive closure ──────────────────────────────────────────
        let mut closure = Closure::default();
        let mut explicit: HashSet<PluginKey> = HashSet::new();
        for plugin in requested {
            if plugin.scope() != self.scope {
                return Err(ConfigurationError::WrongScope {
                    plugin: plugin.name().to_string(),
                    expected: self.scope.as_str(),
                });
            }
            explicit.insert(plugin.key());
            closure.discover(plugin)?;
        }

        // An edge d -> i means d loads before i.
        let mut dependents: Vec<Vec<usize>> = Vec::new();
        let mut in_degree: Vec<usize> = Vec::new();
        let mut cursor = 0;
        while cursor < closure.nodes.len() {
            let plugin = closure.nodes[cursor].clone();
            let mut seen = HashSet::new();
            for dependency in plugin.dependencies() {
                if dependency.scope() != plugin.scope() {
                    return Err(ConfigurationError::ScopeMismatch {
                        plugin: plugin.name().to_string(),
                        dependency: dependency.name().to_string(),
                    });
                }
                let d = closure.discover(&dependency)?;
                if !seen.insert(d) {
                    continue;
                }
                if dependents.len() <= d {
                    dependents.resize(d + 1, Vec::new());
                }
                dependents[d].push(cursor);
                if in_degree.len() <= cursor {
                    in_degree.resize(cursor + 1, 0);
                }
                in_degree[cursor] += 1;
            }
            cursor += 1;
        }

        let n = closure.nodes.len();
        dependents.resize(n, Vec::new());
        in_degree.resize(n, 0);

        // ─── Kahn's algorithm, smallest discovery index first ────────────
        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .map(Reverse)
            .collect();
        let mut order: Vec<usize> = Vec::with_capacity(n);
        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &j in &dependents[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.push(Reverse(j));
                }
            }
        }

        if order.len() != n {
            let plugins: Vec<String> = (0..n)
                .filter(|&i| in_degree[i] > 0)
                .map(|i| closure.nodes[i].name().to_string())
                .collect();
            return Err(ConfigurationError::DependencyCycle { plugins });
        }

        let resolved: Vec<ResolvedPlugin> = order
            .into_iter()
            .map(|i| {
                let plugin = closure.nodes[i].clone();
                ResolvedPlugin {
                    explicit: explicit.contains(&plugin.key()),
                    plugin,
                }
            })
            .collect();
        debug!(
            scope = ?self.scope,
            requested = requested.len(),
            resolved = resolved.len(),
            "Plugin dependencies resolved"
        );
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, OnceLock};

    use super::*;
    use crate::plugin::PluginDefinition;

    fn guild(name: &str, deps: Vec<AnyPlugin>) -> AnyPlugin {
        PluginDefinition::<()>::guild(name)
            .depends_on(deps)
            .build()
            .erase()
    }

    fn names(resolved: &[ResolvedPlugin]) -> Vec<(&str, bool)> {
        resolved
            .iter()
            .map(|r| (r.plugin.name(), r.explicit))
            .collect()
    }

    #[test]
    fn test_transitive_dependencies_come_first() {
        let d2 = guild("d2", vec![]);
        let d1 = guild("d1", vec![d2.clone()]);
        let p = guild("p", vec![d1.clone()]);
        let resolver = DependencyResolver::new(PluginScope::Guild, [p, d1, d2]).unwrap();

        let resolved = resolver.resolve_names(["p"]).unwrap();
        assert_eq!(
            names(&resolved),
            vec![("d2", false), ("d1", false), ("p", true)]
        );
    }

    #[test]
    fn test_ties_follow_declaration_order() {
        let shared = guild("shared", vec![]);
        let a = guild("a", vec![shared.clone()]);
        let b = guild("b", vec![]);
        let c = guild("c", vec![shared.clone()]);
        let resolver =
            DependencyResolver::new(PluginScope::Guild, [a, b, c, shared]).unwrap();

        let resolved = resolver.resolve_names(["c", "b", "a"]).unwrap();
        assert_eq!(
            names(&resolved),
            vec![("b", true), ("shared", false), ("c", true), ("a", true)]
        );
    }

    #[test]
    fn test_explicitly_enabled_dependency_stays_explicit() {
        let d = guild("d", vec![]);
        let p = guild("p", vec![d.clone()]);
        let resolver = DependencyResolver::new(PluginScope::Guild, [p, d]).unwrap();

        let resolved = resolver.resolve_names(["p", "d"]).unwrap();
        assert_eq!(names(&resolved), vec![("d", true), ("p", true)]);
    }

    #[test]
    fn test_cycle_is_reported() {
        let b_slot: Arc<OnceLock<AnyPlugin>> = Arc::new(OnceLock::new());
        let slot = b_slot.clone();
        let a = PluginDefinition::<()>::guild("a")
            .dependencies(move || slot.get().cloned().into_iter().collect())
            .build()
            .erase();
        let b = guild("b", vec![a.clone()]);
        let _ = b_slot.set(b.clone());
        let standalone = guild("standalone", vec![]);

        let resolver = DependencyResolver::new(PluginScope::Guild, [a, b, standalone]).unwrap();
        let err = resolver.resolve_names(["standalone", "a"]).unwrap_err();
        match err {
            ConfigurationError::DependencyCycle { plugins } => {
                assert_eq!(plugins, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unknown_and_duplicate_names() {
        let a = guild("a", vec![]);
        let resolver = DependencyResolver::new(PluginScope::Guild, [a.clone()]).unwrap();
        assert!(matches!(
            resolver.resolve_names(["missing"]),
            Err(ConfigurationError::UnknownPlugin { .. })
        ));

        // Registering the same definition twice is harmless.
        assert!(DependencyResolver::new(PluginScope::Guild, [a.clone(), a.clone()]).is_ok());

        let impostor = guild("a", vec![]);
        assert!(matches!(
            DependencyResolver::new(PluginScope::Guild, [a.clone(), impostor.clone()]),
            Err(ConfigurationError::DuplicateName { .. })
        ));

        // A dependency sharing a name with a distinct requested definition.
        let p = guild("p", vec![impostor]);
        let resolver = DependencyResolver::new(PluginScope::Guild, [a, p]).unwrap();
        assert!(matches!(
            resolver.resolve_names(["a", "p"]),
            Err(ConfigurationError::DuplicateName { .. })
        ));
    }

    #[test]
    fn test_cross_scope_dependency_is_rejected() {
        let global = PluginDefinition::<()>::global("cache").build().erase();
        let p = guild("p", vec![global.clone()]);
        let resolver = DependencyResolver::new(PluginScope::Guild, [p]).unwrap();
        assert!(matches!(
            resolver.resolve_names(["p"]),
            Err(ConfigurationError::ScopeMismatch { .. })
        ));
        assert!(matches!(
            DependencyResolver::new(PluginScope::Guild, [global]),
            Err(ConfigurationError::WrongScope { expected: "guild", .. })
        ));
    }
}
