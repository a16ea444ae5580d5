//! Unified error types for the guildkit core.
//!
//! Plugin-level errors (configuration, hook failures) live in
//! `guildkit-framework`; runtime errors live in `guildkit-runtime`.

use std::time::Duration;

use thiserror::Error;

/// Type-erased error returned by user-supplied hooks, listeners and predicates.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

// =============================================================================
// Lookup Errors
// =============================================================================

/// Errors raised by cross-plugin lookups (`has_plugin` / `get_plugin`).
///
/// Lookups fail fast rather than returning stale or missing data.
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    /// The calling instance is in a lifecycle stage where its dependencies are
    /// not guaranteed to exist.
    #[error("plugin lookups are unavailable during `{stage}` (called from plugin '{plugin}')")]
    UnavailableInStage {
        /// The calling plugin.
        plugin: String,
        /// The stage the caller is in.
        stage: &'static str,
    },

    /// The requested plugin is not loaded in the caller's scope.
    #[error("plugin '{target}' is not loaded in this scope")]
    NotLoaded {
        /// The requested plugin.
        target: String,
    },

    /// The requested plugin is loaded but declares no public interface.
    #[error("plugin '{target}' does not expose a public interface")]
    NoPublicInterface {
        /// The requested plugin.
        target: String,
    },

    /// The requested plugin is loaded but its public interface has a
    /// different type than the one requested.
    #[error("public interface of plugin '{target}' has an unexpected type")]
    TypeMismatch {
        /// The requested plugin.
        target: String,
    },
}

// =============================================================================
// Lock Errors
// =============================================================================

/// Errors that can occur while acquiring a [`Lock`](crate::Lock).
#[derive(Debug, Clone, Error)]
pub enum LockError {
    /// The lock could not be acquired within the given timeout.
    #[error("timed out after {timeout:?} waiting for lock '{key}'")]
    Timeout {
        /// The contended key.
        key: String,
        /// How long the caller waited.
        timeout: Duration,
    },
}

// =============================================================================
// Entity Errors
// =============================================================================

/// Returned when a string cannot be parsed as an entity identifier.
#[derive(Debug, Clone, Error)]
#[error("invalid entity id: '{0}'")]
pub struct EntityIdError(pub String);
