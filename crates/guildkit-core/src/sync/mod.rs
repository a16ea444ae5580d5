//! Coordination primitives scoped to a single plugin instance.

mod cooldown;
mod lock;

pub use cooldown::CooldownManager;
pub use lock::{Lock, LockManager};
