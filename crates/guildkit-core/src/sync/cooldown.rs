//! Keyed cooldown tracking.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Maps keys to expiry instants.
///
/// A key is on cooldown while `now < expiry`. Expired entries behave exactly
/// like absent ones and are dropped lazily on access or by
/// [`purge_expired`](Self::purge_expired).
///
/// Uses [`tokio::time::Instant`] so that cooldowns follow tokio's clock,
/// including when time is paused in tests.
#[derive(Debug, Clone, Default)]
pub struct CooldownManager {
    entries: Arc<Mutex<HashMap<String, Instant>>>,
}

impl CooldownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if `key` has an expiry later than `now`.
    pub fn is_on_cooldown(&self, key: &str, now: Instant) -> bool {
        self.remaining(key, now).is_some()
    }

    /// Puts `key` on cooldown until `expiry`, replacing any previous expiry.
    pub fn set(&self, key: impl Into<String>, expiry: Instant) {
        self.entries.lock().insert(key.into(), expiry);
    }

    /// Puts `key` on cooldown for `duration` starting now.
    pub fn set_for(&self, key: impl Into<String>, duration: Duration) {
        self.set(key, Instant::now() + duration);
    }

    /// Time left on `key`'s cooldown, or `None` if it is not on cooldown.
    pub fn remaining(&self, key: &str, now: Instant) -> Option<Duration> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(&expiry) if now < expiry => Some(expiry - now),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    /// Removes `key`'s cooldown. Returns `true` if it was on cooldown.
    pub fn clear(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Drops every entry that has expired at `now`; returns how many were
    /// dropped.
    pub fn purge_expired(&self, now: Instant) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, expiry| now < *expiry);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let cooldowns = CooldownManager::new();
        let start = Instant::now();
        let expiry = start + Duration::from_secs(10);
        cooldowns.set("user:1", expiry);

        assert!(cooldowns.is_on_cooldown("user:1", start));
        assert!(cooldowns.is_on_cooldown("user:1", expiry - Duration::from_millis(1)));
        assert!(!cooldowns.is_on_cooldown("user:1", expiry));
        // Expired entries are logically absent.
        assert!(cooldowns.is_empty());
    }

    #[test]
    fn test_remaining_and_clear() {
        let cooldowns = CooldownManager::new();
        let now = Instant::now();
        cooldowns.set("k", now + Duration::from_secs(3));

        assert_eq!(cooldowns.remaining("k", now), Some(Duration::from_secs(3)));
        assert_eq!(cooldowns.remaining("missing", now), None);
        assert!(cooldowns.clear("k"));
        assert!(!cooldowns.clear("k"));
        assert!(!cooldowns.is_on_cooldown("k", now));
    }

    #[test]
    fn test_purge_expired() {
        let cooldowns = CooldownManager::new();
        let now = Instant::now();
        cooldowns.set("old", now);
        cooldowns.set("fresh", now + Duration::from_secs(60));

        assert_eq!(cooldowns.purge_expired(now), 1);
        assert_eq!(cooldowns.len(), 1);
        assert!(cooldowns.is_on_cooldown("fresh", now));
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_for_follows_tokio_clock() {
        let cooldowns = CooldownManager::new();
        cooldowns.set_for("cmd", Duration::from_secs(5));
        assert!(cooldowns.is_on_cooldown("cmd", Instant::now()));

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(!cooldowns.is_on_cooldown("cmd", Instant::now()));
    }
}
