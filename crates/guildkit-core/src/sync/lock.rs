//! Keyed mutual exclusion.
//!
//! Each key maps to a fair tokio mutex, so concurrent [`LockManager::acquire`]
//! calls on the same key are granted in the order they started waiting.
//! Entries are created on demand and removed again once no holder or waiter
//! references them, keeping the map bounded by the number of contended keys.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

use crate::error::LockError;

type Slot = Arc<AsyncMutex<()>>;

#[derive(Default)]
struct Inner {
    slots: Mutex<HashMap<String, Slot>>,
}

impl Inner {
    fn slot(&self, key: &str) -> Slot {
        self.slots
            .lock()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Drops the map entry for `key` when only the map still references it.
    fn release(&self, key: &str) {
        let mut slots = self.slots.lock();
        if let Some(slot) = slots.get(key)
            && Arc::strong_count(slot) == 1
        {
            slots.remove(key);
        }
    }
}

/// Per-instance keyed lock registry.
///
/// Cheap to clone; clones share the same keys.
#[derive(Clone, Default)]
pub struct LockManager {
    inner: Arc<Inner>,
}

impl LockManager {
    /// Creates an empty lock manager.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `key`, waiting behind earlier acquirers.
    ///
    /// Dropping the returned future before it completes gives up the place
    /// in the queue and forgets the key if nobody else references it.
    pub async fn acquire(&self, key: impl Into<String>) -> Lock {
        let mut waiting = Waiting {
            key: Some(key.into()),
            manager: &self.inner,
        };
        let slot = self.inner.slot(waiting.key());
        let guard = slot.lock_owned().await;
        let key = waiting.key.take().unwrap_or_default();
        trace!(key = %key, "Lock acquired");
        Lock::new(key, guard, &self.inner)
    }

    /// Acquires the lock for `key`, giving up after `timeout`.
    pub async fn acquire_with_timeout(
        &self,
        key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Lock, LockError> {
        let key = key.into();
        tokio::time::timeout(timeout, self.acquire(key.clone()))
            .await
            .map_err(|_| LockError::Timeout { key, timeout })
    }

    /// Acquires several keys at once.
    ///
    /// Keys are deduplicated and taken in sorted order, so two callers
    /// acquiring overlapping key sets cannot deadlock each other.
    pub async fn acquire_all<I, K>(&self, keys: I) -> Vec<Lock>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();

        let mut locks = Vec::with_capacity(keys.len());
        for key in keys {
            locks.push(self.acquire(key).await);
        }
        locks
    }

    /// Returns `true` if `key` is currently held.
    pub fn is_locked(&self, key: &str) -> bool {
        self.inner
            .slots
            .lock()
            .get(key)
            .is_some_and(|slot| slot.try_lock().is_err())
    }

    /// Number of keys currently held or waited on.
    pub fn active_keys(&self) -> usize {
        self.inner.slots.lock().len()
    }
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("active_keys", &self.active_keys())
            .finish()
    }
}

/// An [`LockManager::acquire`] call that has not been granted yet.
struct Waiting<'a> {
    key: Option<String>,
    manager: &'a Inner,
}

impl Waiting<'_> {
    fn key(&self) -> &str {
        self.key.as_deref().unwrap_or_default()
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        // Only reached with a key when the acquire was cancelled. The pending
        // `lock_owned` future and its slot clone are dropped first.
        if let Some(key) = self.key.take() {
            self.manager.release(&key);
            trace!(key = %key, "Lock wait cancelled");
        }
    }
}

/// A held lock. Released when dropped (or via [`Lock::release`]).
pub struct Lock {
    key: String,
    guard: Option<OwnedMutexGuard<()>>,
    manager: Arc<Inner>,
}

impl Lock {
    fn new(key: String, guard: OwnedMutexGuard<()>, manager: &Arc<Inner>) -> Self {
        Self {
            key,
            guard: Some(guard),
            manager: manager.clone(),
        }
    }

    /// The key this lock holds.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Releases the lock explicitly.
    pub fn release(self) {}
}

impl Drop for Lock {
    fn drop(&mut self) {
        // The guard owns a clone of the slot; drop it before checking the
        // reference count.
        self.guard.take();
        self.manager.release(&self.key);
        trace!(key = %self.key, "Lock released");
    }
}

impl fmt::Debug for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lock").field("key", &self.key).finish()
    }
}
