//! Per-key serialization.
//!
//! Two pushes for the same record both read-modify-write the same cloud
//! copy and chain pointers, so at most one may run per uuid. A `KeyedLock`
//! hands out one async mutex per key and forgets the key once the last
//! guard is dropped.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Slots<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

fn slots_of<K>(slots: &Slots<K>) -> MutexGuard<'_, HashMap<K, Arc<AsyncMutex<()>>>> {
    slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A set of async mutexes addressed by key.
pub struct KeyedLock<K> {
    slots: Slots<K>,
}

impl<K> Default for KeyedLock<K> {
    fn default() -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<K: Eq + Hash + Clone> KeyedLock<K> {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &K) -> Arc<AsyncMutex<()>> {
        slots_of(&self.slots)
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Waits until no other guard holds `key`, then holds it.
    pub async fn lock(&self, key: K) -> KeyedGuard<K> {
        let guard = self.slot(&key).lock_owned().await;
        KeyedGuard {
            key,
            slots: self.slots.clone(),
            guard: Some(guard),
        }
    }

    /// Holds `key` if nobody else does; returns `None` otherwise.
    pub fn try_lock(&self, key: K) -> Option<KeyedGuard<K>> {
        let guard = self.slot(&key).try_lock_owned().ok()?;
        Some(KeyedGuard {
            key,
            slots: self.slots.clone(),
            guard: Some(guard),
        })
    }

    /// Number of keys currently held or waited on.
    pub fn active_keys(&self) -> usize {
        slots_of(&self.slots).len()
    }
}

/// Holds one key of a [`KeyedLock`] until dropped.
#[derive(Debug)]
pub struct KeyedGuard<K: Eq + Hash> {
    key: K,
    slots: Slots<K>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash> KeyedGuard<K> {
    pub fn key(&self) -> &K {
        &self.key
    }
}

impl<K: Eq + Hash> Drop for KeyedGuard<K> {
    fn drop(&mut self) {
        drop(self.guard.take());
        let mut slots = slots_of(&self.slots);
        // Only the map still references the slot: nobody holds or awaits it.
        if slots
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.key);
        }
    }
}
