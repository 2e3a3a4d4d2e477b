//! Per-key async mutual exclusion.
//!
//! Used by the SQLite backend to serialize critical sections on a single transaction group inside one process.
//! Entries are removed from the registry by the last guard to leave, so the map only ever holds keys that are
//! currently contended.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use log::*;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Registry = Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>;

#[derive(Clone, Default)]
pub struct KeyedLocks {
    registry: Registry,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until no other guard for `key` is alive, then returns a guard for it.
    pub async fn acquire(&self, key: &str) -> KeyedLockGuard {
        let lock = {
            let mut map = self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            map.entry(key.to_string()).or_default().clone()
        };
        let guard = lock.lock_owned().await;
        trace!("🔒️ Acquired lock on {key}");
        KeyedLockGuard { key: key.to_string(), registry: Arc::clone(&self.registry), guard: Some(guard) }
    }

    /// The number of keys that are locked or waited on.
    pub fn active_keys(&self) -> usize {
        self.registry.lock().map(|m| m.len()).unwrap_or_default()
    }
}

pub struct KeyedLockGuard {
    key: String,
    registry: Registry,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for KeyedLockGuard {
    fn drop(&mut self) {
        let mut map = self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference lives in the map and one in our guard. Anything more is a waiter.
        if map.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) <= 2) {
            map.remove(&self.key);
        }
        drop(self.guard.take());
        trace!("🔒️ Released lock on {}", self.key);
    }
}
