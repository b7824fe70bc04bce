//! Per-key serialisation of first submissions.
//!
//! Two submissions with the same idempotency key queue on one async mutex;
//! different keys never contend. An entry lives only while someone holds or
//! waits for it.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub(crate) struct InFlight<K> {
    keys: Mutex<HashMap<K, Arc<AsyncMutex<()>>>>,
}

/// Held while the owning submission decides; releasing it admits the next one.
pub(crate) struct InFlightGuard<'a, K: Eq + Hash> {
    owner: &'a InFlight<K>,
    key: K,
    lock: Option<OwnedMutexGuard<()>>,
}

impl<K: Eq + Hash + Clone> InFlight<K> {
    pub(crate) fn new() -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn acquire(&self, key: K) -> InFlightGuard<'_, K> {
        let entry = {
            let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(keys.entry(key.clone()).or_default())
        };
        let lock = entry.lock_owned().await;
        InFlightGuard {
            owner: self,
            key,
            lock: Some(lock),
        }
    }

    /// Keys currently held or waited on.
    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<K: Eq + Hash> Drop for InFlightGuard<'_, K> {
    fn drop(&mut self) {
        // clones are only taken under the map lock, so the count is stable here
        let mut keys = self
            .owner
            .keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.lock.take();
        let idle = keys
            .get(&self.key)
            .is_some_and(|entry| Arc::strong_count(entry) == 1);
        if idle {
            keys.remove(&self.key);
        }
    }
}
